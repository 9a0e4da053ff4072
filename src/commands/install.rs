use anyhow::Result;
use log::debug;
use std::path::Path;

use crate::application::InstallationResult;
use crate::runtime::Runtime;

use super::{Config, print_json, report_failure};

/// Install a package archive.
#[tracing::instrument(skip(runtime, config))]
pub async fn install<R: Runtime>(
    runtime: &R,
    archive: &Path,
    json: bool,
    config: Config,
) -> Result<()> {
    debug!("Installing {:?}", archive);
    let manager = config.manager(runtime)?;

    match manager.install(archive).await {
        Ok(result) if json => print_json(&result),
        Ok(result) => {
            print_installation(&result);
            Ok(())
        }
        Err(e) if json => {
            let subject = archive
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            print_json(&InstallationResult::from_error(&subject, &e))?;
            Err(e.into())
        }
        Err(e) => report_failure("install", &archive.display().to_string(), e),
    }
}

fn print_installation(result: &InstallationResult) {
    println!("Installed {} {}", result.package_id, result.version);
    println!("  {} file(s)", result.installed_assets.len());
    for warning in &result.warnings {
        println!("  warning: {}", warning);
    }
    if result.requires_restart {
        println!("A restart is required to finish the installation.");
    }
}
