use anyhow::Result;
use log::debug;

use crate::runtime::Runtime;

use super::{Config, print_json};

/// List all installed packages
#[tracing::instrument(skip(runtime, config))]
pub fn list<R: Runtime>(runtime: &R, json: bool, config: Config) -> Result<()> {
    let manager = config.manager(runtime)?;
    let packages = manager.list_installed_packages();
    debug!("Found {} package(s)", packages.len());

    if json {
        return print_json(&packages);
    }
    if packages.is_empty() {
        println!("No packages installed.");
        return Ok(());
    }
    for package in packages {
        let state = if package.is_active { "" } else { " (inactive)" };
        println!("{} {}{}", package.package_id, package.version, state);
    }
    Ok(())
}
