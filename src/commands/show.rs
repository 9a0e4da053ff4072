use anyhow::{Result, bail};

use crate::application::PackageInfo;
use crate::runtime::Runtime;

use super::{Config, print_json, report_failure};

/// Show detailed information about a package
#[tracing::instrument(skip(runtime, config))]
pub fn show<R: Runtime>(runtime: &R, package_id: &str, json: bool, config: Config) -> Result<()> {
    let manager = config.manager(runtime)?;
    let Some(info) = manager.get_package_info(package_id) else {
        bail!("Package {} is not installed", package_id);
    };

    if json {
        print_json(&info)
    } else {
        print_info(&info);
        Ok(())
    }
}

/// Record that a package was just used.
#[tracing::instrument(skip(runtime, config))]
pub fn mark_used<R: Runtime>(runtime: &R, package_id: &str, config: Config) -> Result<()> {
    let manager = config.manager(runtime)?;
    match manager.mark_used(package_id) {
        Ok(()) => Ok(()),
        Err(e) => report_failure("mark", package_id, e),
    }
}

fn print_info(info: &PackageInfo) {
    match &info.name {
        Some(name) => println!("Package: {} ({})", info.package_id, name),
        None => println!("Package: {}", info.package_id),
    }
    println!("Version: {}", info.version);
    println!("Author: {}", info.author);
    println!("Path: {}", info.install_path.display());
    println!("Installed: {}", info.installed_at.to_rfc3339());
    if let Some(last_used) = info.last_used {
        println!("Last used: {}", last_used.to_rfc3339());
    }
    if let Some(rating) = &info.age_rating {
        println!("Age rating: {}", rating);
    }
    if !info.dependencies.is_empty() {
        println!("Dependencies: {}", info.dependencies.join(", "));
    }
    if let Some(description) = &info.description
        && !description.is_empty()
    {
        println!("\n{}", description);
    }
}
