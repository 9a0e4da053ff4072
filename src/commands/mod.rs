//! CLI command handlers. Each one builds a [`PackageManager`] from the
//! shared [`Config`], runs one operation and prints the outcome.
//!
//! [`PackageManager`]: crate::application::PackageManager

use anyhow::Result;

use crate::error::PackageError;

pub mod config;
mod install;
mod list;
mod show;
mod uninstall;
mod update;

pub use config::Config;
pub use install::install;
pub use list::list;
pub use show::{mark_used, show};
pub use uninstall::uninstall;
pub use update::update;

/// Print every issue an error carries, then hand it back to `main`.
fn report_failure(action: &str, subject: &str, error: PackageError) -> Result<()> {
    eprintln!("Failed to {} {}:", action, subject);
    for issue in error.issues() {
        eprintln!("  - {}", issue);
    }
    Err(error.into())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
