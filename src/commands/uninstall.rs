use anyhow::Result;

use crate::runtime::Runtime;

use super::{Config, report_failure};

/// Uninstall a package that no other package depends on.
#[tracing::instrument(skip(runtime, config))]
pub async fn uninstall<R: Runtime>(runtime: &R, package_id: &str, config: Config) -> Result<()> {
    let manager = config.manager(runtime)?;
    match manager.uninstall(package_id).await {
        Ok(()) => {
            println!("Uninstalled {}", package_id);
            Ok(())
        }
        Err(e) => report_failure("uninstall", package_id, e),
    }
}
