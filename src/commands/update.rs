use anyhow::Result;
use log::debug;
use std::path::Path;

use crate::application::UpdateResult;
use crate::runtime::Runtime;

use super::{Config, report_failure};

/// Update an installed package from an archive, or from its staged update.
#[tracing::instrument(skip(runtime, config))]
pub async fn update<R: Runtime>(
    runtime: &R,
    package_id: &str,
    archive: Option<&Path>,
    config: Config,
) -> Result<()> {
    debug!("Updating {} from {:?}", package_id, archive);
    let manager = config.manager(runtime)?;

    match manager.update(package_id, archive).await {
        Ok(result) => {
            print_update(&result);
            Ok(())
        }
        Err(e) => report_failure("update", package_id, e),
    }
}

fn print_update(result: &UpdateResult) {
    println!(
        "Updated {} {} -> {}",
        result.package_id, result.old_version, result.new_version
    );
    for change in &result.changes {
        println!("  {}", change);
    }
    for warning in &result.warnings {
        println!("  warning: {}", warning);
    }
    if result.requires_restart {
        println!("A restart is required to finish the update.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{MockRuntime, RealRuntime};
    use crate::test_utils::PackageFixture;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_update_from_staged_archive() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("pkgs");
        let config =
            Config::new(&MockRuntime::new(), Some(root.clone()), None, vec![]).unwrap();
        let v1 = PackageFixture::new("hero", "1.0.0").write(dir.path(), "hero-1.zip");
        config.manager(&RealRuntime).unwrap().install(&v1).await.unwrap();
        PackageFixture::new("hero", "1.1.0").write(&root.join("updates"), "hero.zip");

        update(&RealRuntime, "hero", None, config.clone()).await.unwrap();
        let info = config
            .manager(&RealRuntime)
            .unwrap()
            .get_package_info("hero")
            .unwrap();
        assert_eq!(info.version, "1.1.0");
    }

    #[tokio::test]
    async fn test_update_unknown_package_fails() {
        let dir = tempdir().unwrap();
        let config = Config::new(
            &MockRuntime::new(),
            Some(dir.path().join("pkgs")),
            None,
            vec![],
        )
        .unwrap();
        let archive = PackageFixture::new("ghost", "1.0.0").write(dir.path(), "ghost.zip");

        assert!(
            update(&RealRuntime, "ghost", Some(&archive), config)
                .await
                .is_err()
        );
    }
}
