use anyhow::Result;
use log::debug;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::application::PackageManager;
use crate::cleanup::{self, SharedCleanupContext};
use crate::config::{EngineConfig, default_packages_root};
use crate::runtime::Runtime;

/// Settings shared by every CLI command.
#[derive(Debug, Clone)]
pub struct Config {
    pub packages_root: PathBuf,
    pub system_version: Option<String>,
    pub features: Vec<String>,
    /// Sandbox paths an interrupt handler must remove.
    pub cleanup: SharedCleanupContext,
    pub cancel: CancellationToken,
}

impl Config {
    pub fn new<R: Runtime>(
        runtime: &R,
        packages_root: Option<PathBuf>,
        system_version: Option<String>,
        features: Vec<String>,
    ) -> Result<Self> {
        let packages_root = default_packages_root(runtime, packages_root.as_deref())?;
        debug!("Using packages root: {:?}", packages_root);
        Ok(Self {
            packages_root,
            system_version,
            features,
            cleanup: cleanup::new_shared(),
            cancel: CancellationToken::new(),
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        let config = EngineConfig::new(&self.packages_root).with_features(self.features.clone());
        match &self.system_version {
            Some(version) => config.with_system_version(version.clone()),
            None => config,
        }
    }

    pub fn manager<'a, R: Runtime>(&self, runtime: &'a R) -> Result<PackageManager<'a, R>> {
        Ok(PackageManager::new(runtime, self.engine_config())?
            .with_cleanup_context(self.cleanup.clone())
            .with_cancellation(self.cancel.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;

    #[test]
    fn test_explicit_root_and_overrides() {
        let runtime = MockRuntime::new();
        let config = Config::new(
            &runtime,
            Some(PathBuf::from("/data/pkgs")),
            Some("2.0.0".into()),
            vec!["voice".into()],
        )
        .unwrap();

        let engine = config.engine_config();
        assert_eq!(engine.packages_root, PathBuf::from("/data/pkgs"));
        assert_eq!(engine.system_version, "2.0.0");
        assert!(engine.supports_feature("voice"));
    }

    #[test]
    fn test_default_system_version_is_crate_version() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_data_dir()
            .returning(|| Some(PathBuf::from("/home/user/.local/share")));

        let config = Config::new(&runtime, None, None, vec![]).unwrap();
        assert_eq!(
            config.packages_root,
            PathBuf::from("/home/user/.local/share/charpack")
        );
        assert_eq!(
            config.engine_config().system_version,
            env!("CARGO_PKG_VERSION")
        );
    }
}
