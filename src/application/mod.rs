//! Application layer - the package manager and its operations.
//!
//! [`PackageManager`] owns the registry handle, the per-package locks and
//! the observers, and coordinates archive checks, extraction, scanning and
//! registry updates for each public operation:
//!
//! - `install` - verify an archive and install it into a fresh sandbox
//! - `update` - replace an installed package, rolling back on failure
//! - `uninstall` - remove a package nothing else depends on
//! - `get_package_info` / `list_installed_packages` / `mark_used`

mod install;
mod query;
mod uninstall;
mod update;

use anyhow::Result;
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::cleanup::{self, SharedCleanupContext};
use crate::config::EngineConfig;
use crate::events::{LoggingObserver, PackageEvent, PackageObserver};
use crate::lock::InstallLocks;
use crate::package::RegistryStore;
use crate::runtime::Runtime;

pub use install::InstallationResult;
pub use query::PackageInfo;
pub use update::UpdateResult;

/// Subdirectories created in every sandbox before extraction.
pub const SANDBOX_DIRS: &[&str] = &["assets", "configurations", "thumbnails"];

pub struct PackageManager<'a, R: Runtime> {
    runtime: &'a R,
    config: EngineConfig,
    registry: RegistryStore<'a, R>,
    locks: InstallLocks,
    observers: Vec<Arc<dyn PackageObserver>>,
    cleanup: SharedCleanupContext,
    cancel: CancellationToken,
}

impl<'a, R: Runtime> PackageManager<'a, R> {
    /// Open the registry under `config.packages_root` and build a manager
    /// that logs every lifecycle event.
    #[tracing::instrument(skip(runtime, config), fields(root = ?config.packages_root))]
    pub fn new(runtime: &'a R, config: EngineConfig) -> Result<Self> {
        let registry = RegistryStore::open(runtime, config.registry_path())?;
        debug!(
            "Loaded registry with {} package(s) from {:?}",
            registry.list().len(),
            registry.path()
        );
        Ok(Self {
            runtime,
            config,
            registry,
            locks: InstallLocks::new(),
            observers: vec![Arc::new(LoggingObserver)],
            cleanup: cleanup::new_shared(),
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn PackageObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Share a cleanup context with an interrupt handler.
    pub fn with_cleanup_context(mut self, cleanup: SharedCleanupContext) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn emit(&self, event: PackageEvent) {
        for observer in &self.observers {
            observer.notify(&event);
        }
    }

    /// Remove a sandbox directory after a failure. Best effort: a failure
    /// here is logged and must not mask the original error.
    fn discard_sandbox(&self, sandbox: &Path) {
        if !self.runtime.exists(sandbox) {
            return;
        }
        match self.runtime.remove_dir_all(sandbox) {
            Ok(()) => debug!("Removed sandbox {:?}", sandbox),
            Err(e) => warn!("Failed to remove sandbox {:?}: {:#}", sandbox, e),
        }
    }

    /// Relative paths (with `/` separators) of every file under `root`.
    fn list_files(&self, root: &Path) -> Result<Vec<String>> {
        let mut files = Vec::new();
        let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];
        while let Some(dir) = pending.pop() {
            for path in self.runtime.read_dir(&dir)? {
                if self.runtime.is_dir(&path) {
                    pending.push(path);
                } else {
                    files.push(relative_name(root, &path));
                }
            }
        }
        files.sort();
        Ok(files)
    }
}

fn relative_name(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Archive file stem, used to name a package whose manifest is unreadable.
fn archive_stem(archive_path: &Path) -> String {
    archive_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| archive_path.display().to_string())
}
