//! Engine configuration: filesystem roots, resource ceilings and the
//! capabilities of the host system packages are checked against.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::runtime::Runtime;

/// Largest archive accepted before any decompression.
pub const DEFAULT_MAX_ARCHIVE_SIZE: u64 = 100 * 1024 * 1024;
/// Largest total uncompressed size across all archive entries.
pub const DEFAULT_MAX_UNCOMPRESSED_SIZE: u64 = 512 * 1024 * 1024;
pub const DEFAULT_MAX_ENTRY_COUNT: usize = 10_000;
/// Triangle count above which a performance warning is raised.
pub const DEFAULT_MAX_TRIANGLE_COUNT: u64 = 50_000;
/// Declared asset size above which a performance warning is raised.
pub const DEFAULT_MAX_ASSET_SIZE: u64 = 50 * 1024 * 1024;

/// Name of the registry document under the packages root.
pub const REGISTRY_FILE: &str = "registry.json";
/// Temporary sibling the registry is written to before the rename.
pub const REGISTRY_TMP_FILE: &str = "registry.json.tmp";

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub packages_root: PathBuf,
    /// Staged archives picked up by `update` when no archive path is given.
    pub updates_dir: PathBuf,
    /// Pre-update snapshots of install directories.
    pub backups_dir: PathBuf,
    /// Version of the host system, compared to each manifest's
    /// `minSystemVersion`/`maxSystemVersion`.
    pub system_version: String,
    pub supported_features: Vec<String>,
    pub max_archive_size: u64,
    pub max_uncompressed_size: u64,
    pub max_entry_count: usize,
    pub max_triangle_count: u64,
    pub max_asset_size: u64,
}

impl EngineConfig {
    /// Configuration with default limits rooted at `packages_root`.
    pub fn new(packages_root: impl Into<PathBuf>) -> Self {
        let packages_root = packages_root.into();
        Self {
            updates_dir: packages_root.join("updates"),
            backups_dir: packages_root.join(".backups"),
            packages_root,
            system_version: env!("CARGO_PKG_VERSION").to_string(),
            supported_features: Vec::new(),
            max_archive_size: DEFAULT_MAX_ARCHIVE_SIZE,
            max_uncompressed_size: DEFAULT_MAX_UNCOMPRESSED_SIZE,
            max_entry_count: DEFAULT_MAX_ENTRY_COUNT,
            max_triangle_count: DEFAULT_MAX_TRIANGLE_COUNT,
            max_asset_size: DEFAULT_MAX_ASSET_SIZE,
        }
    }

    pub fn with_system_version(mut self, version: impl Into<String>) -> Self {
        self.system_version = version.into();
        self
    }

    pub fn with_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supported_features = features.into_iter().map(Into::into).collect();
        self
    }

    pub fn registry_path(&self) -> PathBuf {
        self.packages_root.join(REGISTRY_FILE)
    }

    /// Sandbox directory of a package: `{packages_root}/{package_id}`.
    pub fn package_dir(&self, package_id: &str) -> PathBuf {
        self.packages_root.join(package_id)
    }

    /// Staged update archive of a package: `{updates_dir}/{package_id}.zip`.
    pub fn staged_update(&self, package_id: &str) -> PathBuf {
        self.updates_dir.join(format!("{}.zip", package_id))
    }

    /// Entry names under the packages root that belong to the engine and
    /// can never be used as a package id.
    pub fn reserved_names(&self) -> Vec<String> {
        let mut names = vec![REGISTRY_FILE.to_string(), REGISTRY_TMP_FILE.to_string()];
        for dir in [&self.updates_dir, &self.backups_dir] {
            if dir.parent() == Some(self.packages_root.as_path())
                && let Some(name) = dir.file_name()
            {
                names.push(name.to_string_lossy().into_owned());
            }
        }
        names
    }

    pub fn supports_feature(&self, feature: &str) -> bool {
        self.supported_features.iter().any(|f| f == feature)
    }
}

/// Resolve the packages root: an explicit path wins, then the platform
/// data directory, then `~/.charpack`.
#[tracing::instrument(skip(runtime))]
pub fn default_packages_root<R: Runtime>(runtime: &R, explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some(data_dir) = runtime.data_dir() {
        return Ok(data_dir.join("charpack"));
    }
    let home_dir = runtime
        .home_dir()
        .context("Could not find a data or home directory")?;
    Ok(home_dir.join(".charpack"))
}
