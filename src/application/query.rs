//! Read-side operations over the registry.

use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;

use crate::error::{PackageError, PackageResult};
use crate::package::{InstalledPackageRecord, MANIFEST_FILE, PackageManifest};
use crate::runtime::Runtime;

use super::PackageManager;

/// Installed package as reported to callers: the registry record, enriched
/// with the display fields of the installed manifest when it is readable.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageInfo {
    pub package_id: String,
    pub version: String,
    pub author: String,
    pub install_path: PathBuf,
    pub installed_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_rating: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_restart: Option<bool>,
}

impl PackageInfo {
    fn from_record(record: InstalledPackageRecord, manifest: Option<PackageManifest>) -> Self {
        let mut info = Self {
            package_id: record.package_id,
            version: record.version,
            author: record.author,
            install_path: record.install_path,
            installed_at: record.installed_at,
            last_used: record.last_used,
            is_active: record.is_active,
            dependencies: record.dependencies,
            name: None,
            description: None,
            age_rating: None,
            requires_restart: None,
        };
        if let Some(manifest) = manifest {
            info.name = Some(manifest.name);
            info.description = Some(manifest.description);
            info.age_rating = Some(manifest.content.age_rating);
            info.requires_restart = Some(manifest.installation.requires_restart);
        }
        info
    }
}

impl<'a, R: Runtime> PackageManager<'a, R> {
    pub fn get_package_info(&self, package_id: &str) -> Option<PackageInfo> {
        let record = self.registry.get(package_id)?;
        Some(self.describe(record))
    }

    /// Every installed package, ordered by package id.
    pub fn list_installed_packages(&self) -> Vec<PackageInfo> {
        let mut records = self.registry.list();
        records.sort_by(|a, b| a.package_id.cmp(&b.package_id));
        records.into_iter().map(|r| self.describe(r)).collect()
    }

    /// Refresh the package's `lastUsed` timestamp.
    #[tracing::instrument(skip(self))]
    pub fn mark_used(&self, package_id: &str) -> PackageResult<()> {
        let _lock = self.locks.acquire(package_id)?;
        if self.registry.touch(package_id)? {
            Ok(())
        } else {
            Err(PackageError::NotInstalled(package_id.to_string()))
        }
    }

    fn describe(&self, record: InstalledPackageRecord) -> PackageInfo {
        let manifest = self.installed_manifest(&record);
        PackageInfo::from_record(record, manifest)
    }

    fn installed_manifest(&self, record: &InstalledPackageRecord) -> Option<PackageManifest> {
        let path = record.install_path.join(MANIFEST_FILE);
        let content = match self.runtime.read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                debug!("No installed manifest for {}: {:#}", record.package_id, e);
                return None;
            }
        };
        let value: Value = serde_json::from_str(&content).ok()?;
        PackageManifest::from_value(&value).ok()
    }
}
