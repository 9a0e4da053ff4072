//! Update use case - replace an installed package with a newer version.
//!
//! The installed directory is moved aside as a backup, the new archive goes
//! through the full install pipeline, and on any failure the backup is
//! moved back and the old registry record restored. The registry therefore
//! always describes either the old or the new version, never a mix.

use chrono::Utc;
use log::{debug, info, warn};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::cleanup;
use crate::error::{PackageError, PackageResult};
use crate::events::PackageEvent;
use crate::package::{
    InstalledPackageRecord, MANIFEST_FILE, PackageManifest, SIGNATURE_FILE, compare_versions,
};
use crate::runtime::Runtime;

use super::PackageManager;

/// Outcome of an update.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    pub success: bool,
    pub package_id: String,
    pub old_version: String,
    pub new_version: String,
    /// Human readable change summary.
    pub changes: Vec<String>,
    pub warnings: Vec<String>,
    pub requires_restart: bool,
}

impl<'a, R: Runtime> PackageManager<'a, R> {
    /// Update `package_id` from `archive_path`, or from the staged archive
    /// `{updates_dir}/{package_id}.zip` when no path is given.
    #[tracing::instrument(skip(self))]
    pub async fn update(
        &self,
        package_id: &str,
        archive_path: Option<&Path>,
    ) -> PackageResult<UpdateResult> {
        let result = self.try_update(package_id, archive_path).await;
        match &result {
            Ok(updated) => self.emit(PackageEvent::UpdateCompleted {
                package_id: package_id.to_string(),
                old_version: updated.old_version.clone(),
                new_version: updated.new_version.clone(),
                changes: updated.changes.clone(),
            }),
            Err(e) => self.emit(PackageEvent::update_failed(package_id, e)),
        }
        result
    }

    async fn try_update(
        &self,
        package_id: &str,
        archive_path: Option<&Path>,
    ) -> PackageResult<UpdateResult> {
        let archive_path = match archive_path {
            Some(path) => path.to_path_buf(),
            None => {
                let staged = self.config.staged_update(package_id);
                if !self.runtime.exists(&staged) {
                    return Err(PackageError::Format(format!(
                        "no update archive for {} at {}",
                        package_id,
                        staged.display()
                    )));
                }
                staged
            }
        };

        let (mut archive, report) = self.open_verified(&archive_path)?;
        if archive.manifest().id != package_id {
            return Err(PackageError::Format(format!(
                "archive contains package {} but {} was requested",
                archive.manifest().id,
                package_id
            )));
        }

        let _lock = self.locks.acquire(package_id)?;
        let previous = self
            .registry
            .get(package_id)
            .ok_or_else(|| PackageError::NotInstalled(package_id.to_string()))?;

        let new_version = archive.manifest().version.clone();
        if compare_versions(&new_version, &previous.version) != Ordering::Greater {
            return Err(PackageError::VersionNotNewer {
                package_id: package_id.to_string(),
                installed: previous.version.clone(),
                candidate: new_version,
            });
        }

        let old_files = self.list_files(&previous.install_path)?;
        let backup = self.back_up(&previous)?;

        let warnings = report
            .warnings
            .into_iter()
            .chain(report.performance_warnings)
            .collect();
        match self.stage(&mut archive, warnings, Some(previous.clone())).await {
            Ok(installed) => {
                cleanup::lock(&self.cleanup).remove_restore(&backup);
                if let Err(e) = self.runtime.remove_dir_all(&backup) {
                    warn!("Failed to remove backup {:?}: {:#}", backup, e);
                }
                let changes = summarize_changes(
                    &previous,
                    archive.manifest(),
                    &old_files,
                    &installed.installed_assets,
                );
                info!(
                    "Updated {} from {} to {}",
                    package_id, previous.version, installed.version
                );
                Ok(UpdateResult {
                    success: true,
                    package_id: package_id.to_string(),
                    old_version: previous.version,
                    new_version: installed.version,
                    changes,
                    warnings: installed.warnings,
                    requires_restart: installed.requires_restart,
                })
            }
            Err(e) => {
                cleanup::lock(&self.cleanup).remove_restore(&backup);
                if let Err(restore) = self.restore_backup(&backup, &previous) {
                    warn!(
                        "Failed to restore {} from {:?}: {:#}",
                        package_id, backup, restore
                    );
                }
                Err(e)
            }
        }
    }

    /// Move the install directory to a timestamped backup location.
    fn back_up(&self, record: &InstalledPackageRecord) -> PackageResult<PathBuf> {
        let backup = self.config.backups_dir.join(format!(
            "{}-{}",
            record.package_id,
            Utc::now().format("%Y%m%d%H%M%S%3f")
        ));
        self.runtime.create_dir_all(&self.config.backups_dir)?;
        self.runtime.rename(&record.install_path, &backup)?;
        cleanup::lock(&self.cleanup).add_restore(backup.clone(), record.install_path.clone());
        debug!("Backed up {:?} to {:?}", record.install_path, backup);
        Ok(backup)
    }

    /// Put the backed up directory and registry record back in place.
    fn restore_backup(&self, backup: &Path, record: &InstalledPackageRecord) -> PackageResult<()> {
        if self.runtime.exists(&record.install_path) {
            self.runtime.remove_dir_all(&record.install_path)?;
        }
        self.runtime.rename(backup, &record.install_path)?;
        self.registry
            .restore(&record.package_id, Some(record.clone()))?;
        info!(
            "Restored {} {} after failed update",
            record.package_id, record.version
        );
        Ok(())
    }
}

/// Describe what an update changed: version, dependencies, author and
/// package files.
fn summarize_changes(
    old: &InstalledPackageRecord,
    new: &PackageManifest,
    old_files: &[String],
    new_files: &[String],
) -> Vec<String> {
    let mut changes = vec![format!("version: {} -> {}", old.version, new.version)];

    let old_deps: BTreeSet<&str> = old.dependencies.iter().map(String::as_str).collect();
    let new_deps: BTreeSet<&str> = new.dependencies.iter().map(|d| d.package_id.as_str()).collect();
    changes.extend(
        new_deps
            .difference(&old_deps)
            .map(|d| format!("dependency added: {}", d)),
    );
    changes.extend(
        old_deps
            .difference(&new_deps)
            .map(|d| format!("dependency removed: {}", d)),
    );

    if old.author != new.author {
        changes.push(format!("author: {} -> {}", old.author, new.author));
    }

    let is_content = |name: &&String| *name != MANIFEST_FILE && *name != SIGNATURE_FILE;
    let old_set: BTreeSet<&String> = old_files.iter().filter(is_content).collect();
    let new_set: BTreeSet<&String> = new_files.iter().filter(is_content).collect();
    changes.extend(
        new_set
            .difference(&old_set)
            .map(|f| format!("file added: {}", f)),
    );
    changes.extend(
        old_set
            .difference(&new_set)
            .map(|f| format!("file removed: {}", f)),
    );

    changes
}
