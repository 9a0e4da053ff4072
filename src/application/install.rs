//! Install use case - verify an archive and install it into a sandbox.
//!
//! The flow is:
//! - open the archive, validate the manifest, verify the signature
//! - claim the package id
//! - resolve dependencies against the registry
//! - create the sandbox, extract, re-verify the inner manifest, scan
//! - commit the registry record and check the post-install script
//!
//! Nothing is written before the package id is claimed, and every failure
//! after that removes the sandbox again.

use anyhow::anyhow;
use chrono::Utc;
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

use crate::archive::{ArchiveLimits, PackageArchive};
use crate::cleanup::CleanupGuard;
use crate::error::{PackageError, PackageResult};
use crate::events::{PackageEvent, ScriptStage};
use crate::package::{
    DependencyResolver, InstalledPackageRecord, MANIFEST_FILE, ManifestValidator,
    PackageManifest, SIGNATURE_FILE, SignatureVerifier, ValidationReport, canonical_bytes,
};
use crate::runtime::Runtime;
use crate::safety::SafetyScanner;

use super::{PackageManager, SANDBOX_DIRS, archive_stem};

/// Outcome of an install.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationResult {
    pub success: bool,
    pub package_id: String,
    pub version: String,
    /// Files written into the sandbox, relative to it.
    pub installed_assets: Vec<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub requires_restart: bool,
}

impl InstallationResult {
    /// Flatten a failed install into the same shape as a successful one.
    pub fn from_error(package_id: &str, error: &PackageError) -> Self {
        Self {
            success: false,
            package_id: package_id.to_string(),
            version: String::new(),
            installed_assets: Vec::new(),
            errors: error.issues(),
            warnings: Vec::new(),
            requires_restart: false,
        }
    }
}

impl<'a, R: Runtime> PackageManager<'a, R> {
    /// Install the package archive at `archive_path`.
    #[tracing::instrument(skip(self))]
    pub async fn install(&self, archive_path: &Path) -> PackageResult<InstallationResult> {
        let mut package_id = archive_stem(archive_path);
        let result = self.try_install(archive_path, &mut package_id).await;
        match &result {
            Ok(installed) => self.emit(PackageEvent::InstallCompleted {
                package_id: installed.package_id.clone(),
                version: installed.version.clone(),
                requires_restart: installed.requires_restart,
            }),
            Err(e) => self.emit(PackageEvent::install_failed(&package_id, e)),
        }
        result
    }

    async fn try_install(
        &self,
        archive_path: &Path,
        package_id: &mut String,
    ) -> PackageResult<InstallationResult> {
        let (mut archive, report) = self.open_verified(archive_path)?;
        *package_id = archive.manifest().id.clone();

        let _lock = self.locks.acquire(package_id)?;
        self.emit(PackageEvent::InstallStarted {
            package_id: package_id.clone(),
            version: archive.manifest().version.clone(),
            archive: archive_path.to_path_buf(),
        });

        if let Some(existing) = self.registry.get(package_id) {
            return Err(PackageError::AlreadyInstalled {
                package_id: package_id.clone(),
                version: existing.version,
            });
        }

        let warnings = report
            .warnings
            .into_iter()
            .chain(report.performance_warnings)
            .collect();
        self.stage(&mut archive, warnings, None).await
    }

    /// Open an archive and run every check that needs no filesystem
    /// mutation: format, manifest validation, signature.
    pub(super) fn open_verified(
        &self,
        archive_path: &Path,
    ) -> PackageResult<(PackageArchive, ValidationReport)> {
        let archive = PackageArchive::open(
            self.runtime,
            archive_path,
            &ArchiveLimits::from(&self.config),
        )?;
        let report = ManifestValidator::new(&self.config)
            .validate(archive.manifest())
            .into_result()?;
        SignatureVerifier::verify(archive.manifest_document(), archive.signature())?;
        Ok((archive, report))
    }

    /// Resolve dependencies, extract into a fresh sandbox, scan it and
    /// commit the registry record.
    ///
    /// On failure the sandbox is removed and the registry entry is put back
    /// to `previous`. The caller must hold the package id's lock.
    pub(super) async fn stage(
        &self,
        archive: &mut PackageArchive,
        mut warnings: Vec<String>,
        previous: Option<InstalledPackageRecord>,
    ) -> PackageResult<InstallationResult> {
        let manifest = archive.manifest().clone();

        let snapshot = self.registry.snapshot();
        let resolution =
            DependencyResolver::new(&snapshot).resolve(&manifest.id, &manifest.dependencies);
        if !resolution.resolved() {
            return Err(PackageError::UnresolvedDependencies {
                package_id: manifest.id.clone(),
                missing: resolution.missing,
                conflicts: resolution.conflicts,
            });
        }

        let sandbox = self.config.package_dir(&manifest.id);
        if self.runtime.exists(&sandbox) && !self.runtime.is_dir(&sandbox) {
            return Err(anyhow!(
                "{:?} exists and is not a package directory, refusing to replace it",
                sandbox
            )
            .into());
        }
        if self.runtime.exists(&sandbox) {
            warn!(
                "Removing leftover directory {:?} with no registry entry",
                sandbox
            );
            self.runtime.remove_dir_all(&sandbox)?;
        }

        let guard = CleanupGuard::new(self.cleanup.clone(), sandbox.clone());
        let result = self
            .populate_and_commit(archive, &manifest, &sandbox, &mut warnings, previous)
            .await;
        if result.is_err() {
            self.discard_sandbox(&sandbox);
        }
        guard.release();

        let installed_assets = result?;
        info!(
            "Installed {} {} into {:?}",
            manifest.id, manifest.version, sandbox
        );
        Ok(InstallationResult {
            success: true,
            package_id: manifest.id,
            version: manifest.version,
            installed_assets,
            errors: Vec::new(),
            warnings,
            requires_restart: manifest.installation.requires_restart,
        })
    }

    async fn populate_and_commit(
        &self,
        archive: &mut PackageArchive,
        manifest: &PackageManifest,
        sandbox: &Path,
        warnings: &mut Vec<String>,
        previous: Option<InstalledPackageRecord>,
    ) -> PackageResult<Vec<String>> {
        for dir in SANDBOX_DIRS {
            self.runtime.create_dir_all(&sandbox.join(dir))?;
        }

        let extracted = archive.extract_into(self.runtime, sandbox, &self.cancel).await?;
        self.verify_inner_manifest(archive.manifest_document(), sandbox)?;

        for dir in SANDBOX_DIRS {
            if self.runtime.read_dir(&sandbox.join(dir))?.is_empty() {
                warnings.push(format!("package has no {}", dir));
            }
        }

        SafetyScanner::new(self.runtime)
            .scan(sandbox, &self.cancel)?
            .into_result()?;

        // A dependency may have been uninstalled during extraction
        self.registry.commit_resolved(
            InstalledPackageRecord {
                package_id: manifest.id.clone(),
                version: manifest.version.clone(),
                author: manifest.author.clone(),
                install_path: sandbox.to_path_buf(),
                installed_at: Utc::now(),
                last_used: None,
                is_active: true,
                dependencies: manifest.dependency_ids(),
            },
            &manifest.dependencies,
        )?;

        if let Err(e) = self.check_post_install_script(manifest, sandbox) {
            if let Err(restore) = self.registry.restore(&manifest.id, previous) {
                warn!(
                    "Failed to roll back registry entry for {}: {:#}",
                    manifest.id, restore
                );
            }
            return Err(e);
        }

        let mut installed: Vec<String> = extracted
            .iter()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .filter(|name| name != MANIFEST_FILE && name != SIGNATURE_FILE)
            .collect();
        installed.sort();
        Ok(installed)
    }

    /// Compare the manifest written into the sandbox with the one that was
    /// validated and signature-checked.
    fn verify_inner_manifest(&self, verified: &Value, sandbox: &Path) -> PackageResult<()> {
        let inner_path = sandbox.join(MANIFEST_FILE);
        let content = self.runtime.read_to_string(&inner_path)?;
        let inner: Value = serde_json::from_str(&content).map_err(|e| {
            PackageError::Corrupted(format!("extracted {} is not valid JSON: {}", MANIFEST_FILE, e))
        })?;
        if canonical_bytes(&inner) != canonical_bytes(verified) {
            return Err(PackageError::Corrupted(format!(
                "extracted {} differs from the verified manifest",
                MANIFEST_FILE
            )));
        }
        debug!("Extracted manifest matches the verified manifest");
        Ok(())
    }

    /// A declared post-install script must have been extracted. It is only
    /// checked here; running it is up to the host.
    fn check_post_install_script(
        &self,
        manifest: &PackageManifest,
        sandbox: &Path,
    ) -> PackageResult<()> {
        let Some(script) = &manifest.installation.post_install_script else {
            return Ok(());
        };
        let present = self.runtime.exists(&sandbox.join(script));
        self.emit(PackageEvent::LifecycleScriptChecked {
            package_id: manifest.id.clone(),
            stage: ScriptStage::PostInstall,
            script: script.clone(),
            present,
        });
        if present {
            Ok(())
        } else {
            Err(PackageError::Corrupted(format!(
                "declared post-install script {} is missing",
                script
            )))
        }
    }
}
