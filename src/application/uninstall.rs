//! Uninstall use case - remove a package that nothing depends on.

use log::{info, warn};
use serde_json::Value;

use crate::error::{PackageError, PackageResult};
use crate::events::{PackageEvent, ScriptStage};
use crate::package::{InstalledPackageRecord, MANIFEST_FILE, PackageManifest};
use crate::runtime::Runtime;

use super::PackageManager;

impl<'a, R: Runtime> PackageManager<'a, R> {
    /// Remove `package_id`'s sandbox and registry entry.
    ///
    /// Fails with [`PackageError::RequiredByDependents`] while any other
    /// installed package still depends on it.
    #[tracing::instrument(skip(self))]
    pub async fn uninstall(&self, package_id: &str) -> PackageResult<()> {
        match self.try_uninstall(package_id) {
            Ok(record) => {
                self.emit(PackageEvent::UninstallCompleted {
                    package_id: package_id.to_string(),
                    version: record.version,
                });
                Ok(())
            }
            Err(e) => {
                self.emit(PackageEvent::uninstall_failed(package_id, &e));
                Err(e)
            }
        }
    }

    fn try_uninstall(&self, package_id: &str) -> PackageResult<InstalledPackageRecord> {
        let _lock = self.locks.acquire(package_id)?;
        let record = self
            .registry
            .get(package_id)
            .ok_or_else(|| PackageError::NotInstalled(package_id.to_string()))?;

        // The dependents check and the removal share one registry lock, so an
        // install committing against this package cannot slip in between
        self.registry.remove_unrequired(package_id)?;

        self.check_uninstall_script(&record);

        if self.runtime.exists(&record.install_path) {
            if let Err(e) = self.runtime.remove_dir_all(&record.install_path) {
                if let Err(restore) = self.registry.restore(package_id, Some(record.clone())) {
                    warn!("Failed to restore registry entry of {}: {}", package_id, restore);
                }
                return Err(e.into());
            }
        } else {
            warn!(
                "Install directory {:?} of {} was already gone",
                record.install_path, package_id
            );
        }

        info!("Uninstalled {} {}", package_id, record.version);
        Ok(record)
    }

    /// Report whether a declared uninstall script is present. A missing
    /// script or an unreadable manifest never blocks the uninstall.
    fn check_uninstall_script(&self, record: &InstalledPackageRecord) {
        let manifest_path = record.install_path.join(MANIFEST_FILE);
        let manifest = self
            .runtime
            .read_to_string(&manifest_path)
            .ok()
            .and_then(|content| serde_json::from_str::<Value>(&content).ok())
            .and_then(|value| PackageManifest::from_value(&value).ok());
        let Some(manifest) = manifest else {
            warn!(
                "Could not read {:?}, skipping uninstall script check",
                manifest_path
            );
            return;
        };
        let Some(script) = manifest.installation.uninstall_script else {
            return;
        };

        let present = self.runtime.exists(&record.install_path.join(&script));
        if !present {
            warn!(
                "Uninstall script {} of {} is missing, continuing",
                script, record.package_id
            );
        }
        self.emit(PackageEvent::LifecycleScriptChecked {
            package_id: record.package_id.clone(),
            stage: ScriptStage::Uninstall,
            script,
            present,
        });
    }
}
