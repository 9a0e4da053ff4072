//! Durable record of installed packages.
//!
//! The registry lives in `{packages_root}/registry.json` and is the single
//! source of truth for dependency resolution and uninstall checks. Every
//! mutation is persisted before it becomes visible in memory, so a failed
//! write leaves the in-memory view unchanged.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::config::REGISTRY_TMP_FILE;
use crate::error::{PackageError, PackageResult};
use crate::runtime::Runtime;

use super::manifest::Dependency;
use super::resolver::DependencyResolver;

pub const REGISTRY_FORMAT_VERSION: &str = "1.0";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstalledPackageRecord {
    pub package_id: String,
    pub version: String,
    pub author: String,
    pub install_path: PathBuf,
    pub installed_at: DateTime<Utc>,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
    pub is_active: bool,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// On-disk registry document.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegistryFile {
    pub version: String,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub packages: Vec<InstalledPackageRecord>,
}

impl Default for RegistryFile {
    fn default() -> Self {
        Self {
            version: REGISTRY_FORMAT_VERSION.to_string(),
            last_updated: None,
            packages: Vec::new(),
        }
    }
}

impl RegistryFile {
    pub fn get(&self, package_id: &str) -> Option<&InstalledPackageRecord> {
        self.packages.iter().find(|p| p.package_id == package_id)
    }

    /// Insert or replace the record keyed by its package id.
    pub fn upsert(&mut self, record: InstalledPackageRecord) {
        match self
            .packages
            .iter_mut()
            .find(|p| p.package_id == record.package_id)
        {
            Some(existing) => *existing = record,
            None => self.packages.push(record),
        }
    }

    pub fn remove(&mut self, package_id: &str) -> Option<InstalledPackageRecord> {
        let index = self
            .packages
            .iter()
            .position(|p| p.package_id == package_id)?;
        Some(self.packages.remove(index))
    }

    /// Ids of installed packages that list `package_id` as a dependency.
    pub fn dependents_of(&self, package_id: &str) -> Vec<String> {
        self.packages
            .iter()
            .filter(|p| p.package_id != package_id)
            .filter(|p| p.dependencies.iter().any(|d| d == package_id))
            .map(|p| p.package_id.clone())
            .collect()
    }
}

/// Shared handle to the registry document.
pub struct RegistryStore<'a, R: Runtime> {
    runtime: &'a R,
    path: PathBuf,
    state: Mutex<RegistryFile>,
}

impl<'a, R: Runtime> RegistryStore<'a, R> {
    /// Load the registry at `path`; a missing file is an empty registry.
    #[tracing::instrument(skip(runtime))]
    pub fn open(runtime: &'a R, path: PathBuf) -> Result<Self> {
        let state = if runtime.exists(&path) {
            let content = runtime.read_to_string(&path)?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse registry at {:?}", path))?
        } else {
            debug!("No registry at {:?}, starting empty", path);
            RegistryFile::default()
        };

        Ok(Self {
            runtime,
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> RegistryFile {
        self.lock().clone()
    }

    pub fn get(&self, package_id: &str) -> Option<InstalledPackageRecord> {
        self.lock().get(package_id).cloned()
    }

    pub fn list(&self) -> Vec<InstalledPackageRecord> {
        self.lock().packages.clone()
    }

    pub fn dependents_of(&self, package_id: &str) -> Vec<String> {
        self.lock().dependents_of(package_id)
    }

    /// Insert or replace a record and persist.
    #[tracing::instrument(skip(self, record), fields(package_id = %record.package_id))]
    pub fn commit(&self, record: InstalledPackageRecord) -> Result<()> {
        self.mutate(|registry| registry.upsert(record))
    }

    /// Insert or replace a record and persist, provided `dependencies`
    /// still resolve against the registry at this moment. Resolution and
    /// write happen under one lock, so a concurrent removal of a dependency
    /// either lands before (and this fails) or is refused afterwards.
    #[tracing::instrument(skip(self, record, dependencies), fields(package_id = %record.package_id))]
    pub fn commit_resolved(
        &self,
        record: InstalledPackageRecord,
        dependencies: &[Dependency],
    ) -> PackageResult<()> {
        self.try_mutate(|registry| {
            let resolution =
                DependencyResolver::new(registry).resolve(&record.package_id, dependencies);
            if !resolution.resolved() {
                return Err(PackageError::UnresolvedDependencies {
                    package_id: record.package_id.clone(),
                    missing: resolution.missing,
                    conflicts: resolution.conflicts,
                });
            }
            registry.upsert(record);
            Ok(())
        })
    }

    /// Remove a record and persist unless another package depends on it.
    #[tracing::instrument(skip(self))]
    pub fn remove_unrequired(&self, package_id: &str) -> PackageResult<Option<InstalledPackageRecord>> {
        self.try_mutate(|registry| {
            let dependents = registry.dependents_of(package_id);
            if !dependents.is_empty() {
                return Err(PackageError::RequiredByDependents {
                    package_id: package_id.to_string(),
                    dependents,
                });
            }
            Ok(registry.remove(package_id))
        })
    }

    /// Remove a record and persist, returning the removed record.
    #[tracing::instrument(skip(self))]
    pub fn remove(&self, package_id: &str) -> Result<Option<InstalledPackageRecord>> {
        let mut removed = None;
        self.mutate(|registry| removed = registry.remove(package_id))?;
        Ok(removed)
    }

    /// Put a package's entry back to a previous state: the given record, or
    /// no entry at all.
    #[tracing::instrument(skip(self, previous))]
    pub fn restore(
        &self,
        package_id: &str,
        previous: Option<InstalledPackageRecord>,
    ) -> Result<()> {
        self.mutate(|registry| match previous {
            Some(record) => registry.upsert(record),
            None => {
                registry.remove(package_id);
            }
        })
    }

    /// Set `lastUsed` to now. Returns false if the package is not installed.
    pub fn touch(&self, package_id: &str) -> Result<bool> {
        let mut found = false;
        self.mutate(|registry| {
            if let Some(record) = registry.packages.iter_mut().find(|p| p.package_id == package_id)
            {
                record.last_used = Some(Utc::now());
                found = true;
            }
        })?;
        Ok(found)
    }

    fn mutate<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut RegistryFile),
    {
        self.try_mutate(|registry| {
            change(registry);
            Ok(())
        })
        .map_err(|e| match e {
            PackageError::Io(e) => e,
            other => other.into(),
        })
    }

    /// Apply `change` to a copy, persist the copy, then publish it. Nothing
    /// is written when `change` fails.
    fn try_mutate<T, F>(&self, change: F) -> PackageResult<T>
    where
        F: FnOnce(&mut RegistryFile) -> PackageResult<T>,
    {
        let mut state = self.lock();
        let mut next = state.clone();
        let value = change(&mut next)?;
        next.last_updated = Some(Utc::now());
        self.persist(&next)?;
        *state = next;
        Ok(value)
    }

    /// Write to a temporary sibling and rename over the registry.
    fn persist(&self, registry: &RegistryFile) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !self.runtime.exists(parent)
        {
            self.runtime.create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(registry)?;
        let tmp_path = self.path.with_file_name(REGISTRY_TMP_FILE);
        self.runtime
            .write(&tmp_path, content.as_bytes())
            .with_context(|| format!("Failed to save registry to {:?}", tmp_path))?;
        self.runtime.rename(&tmp_path, &self.path)?;
        debug!(
            "Persisted registry with {} package(s)",
            registry.packages.len()
        );
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, RegistryFile> {
        // The document is only replaced wholesale, so a poisoned lock still
        // guards a consistent value
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{MockRuntime, RealRuntime};
    use mockall::predicate::eq;
    use tempfile::tempdir;

    fn record(id: &str, deps: &[&str]) -> InstalledPackageRecord {
        InstalledPackageRecord {
            package_id: id.into(),
            version: "1.0.0".into(),
            author: "Studio".into(),
            install_path: PathBuf::from("/pkgs").join(id),
            installed_at: Utc::now(),
            last_used: None,
            is_active: true,
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
        }
    }

    #[test]
    fn test_registry_file_upsert_replaces_by_id() {
        let mut registry = RegistryFile::default();
        registry.upsert(record("hero", &[]));
        let mut updated = record("hero", &[]);
        updated.version = "2.0.0".into();
        registry.upsert(updated);

        assert_eq!(registry.packages.len(), 1);
        assert_eq!(registry.get("hero").unwrap().version, "2.0.0");
    }

    #[test]
    fn test_dependents_of() {
        let mut registry = RegistryFile::default();
        registry.upsert(record("base", &[]));
        registry.upsert(record("hero", &["base"]));
        registry.upsert(record("villain", &["base", "hero"]));

        assert_eq!(registry.dependents_of("base"), vec!["hero", "villain"]);
        assert_eq!(registry.dependents_of("hero"), vec!["villain"]);
        assert!(registry.dependents_of("villain").is_empty());
    }

    #[test]
    fn test_store_persists_and_reloads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.json");

        {
            let store = RegistryStore::open(&RealRuntime, path.clone()).unwrap();
            assert!(store.list().is_empty());
            store.commit(record("hero", &["base"])).unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"packageId\": \"hero\""));
        assert!(content.contains("\"lastUpdated\""));
        assert!(!dir.path().join("registry.json.tmp").exists());

        let store = RegistryStore::open(&RealRuntime, path).unwrap();
        let loaded = store.get("hero").unwrap();
        assert_eq!(loaded.dependencies, vec!["base"]);
        assert!(loaded.is_active);
    }

    #[test]
    fn test_store_remove_and_restore() {
        let dir = tempdir().unwrap();
        let store =
            RegistryStore::open(&RealRuntime, dir.path().join("registry.json")).unwrap();
        let original = record("hero", &[]);
        store.commit(original.clone()).unwrap();

        let removed = store.remove("hero").unwrap();
        assert_eq!(removed, Some(original.clone()));
        assert!(store.get("hero").is_none());

        store.restore("hero", Some(original.clone())).unwrap();
        assert_eq!(store.get("hero"), Some(original));

        store.restore("hero", None).unwrap();
        assert!(store.get("hero").is_none());
    }

    fn requires(package_id: &str, requirement: &str) -> Dependency {
        Dependency {
            package_id: package_id.into(),
            version_requirement: requirement.into(),
        }
    }

    #[test]
    fn test_commit_resolved_checks_current_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let store = RegistryStore::open(&RealRuntime, path.clone()).unwrap();
        store.commit(record("base", &[])).unwrap();

        store
            .commit_resolved(record("hero", &["base"]), &[requires("base", ">=1.0.0")])
            .unwrap();
        assert!(store.get("hero").is_some());

        let err = store
            .commit_resolved(record("villain", &["ghost"]), &[requires("ghost", "1.0.0")])
            .unwrap_err();
        assert!(matches!(
            err,
            PackageError::UnresolvedDependencies { ref missing, .. } if missing == &["ghost"]
        ));
        assert!(store.get("villain").is_none());
        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert!(!on_disk.contains("villain"));
    }

    #[test]
    fn test_remove_unrequired_refuses_dependents() {
        let dir = tempdir().unwrap();
        let store =
            RegistryStore::open(&RealRuntime, dir.path().join("registry.json")).unwrap();
        store.commit(record("base", &[])).unwrap();
        store.commit(record("hero", &["base"])).unwrap();

        assert!(matches!(
            store.remove_unrequired("base"),
            Err(PackageError::RequiredByDependents { ref dependents, .. }) if dependents == &["hero"]
        ));
        assert!(store.get("base").is_some());

        assert!(store.remove_unrequired("hero").unwrap().is_some());
        assert!(store.remove_unrequired("base").unwrap().is_some());
        assert_eq!(store.remove_unrequired("base").unwrap(), None);
    }

    #[test]
    fn test_store_touch() {
        let dir = tempdir().unwrap();
        let store =
            RegistryStore::open(&RealRuntime, dir.path().join("registry.json")).unwrap();
        store.commit(record("hero", &[])).unwrap();

        assert!(store.touch("hero").unwrap());
        assert!(store.get("hero").unwrap().last_used.is_some());
        assert!(!store.touch("ghost").unwrap());
    }

    #[test]
    fn test_corrupt_registry_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(RegistryStore::open(&RealRuntime, path).is_err());
    }

    #[test]
    fn test_failed_persist_leaves_memory_unchanged() {
        let mut runtime = MockRuntime::new();
        let path = PathBuf::from("/pkgs/registry.json");

        runtime
            .expect_exists()
            .with(eq(path.clone()))
            .returning(|_| false);
        runtime
            .expect_exists()
            .with(eq(PathBuf::from("/pkgs")))
            .returning(|_| true);
        runtime
            .expect_write()
            .returning(|_, _| Err(anyhow::anyhow!("disk full")));

        let store = RegistryStore::open(&runtime, path).unwrap();
        assert!(store.commit(record("hero", &[])).is_err());
        assert!(store.get("hero").is_none());
    }
}
