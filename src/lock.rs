use log::debug;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{PackageError, PackageResult};

/// Set of package ids with an install, update or uninstall in flight.
///
/// Acquisition never waits: a second request for a busy id fails with
/// [`PackageError::Concurrency`] so the caller can report it immediately.
#[derive(Debug, Clone, Default)]
pub struct InstallLocks {
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl InstallLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `package_id`, or fail if it is already claimed.
    pub fn acquire(&self, package_id: &str) -> PackageResult<InstallLock> {
        if !self.set().insert(package_id.to_string()) {
            return Err(PackageError::Concurrency(package_id.to_string()));
        }
        debug!("Acquired lock for {}", package_id);
        Ok(InstallLock {
            in_flight: Arc::clone(&self.in_flight),
            package_id: package_id.to_string(),
        })
    }

    #[cfg(test)]
    pub fn is_locked(&self, package_id: &str) -> bool {
        self.set().contains(package_id)
    }

    fn set(&self) -> MutexGuard<'_, HashSet<String>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// RAII guard that releases its package id when dropped, on every exit
/// path including errors and panics.
#[derive(Debug)]
pub struct InstallLock {
    in_flight: Arc<Mutex<HashSet<String>>>,
    package_id: String,
}

impl InstallLock {
    #[cfg(test)]
    pub fn package_id(&self) -> &str {
        &self.package_id
    }
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.package_id);
        debug!("Released lock for {}", self.package_id);
    }
}
