use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::runtime::Runtime;

/// Tracks sandbox paths that must be removed, and update backups that must
/// be moved back, if an operation is interrupted before it finishes.
#[derive(Debug, Default)]
pub struct CleanupContext {
    paths: Vec<PathBuf>,
    /// `(backup, original)` pairs.
    restores: Vec<(PathBuf, PathBuf)>,
}

impl CleanupContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a path to be cleaned up on interruption
    pub fn add(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    /// Remove a path from cleanup list (e.g., when operation succeeds)
    pub fn remove(&mut self, path: &Path) {
        self.paths.retain(|p| p != path);
    }

    /// Move `backup` back to `original` on interruption.
    pub fn add_restore(&mut self, backup: PathBuf, original: PathBuf) {
        self.restores.push((backup, original));
    }

    pub fn remove_restore(&mut self, backup: &Path) {
        self.restores.retain(|(b, _)| b != backup);
    }

    #[cfg(test)]
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Remove every registered path, then move registered backups back into
    /// place. Best effort: failures are logged and the remaining entries are
    /// still attempted.
    pub fn cleanup<R: Runtime>(&mut self, runtime: &R) {
        for path in self.paths.drain(..) {
            debug!("Cleaning up: {:?}", path);
            let result = if runtime.is_dir(&path) {
                runtime.remove_dir_all(&path)
            } else if runtime.exists(&path) {
                runtime.remove_file(&path)
            } else {
                Ok(())
            };
            if let Err(e) = result {
                warn!("Failed to clean up {:?}: {:#}", path, e);
            }
        }
        for (backup, original) in self.restores.drain(..) {
            debug!("Restoring {:?} to {:?}", backup, original);
            if runtime.exists(&original) {
                warn!(
                    "Not restoring {:?}, {:?} is still present",
                    backup, original
                );
                continue;
            }
            if let Err(e) = runtime.rename(&backup, &original) {
                warn!("Failed to restore {:?}: {:#}", backup, e);
            }
        }
    }
}

/// Type alias for shared cleanup context
pub type SharedCleanupContext = Arc<Mutex<CleanupContext>>;

/// Create a new shared cleanup context
pub fn new_shared() -> SharedCleanupContext {
    Arc::new(Mutex::new(CleanupContext::new()))
}

/// Lock a shared context, recovering from poisoning since the path list
/// stays valid whatever panicked.
pub fn lock(ctx: &SharedCleanupContext) -> MutexGuard<'_, CleanupContext> {
    ctx.lock().unwrap_or_else(|e| e.into_inner())
}

/// Registers a path for interruption cleanup until the operation that
/// created it either succeeds or removes the path itself.
pub struct CleanupGuard {
    ctx: SharedCleanupContext,
    path: PathBuf,
}

impl CleanupGuard {
    /// Create a new cleanup guard and register the path
    pub fn new(ctx: SharedCleanupContext, path: PathBuf) -> Self {
        lock(&ctx).add(path.clone());
        Self { ctx, path }
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The operation is done with the path, either because it succeeded or
    /// because it already removed the path itself.
    ///
    /// Dropping the guard without calling this leaves the path registered
    /// so a Ctrl-C handler can still remove it.
    pub fn release(self) {
        lock(&self.ctx).remove(&self.path);
    }
}
