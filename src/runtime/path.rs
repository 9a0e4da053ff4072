//! Path utility functions for normalization and containment checks.

use std::path::{Component, Path, PathBuf};

/// Normalize a path by processing `.` and `..` components lexically.
/// This does not access the filesystem and does not follow symlinks.
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // At the root there is nothing to pop, keep the `..`
                if !result.pop() {
                    result.push(component);
                }
            }
            _ => {
                result.push(component);
            }
        }
    }
    result
}

/// Check if a path is under a given directory by comparing normalized path components.
///
/// # Security
/// Both paths are normalized first, so `/pkgs/a/../../etc/passwd` is NOT under `/pkgs`.
pub fn is_path_under(path: &Path, dir: &Path) -> bool {
    let normalized_path = normalize_path(path);
    let normalized_dir = normalize_path(dir);

    let path_components: Vec<_> = normalized_path.components().collect();
    let dir_components: Vec<_> = normalized_dir.components().collect();

    if path_components.len() < dir_components.len() {
        return false;
    }

    dir_components
        .iter()
        .zip(path_components.iter())
        .all(|(d, p)| d == p)
}

/// Check that an archive entry name stays inside the directory it is extracted to.
///
/// Rejects empty names, absolute paths, drive prefixes and any `..` component.
pub fn is_safe_relative_path(name: &str) -> bool {
    if name.is_empty() || name.contains('\0') {
        return false;
    }
    // Zip names always use '/', but a hostile archive may use '\' to sneak past
    // component parsing on Windows
    let unified = name.replace('\\', "/");
    let path = Path::new(&unified);
    if unified.starts_with('/') || path.is_absolute() {
        return false;
    }
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
