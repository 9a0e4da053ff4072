use anyhow::Context;
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use zip::ZipArchive;

use crate::error::{PackageError, PackageResult};
use crate::package::{MANIFEST_FILE, PackageManifest, SIGNATURE_FILE, Signature};
use crate::runtime::{Runtime, is_path_under, is_safe_relative_path};

use super::ArchiveLimits;

/// Manifest and signature entries are small documents; anything larger is
/// not a legitimate package.
const MAX_DOCUMENT_SIZE: u64 = 1024 * 1024;

/// An opened, pre-checked package archive.
///
/// The whole archive is held in memory. Its size is bounded by
/// `max_archive_size`, and `ZipArchive` needs `Read + Seek`.
pub struct PackageArchive {
    path: PathBuf,
    zip: ZipArchive<Cursor<Vec<u8>>>,
    file_names: Vec<String>,
    manifest_document: Value,
    manifest: PackageManifest,
    signature: Signature,
}

impl std::fmt::Debug for PackageArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageArchive")
            .field("path", &self.path)
            .field("package_id", &self.manifest.id)
            .field("entries", &self.file_names.len())
            .finish()
    }
}

impl PackageArchive {
    /// Open an archive and parse its manifest and signature.
    ///
    /// Every failure is a [`PackageError::Format`] and happens before
    /// anything is written.
    #[tracing::instrument(skip(runtime, limits))]
    pub fn open<R: Runtime>(
        runtime: &R,
        path: &Path,
        limits: &ArchiveLimits,
    ) -> PackageResult<Self> {
        if !runtime.exists(path) {
            return Err(PackageError::Format(format!(
                "archive {} does not exist",
                path.display()
            )));
        }

        let size = runtime.file_size(path)?;
        if size > limits.max_archive_size {
            return Err(PackageError::Format(format!(
                "archive is {} bytes, above the {} byte limit",
                size, limits.max_archive_size
            )));
        }

        let buffer = runtime
            .read(path)
            .with_context(|| format!("Failed to read archive {:?}", path))?;
        let mut zip = ZipArchive::new(Cursor::new(buffer))
            .map_err(|e| PackageError::Format(format!("not a valid zip archive: {}", e)))?;

        if zip.len() > limits.max_entry_count {
            return Err(PackageError::Format(format!(
                "archive has {} entries, above the limit of {}",
                zip.len(),
                limits.max_entry_count
            )));
        }

        let mut file_names = Vec::new();
        let mut unsafe_names = Vec::new();
        let mut total_size: u64 = 0;
        for i in 0..zip.len() {
            let entry = zip
                .by_index(i)
                .map_err(|e| PackageError::Format(format!("unreadable entry {}: {}", i, e)))?;
            let name = entry.name().to_string();
            if entry.enclosed_name().is_none()
                || !is_safe_relative_path(name.trim_end_matches('/'))
            {
                unsafe_names.push(name);
                continue;
            }
            total_size = total_size.saturating_add(entry.size());
            if !entry.is_dir() {
                file_names.push(name);
            }
        }

        if !unsafe_names.is_empty() {
            return Err(PackageError::Format(format!(
                "entries escape the package directory: {}",
                unsafe_names.join(", ")
            )));
        }
        if total_size > limits.max_uncompressed_size {
            return Err(PackageError::Format(format!(
                "archive expands to {} bytes, above the {} byte limit",
                total_size, limits.max_uncompressed_size
            )));
        }

        let missing: Vec<&str> = [MANIFEST_FILE, SIGNATURE_FILE]
            .into_iter()
            .filter(|required| !file_names.iter().any(|name| name == required))
            .collect();
        if !missing.is_empty() {
            return Err(PackageError::Format(format!(
                "missing required entries: {}",
                missing.join(", ")
            )));
        }

        let manifest_document: Value = read_document(&mut zip, MANIFEST_FILE)?;
        if !manifest_document.is_object() {
            return Err(PackageError::Format(format!(
                "{} must contain a JSON object",
                MANIFEST_FILE
            )));
        }
        let manifest = PackageManifest::from_value(&manifest_document).map_err(|e| {
            PackageError::Format(format!("{} does not match the schema: {}", MANIFEST_FILE, e))
        })?;
        let signature: Signature = read_document(&mut zip, SIGNATURE_FILE)?;

        debug!(
            "Opened archive {:?}: package {} {}, {} file(s)",
            path,
            manifest.id,
            manifest.version,
            file_names.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            zip,
            file_names,
            manifest_document,
            manifest,
            signature,
        })
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn manifest(&self) -> &PackageManifest {
        &self.manifest
    }

    /// The manifest exactly as parsed, used for signature and
    /// post-extraction comparison.
    pub fn manifest_document(&self) -> &Value {
        &self.manifest_document
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Names of the file (non-directory) entries.
    #[cfg(test)]
    pub fn file_names(&self) -> &[String] {
        &self.file_names
    }

    /// Extract every entry into `dest`, returning the relative paths of the
    /// files written.
    ///
    /// Yields to the scheduler after each entry and stops with
    /// [`PackageError::Cancelled`] once `cancel` fires. Already written
    /// files are left for the caller's cleanup.
    #[tracing::instrument(skip(self, runtime, cancel), fields(archive = ?self.path))]
    pub async fn extract_into<R: Runtime>(
        &mut self,
        runtime: &R,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> PackageResult<Vec<PathBuf>> {
        debug!("Extracting {:?} to {:?}...", self.path, dest);
        let mut extracted = Vec::new();

        for i in 0..self.zip.len() {
            if cancel.is_cancelled() {
                return Err(PackageError::Cancelled);
            }
            if let Some(relative) = self.extract_entry(runtime, i, dest)? {
                extracted.push(relative);
            }
            tokio::task::yield_now().await;
        }

        info!("Extracted {} file(s) into {:?}", extracted.len(), dest);
        Ok(extracted)
    }

    fn extract_entry<R: Runtime>(
        &mut self,
        runtime: &R,
        index: usize,
        dest: &Path,
    ) -> PackageResult<Option<PathBuf>> {
        let mut entry = self
            .zip
            .by_index(index)
            .map_err(|e| PackageError::Format(format!("unreadable entry {}: {}", index, e)))?;

        let Some(relative) = entry.enclosed_name().map(|p| p.to_path_buf()) else {
            return Err(PackageError::Format(format!(
                "entry {} escapes the package directory",
                entry.name()
            )));
        };
        let full_path = dest.join(&relative);
        if !is_path_under(&full_path, dest) {
            return Err(PackageError::Format(format!(
                "entry {} escapes the package directory",
                entry.name()
            )));
        }

        if entry.is_dir() {
            runtime.create_dir_all(&full_path)?;
            return Ok(None);
        }

        if let Some(parent) = full_path.parent() {
            runtime.create_dir_all(parent)?;
        }

        // Read one byte past the declared size so a lying header is caught
        let declared = entry.size();
        let mut dest_file = runtime.create_file(&full_path)?;
        let written = std::io::copy(&mut entry.by_ref().take(declared + 1), &mut dest_file)
            .with_context(|| format!("Failed to extract file {:?}", full_path))?;
        if written > declared {
            return Err(PackageError::Format(format!(
                "entry {} is larger than its declared size of {} bytes",
                relative.display(),
                declared
            )));
        }

        Ok(Some(relative))
    }
}

/// Read and deserialize a small JSON entry.
fn read_document<T: DeserializeOwned>(
    zip: &mut ZipArchive<Cursor<Vec<u8>>>,
    name: &str,
) -> PackageResult<T> {
    let entry = zip
        .by_name(name)
        .map_err(|e| PackageError::Format(format!("cannot read {}: {}", name, e)))?;

    let mut content = String::new();
    entry
        .take(MAX_DOCUMENT_SIZE + 1)
        .read_to_string(&mut content)
        .map_err(|e| PackageError::Format(format!("{} is not UTF-8 text: {}", name, e)))?;
    if content.len() as u64 > MAX_DOCUMENT_SIZE {
        return Err(PackageError::Format(format!(
            "{} is larger than {} bytes",
            name, MAX_DOCUMENT_SIZE
        )));
    }

    serde_json::from_str(&content)
        .map_err(|e| PackageError::Format(format!("{} is not valid JSON: {}", name, e)))
}
