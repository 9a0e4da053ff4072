//! Content safety scanning of an extracted package tree.
//!
//! The scanner has the final word on package contents: whatever the
//! manifest declares, any issue found here fails the install.

mod rules;

use log::{debug, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use crate::error::{PackageError, PackageResult};
use crate::runtime::Runtime;

/// Issues found in a package tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyReport {
    pub issues: Vec<String>,
    pub files_scanned: usize,
}

impl SafetyReport {
    pub fn is_safe(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn into_result(self) -> PackageResult<SafetyReport> {
        if self.is_safe() {
            Ok(self)
        } else {
            Err(PackageError::SafetyViolation {
                issues: self.issues,
            })
        }
    }
}

pub struct SafetyScanner<'a, R: Runtime> {
    runtime: &'a R,
}

impl<'a, R: Runtime> SafetyScanner<'a, R> {
    pub fn new(runtime: &'a R) -> Self {
        Self { runtime }
    }

    /// Walk `root` and check every file it contains.
    ///
    /// Returns [`PackageError::Cancelled`] if `cancel` fires between files.
    #[tracing::instrument(skip(self, cancel))]
    pub fn scan(&self, root: &Path, cancel: &CancellationToken) -> PackageResult<SafetyReport> {
        let mut report = SafetyReport::default();
        let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];

        while let Some(dir) = pending.pop() {
            for path in self.runtime.read_dir(&dir)? {
                if cancel.is_cancelled() {
                    return Err(PackageError::Cancelled);
                }
                let relative = path
                    .strip_prefix(root)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .replace('\\', "/");

                if let Some(keyword) = rules::inappropriate_keyword(&relative) {
                    report.issues.push(format!(
                        "{}: name contains inappropriate keyword '{}'",
                        relative, keyword
                    ));
                }

                if self.runtime.is_dir(&path) {
                    pending.push(path);
                } else {
                    self.scan_file(&path, &relative, &mut report)?;
                    report.files_scanned += 1;
                }
            }
        }

        if report.is_safe() {
            debug!("Scanned {} file(s) under {:?}: clean", report.files_scanned, root);
        } else {
            warn!(
                "Scanned {} file(s) under {:?}: {} issue(s)",
                report.files_scanned,
                root,
                report.issues.len()
            );
        }
        Ok(report)
    }

    fn scan_file(&self, path: &Path, relative: &str, report: &mut SafetyReport) -> PackageResult<()> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if rules::is_denied_file_name(&file_name) {
            report
                .issues
                .push(format!("{}: executable or script file type is not allowed", relative));
            return Ok(());
        }

        let content = self.runtime.read(path)?;

        if let Some(kind) = native_executable_kind(&content) {
            report
                .issues
                .push(format!("{}: file is a native {} executable", relative, kind));
            return Ok(());
        }

        if rules::is_text_file(&file_name) {
            let text = String::from_utf8_lossy(&content);
            for label in rules::dangerous_patterns(&text) {
                report
                    .issues
                    .push(format!("{}: contains dangerous pattern {}", relative, label));
            }
        }

        Ok(())
    }
}

/// Binary format of `content` if it parses as a native executable or
/// library, whatever the file is named.
fn native_executable_kind(content: &[u8]) -> Option<&'static str> {
    match goblin::Object::parse(content) {
        Ok(goblin::Object::Elf(_)) => Some("ELF"),
        Ok(goblin::Object::PE(_)) => Some("PE"),
        Ok(goblin::Object::Mach(_)) => Some("Mach-O"),
        _ => None,
    }
}
