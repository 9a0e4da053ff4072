use serde::Serialize;
use thiserror::Error;

use crate::package::DependencyConflict;

/// Errors produced by package operations.
///
/// Variants that describe a validation failure carry every detected
/// problem, not just the first one, so a caller can show one complete
/// remediation list.
#[derive(Debug, Error)]
pub enum PackageError {
    /// Missing manifest/signature entry, oversized archive, malformed JSON.
    #[error("Invalid package archive: {0}")]
    Format(String),

    /// Hash mismatch or malformed signature.
    #[error("Signature verification failed: {0}")]
    Signature(String),

    #[error("Manifest validation failed: {}", join_issues(.errors, .safety_issues))]
    ManifestValidation {
        errors: Vec<String>,
        safety_issues: Vec<String>,
    },

    /// Denylisted file type, dangerous pattern or inappropriate file name.
    #[error("Safety violation: {}", .issues.join("; "))]
    SafetyViolation { issues: Vec<String> },

    #[error(
        "Unresolved dependencies for {package_id}: {}",
        describe_dependencies(.missing, .conflicts)
    )]
    UnresolvedDependencies {
        package_id: String,
        missing: Vec<String>,
        conflicts: Vec<DependencyConflict>,
    },

    #[error("Package {package_id} is still required by: {}", .dependents.join(", "))]
    RequiredByDependents {
        package_id: String,
        dependents: Vec<String>,
    },

    #[error("An install or update of {0} is already in progress")]
    Concurrency(String),

    #[error("Package {0} is not installed")]
    NotInstalled(String),

    #[error("Package {package_id} {version} is already installed")]
    AlreadyInstalled { package_id: String, version: String },

    #[error("Version {candidate} of {package_id} is not newer than installed {installed}")]
    VersionNotNewer {
        package_id: String,
        installed: String,
        candidate: String,
    },

    /// The package is internally inconsistent, e.g. a declared lifecycle
    /// script is absent from the archive.
    #[error("Package is corrupted: {0}")]
    Corrupted(String),

    #[error("Operation cancelled")]
    Cancelled,

    /// Filesystem failure during extraction, backup, restore or persistence.
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

/// Coarse classification of a [`PackageError`], matching the error table
/// lifecycle observers and the CLI report against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Format,
    Signature,
    ManifestValidation,
    SafetyViolation,
    Dependency,
    Concurrency,
    NotInstalled,
    AlreadyInstalled,
    VersionOrdering,
    Corrupted,
    Cancelled,
    Io,
}

impl PackageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PackageError::Format(_) => ErrorKind::Format,
            PackageError::Signature(_) => ErrorKind::Signature,
            PackageError::ManifestValidation { .. } => ErrorKind::ManifestValidation,
            PackageError::SafetyViolation { .. } => ErrorKind::SafetyViolation,
            PackageError::UnresolvedDependencies { .. }
            | PackageError::RequiredByDependents { .. } => ErrorKind::Dependency,
            PackageError::Concurrency(_) => ErrorKind::Concurrency,
            PackageError::NotInstalled(_) => ErrorKind::NotInstalled,
            PackageError::AlreadyInstalled { .. } => ErrorKind::AlreadyInstalled,
            PackageError::VersionNotNewer { .. } => ErrorKind::VersionOrdering,
            PackageError::Corrupted(_) => ErrorKind::Corrupted,
            PackageError::Cancelled => ErrorKind::Cancelled,
            PackageError::Io(_) => ErrorKind::Io,
        }
    }

    /// Flatten the error into the individual problems it reports.
    pub fn issues(&self) -> Vec<String> {
        match self {
            PackageError::ManifestValidation {
                errors,
                safety_issues,
            } => errors.iter().chain(safety_issues).cloned().collect(),
            PackageError::SafetyViolation { issues } => issues.clone(),
            PackageError::UnresolvedDependencies {
                missing, conflicts, ..
            } => missing
                .iter()
                .map(|id| format!("missing dependency: {}", id))
                .chain(conflicts.iter().map(|c| c.to_string()))
                .collect(),
            other => vec![format!("{:#}", other)],
        }
    }
}

fn join_issues(errors: &[String], safety_issues: &[String]) -> String {
    errors
        .iter()
        .chain(safety_issues)
        .cloned()
        .collect::<Vec<_>>()
        .join("; ")
}

fn describe_dependencies(missing: &[String], conflicts: &[DependencyConflict]) -> String {
    let mut parts = Vec::new();
    if !missing.is_empty() {
        parts.push(format!("missing {}", missing.join(", ")));
    }
    parts.extend(conflicts.iter().map(|c| c.to_string()));
    parts.join("; ")
}

/// Result alias for package operations.
pub type PackageResult<T> = Result<T, PackageError>;
