//! Package model and the checks run against it.
//!
//! This module covers the manifest and signature documents, version
//! ordering, manifest validation, dependency resolution and the installed
//! package registry.

mod manifest;
mod registry;
mod resolver;
mod signature;
mod validator;
mod version;

pub use manifest::{
    AgeRating, AssetSummary, Compatibility, ContentInfo, Dependency, InstallationInfo,
    MANIFEST_FILE, PackageManifest, PerformanceHints, SIGNATURE_FILE, SafetyLevel, Signature,
    canonical_bytes,
};
pub use registry::{InstalledPackageRecord, RegistryFile, RegistryStore};
pub use resolver::{DependencyConflict, DependencyResolver, Resolution};
pub use signature::{SignatureVerifier, manifest_digest};
pub use validator::{ManifestValidator, ValidationReport};
pub use version::{Version, VersionRequirement, compare_versions};
