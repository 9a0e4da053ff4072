//! Manifest schema and policy validation.

use regex::Regex;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::LazyLock;

use crate::config::EngineConfig;
use crate::error::{PackageError, PackageResult};
use crate::runtime::is_safe_relative_path;

use super::manifest::{AgeRating, PackageManifest, SafetyLevel};
use super::version::{Version, VersionRequirement};

/// Package ids double as directory names, so they are restricted to a
/// filesystem-safe alphabet.
static PACKAGE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,127}$").expect("invalid regex"));

/// Everything the validator found wrong with a manifest.
///
/// `errors` and `safety_issues` make a manifest invalid; `warnings` and
/// `performance_warnings` are informational.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub safety_issues: Vec<String>,
    pub performance_warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty() && self.safety_issues.is_empty()
    }

    /// Turn an invalid report into a [`PackageError::ManifestValidation`]
    /// carrying all errors and safety issues.
    pub fn into_result(self) -> PackageResult<ValidationReport> {
        if self.is_valid() {
            Ok(self)
        } else {
            Err(PackageError::ManifestValidation {
                errors: self.errors,
                safety_issues: self.safety_issues,
            })
        }
    }
}

pub struct ManifestValidator<'a> {
    config: &'a EngineConfig,
}

impl<'a> ManifestValidator<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Validate a manifest, collecting every issue before returning.
    #[tracing::instrument(skip(self, manifest), fields(package_id = %manifest.id))]
    pub fn validate(&self, manifest: &PackageManifest) -> ValidationReport {
        let mut report = ValidationReport::default();

        self.check_identity(manifest, &mut report);
        self.check_compatibility(manifest, &mut report);
        self.check_content(manifest, &mut report);
        self.check_dependencies(manifest, &mut report);
        self.check_installation(manifest, &mut report);
        self.check_performance(manifest, &mut report);

        report
    }

    fn check_identity(&self, manifest: &PackageManifest, report: &mut ValidationReport) {
        let required = [
            ("id", &manifest.id),
            ("name", &manifest.name),
            ("version", &manifest.version),
            ("description", &manifest.description),
            ("author", &manifest.author),
            ("license", &manifest.license),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                report.errors.push(format!("{} is required", field));
            }
        }

        if !manifest.id.is_empty() && !PACKAGE_ID.is_match(&manifest.id) {
            report.errors.push(format!(
                "id '{}' may only contain letters, digits, '.', '_' and '-'",
                manifest.id
            ));
        }

        if let Some(reserved) = self
            .config
            .reserved_names()
            .into_iter()
            .find(|name| name.eq_ignore_ascii_case(&manifest.id))
        {
            report.errors.push(format!(
                "id '{}' is reserved for the package store ({})",
                manifest.id, reserved
            ));
        }

        if !manifest.version.is_empty() && !Version::is_strict_semver(&manifest.version) {
            report.errors.push(format!(
                "version '{}' is not MAJOR.MINOR.PATCH[-pre][+build]",
                manifest.version
            ));
        }
    }

    fn check_compatibility(&self, manifest: &PackageManifest, report: &mut ValidationReport) {
        let compat = &manifest.compatibility;
        let system = Version::parse(&self.config.system_version).unwrap_or_default();

        if compat.min_system_version.trim().is_empty() {
            report
                .errors
                .push("compatibility.minSystemVersion is required".to_string());
        } else {
            match Version::parse(&compat.min_system_version) {
                Some(min) if system.cmp(&min) == Ordering::Less => report.errors.push(format!(
                    "requires system version {} or newer (running {})",
                    min, system
                )),
                Some(_) => {}
                None => report.errors.push(format!(
                    "compatibility.minSystemVersion '{}' is not a version",
                    compat.min_system_version
                )),
            }
        }

        if let Some(max_raw) = &compat.max_system_version {
            match Version::parse(max_raw) {
                Some(max) if system > max => report.errors.push(format!(
                    "supports system versions up to {} (running {})",
                    max, system
                )),
                Some(_) => {}
                None => report.errors.push(format!(
                    "compatibility.maxSystemVersion '{}' is not a version",
                    max_raw
                )),
            }
        }

        for feature in &compat.required_features {
            if !self.config.supports_feature(feature) {
                report
                    .errors
                    .push(format!("required feature '{}' is not supported", feature));
            }
        }
        for feature in &compat.optional_features {
            if !self.config.supports_feature(feature) {
                report.warnings.push(format!(
                    "optional feature '{}' is not supported and will be unavailable",
                    feature
                ));
            }
        }
    }

    fn check_content(&self, manifest: &PackageManifest, report: &mut ValidationReport) {
        let content = &manifest.content;

        match content.age_rating.parse::<AgeRating>() {
            Ok(AgeRating::AdultsOnly) => report
                .safety_issues
                .push("age rating 'adults-only' is not permitted".to_string()),
            Ok(AgeRating::Mature) if !content.parental_approval_required => {
                report.safety_issues.push(
                    "age rating 'mature' requires parentalApprovalRequired".to_string(),
                )
            }
            Ok(_) => {}
            Err(_) if content.age_rating.trim().is_empty() => report
                .errors
                .push("content.ageRating is required".to_string()),
            Err(e) => report.errors.push(format!("content.ageRating: {}", e)),
        }

        if let Err(e) = content.safety_level.parse::<SafetyLevel>() {
            report.errors.push(format!("content.safetyLevel: {}", e));
        }

        for warning in &content.content_warnings {
            report.warnings.push(format!("content warning: {}", warning));
        }
    }

    fn check_dependencies(&self, manifest: &PackageManifest, report: &mut ValidationReport) {
        for (i, dep) in manifest.dependencies.iter().enumerate() {
            if dep.package_id.trim().is_empty() {
                report
                    .errors
                    .push(format!("dependencies[{}].packageId is required", i));
                continue;
            }
            if VersionRequirement::parse(&dep.version_requirement).is_none() {
                report.errors.push(format!(
                    "dependency {} has an invalid version requirement '{}'",
                    dep.package_id, dep.version_requirement
                ));
            }
        }
    }

    fn check_installation(&self, manifest: &PackageManifest, report: &mut ValidationReport) {
        let scripts = [
            ("postInstallScript", &manifest.installation.post_install_script),
            ("uninstallScript", &manifest.installation.uninstall_script),
        ];
        for (field, script) in scripts {
            if let Some(path) = script
                && !is_safe_relative_path(path)
            {
                report.errors.push(format!(
                    "installation.{} '{}' must be a relative path inside the package",
                    field, path
                ));
            }
        }
    }

    fn check_performance(&self, manifest: &PackageManifest, report: &mut ValidationReport) {
        let triangles = manifest.performance.triangle_count;
        if triangles > self.config.max_triangle_count {
            report.performance_warnings.push(format!(
                "triangle count {} exceeds recommended {}",
                triangles, self.config.max_triangle_count
            ));
        }
        let size = manifest.assets.total_size;
        if size > self.config.max_asset_size {
            report.performance_warnings.push(format!(
                "asset size {} bytes exceeds recommended {} bytes",
                size, self.config.max_asset_size
            ));
        }
    }
}
