//! Dependency resolution against the installed registry.
//!
//! The resolver only inspects; it never installs anything. Missing
//! packages are reported so the caller can install them first.

use std::collections::HashSet;
use std::fmt;

use log::debug;
use serde::Serialize;

use super::manifest::Dependency;
use super::registry::RegistryFile;
use super::version::{Version, VersionRequirement};

/// A dependency that is present but cannot be satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DependencyConflict {
    /// The installed version does not meet the requirement.
    #[serde(rename_all = "camelCase")]
    VersionMismatch {
        package_id: String,
        required: String,
        installed: String,
    },
    /// `package_id` was reached again while still on the current path.
    #[serde(rename_all = "camelCase")]
    Circular {
        package_id: String,
        cycle: Vec<String>,
    },
}

impl DependencyConflict {
    pub fn package_id(&self) -> &str {
        match self {
            DependencyConflict::VersionMismatch { package_id, .. }
            | DependencyConflict::Circular { package_id, .. } => package_id,
        }
    }
}

impl fmt::Display for DependencyConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyConflict::VersionMismatch {
                package_id,
                required,
                installed,
            } => write!(
                f,
                "{} requires version {} but {} is installed",
                package_id, required, installed
            ),
            DependencyConflict::Circular { package_id, cycle } => write!(
                f,
                "circular dependency on {}: {}",
                package_id,
                cycle.join(" -> ")
            ),
        }
    }
}

/// Outcome of resolving a package's dependencies.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub missing: Vec<String>,
    pub conflicts: Vec<DependencyConflict>,
    /// Resolved dependencies, each listed after everything it depends on.
    pub install_order: Vec<String>,
}

impl Resolution {
    pub fn resolved(&self) -> bool {
        self.missing.is_empty() && self.conflicts.is_empty()
    }
}

pub struct DependencyResolver<'a> {
    registry: &'a RegistryFile,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(registry: &'a RegistryFile) -> Self {
        Self { registry }
    }

    /// Resolve the declared `dependencies` of `package_id`.
    ///
    /// The walk starts with `package_id` already on the path, so a package
    /// depending on itself is reported as a one-node cycle.
    #[tracing::instrument(skip(self, dependencies))]
    pub fn resolve(&self, package_id: &str, dependencies: &[Dependency]) -> Resolution {
        let mut walk = Walk {
            registry: self.registry,
            visiting: vec![package_id.to_string()],
            visited: HashSet::new(),
            resolution: Resolution::default(),
        };

        for dep in dependencies {
            let requirement = VersionRequirement::parse(&dep.version_requirement);
            walk.visit(&dep.package_id, Some((dep.version_requirement.as_str(), requirement)));
        }

        debug!(
            "Resolved dependencies of {}: {} missing, {} conflicts",
            package_id,
            walk.resolution.missing.len(),
            walk.resolution.conflicts.len()
        );
        walk.resolution
    }
}

struct Walk<'a> {
    registry: &'a RegistryFile,
    /// Current path, in order, for cycle reporting.
    visiting: Vec<String>,
    visited: HashSet<String>,
    resolution: Resolution,
}

impl Walk<'_> {
    fn visit(&mut self, package_id: &str, requirement: Option<(&str, Option<VersionRequirement>)>) {
        if let Some(start) = self.visiting.iter().position(|id| id == package_id) {
            let mut cycle = self.visiting[start..].to_vec();
            cycle.push(package_id.to_string());
            self.push_conflict(DependencyConflict::Circular {
                package_id: package_id.to_string(),
                cycle,
            });
            return;
        }

        let registry = self.registry;
        let Some(record) = registry.get(package_id) else {
            if !self.resolution.missing.iter().any(|id| id == package_id) {
                self.resolution.missing.push(package_id.to_string());
            }
            return;
        };

        if let Some((raw, parsed)) = requirement {
            let installed = Version::parse(&record.version).unwrap_or_default();
            let satisfied = parsed.is_some_and(|req| req.matches(&installed));
            if !satisfied {
                self.push_conflict(DependencyConflict::VersionMismatch {
                    package_id: package_id.to_string(),
                    required: raw.to_string(),
                    installed: record.version.clone(),
                });
            }
        }

        if self.visited.contains(package_id) {
            return;
        }

        self.visiting.push(package_id.to_string());
        for dep_id in &record.dependencies {
            self.visit(dep_id, None);
        }
        self.visiting.pop();

        self.visited.insert(package_id.to_string());
        self.resolution.install_order.push(package_id.to_string());
    }

    fn push_conflict(&mut self, conflict: DependencyConflict) {
        if !self.resolution.conflicts.contains(&conflict) {
            self.resolution.conflicts.push(conflict);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::registry::InstalledPackageRecord;

    fn record(id: &str, version: &str, deps: &[&str]) -> InstalledPackageRecord {
        InstalledPackageRecord {
            package_id: id.into(),
            version: version.into(),
            author: "Studio".into(),
            install_path: format!("/pkgs/{}", id).into(),
            installed_at: chrono::Utc::now(),
            last_used: None,
            is_active: true,
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
        }
    }

    fn registry(records: Vec<InstalledPackageRecord>) -> RegistryFile {
        let mut registry = RegistryFile::default();
        for r in records {
            registry.upsert(r);
        }
        registry
    }

    fn dep(id: &str, req: &str) -> Dependency {
        Dependency {
            package_id: id.into(),
            version_requirement: req.into(),
        }
    }

    #[test]
    fn test_at_least_requirement_resolves() {
        let registry = registry(vec![record("A", "1.0.0", &[])]);
        let resolution = DependencyResolver::new(&registry).resolve("P", &[dep("A", ">=1.0.0")]);
        assert!(resolution.resolved());
        assert_eq!(resolution.install_order, vec!["A"]);
    }

    #[test]
    fn test_unsatisfied_requirement_is_one_conflict() {
        let registry = registry(vec![record("A", "1.0.0", &[])]);
        let resolution = DependencyResolver::new(&registry).resolve("P", &[dep("A", ">=2.0.0")]);
        assert!(!resolution.resolved());
        assert!(resolution.missing.is_empty());
        assert_eq!(resolution.conflicts.len(), 1);
        assert_eq!(resolution.conflicts[0].package_id(), "A");
    }

    #[test]
    fn test_exact_requirement() {
        let registry = registry(vec![record("A", "1.2.0", &[])]);
        let resolver = DependencyResolver::new(&registry);
        assert!(resolver.resolve("P", &[dep("A", "1.2.0")]).resolved());
        assert!(!resolver.resolve("P", &[dep("A", "1.2.1")]).resolved());
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let registry = RegistryFile::default();
        let resolution = DependencyResolver::new(&registry).resolve("P", &[dep("P", ">=1.0.0")]);
        assert!(!resolution.resolved());
        assert_eq!(
            resolution.conflicts,
            vec![DependencyConflict::Circular {
                package_id: "P".into(),
                cycle: vec!["P".into(), "P".into()],
            }]
        );
    }

    #[test]
    fn test_cycle_through_installed_packages_terminates() {
        // P -> A -> B -> P
        let registry = registry(vec![record("A", "1.0.0", &["B"]), record("B", "1.0.0", &["P"])]);
        let resolution = DependencyResolver::new(&registry).resolve("P", &[dep("A", "1.0.0")]);
        assert_eq!(resolution.conflicts.len(), 1);
        match &resolution.conflicts[0] {
            DependencyConflict::Circular { package_id, cycle } => {
                assert_eq!(package_id, "P");
                assert_eq!(cycle, &vec!["P", "A", "B", "P"]);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_dependencies_collected() {
        let registry = registry(vec![record("A", "1.0.0", &["gone"])]);
        let resolution = DependencyResolver::new(&registry)
            .resolve("P", &[dep("A", ">=1.0.0"), dep("B", "1.0.0")]);
        assert_eq!(resolution.missing, vec!["gone", "B"]);
        assert!(resolution.conflicts.is_empty());
    }

    #[test]
    fn test_install_order_is_post_order_and_deduplicated() {
        let registry = registry(vec![
            record("base", "1.0.0", &[]),
            record("voice", "1.0.0", &["base"]),
            record("outfit", "1.0.0", &["base"]),
        ]);
        let resolution = DependencyResolver::new(&registry)
            .resolve("P", &[dep("voice", "1.0.0"), dep("outfit", "1.0.0")]);
        assert!(resolution.resolved());
        assert_eq!(resolution.install_order, vec!["base", "voice", "outfit"]);
    }

    #[test]
    fn test_unparseable_requirement_is_a_conflict() {
        let registry = registry(vec![record("A", "1.0.0", &[])]);
        let resolution = DependencyResolver::new(&registry).resolve("P", &[dep("A", "^1")]);
        assert_eq!(resolution.conflicts.len(), 1);
    }
}
