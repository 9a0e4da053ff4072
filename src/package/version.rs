//! Version parsing, ordering and requirement matching.
//!
//! Installed versions are compared numerically on `MAJOR.MINOR.PATCH`, with
//! missing components treated as 0 so `"1.2"` equals `"1.2.0"`. The strict
//! `MAJOR.MINOR.PATCH[-pre][+build]` grammar is only enforced when a
//! manifest is validated.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A leniently parsed package version.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre: Option<String>,
}

impl Version {
    /// Parse a version, filling missing numeric components with 0.
    ///
    /// Build metadata (`+...`) is ignored; a leading `v` is accepted.
    /// Returns `None` if a present numeric component is not a number.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let without_build = trimmed.split('+').next().unwrap_or_default();
        let (core, pre) = match without_build.split_once('-') {
            Some((core, pre)) if !pre.is_empty() => (core, Some(pre.to_string())),
            Some((core, _)) => (core, None),
            None => (without_build, None),
        };
        if core.is_empty() {
            return None;
        }

        let mut parts = [0u64; 3];
        for (i, part) in core.split('.').enumerate() {
            if i >= parts.len() {
                return None;
            }
            parts[i] = part.parse().ok()?;
        }

        Some(Version {
            major: parts[0],
            minor: parts[1],
            patch: parts[2],
            pre,
        })
    }

    /// Check a version string against the strict
    /// `MAJOR.MINOR.PATCH[-pre][+build]` grammar.
    pub fn is_strict_semver(input: &str) -> bool {
        semver::Version::parse(input).is_ok()
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.pre, &other.pre) {
                (None, None) => Ordering::Equal,
                // A pre-release sorts before its release
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(a), Some(b)) => compare_prerelease(a, b),
            })
    }
}

/// Identifier-wise pre-release order, so `rc.2` sorts before `rc.10`.
/// Identifiers semver rejects fall back to plain string order.
fn compare_prerelease(a: &str, b: &str) -> Ordering {
    match (semver::Prerelease::new(a), semver::Prerelease::new(b)) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre {
            write!(f, "-{}", pre)?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s).ok_or_else(|| format!("invalid version '{}'", s))
    }
}

/// Compare two version strings.
///
/// Unparseable input sorts as `0.0.0`, so a garbage installed version never
/// blocks an update to a well-formed one.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let a = Version::parse(a).unwrap_or_default();
    let b = Version::parse(b).unwrap_or_default();
    a.cmp(&b)
}

/// A dependency's version constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionRequirement {
    /// Installed version must equal this one (`"1.2.0"` or `"=1.2.0"`).
    Exact(Version),
    /// Installed version must be at least this one (`">=1.2.0"`).
    AtLeast(Version),
}

impl VersionRequirement {
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if let Some(rest) = trimmed.strip_prefix(">=") {
            return Version::parse(rest).map(VersionRequirement::AtLeast);
        }
        let rest = trimmed.strip_prefix('=').unwrap_or(trimmed);
        Version::parse(rest).map(VersionRequirement::Exact)
    }

    pub fn matches(&self, installed: &Version) -> bool {
        match self {
            VersionRequirement::Exact(v) => installed == v,
            VersionRequirement::AtLeast(v) => installed >= v,
        }
    }
}

impl fmt::Display for VersionRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionRequirement::Exact(v) => write!(f, "{}", v),
            VersionRequirement::AtLeast(v) => write!(f, ">={}", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_versions_numeric_not_lexical() {
        assert_eq!(compare_versions("1.9.0", "1.10.0"), Ordering::Less);
        assert_eq!(compare_versions("1.10.0", "1.9.0"), Ordering::Greater);
    }

    #[test]
    fn test_compare_versions_equal() {
        assert_eq!(compare_versions("1.0.0", "1.0.0"), Ordering::Equal);
    }

    #[test]
    fn test_missing_components_are_zero() {
        assert_eq!(compare_versions("1.2", "1.2.0"), Ordering::Equal);
        assert_eq!(compare_versions("2", "2.0.0"), Ordering::Equal);
        assert_eq!(Version::parse("3").unwrap().to_string(), "3.0.0");
    }

    #[test]
    fn test_prerelease_sorts_before_release() {
        assert_eq!(compare_versions("1.0.0-beta", "1.0.0"), Ordering::Less);
        assert_eq!(compare_versions("1.0.0-alpha", "1.0.0-beta"), Ordering::Less);
    }

    #[test]
    fn test_prerelease_identifiers_compare_numerically() {
        assert_eq!(compare_versions("1.0.0-rc.2", "1.0.0-rc.10"), Ordering::Less);
        assert_eq!(compare_versions("1.0.0-alpha", "1.0.0-alpha.1"), Ordering::Less);
        assert_eq!(compare_versions("1.0.0-beta.11", "1.0.0-rc.1"), Ordering::Less);
        assert_eq!(compare_versions("1.0.0-rc.1", "1.0.0-rc.1"), Ordering::Equal);
    }

    #[test]
    fn test_build_metadata_ignored() {
        assert_eq!(compare_versions("1.0.0+build.7", "1.0.0"), Ordering::Equal);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Version::parse("").is_none());
        assert!(Version::parse("one.two").is_none());
        assert!(Version::parse("1.2.3.4").is_none());
    }

    #[test]
    fn test_strict_semver_grammar() {
        assert!(Version::is_strict_semver("1.2.3"));
        assert!(Version::is_strict_semver("1.2.3-beta.1+build.5"));
        assert!(!Version::is_strict_semver("1.2"));
        assert!(!Version::is_strict_semver("v1.2.3"));
        assert!(!Version::is_strict_semver("1.2.x"));
    }

    #[test]
    fn test_requirement_at_least() {
        let req = VersionRequirement::parse(">=1.0.0").unwrap();
        assert!(req.matches(&Version::parse("1.0.0").unwrap()));
        assert!(req.matches(&Version::parse("1.10.0").unwrap()));
        assert!(!req.matches(&Version::parse("0.9.9").unwrap()));
        assert_eq!(req.to_string(), ">=1.0.0");
    }

    #[test]
    fn test_requirement_exact() {
        let req = VersionRequirement::parse("1.2.0").unwrap();
        assert!(req.matches(&Version::parse("1.2").unwrap()));
        assert!(!req.matches(&Version::parse("1.2.1").unwrap()));

        let req = VersionRequirement::parse("=1.2.0").unwrap();
        assert_eq!(req, VersionRequirement::Exact(Version::parse("1.2.0").unwrap()));
    }

    #[test]
    fn test_requirement_rejects_unparseable() {
        assert!(VersionRequirement::parse(">=latest").is_none());
        assert!(VersionRequirement::parse("^1.0").is_none());
    }
}
