//! Package manifest and signature documents.
//!
//! Both are read from the archive as JSON. Manifest string fields default to
//! empty so that a document with several missing fields still deserializes
//! and the validator can report every problem at once instead of stopping
//! at the first absent key.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Name of the manifest entry inside a package archive.
pub const MANIFEST_FILE: &str = "manifest.json";
/// Name of the signature entry inside a package archive.
pub const SIGNATURE_FILE: &str = "signature.sig";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PackageManifest {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: String,
    pub license: String,
    pub compatibility: Compatibility,
    pub content: ContentInfo,
    pub assets: AssetSummary,
    pub performance: PerformanceHints,
    pub dependencies: Vec<Dependency>,
    pub installation: InstallationInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Compatibility {
    pub min_system_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_system_version: Option<String>,
    pub required_features: Vec<String>,
    pub optional_features: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ContentInfo {
    /// Raw rating string; see [`AgeRating`] for the accepted values.
    pub age_rating: String,
    pub content_warnings: Vec<String>,
    /// Raw safety level; see [`SafetyLevel`] for the accepted values.
    pub safety_level: String,
    pub parental_approval_required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct AssetSummary {
    pub models: u32,
    pub textures: u32,
    pub animations: u32,
    pub audio: u32,
    /// Total uncompressed size of all assets in bytes.
    pub total_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PerformanceHints {
    pub triangle_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub texture_memory_mb: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Dependency {
    pub package_id: String,
    pub version_requirement: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct InstallationInfo {
    pub requires_restart: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_install_script: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uninstall_script: Option<String>,
}

impl PackageManifest {
    /// Deserialize a manifest from an already parsed JSON document.
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        PackageManifest::deserialize(value)
    }

    pub fn dependency_ids(&self) -> Vec<String> {
        self.dependencies
            .iter()
            .map(|d| d.package_id.clone())
            .collect()
    }
}

/// Detached signature over the canonical manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Signature {
    pub signer: String,
    pub timestamp: String,
    /// Hex-encoded SHA-256 of the canonical manifest.
    pub hash: String,
    pub algorithm: String,
}

/// Content age rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeRating {
    Everyone,
    Everyone10Plus,
    Teen,
    Mature,
    AdultsOnly,
}

impl AgeRating {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgeRating::Everyone => "everyone",
            AgeRating::Everyone10Plus => "everyone-10+",
            AgeRating::Teen => "teen",
            AgeRating::Mature => "mature",
            AgeRating::AdultsOnly => "adults-only",
        }
    }
}

impl FromStr for AgeRating {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "everyone" => Ok(AgeRating::Everyone),
            "everyone-10+" => Ok(AgeRating::Everyone10Plus),
            "teen" => Ok(AgeRating::Teen),
            "mature" => Ok(AgeRating::Mature),
            "adults-only" => Ok(AgeRating::AdultsOnly),
            other => Err(format!("unknown age rating '{}'", other)),
        }
    }
}

impl fmt::Display for AgeRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared content safety level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyLevel {
    Strict,
    Moderate,
    Standard,
}

impl FromStr for SafetyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(SafetyLevel::Strict),
            "moderate" => Ok(SafetyLevel::Moderate),
            "standard" => Ok(SafetyLevel::Standard),
            other => Err(format!("unknown safety level '{}'", other)),
        }
    }
}

/// Rebuild a JSON document with every object's keys in sorted order.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Canonical byte form of a manifest: compact JSON with sorted object keys.
///
/// This is the exact input to the signature digest and to the
/// post-extraction comparison, so formatting differences in the archive's
/// `manifest.json` do not matter but any change of content does.
pub fn canonical_bytes(value: &Value) -> Vec<u8> {
    // Serializing an in-memory Value cannot fail
    serde_json::to_vec(&canonicalize(value)).unwrap_or_default()
}
