//! Builders for package archives used by unit tests.

use serde_json::{Value, json};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::FileOptions;

use crate::package::{MANIFEST_FILE, SIGNATURE_FILE, manifest_digest};

/// A manifest that passes validation against a default `EngineConfig`.
pub fn valid_manifest(id: &str, version: &str) -> Value {
    json!({
        "id": id,
        "name": "Test Character",
        "version": version,
        "description": "A friendly test character",
        "author": "Test Studio",
        "license": "CC-BY-4.0",
        "compatibility": {
            "minSystemVersion": "0.1.0",
            "requiredFeatures": [],
            "optionalFeatures": []
        },
        "content": {
            "ageRating": "everyone",
            "contentWarnings": [],
            "safetyLevel": "strict",
            "parentalApprovalRequired": false
        },
        "assets": { "models": 1, "textures": 1, "animations": 0, "audio": 0, "totalSize": 2048 },
        "performance": { "triangleCount": 1200 },
        "dependencies": [],
        "installation": { "requiresRestart": false }
    })
}

pub fn signature_for(manifest: &Value) -> Value {
    json!({
        "signer": "Test Studio",
        "timestamp": "2026-01-01T00:00:00Z",
        "hash": manifest_digest(manifest),
        "algorithm": "sha256"
    })
}

/// Zip archive contents for a package, signed over its manifest unless
/// told otherwise.
pub struct PackageFixture {
    manifest: Value,
    signature: Option<Value>,
    include_manifest: bool,
    include_signature: bool,
    files: Vec<(String, Vec<u8>)>,
}

impl PackageFixture {
    pub fn new(id: &str, version: &str) -> Self {
        Self {
            manifest: valid_manifest(id, version),
            signature: None,
            include_manifest: true,
            include_signature: true,
            files: vec![
                (
                    "assets/models/body.gltf".into(),
                    br#"{"asset":{"version":"2.0"}}"#.to_vec(),
                ),
                ("assets/textures/skin.png".into(), b"\x89PNG\r\n\x1a\nfake".to_vec()),
                (
                    "configurations/personality.json".into(),
                    br#"{"voice":"warm","greeting":"Hello!"}"#.to_vec(),
                ),
                ("thumbnails/preview.png".into(), b"\x89PNG\r\n\x1a\nthumb".to_vec()),
            ],
        }
    }

    /// Modify the manifest before it is signed.
    pub fn edit(mut self, change: impl FnOnce(&mut Value)) -> Self {
        change(&mut self.manifest);
        self
    }

    pub fn with_dependency(self, package_id: &str, requirement: &str) -> Self {
        self.edit(|m| {
            if let Some(deps) = m["dependencies"].as_array_mut() {
                deps.push(json!({ "packageId": package_id, "versionRequirement": requirement }));
            }
        })
    }

    pub fn with_file(mut self, name: &str, content: &[u8]) -> Self {
        self.files.push((name.to_string(), content.to_vec()));
        self
    }

    pub fn without_file(mut self, name: &str) -> Self {
        self.files.retain(|(n, _)| n != name);
        self
    }

    /// Use an explicit signature document instead of a matching one.
    pub fn with_signature(mut self, signature: Value) -> Self {
        self.signature = Some(signature);
        self
    }

    pub fn without_manifest(mut self) -> Self {
        self.include_manifest = false;
        self
    }

    pub fn without_signature(mut self) -> Self {
        self.include_signature = false;
        self
    }

    pub fn manifest(&self) -> &Value {
        &self.manifest
    }

    /// Write the archive to `dir/{name}` and return its path.
    pub fn write(&self, dir: &Path, name: &str) -> PathBuf {
        std::fs::create_dir_all(dir).unwrap();
        let path = dir.join(name);
        let file = File::create(&path).unwrap();
        let mut zip = ZipWriter::new(file);
        let options: FileOptions<()> =
            FileOptions::default().compression_method(CompressionMethod::Deflated);

        if self.include_manifest {
            zip.start_file(MANIFEST_FILE, options).unwrap();
            zip.write_all(&serde_json::to_vec_pretty(&self.manifest).unwrap())
                .unwrap();
        }
        if self.include_signature {
            let signature = self
                .signature
                .clone()
                .unwrap_or_else(|| signature_for(&self.manifest));
            zip.start_file(SIGNATURE_FILE, options).unwrap();
            zip.write_all(&serde_json::to_vec(&signature).unwrap())
                .unwrap();
        }
        for (name, content) in &self.files {
            zip.start_file(name.as_str(), options).unwrap();
            zip.write_all(content).unwrap();
        }

        zip.finish().unwrap();
        path
    }
}

/// Write a zip with arbitrary raw entries, bypassing the fixture's defaults.
pub fn write_raw_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let file = File::create(path).unwrap();
    let mut zip = ZipWriter::new(file);
    let options: FileOptions<()> =
        FileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, content) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(content).unwrap();
    }
    zip.finish().unwrap();
}
