use assert_cmd::Command;
use assert_cmd::cargo;
use charpack::package::manifest_digest;
use serde_json::{Value, json};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::tempdir;
use zip::{CompressionMethod, ZipWriter};
use zip::write::SimpleFileOptions;

fn manifest(id: &str, version: &str, dependencies: Value) -> Value {
    json!({
        "id": id,
        "name": format!("{} character", id),
        "version": version,
        "description": "Integration test character",
        "author": "Integration Studio",
        "license": "CC-BY-4.0",
        "compatibility": { "minSystemVersion": "0.1.0" },
        "content": {
            "ageRating": "everyone",
            "contentWarnings": [],
            "safetyLevel": "strict",
            "parentalApprovalRequired": false
        },
        "assets": { "models": 1, "textures": 0, "animations": 0, "audio": 0, "totalSize": 1024 },
        "performance": { "triangleCount": 500 },
        "dependencies": dependencies,
        "installation": { "requiresRestart": false }
    })
}

/// Write a signed package archive. `tamper` edits the manifest after the
/// signature was computed.
fn write_package(
    dir: &Path,
    name: &str,
    manifest: &Value,
    extra: &[(&str, &[u8])],
    tamper: Option<fn(&mut Value)>,
) -> PathBuf {
    let signature = json!({
        "signer": "Integration Studio",
        "timestamp": "2026-01-01T00:00:00Z",
        "hash": manifest_digest(manifest),
        "algorithm": "SHA-256"
    });
    let mut stored = manifest.clone();
    if let Some(tamper) = tamper {
        tamper(&mut stored);
    }

    let path = dir.join(name);
    let mut zip = ZipWriter::new(File::create(&path).unwrap());
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file("manifest.json", options).unwrap();
    zip.write_all(&serde_json::to_vec_pretty(&stored).unwrap())
        .unwrap();
    zip.start_file("signature.sig", options).unwrap();
    zip.write_all(&serde_json::to_vec(&signature).unwrap())
        .unwrap();
    zip.start_file("assets/models/body.gltf", options).unwrap();
    zip.write_all(b"{\"asset\":{\"version\":\"2.0\"}}").unwrap();
    zip.start_file("configurations/personality.json", options)
        .unwrap();
    zip.write_all(b"{\"voice\":\"calm\"}").unwrap();
    zip.start_file("thumbnails/preview.png", options).unwrap();
    zip.write_all(b"\x89PNG").unwrap();
    for (entry, content) in extra {
        zip.start_file(*entry, options).unwrap();
        zip.write_all(content).unwrap();
    }
    zip.finish().unwrap();
    path
}

fn charpack(root: &Path) -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("charpack"));
    cmd.env_remove("CHARPACK_ROOT").arg("--root").arg(root);
    cmd
}

#[test]
fn test_install_show_list_round_trip() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("pkgs");
    let archive = write_package(
        dir.path(),
        "hero.zip",
        &manifest("hero", "1.2.0", json!([])),
        &[],
        None,
    );

    charpack(&root)
        .arg("install")
        .arg(&archive)
        .assert()
        .success()
        .stdout(predicates::str::contains("Installed hero 1.2.0"));

    assert!(root.join("hero/assets/models/body.gltf").exists());
    assert!(root.join("registry.json").exists());

    let output = charpack(&root)
        .args(["show", "hero", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let info: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(info["version"], "1.2.0");
    assert_eq!(info["author"], "Integration Studio");
    assert_eq!(info["dependencies"], json!([]));

    charpack(&root)
        .arg("list")
        .assert()
        .success()
        .stdout(predicates::str::contains("hero 1.2.0"));
}

#[test]
fn test_tampered_archive_leaves_nothing_behind() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("pkgs");
    let archive = write_package(
        dir.path(),
        "hero.zip",
        &manifest("hero", "1.0.0", json!([])),
        &[],
        Some(|m| m["description"] = json!("changed after signing")),
    );

    for _ in 0..2 {
        charpack(&root)
            .arg("install")
            .arg(&archive)
            .assert()
            .failure()
            .stderr(predicates::str::contains("hash"));
    }
    assert!(!root.join("hero").exists());

    charpack(&root)
        .arg("list")
        .assert()
        .success()
        .stdout(predicates::str::contains("No packages installed."));
}

#[test]
fn test_executable_payload_rejected() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("pkgs");
    let archive = write_package(
        dir.path(),
        "hero.zip",
        &manifest("hero", "1.0.0", json!([])),
        &[("assets/payload.exe", &b"MZ\x90\x00"[..])],
        None,
    );

    charpack(&root)
        .arg("install")
        .arg(&archive)
        .assert()
        .failure()
        .stderr(predicates::str::contains("assets/payload.exe"));
    assert!(!root.join("hero").exists());
}

#[test]
fn test_uninstall_respects_dependents() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("pkgs");
    let base = write_package(
        dir.path(),
        "base.zip",
        &manifest("base", "1.0.0", json!([])),
        &[],
        None,
    );
    let hero = write_package(
        dir.path(),
        "hero.zip",
        &manifest(
            "hero",
            "1.0.0",
            json!([{ "packageId": "base", "versionRequirement": ">=1.0.0" }]),
        ),
        &[],
        None,
    );

    charpack(&root)
        .arg("install")
        .arg(&hero)
        .assert()
        .failure()
        .stderr(predicates::str::contains("missing dependency: base"));

    charpack(&root).arg("install").arg(&base).assert().success();
    charpack(&root).arg("install").arg(&hero).assert().success();

    charpack(&root)
        .args(["uninstall", "base"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("still required by: hero"));

    charpack(&root).args(["uninstall", "hero"]).assert().success();
    charpack(&root).args(["uninstall", "base"]).assert().success();
    assert!(!root.join("base").exists());
}

#[test]
fn test_update_reports_changes() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("pkgs");
    let v1 = write_package(
        dir.path(),
        "hero-1.zip",
        &manifest("hero", "1.0.0", json!([])),
        &[],
        None,
    );
    let v2 = write_package(
        dir.path(),
        "hero-2.zip",
        &manifest("hero", "1.1.0", json!([])),
        &[("assets/textures/skin.png", &b"\x89PNG"[..])],
        None,
    );

    charpack(&root).arg("install").arg(&v1).assert().success();
    charpack(&root)
        .args(["update", "hero", "--archive"])
        .arg(&v2)
        .assert()
        .success()
        .stdout(predicates::str::contains("version: 1.0.0 -> 1.1.0"))
        .stdout(predicates::str::contains(
            "file added: assets/textures/skin.png",
        ));

    charpack(&root)
        .args(["update", "hero", "--archive"])
        .arg(&v2)
        .assert()
        .failure()
        .stderr(predicates::str::contains("not newer"));

    assert!(root.join("hero/assets/textures/skin.png").exists());
}

#[test]
fn test_update_without_staged_archive_fails() {
    let dir = tempdir().unwrap();
    charpack(&dir.path().join("pkgs"))
        .args(["update", "hero"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("no update archive"));
}
