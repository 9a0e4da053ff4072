//! Manifest signature verification.
//!
//! A signature binds the SHA-256 digest of the canonical manifest to a
//! claimed signer. There is no public-key check behind the signer name, so
//! this detects tampering after signing but does not establish who signed.

use log::debug;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{PackageError, PackageResult};

use super::manifest::{Signature, canonical_bytes};

const SUPPORTED_ALGORITHMS: &[&str] = &["sha256", "sha-256"];

/// Hex-encoded SHA-256 digest of the canonical form of `manifest`.
pub fn manifest_digest(manifest: &Value) -> String {
    hex::encode(Sha256::digest(canonical_bytes(manifest)))
}

pub struct SignatureVerifier;

impl SignatureVerifier {
    /// Verify `signature` against the manifest document.
    ///
    /// Every failure is a [`PackageError::Signature`]; there is no
    /// downgrade to a warning.
    #[tracing::instrument(skip(manifest, signature), fields(signer = %signature.signer))]
    pub fn verify(manifest: &Value, signature: &Signature) -> PackageResult<()> {
        let mut missing = Vec::new();
        if signature.signer.trim().is_empty() {
            missing.push("signer");
        }
        if signature.timestamp.trim().is_empty() {
            missing.push("timestamp");
        }
        if signature.hash.trim().is_empty() {
            missing.push("hash");
        }
        if !missing.is_empty() {
            return Err(PackageError::Signature(format!(
                "signature is missing {}",
                missing.join(", ")
            )));
        }

        let algorithm = signature.algorithm.trim().to_ascii_lowercase();
        if !SUPPORTED_ALGORITHMS.contains(&algorithm.as_str()) {
            return Err(PackageError::Signature(format!(
                "unsupported signature algorithm '{}'",
                signature.algorithm
            )));
        }

        let expected = manifest_digest(manifest);
        if !expected.eq_ignore_ascii_case(signature.hash.trim()) {
            return Err(PackageError::Signature(format!(
                "manifest hash mismatch: signature claims {}, manifest hashes to {}",
                signature.hash, expected
            )));
        }

        debug!("Manifest signature by {} verified", signature.signer);
        Ok(())
    }
}
