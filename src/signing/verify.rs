//! Detached signature verification against the trusted release key.

use crate::error::{Result, VerifyError};
use log::info;
use pgp::composed::{Deserializable, SignedPublicKey, StandaloneSignature};
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// The trusted release signing public key, compiled into the binary.
const TRUSTED_KEY: &str = include_str!("release-signing-key.asc");

/// Suffix appended to a file path to locate its detached signature.
pub const SIGNATURE_SUFFIX: &str = ".sig";

/// Checks detached OpenPGP signatures against one fixed trusted key.
///
/// The key is not configurable per call; production code uses the
/// embedded release key via [`SignatureVerifier::new`].
#[derive(Clone)]
pub struct SignatureVerifier {
    key: SignedPublicKey,
}

impl SignatureVerifier {
    /// Build a verifier over the embedded trusted key.
    pub fn new() -> Result<Self> {
        Self::from_armored_key(TRUSTED_KEY)
    }

    /// Build a verifier over an explicit armored public key.
    pub fn from_armored_key(armored: &str) -> Result<Self> {
        let (key, _) = SignedPublicKey::from_string(armored)
            .map_err(|e| VerifyError::Key(e.to_string()))?;
        Ok(Self { key })
    }

    /// Path of the detached signature belonging to `file`.
    pub fn signature_path(file: &Path) -> PathBuf {
        PathBuf::from(format!("{}{}", file.display(), SIGNATURE_SUFFIX))
    }

    /// Verify `file` against its `<file>.sig` detached signature.
    ///
    /// Fails closed: a missing or unreadable signature file, or any
    /// cryptographic mismatch, is an error.
    pub fn verify_detached(&self, file: &Path) -> Result<()> {
        let content = std::fs::read(file)?;

        let sig_path = Self::signature_path(file);
        let raw = std::fs::read(&sig_path).map_err(|e| VerifyError::MissingSignature {
            path: file.to_path_buf(),
            reason: e.to_string(),
        })?;

        let signature = parse_signature(&raw).map_err(|reason| VerifyError::BadSignature {
            path: file.to_path_buf(),
            reason,
        })?;

        signature
            .verify(&self.key, &content)
            .map_err(|e| VerifyError::BadSignature {
                path: file.to_path_buf(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    /// Verify every file in order, aborting on the first failure.
    pub fn verify_all(&self, files: &[PathBuf]) -> Result<()> {
        for file in files {
            self.verify_detached(file)?;
        }
        info!("signatures verified for {} file(s)", files.len());
        Ok(())
    }
}

/// Parse a detached signature, accepting both ASCII-armored and raw
/// binary OpenPGP encodings.
fn parse_signature(raw: &[u8]) -> std::result::Result<StandaloneSignature, String> {
    if raw.starts_with(b"-----BEGIN") {
        let armored = std::str::from_utf8(raw).map_err(|e| e.to_string())?;
        StandaloneSignature::from_string(armored)
            .map(|(signature, _)| signature)
            .map_err(|e| e.to_string())
    } else {
        StandaloneSignature::from_bytes(Cursor::new(raw)).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReleaseError;
    use tempfile::TempDir;

    const SAMPLE: &[u8] = include_bytes!("../../tests/fixtures/sample-bundle.tar.gz");
    const SAMPLE_SIG_ARMORED: &[u8] =
        include_bytes!("../../tests/fixtures/sample-bundle.tar.gz.sig.asc");
    const SAMPLE_SIG_BINARY: &[u8] = include_bytes!("../../tests/fixtures/sample-bundle.tar.gz.sig");
    const UNRELATED_KEY: &str = include_str!("../../tests/fixtures/unrelated_public.asc");

    fn write_pair(dir: &Path, sig: &[u8]) -> PathBuf {
        let file = dir.join("sample-bundle.tar.gz");
        std::fs::write(&file, SAMPLE).unwrap();
        std::fs::write(SignatureVerifier::signature_path(&file), sig).unwrap();
        file
    }

    #[test]
    fn verifies_armored_signature_with_embedded_key() {
        let dir = TempDir::new().unwrap();
        let file = write_pair(dir.path(), SAMPLE_SIG_ARMORED);
        SignatureVerifier::new().unwrap().verify_detached(&file).unwrap();
    }

    #[test]
    fn verifies_binary_signature_with_embedded_key() {
        let dir = TempDir::new().unwrap();
        let file = write_pair(dir.path(), SAMPLE_SIG_BINARY);
        SignatureVerifier::new().unwrap().verify_detached(&file).unwrap();
    }

    #[test]
    fn rejects_signature_under_a_different_key() {
        let dir = TempDir::new().unwrap();
        let file = write_pair(dir.path(), SAMPLE_SIG_ARMORED);
        let verifier = SignatureVerifier::from_armored_key(UNRELATED_KEY).unwrap();
        let err = verifier.verify_detached(&file).unwrap_err();
        assert!(matches!(
            err,
            ReleaseError::Verify(VerifyError::BadSignature { .. })
        ));
    }

    #[test]
    fn rejects_tampered_content() {
        let dir = TempDir::new().unwrap();
        let file = write_pair(dir.path(), SAMPLE_SIG_ARMORED);
        std::fs::write(&file, b"tampered").unwrap();
        let err = SignatureVerifier::new().unwrap().verify_detached(&file).unwrap_err();
        assert!(matches!(
            err,
            ReleaseError::Verify(VerifyError::BadSignature { .. })
        ));
    }

    #[test]
    fn missing_signature_file_fails_closed() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("sample-bundle.tar.gz");
        std::fs::write(&file, SAMPLE).unwrap();
        let err = SignatureVerifier::new().unwrap().verify_detached(&file).unwrap_err();
        match err {
            ReleaseError::Verify(VerifyError::MissingSignature { path, .. }) => {
                assert_eq!(path, file);
            }
            other => panic!("expected missing-signature error, got {other}"),
        }
    }

    #[test]
    fn garbage_signature_fails_closed() {
        let dir = TempDir::new().unwrap();
        let file = write_pair(dir.path(), b"definitely not a signature");
        let err = SignatureVerifier::new().unwrap().verify_detached(&file).unwrap_err();
        assert!(matches!(
            err,
            ReleaseError::Verify(VerifyError::BadSignature { .. })
        ));
    }

    #[test]
    fn verify_all_names_the_first_failing_file() {
        let dir = TempDir::new().unwrap();
        let good = write_pair(dir.path(), SAMPLE_SIG_ARMORED);
        let bad = dir.path().join("unsigned.tar.gz");
        std::fs::write(&bad, b"unsigned").unwrap();

        let verifier = SignatureVerifier::new().unwrap();
        let err = verifier
            .verify_all(&[good, bad.clone()])
            .unwrap_err();
        match err {
            ReleaseError::Verify(VerifyError::MissingSignature { path, .. }) => {
                assert_eq!(path, bad);
            }
            other => panic!("expected missing-signature error, got {other}"),
        }
    }
}
