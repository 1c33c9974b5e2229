//! Integrity verification for downloaded artefacts.
//!
//! A [`FetchedArtefact`] becomes a [`VerifiedArtefact`] only through
//! [`verify`], and extraction accepts nothing else. There is no switch that
//! disables the check. On a mismatch the spooled archive is deleted before
//! the error is returned.

use std::path::{Path, PathBuf};

use log::{debug, warn};

use super::download::FetchedArtefact;
use super::sha256_digest::Sha256Digest;

/// An archive whose digest matched the release table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedArtefact {
    path: PathBuf,
    digest: Sha256Digest,
    size: u64,
}

impl VerifiedArtefact {
    /// Return the spool file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the verified digest.
    #[must_use]
    pub fn digest(&self) -> &Sha256Digest {
        &self.digest
    }

    /// Return the archive size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Errors arising from artefact verification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    /// The computed digest differs from the expected one.
    #[error("checksum mismatch: expected {expected}, actual {actual}")]
    IntegrityMismatch {
        /// The digest recorded in the release table.
        expected: Sha256Digest,
        /// The digest computed from the downloaded bytes.
        actual: Sha256Digest,
    },
}

/// Check `artefact` against `expected`.
///
/// Both digests are normalised to lower case at construction, so equality
/// here is a case-insensitive hex comparison.
///
/// # Errors
///
/// Returns [`VerificationError::IntegrityMismatch`] when the digests
/// differ. The spool file has been removed by the time the error returns.
pub fn verify(
    artefact: FetchedArtefact,
    expected: &Sha256Digest,
) -> Result<VerifiedArtefact, VerificationError> {
    let (path, actual, size) = artefact.into_parts();
    if &actual != expected {
        discard(&path);
        return Err(VerificationError::IntegrityMismatch {
            expected: expected.clone(),
            actual,
        });
    }
    debug!("verified {} ({size} bytes, sha256 {actual})", path.display());
    Ok(VerifiedArtefact {
        path,
        digest: actual,
        size,
    })
}

/// Return whether `bytes` hash to `expected`.
///
/// # Examples
///
/// ```
/// use nping_installer::artefact::sha256_digest::Sha256Digest;
/// use nping_installer::artefact::verification::digest_matches;
///
/// let expected = Sha256Digest::of_bytes(b"nping");
/// assert!(digest_matches(b"nping", &expected));
/// assert!(!digest_matches(b"npinG", &expected));
/// ```
#[must_use]
pub fn digest_matches(bytes: &[u8], expected: &Sha256Digest) -> bool {
    &Sha256Digest::of_bytes(bytes) == expected
}

/// Remove a rejected artefact so it cannot be picked up later.
fn discard(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("removed rejected artefact {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("failed to remove rejected artefact {}: {e}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artefact::download::spool_hashed;
    use crate::cancel::CancellationToken;

    const BODY: &[u8] = b"PK\x03\x04 pretend archive bytes";

    fn fetch(bytes: &[u8]) -> (tempfile::TempDir, FetchedArtefact) {
        let temp = tempfile::tempdir().expect("temp dir");
        let dest = temp.path().join("archive.zip");
        let fetched = spool_hashed(
            &mut &bytes[..],
            &dest,
            None,
            "https://example.test/archive.zip",
            &CancellationToken::new(),
        )
        .expect("spool");
        (temp, fetched)
    }

    #[test]
    fn accepts_matching_digest() {
        let (_temp, fetched) = fetch(BODY);
        let expected = Sha256Digest::of_bytes(BODY);
        let verified = verify(fetched, &expected).expect("digest matches");
        assert_eq!(verified.digest(), &expected);
        assert!(verified.path().exists());
    }

    #[test]
    fn accepts_uppercase_expected_digest() {
        let (_temp, fetched) = fetch(BODY);
        let upper = Sha256Digest::of_bytes(BODY).as_str().to_ascii_uppercase();
        let expected = Sha256Digest::try_from(upper).expect("valid digest");
        assert!(verify(fetched, &expected).is_ok());
    }

    #[test]
    fn mismatch_deletes_spooled_artefact() {
        let (_temp, fetched) = fetch(BODY);
        let path = fetched.path().to_path_buf();
        let expected = Sha256Digest::of_bytes(b"something else");
        let err = verify(fetched, &expected).expect_err("digest differs");
        assert!(matches!(err, VerificationError::IntegrityMismatch { .. }));
        assert!(!path.exists(), "rejected artefact must be removed");
    }

    #[test]
    fn any_single_byte_mutation_is_rejected() {
        let expected = Sha256Digest::of_bytes(BODY);
        for index in 0..BODY.len() {
            let mut mutated = BODY.to_vec();
            if let Some(byte) = mutated.get_mut(index) {
                *byte ^= 0x01;
            }
            assert!(
                !digest_matches(&mutated, &expected),
                "mutation at byte {index} went undetected"
            );
        }
        assert!(digest_matches(BODY, &expected));
    }
}
