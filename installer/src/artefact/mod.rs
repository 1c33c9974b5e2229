//! Release artefact model and handling.
//!
//! Covers everything between the release table and a verified archive on
//! disk, plus extraction of the executable from it.
//!
//! # Sub-modules
//!
//! - [`error`] - Validation errors for release table values.
//! - [`target`] - Architecture enum and tag parsing (`Architecture`).
//! - [`sha256_digest`] - SHA-256 digest newtype (`Sha256Digest`).
//! - [`release`] - Release table and target selection (`ReleaseTable`).
//! - [`download`] - Artefact download trait and HTTP implementation.
//! - [`retry`] - Bounded exponential backoff around downloads.
//! - [`verification`] - Digest check producing `VerifiedArtefact`.
//! - [`extraction`] - Single-entry extraction with path traversal protection.

pub mod download;
pub mod error;
pub mod extraction;
pub mod release;
pub mod retry;
pub mod sha256_digest;
pub mod target;
pub mod verification;
