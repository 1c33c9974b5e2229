//! Error types for release table values.
//!
//! Each variant provides a descriptive message identifying the invalid input
//! and the constraint that was violated. These are configuration errors: they
//! are raised before any network or filesystem work begins.

use thiserror::Error;

/// Errors arising from invalid release-table values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArtefactError {
    /// The architecture tag is not in the supported set, or the release
    /// table has no artefact for it.
    #[error("unsupported architecture \"{value}\"; expected one of: {expected}")]
    UnsupportedArchitecture {
        /// The rejected architecture string.
        value: String,
        /// Comma-separated list of accepted architectures.
        expected: String,
    },

    /// A SHA-256 digest is not a valid 64-character hex string.
    #[error("malformed SHA-256 digest: {reason}")]
    MalformedDigest {
        /// Description of the validation failure.
        reason: String,
    },

    /// A release URL is not a well-formed HTTPS URL.
    #[error("invalid release URL \"{url}\": {reason}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
        /// Description of the validation failure.
        reason: String,
    },

    /// The release table itself is inconsistent or could not be parsed.
    #[error("invalid release table: {reason}")]
    InvalidReleaseTable {
        /// Description of the validation failure.
        reason: String,
    },
}

/// Result type alias using [`ArtefactError`].
pub type Result<T> = std::result::Result<T, ArtefactError>;
