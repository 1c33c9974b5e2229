//! Error types for the Nping installer.
//!
//! Each stage has its own error enum; [`InstallerError`] folds them together
//! so the binary can classify any failure into an [`ErrorKind`] and an exit
//! status.

use std::fmt;

use thiserror::Error;

use crate::artefact::download::DownloadError;
use crate::artefact::error::ArtefactError;
use crate::artefact::extraction::ExtractionError;
use crate::artefact::verification::VerificationError;
use crate::cancel::Cancelled;
use crate::self_check::SelfCheckError;
use crate::stager::StagingError;

/// Errors that can occur during installation.
#[derive(Debug, Error)]
pub enum InstallerError {
    /// A configuration value (architecture, digest, URL, table) is invalid.
    #[error(transparent)]
    Artefact(#[from] ArtefactError),

    /// The archive could not be fetched.
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// The archive did not match its expected digest.
    #[error(transparent)]
    Verification(#[from] VerificationError),

    /// The archive format could not be determined or decoded.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// The binary could not be placed in the destination directory.
    #[error(transparent)]
    Staging(#[from] StagingError),

    /// The installed binary failed its post-install check.
    #[error("self-check failed: {0}")]
    SelfCheck(#[from] SelfCheckError),

    /// No destination was given and none could be derived.
    #[error("could not determine an install directory; pass --dest")]
    NoInstallDir,

    /// The run was interrupted.
    #[error("operation cancelled")]
    Cancelled,

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to write output.
    #[error("failed to write output")]
    WriteFailed {
        /// The underlying error that caused the write to fail.
        #[source]
        source: std::io::Error,
    },
}

impl From<Cancelled> for InstallerError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

/// Coarse classification of failures, used for diagnostics and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The architecture is not supported by the release table.
    UnsupportedArchitecture,
    /// A digest in the release table is not 64 hex characters.
    MalformedDigest,
    /// Any other invalid configuration value.
    InvalidConfiguration,
    /// The download failed at the transport or HTTP level.
    NetworkError,
    /// Fewer (or more) bytes arrived than were announced.
    TruncatedDownload,
    /// The archive digest did not match.
    IntegrityMismatch,
    /// The archive could not be decoded.
    CorruptArchive,
    /// The matching archive entry escapes its directory.
    PathTraversal,
    /// The archive does not contain the executable.
    MissingEntry,
    /// The destination cannot be created or written.
    InstallPathNotWritable,
    /// The installed binary failed its self-check.
    SelfCheckFailed,
    /// The run was interrupted.
    Cancelled,
    /// Unclassified I/O failure.
    Io,
}

impl ErrorKind {
    /// Return the kind's name as shown in diagnostics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnsupportedArchitecture => "UnsupportedArchitecture",
            Self::MalformedDigest => "MalformedDigest",
            Self::InvalidConfiguration => "InvalidConfiguration",
            Self::NetworkError => "NetworkError",
            Self::TruncatedDownload => "TruncatedDownload",
            Self::IntegrityMismatch => "IntegrityMismatch",
            Self::CorruptArchive => "CorruptArchive",
            Self::PathTraversal => "PathTraversal",
            Self::MissingEntry => "MissingEntry",
            Self::InstallPathNotWritable => "InstallPathNotWritable",
            Self::SelfCheckFailed => "SelfCheckFailed",
            Self::Cancelled => "Cancelled",
            Self::Io => "Io",
        }
    }

    /// Return the process exit status for this kind.
    ///
    /// # Examples
    ///
    /// ```
    /// use nping_installer::error::ErrorKind;
    ///
    /// assert_eq!(ErrorKind::IntegrityMismatch.exit_code(), 11);
    /// assert_eq!(ErrorKind::Cancelled.exit_code(), 130);
    /// ```
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            Self::UnsupportedArchitecture | Self::MalformedDigest | Self::InvalidConfiguration => 2,
            Self::NetworkError | Self::TruncatedDownload => 10,
            Self::IntegrityMismatch => 11,
            Self::CorruptArchive
            | Self::PathTraversal
            | Self::MissingEntry
            | Self::InstallPathNotWritable => 12,
            Self::SelfCheckFailed => 13,
            Self::Cancelled => 130,
            Self::Io => 1,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl InstallerError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Artefact(err) => artefact_kind(err),
            Self::Download(err) => download_kind(err),
            Self::Verification(VerificationError::IntegrityMismatch { .. }) => {
                ErrorKind::IntegrityMismatch
            }
            Self::Extraction(err) => extraction_kind(err),
            Self::Staging(err) => staging_kind(err),
            Self::SelfCheck(SelfCheckError::Cancelled) | Self::Cancelled => ErrorKind::Cancelled,
            Self::SelfCheck(_) => ErrorKind::SelfCheckFailed,
            Self::NoInstallDir => ErrorKind::InvalidConfiguration,
            Self::Io(_) | Self::WriteFailed { .. } => ErrorKind::Io,
        }
    }

    /// Return whether retrying the whole operation might succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Download(err) if err.is_retryable())
    }

    /// Return the process exit status for this error.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }
}

fn artefact_kind(err: &ArtefactError) -> ErrorKind {
    match err {
        ArtefactError::UnsupportedArchitecture { .. } => ErrorKind::UnsupportedArchitecture,
        ArtefactError::MalformedDigest { .. } => ErrorKind::MalformedDigest,
        ArtefactError::InvalidUrl { .. } | ArtefactError::InvalidReleaseTable { .. } => {
            ErrorKind::InvalidConfiguration
        }
    }
}

fn download_kind(err: &DownloadError) -> ErrorKind {
    match err {
        DownloadError::InsecureUrl { .. }
        | DownloadError::NotFound { .. }
        | DownloadError::Status { .. }
        | DownloadError::Request { .. }
        | DownloadError::Transport { .. } => ErrorKind::NetworkError,
        DownloadError::Truncated { .. } => ErrorKind::TruncatedDownload,
        DownloadError::Cancelled => ErrorKind::Cancelled,
        DownloadError::Io(_) => ErrorKind::Io,
    }
}

fn extraction_kind(err: &ExtractionError) -> ErrorKind {
    match err {
        ExtractionError::Archive { .. } => ErrorKind::CorruptArchive,
        ExtractionError::PathTraversal { .. } => ErrorKind::PathTraversal,
        ExtractionError::MissingEntry { .. } => ErrorKind::MissingEntry,
        ExtractionError::UnsupportedFormat { .. } => ErrorKind::InvalidConfiguration,
        ExtractionError::Io(_) => ErrorKind::Io,
    }
}

fn staging_kind(err: &StagingError) -> ErrorKind {
    match err {
        StagingError::NotWritable { .. } => ErrorKind::InstallPathNotWritable,
        StagingError::InvalidEntryName { .. } => ErrorKind::InvalidConfiguration,
        StagingError::Extraction(inner) => extraction_kind(inner),
        StagingError::Cancelled => ErrorKind::Cancelled,
        StagingError::Io(_) => ErrorKind::Io,
    }
}

/// Result type alias using [`InstallerError`].
pub type Result<T> = std::result::Result<T, InstallerError>;
