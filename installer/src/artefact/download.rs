//! Artefact download with streaming SHA-256 computation.
//!
//! Provides a trait-based abstraction for fetching release archives so that
//! tests can inject stubs without network access. The HTTP implementation
//! streams the body to a spool file in fixed-size chunks, hashing each chunk
//! as it passes, so memory use stays bounded regardless of archive size.

use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use log::{debug, trace};
use sha2::{Digest, Sha256};

use super::sha256_digest::Sha256Digest;
use crate::cancel::{CancellationToken, Cancelled};

/// Network timeout for a single download attempt.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Timeout for establishing a connection, and for the response headers.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// How often a transfer running on a worker thread is checked for
/// cancellation.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Size of each read from the response body.
const CHUNK_SIZE: usize = 64 * 1024;

/// Trait for fetching a release archive.
///
/// Abstractions allow tests to mock HTTP behaviour without network access.
///
/// # Examples
///
/// ```
/// use nping_installer::artefact::download::HttpDownloader;
///
/// let downloader = HttpDownloader;
/// // Use downloader.fetch(url, dest, &cancel) in production
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait ArtefactDownloader {
    /// Download `url` into the spool file `dest`, hashing while writing.
    ///
    /// # Errors
    ///
    /// Returns a [`DownloadError`] describing the failure; callers consult
    /// [`DownloadError::is_retryable`] to decide whether to try again.
    fn fetch(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<FetchedArtefact, DownloadError>;
}

/// A downloaded archive spooled to disk, with the digest computed while it
/// was being written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedArtefact {
    path: PathBuf,
    digest: Sha256Digest,
    size: u64,
}

impl FetchedArtefact {
    /// Return the spool file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the digest computed during download.
    #[must_use]
    pub fn digest(&self) -> &Sha256Digest {
        &self.digest
    }

    /// Return the number of bytes received.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    pub(crate) fn into_parts(self) -> (PathBuf, Sha256Digest, u64) {
        (self.path, self.digest, self.size)
    }
}

/// Errors arising from artefact download operations.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// The URL is not an HTTPS URL; no request was made.
    #[error("refusing to download over an insecure transport: {url}")]
    InsecureUrl {
        /// The rejected URL.
        url: String,
    },

    /// The requested artefact was not found (HTTP 404).
    #[error("artefact not found: {url}")]
    NotFound {
        /// The URL that returned 404.
        url: String,
    },

    /// The server answered with a non-success status other than 404.
    #[error("download failed for {url}: HTTP status {code}")]
    Status {
        /// The URL that was requested.
        url: String,
        /// The HTTP status code.
        code: u16,
    },

    /// The connection failed before or during the transfer.
    #[error("download failed for {url}: {reason}")]
    Transport {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The request failed in a way that repeating it will not fix, such as
    /// a TLS certificate error or a malformed URI.
    #[error("request to {url} failed: {reason}")]
    Request {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The body was shorter or longer than its declared `Content-Length`.
    #[error("truncated download from {url}: expected {expected} bytes, received {received}")]
    Truncated {
        /// The URL that was requested.
        url: String,
        /// The declared `Content-Length`.
        expected: u64,
        /// The number of bytes actually received.
        received: u64,
    },

    /// The download was interrupted by a cancellation request.
    #[error("download cancelled")]
    Cancelled,

    /// I/O error writing the spool file.
    #[error("I/O error writing download: {0}")]
    Io(#[from] std::io::Error),
}

impl DownloadError {
    /// Return whether retrying the same request might succeed.
    ///
    /// Connection-level failures and server errors (5xx) are transient.
    /// Client errors (4xx), integrity problems and local I/O are not.
    ///
    /// # Examples
    ///
    /// ```
    /// use nping_installer::artefact::download::DownloadError;
    ///
    /// let not_found = DownloadError::NotFound { url: "https://h/a.zip".to_owned() };
    /// assert!(!not_found.is_retryable());
    /// ```
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Status { code, .. } => *code >= 500,
            Self::InsecureUrl { .. }
            | Self::NotFound { .. }
            | Self::Request { .. }
            | Self::Truncated { .. }
            | Self::Cancelled
            | Self::Io(_) => false,
        }
    }
}

impl From<Cancelled> for DownloadError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

/// HTTP-based downloader using `ureq`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpDownloader;

impl ArtefactDownloader for HttpDownloader {
    fn fetch(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<FetchedArtefact, DownloadError> {
        if !url.starts_with("https://") {
            return Err(DownloadError::InsecureUrl {
                url: url.to_owned(),
            });
        }
        cancel.check()?;
        let url = url.to_owned();
        let dest = dest.to_path_buf();
        run_cancellable(cancel, move |token| http_fetch(&url, &dest, &token))
    }
}

fn http_fetch(
    url: &str,
    dest: &Path,
    cancel: &CancellationToken,
) -> Result<FetchedArtefact, DownloadError> {
    debug!("GET {url}");
    let response = http_agent()
        .get(url)
        .call()
        .map_err(|e| map_ureq_error(url, &e))?;
    let declared_len = declared_length(response.headers());
    trace!("response for {url} declares length {declared_len:?}");
    let mut body = response.into_body();
    spool_hashed(&mut body.as_reader(), dest, declared_len, url, cancel)
}

/// Run `transfer` on a worker thread and wait for it, returning
/// [`DownloadError::Cancelled`] as soon as `cancel` fires.
///
/// Blocking network calls cannot observe the token while they wait, so the
/// caller polls instead. An abandoned worker holds its own clone of the
/// token and stops at its next chunk boundary; its spool file lives in a
/// directory the caller owns.
///
/// # Errors
///
/// Returns the transfer's own error, [`DownloadError::Cancelled`] if the
/// token is set before or while it runs, or [`DownloadError::Io`] if the
/// worker cannot be started or exits without a result.
pub fn run_cancellable<T, F>(cancel: &CancellationToken, transfer: F) -> Result<T, DownloadError>
where
    T: Send + 'static,
    F: FnOnce(CancellationToken) -> Result<T, DownloadError> + Send + 'static,
{
    let (sender, receiver) = mpsc::channel();
    let token = cancel.clone();
    thread::Builder::new()
        .name("nping-download".to_owned())
        .spawn(move || {
            if sender.send(transfer(token)).is_err() {
                debug!("download finished after the caller stopped waiting");
            }
        })?;

    loop {
        match receiver.recv_timeout(CANCEL_POLL_INTERVAL) {
            Ok(result) => return result.map_err(|err| cancelled_or(cancel, err)),
            Err(RecvTimeoutError::Timeout) => cancel.check()?,
            Err(RecvTimeoutError::Disconnected) => {
                return Err(DownloadError::Io(std::io::Error::other(
                    "download worker exited without a result",
                )));
            }
        }
    }
}

/// Report `err` as a cancellation when the token fired while it was raised.
fn cancelled_or(cancel: &CancellationToken, err: DownloadError) -> DownloadError {
    if cancel.is_cancelled() {
        DownloadError::Cancelled
    } else {
        err
    }
}

/// Stream `reader` into a new file at `dest`, hashing every chunk.
///
/// When `declared_len` is known the received byte count must match it.
/// This is the single code path for spooling; stub downloaders reuse it so
/// that tests exercise the same hashing and length checks.
///
/// # Errors
///
/// Returns [`DownloadError::Cancelled`] if `cancel` fires between chunks or
/// while a failing read was in progress,
/// [`DownloadError::Truncated`] on a length mismatch,
/// [`DownloadError::Transport`] on read failures and [`DownloadError::Io`]
/// on write failures.
pub fn spool_hashed(
    reader: &mut dyn Read,
    dest: &Path,
    declared_len: Option<u64>,
    url: &str,
    cancel: &CancellationToken,
) -> Result<FetchedArtefact, DownloadError> {
    let mut file = File::create(dest)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut received: u64 = 0;

    loop {
        cancel.check()?;
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(_) if cancel.is_cancelled() => return Err(DownloadError::Cancelled),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof && declared_len.is_some() => {
                return Err(DownloadError::Truncated {
                    url: url.to_owned(),
                    expected: declared_len.unwrap_or_default(),
                    received,
                });
            }
            Err(e) => {
                return Err(DownloadError::Transport {
                    url: url.to_owned(),
                    reason: e.to_string(),
                });
            }
        };
        let chunk = buffer.get(..bytes_read).unwrap_or_default();
        hasher.update(chunk);
        file.write_all(chunk)?;
        received += bytes_read as u64;
    }
    file.flush()?;
    file.sync_all()?;

    if let Some(expected) = declared_len.filter(|expected| *expected != received) {
        return Err(DownloadError::Truncated {
            url: url.to_owned(),
            expected,
            received,
        });
    }

    let digest = Sha256Digest::from_hasher(hasher);
    debug!("received {received} bytes from {url} (sha256 {digest})");
    Ok(FetchedArtefact {
        path: dest.to_path_buf(),
        digest,
        size: received,
    })
}

/// Return the declared body length, unless a content encoding makes the
/// header describe the encoded rather than the delivered bytes.
fn declared_length(headers: &ureq::http::HeaderMap) -> Option<u64> {
    if headers.contains_key("content-encoding") {
        return None;
    }
    headers
        .get("content-length")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

/// Shared `ureq` agent with request timeout configuration.
fn http_agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(DOWNLOAD_TIMEOUT))
            .timeout_connect(Some(CONNECT_TIMEOUT))
            .timeout_recv_response(Some(CONNECT_TIMEOUT))
            .build();
        ureq::Agent::new_with_config(config)
    })
}

/// Map a ureq error to a [`DownloadError`].
///
/// Only connection-level failures become the retryable
/// [`DownloadError::Transport`]; TLS, URI and protocol errors are permanent.
fn map_ureq_error(url: &str, err: &ureq::Error) -> DownloadError {
    match err {
        ureq::Error::StatusCode(404) => DownloadError::NotFound {
            url: url.to_owned(),
        },
        ureq::Error::StatusCode(code) => DownloadError::Status {
            url: url.to_owned(),
            code: *code,
        },
        ureq::Error::Io(_)
        | ureq::Error::Timeout(_)
        | ureq::Error::HostNotFound
        | ureq::Error::ConnectionFailed => DownloadError::Transport {
            url: url.to_owned(),
            reason: err.to_string(),
        },
        other => DownloadError::Request {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}
