//! Bounded exponential backoff around [`ArtefactDownloader::fetch`].
//!
//! Only errors that [`DownloadError::is_retryable`] marks as transient are
//! retried. Client errors such as HTTP 404 surface after a single attempt.

use std::path::Path;
use std::time::Duration;

use log::{debug, warn};

use super::download::{ArtefactDownloader, DownloadError, FetchedArtefact};
use crate::cancel::CancellationToken;

/// Upper bound on attempts, whatever the caller asks for.
pub const MAX_ATTEMPTS: u32 = 3;

/// Delay before the first retry.
const INITIAL_DELAY: Duration = Duration::from_millis(500);

/// Ceiling for any single backoff delay.
const MAX_DELAY: Duration = Duration::from_secs(4);

/// How many times to attempt a download and how long to wait in between.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use nping_installer::artefact::retry::RetryPolicy;
///
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.max_attempts(), 3);
/// assert_eq!(policy.delay_for(0), Duration::from_millis(500));
/// assert_eq!(policy.delay_for(1), Duration::from_secs(1));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy; `max_attempts` is clamped to `1..=MAX_ATTEMPTS`.
    #[must_use]
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.clamp(1, MAX_ATTEMPTS),
            initial_delay,
            max_delay,
        }
    }

    /// A policy that retries without sleeping, for tests and scripted runs.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    /// Return the total number of attempts allowed.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Return the delay before retry number `retry` (zero-based).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32 << retry.min(16);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(MAX_ATTEMPTS, INITIAL_DELAY, MAX_DELAY)
    }
}

/// Fetch `url`, retrying transient failures according to `policy`.
///
/// # Errors
///
/// Returns the first non-retryable error, the last error once attempts are
/// exhausted, or [`DownloadError::Cancelled`] if cancelled while backing
/// off.
pub fn fetch_with_retry(
    downloader: &dyn ArtefactDownloader,
    url: &str,
    dest: &Path,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<FetchedArtefact, DownloadError> {
    let mut attempt = 1;
    loop {
        match downloader.fetch(url, dest, cancel) {
            Ok(fetched) => {
                debug!("fetched {url} on attempt {attempt}");
                return Ok(fetched);
            }
            Err(err) if cancel.is_cancelled() => {
                debug!("attempt {attempt} for {url} ended after cancellation: {err}");
                return Err(DownloadError::Cancelled);
            }
            Err(err) if err.is_retryable() && attempt < policy.max_attempts() => {
                let delay = policy.delay_for(attempt - 1);
                warn!(
                    "attempt {attempt}/{} for {url} failed: {err}; retrying in {delay:?}",
                    policy.max_attempts()
                );
                cancel.sleep(delay)?;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
