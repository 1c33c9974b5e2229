//! Post-install smoke test for the installed binary.
//!
//! The probe runs `<binary> --version` and waits a bounded time for it. A
//! failing probe does not undo the install; the pipeline records the
//! failure in its report and leaves the binary in place.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};
use wait_timeout::ChildExt;

use crate::cancel::CancellationToken;

/// Default time allowed for the probe to exit.
pub const DEFAULT_SELF_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Argument passed to the installed binary.
pub const VERSION_ARG: &str = "--version";

/// How often the wait loop wakes to look at the cancellation token.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Trait for probing an installed binary, enabling test mocking.
#[cfg_attr(test, mockall::automock)]
pub trait SelfChecker {
    /// Run the probe against `binary`, returning the first line it printed.
    ///
    /// # Errors
    ///
    /// Returns a [`SelfCheckError`] when the binary cannot be started, exits
    /// unsuccessfully, overruns its time limit, or is cancelled.
    fn check(&self, binary: &Utf8Path, cancel: &CancellationToken)
    -> Result<String, SelfCheckError>;
}

/// Reasons a self-check did not pass.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelfCheckError {
    /// The binary could not be executed at all.
    #[error("failed to run {path}: {reason}")]
    Spawn {
        /// The binary that was run.
        path: Utf8PathBuf,
        /// Description of the OS error.
        reason: String,
    },

    /// The binary exited with a failure status.
    #[error("{arg} exited with {status}: {stderr}")]
    NonZeroExit {
        /// The argument the binary was run with.
        arg: String,
        /// Human-readable exit status.
        status: String,
        /// Trimmed standard error output.
        stderr: String,
    },

    /// The binary did not exit within the allowed time and was killed.
    #[error("{arg} did not exit within {} ms", .timeout.as_millis())]
    TimedOut {
        /// The argument the binary was run with.
        arg: String,
        /// The limit that was exceeded.
        timeout: Duration,
    },

    /// The probe was interrupted and the child killed.
    #[error("self-check cancelled")]
    Cancelled,
}

/// Runs the installed binary with a version flag under a time limit.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use nping_installer::self_check::VersionProbe;
///
/// let probe = VersionProbe::new(Duration::from_secs(2));
/// assert_eq!(probe.timeout(), Duration::from_secs(2));
/// assert_eq!(probe.arg(), "--version");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionProbe {
    timeout: Duration,
    arg: String,
}

impl VersionProbe {
    /// Create a probe that passes `--version` and waits up to `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            arg: VERSION_ARG.to_owned(),
        }
    }

    /// Replace the argument passed to the binary.
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.arg = arg.into();
        self
    }

    /// Return the time limit.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Return the argument passed to the binary.
    #[must_use]
    pub fn arg(&self) -> &str {
        &self.arg
    }

    fn wait(
        &self,
        child: &mut Child,
        binary: &Utf8Path,
        cancel: &CancellationToken,
    ) -> Result<ExitStatus, SelfCheckError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if cancel.is_cancelled() {
                reap(child);
                return Err(SelfCheckError::Cancelled);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                reap(child);
                return Err(SelfCheckError::TimedOut {
                    arg: self.arg.clone(),
                    timeout: self.timeout,
                });
            }
            let waited = child.wait_timeout(POLL_INTERVAL.min(remaining));
            match waited {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {}
                Err(e) => {
                    reap(child);
                    return Err(SelfCheckError::Spawn {
                        path: binary.to_owned(),
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
}

impl Default for VersionProbe {
    fn default() -> Self {
        Self::new(DEFAULT_SELF_CHECK_TIMEOUT)
    }
}

impl SelfChecker for VersionProbe {
    fn check(
        &self,
        binary: &Utf8Path,
        cancel: &CancellationToken,
    ) -> Result<String, SelfCheckError> {
        debug!("running {binary} {} (timeout {:?})", self.arg, self.timeout);
        let mut child = Command::new(binary.as_std_path())
            .arg(&self.arg)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SelfCheckError::Spawn {
                path: binary.to_owned(),
                reason: e.to_string(),
            })?;

        // Pipes are drained while waiting; a full pipe blocks the child.
        // Readers are detached on timeout or cancel.
        let stdout = spawn_drain(child.stdout.take());
        let stderr = spawn_drain(child.stderr.take());
        let status = self.wait(&mut child, binary, cancel)?;
        let stdout = collect(stdout);
        let stderr = collect(stderr);

        if !status.success() {
            return Err(SelfCheckError::NonZeroExit {
                arg: self.arg.clone(),
                status: status.to_string(),
                stderr: stderr.trim().to_owned(),
            });
        }
        let version = first_line(&stdout);
        debug!("self-check reported \"{version}\"");
        Ok(version)
    }
}

/// Kill and reap a child that is no longer wanted.
fn reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        warn!("failed to kill self-check process: {e}");
    }
    let _ = child.wait();
}

fn spawn_drain<R>(pipe: Option<R>) -> JoinHandle<String>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || drain(pipe))
}

fn collect(reader: JoinHandle<String>) -> String {
    reader.join().unwrap_or_else(|_| {
        warn!("self-check output reader panicked");
        String::new()
    })
}

fn drain(pipe: Option<impl Read>) -> String {
    let mut text = String::new();
    if let Some(mut pipe) = pipe {
        let mut bytes = Vec::new();
        if pipe.read_to_end(&mut bytes).is_ok() {
            text = String::from_utf8_lossy(&bytes).into_owned();
        }
    }
    text
}

/// Return the first non-empty line of `output`, trimmed.
fn first_line(output: &str) -> String {
    output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_owned()
}
