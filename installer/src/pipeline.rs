//! Install pipeline orchestration.
//!
//! A run walks a fixed sequence of stages:
//!
//! ```text
//! Selecting -> Fetching -> Verifying -> Installing -> SelfChecking -> Done
//! ```
//!
//! Any stage may fail, ending the run in `Failed(stage, reason)`; no stage
//! loops back to an earlier one. Download retries happen inside `Fetching`.
//! A failed self-check does not fail the run: the binary stays installed and
//! the failure is carried in the [`InstallReport`].

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};

use crate::artefact::download::ArtefactDownloader;
use crate::artefact::extraction::{ArchiveFormat, ArtefactExtractor};
use crate::artefact::release::{ReleaseTable, ReleaseTarget};
use crate::artefact::retry::{RetryPolicy, fetch_with_retry};
use crate::artefact::verification::verify;
use crate::cancel::CancellationToken;
use crate::error::{ErrorKind, InstallerError};
use crate::self_check::{SelfCheckError, SelfChecker};
use crate::stager::{InstalledBinary, Stager};

/// Prefix of the private directory a download is spooled into.
const SPOOL_PREFIX: &str = "nping-installer-";

/// A pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Choosing the release target for the requested architecture.
    Selecting,
    /// Downloading the archive.
    Fetching,
    /// Checking the archive digest.
    Verifying,
    /// Extracting the executable and placing it.
    Installing,
    /// Running the installed binary's version probe.
    SelfChecking,
    /// Terminal success.
    Done,
}

impl Stage {
    /// Return the stage name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Selecting => "Selecting",
            Self::Fetching => "Fetching",
            Self::Verifying => "Verifying",
            Self::Installing => "Installing",
            Self::SelfChecking => "SelfChecking",
            Self::Done => "Done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed run: the stage that failed and why.
#[derive(Debug, thiserror::Error)]
#[error("{source}")]
pub struct PipelineError {
    stage: Stage,
    #[source]
    source: InstallerError,
}

impl PipelineError {
    /// Attribute `source` to `stage`.
    #[must_use]
    pub fn at(stage: Stage, source: impl Into<InstallerError>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }

    /// Return the stage that failed.
    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Return the underlying error.
    #[must_use]
    pub fn error(&self) -> &InstallerError {
        &self.source
    }

    /// Return the error classification.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }

    /// Return the process exit status for this failure.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.source.exit_code()
    }

    /// Format the one-line diagnostic printed by the CLI.
    ///
    /// # Examples
    ///
    /// ```
    /// use nping_installer::artefact::release::ReleaseTable;
    /// use nping_installer::pipeline::{InstallConfig, plan};
    ///
    /// let table = ReleaseTable::builtin().expect("built-in table");
    /// let config = InstallConfig::new("sparc", "/tmp/bin".into());
    /// let err = plan(&table, &config).expect_err("unsupported");
    /// assert!(err.diagnostic().starts_with("error[UnsupportedArchitecture] during Selecting: "));
    /// ```
    #[must_use]
    pub fn diagnostic(&self) -> String {
        format!("error[{}] during {}: {}", self.kind(), self.stage, self.source)
    }

    /// Consume the failure, returning the underlying error.
    #[must_use]
    pub fn into_error(self) -> InstallerError {
        self.source
    }
}

/// Outcome of the post-install check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelfCheckStatus {
    /// The binary exited successfully and printed `version`.
    Passed {
        /// First non-empty line of the binary's output.
        version: String,
    },
    /// The binary did not pass; it remains installed.
    Failed {
        /// Why the check failed.
        error: SelfCheckError,
    },
    /// The check was not run.
    Skipped,
}

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    target: ReleaseTarget,
    installed: InstalledBinary,
    self_check: SelfCheckStatus,
}

impl InstallReport {
    /// Return the release target that was installed.
    #[must_use]
    pub fn target(&self) -> &ReleaseTarget {
        &self.target
    }

    /// Return the installed binary.
    #[must_use]
    pub fn installed(&self) -> &InstalledBinary {
        &self.installed
    }

    /// Return the self-check outcome.
    #[must_use]
    pub fn self_check(&self) -> &SelfCheckStatus {
        &self.self_check
    }
}

/// Parameters for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallConfig {
    /// Architecture tag to install for.
    pub arch: String,
    /// Directory the binary is placed in.
    pub dest_dir: Utf8PathBuf,
    /// Download retry policy.
    pub retry: RetryPolicy,
    /// Whether to skip the post-install check.
    pub skip_self_check: bool,
}

impl InstallConfig {
    /// Create a config with the default retry policy and self-check on.
    #[must_use]
    pub fn new(arch: &str, dest_dir: Utf8PathBuf) -> Self {
        Self {
            arch: arch.to_owned(),
            dest_dir,
            retry: RetryPolicy::default(),
            skip_self_check: false,
        }
    }
}

/// The side-effecting collaborators a run drives.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    /// Fetches the archive.
    pub downloader: &'a dyn ArtefactDownloader,
    /// Extracts the executable from the archive.
    pub extractor: &'a dyn ArtefactExtractor,
    /// Probes the installed binary.
    pub self_checker: &'a dyn SelfChecker,
}

/// What a run would do, resolved without touching the network or disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPlan {
    /// The selected release target.
    pub target: ReleaseTarget,
    /// Archive format inferred from the URL.
    pub format: ArchiveFormat,
    /// Archive entry holding the executable.
    pub entry: String,
    /// Final path of the installed binary.
    pub install_path: Utf8PathBuf,
}

/// Resolve the `Selecting` stage only.
///
/// # Errors
///
/// Returns a [`PipelineError`] at [`Stage::Selecting`] if the architecture
/// is unsupported or the URL names an unknown archive format.
pub fn plan(table: &ReleaseTable, config: &InstallConfig) -> Result<InstallPlan, PipelineError> {
    let target = table
        .select_target(&config.arch)
        .map_err(|e| PipelineError::at(Stage::Selecting, e))?
        .clone();
    let format = ArchiveFormat::from_file_name(target.file_name())
        .map_err(|e| PipelineError::at(Stage::Selecting, e))?;
    Ok(InstallPlan {
        install_path: config.dest_dir.join(table.entry()),
        entry: table.entry().to_owned(),
        target,
        format,
    })
}

/// Run every stage against `table`.
///
/// # Errors
///
/// Returns a [`PipelineError`] naming the stage that failed. A failing
/// self-check is not an error; see [`InstallReport::self_check`].
pub fn run_pipeline(
    table: &ReleaseTable,
    config: &InstallConfig,
    collaborators: Collaborators<'_>,
    cancel: &CancellationToken,
) -> Result<InstallReport, PipelineError> {
    let mut run = Run {
        stage: Stage::Selecting,
    };
    debug!("pipeline started at {}", run.stage);

    let plan = plan(table, config)
        .inspect_err(|e| debug!("pipeline {} -> Failed: {e}", e.stage()))?;
    run.fail_if_cancelled(cancel)?;
    debug!("selected {} ({})", plan.target.url(), plan.target.architecture());

    run.advance(Stage::Fetching);
    let spool = tempfile::Builder::new()
        .prefix(SPOOL_PREFIX)
        .tempdir()
        .map_err(|e| run.fail(e))?;
    let spool_file = spool.path().join(plan.target.file_name());
    let fetched = fetch_with_retry(
        collaborators.downloader,
        plan.target.url(),
        &spool_file,
        &config.retry,
        cancel,
    )
    .map_err(|e| run.fail(e))?;

    run.advance(Stage::Verifying);
    run.fail_if_cancelled(cancel)?;
    let verified = verify(fetched, plan.target.expected_digest()).map_err(|e| run.fail(e))?;

    run.advance(Stage::Installing);
    let stager = Stager::new(config.dest_dir.clone());
    stager.prepare().map_err(|e| run.fail(e))?;
    let installed = stager
        .install(
            &verified,
            plan.format,
            &plan.entry,
            collaborators.extractor,
            cancel,
        )
        .map_err(|e| run.fail(e))?;
    drop(spool);

    run.advance(Stage::SelfChecking);
    let self_check = if config.skip_self_check {
        debug!("self-check skipped");
        SelfCheckStatus::Skipped
    } else {
        probe(collaborators.self_checker, installed.install_path(), cancel)
            .map_err(|e| run.fail(e))?
    };

    run.advance(Stage::Done);
    Ok(InstallReport {
        target: plan.target,
        installed,
        self_check,
    })
}

/// Run the self-check, converting failures into a status. Only
/// cancellation aborts the run.
fn probe(
    checker: &dyn SelfChecker,
    binary: &Utf8Path,
    cancel: &CancellationToken,
) -> Result<SelfCheckStatus, InstallerError> {
    match checker.check(binary, cancel) {
        Ok(version) => Ok(SelfCheckStatus::Passed { version }),
        Err(SelfCheckError::Cancelled) => Err(InstallerError::Cancelled),
        Err(error) => {
            warn!("self-check of {binary} failed: {error}");
            Ok(SelfCheckStatus::Failed { error })
        }
    }
}

/// Tracks the current stage and attributes failures to it.
struct Run {
    stage: Stage,
}

impl Run {
    fn advance(&mut self, next: Stage) {
        debug!("pipeline {} -> {next}", self.stage);
        self.stage = next;
    }

    fn fail(&self, err: impl Into<InstallerError>) -> PipelineError {
        let failure = PipelineError::at(self.stage, err);
        debug!("pipeline {} -> Failed: {failure}", self.stage);
        failure
    }

    fn fail_if_cancelled(&self, cancel: &CancellationToken) -> Result<(), PipelineError> {
        cancel.check().map_err(|e| self.fail(e))
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
