//! Output formatting for the installer CLI.
//!
//! Progress and results go to stderr as plain lines; this module builds
//! those lines so they can be tested without running the binary.

use std::io::Write;

use camino::Utf8Path;

use crate::pipeline::{InstallPlan, InstallReport, SelfCheckStatus};

/// Write one line to `stderr`, ignoring write failures.
pub fn write_stderr_line(stderr: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort logging; ignore write failures.
    }
}

/// Format a success message after installation.
///
/// # Examples
///
/// ```
/// use camino::Utf8Path;
/// use nping_installer::output::success_message;
///
/// let msg = success_message("nping", "0.2.0", Utf8Path::new("/usr/local/bin/nping"));
/// assert_eq!(msg, "Installed nping 0.2.0 to /usr/local/bin/nping");
/// ```
#[must_use]
pub fn success_message(package: &str, version: &str, install_path: &Utf8Path) -> String {
    format!("Installed {package} {version} to {install_path}")
}

/// Describe the self-check outcome in one line.
#[must_use]
pub fn self_check_line(report: &InstallReport) -> String {
    let binary = report.installed().install_path();
    match report.self_check() {
        SelfCheckStatus::Passed { version } if version.is_empty() => {
            format!("Self-check passed: {binary} --version exited successfully")
        }
        SelfCheckStatus::Passed { version } => format!("Self-check passed: {version}"),
        SelfCheckStatus::Failed { error } => {
            format!("Warning: {binary} is installed but its self-check failed: {error}")
        }
        SelfCheckStatus::Skipped => "Self-check skipped".to_owned(),
    }
}

/// Configuration information for dry-run output.
#[derive(Debug)]
pub struct DryRunInfo<'a> {
    /// Package name from the release table.
    pub package: &'a str,
    /// Package version from the release table.
    pub version: &'a str,
    /// The resolved plan.
    pub plan: &'a InstallPlan,
    /// Where the release table came from.
    pub table_source: &'a str,
    /// Whether the self-check would run.
    pub skip_self_check: bool,
    /// Self-check timeout in seconds.
    pub timeout_secs: u64,
}

impl DryRunInfo<'_> {
    /// Format the dry-run information for display.
    #[must_use]
    pub fn display_text(&self) -> String {
        let target = &self.plan.target;
        let self_check = if self.skip_self_check {
            "skipped".to_owned()
        } else {
            format!("--version (timeout {}s)", self.timeout_secs)
        };
        [
            "Dry run - nothing will be downloaded or installed".to_owned(),
            String::new(),
            format!("Package: {} {}", self.package, self.version),
            format!("Release table: {}", self.table_source),
            format!("Architecture: {}", target.architecture()),
            format!("URL: {}", target.url()),
            format!("SHA-256: {}", target.expected_digest()),
            format!("Archive format: {:?}", self.plan.format),
            format!("Archive entry: {}", self.plan.entry),
            format!("Install path: {}", self.plan.install_path),
            format!("Self-check: {self_check}"),
        ]
        .join("\n")
    }
}
