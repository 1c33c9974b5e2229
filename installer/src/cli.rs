//! CLI argument definitions for the Nping installer.
//!
//! This module defines the command-line interface using clap. It is separated
//! from the main entrypoint to keep the binary small and focused on
//! orchestration.

use std::time::Duration;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// Default self-check timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Install the prebuilt Nping binary after verifying its checksum.
#[derive(Parser, Debug)]
#[command(name = "nping-installer")]
#[command(version, about)]
#[command(long_about = concat!(
    "Install the prebuilt Nping binary after verifying its checksum.\n\n",
    "The installer selects the release archive for the host architecture, ",
    "downloads it over HTTPS, checks its SHA-256 digest against the release ",
    "table, extracts the `nping` executable into the destination directory and ",
    "runs `nping --version` as a smoke test.\n\n",
    "A digest mismatch always aborts the install; there is no flag to skip it.",
))]
#[command(after_help = concat!(
    "EXIT CODES:\n",
    "  0    installed\n",
    "  2    unsupported architecture or invalid configuration\n",
    "  10   network failure or truncated download\n",
    "  11   checksum mismatch\n",
    "  12   extraction or install failure\n",
    "  13   installed, but the self-check failed\n",
    "  130  cancelled\n\n",
    "EXAMPLES:\n",
    "  Install for this machine into the default directory:\n",
    "    $ nping-installer\n\n",
    "  Install the arm64 build into a custom directory:\n",
    "    $ nping-installer install --arch arm64 --dest /opt/nping/bin\n\n",
    "  Show the release table as JSON:\n",
    "    $ nping-installer targets --json\n\n",
    "  Preview without downloading:\n",
    "    $ nping-installer --dry-run",
))]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Install arguments (used when no subcommand is given).
    #[command(flatten)]
    pub install: InstallArgs,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Download, verify and install the binary (default).
    Install(InstallArgs),

    /// List the release targets.
    Targets(TargetsArgs),
}

/// Arguments for the install command.
#[derive(Parser, Debug, Clone)]
pub struct InstallArgs {
    /// Architecture to install for (x86_64, amd64, arm64, aarch64, or a target
    /// triple) [default: this machine].
    #[arg(short, long, value_name = "TAG")]
    pub arch: Option<String>,

    /// Directory to install the binary into [default: platform-specific].
    #[arg(short, long, value_name = "DIR")]
    pub dest: Option<Utf8PathBuf>,

    /// Read release targets from a TOML file instead of the built-in table.
    #[arg(long, value_name = "FILE")]
    pub release_table: Option<Utf8PathBuf>,

    /// Seconds to wait for `nping --version` during the self-check.
    #[arg(
        long,
        value_name = "SECS",
        default_value_t = DEFAULT_TIMEOUT_SECS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub timeout: u64,

    /// Do not run the installed binary after placing it.
    #[arg(long)]
    pub skip_self_check: bool,

    /// Show what would be installed and exit without downloading.
    #[arg(long)]
    pub dry_run: bool,

    /// Increase log verbosity (repeatable: -v, -vv).
    #[arg(
        short,
        long = "verbose",
        action = clap::ArgAction::Count,
        conflicts_with = "quiet"
    )]
    pub verbosity: u8,

    /// Suppress progress output (errors still shown).
    #[arg(short, long, conflicts_with = "verbosity")]
    pub quiet: bool,
}

/// Arguments for the targets command.
#[derive(Parser, Debug, Clone, Default)]
pub struct TargetsArgs {
    /// Output in JSON format for scripting.
    #[arg(long)]
    pub json: bool,

    /// Read release targets from a TOML file instead of the built-in table.
    #[arg(long, value_name = "FILE")]
    pub release_table: Option<Utf8PathBuf>,
}

impl InstallArgs {
    /// Return the requested architecture tag, or this machine's.
    ///
    /// # Examples
    ///
    /// ```
    /// use nping_installer::cli::InstallArgs;
    ///
    /// let args = InstallArgs {
    ///     arch: Some("arm64".to_owned()),
    ///     ..InstallArgs::default()
    /// };
    /// assert_eq!(args.arch_tag(), "arm64");
    /// assert_eq!(InstallArgs::default().arch_tag(), std::env::consts::ARCH);
    /// ```
    #[must_use]
    pub fn arch_tag(&self) -> &str {
        self.arch.as_deref().unwrap_or(std::env::consts::ARCH)
    }

    /// Return the self-check timeout.
    #[must_use]
    pub fn self_check_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl Default for InstallArgs {
    /// Creates an `InstallArgs` instance matching a bare invocation.
    fn default() -> Self {
        Self {
            arch: None,
            dest: None,
            release_table: None,
            timeout: DEFAULT_TIMEOUT_SECS,
            skip_self_check: false,
            dry_run: false,
            verbosity: 0,
            quiet: false,
        }
    }
}

impl Cli {
    /// Returns the effective install arguments.
    ///
    /// If an `Install` subcommand was provided, returns those arguments.
    /// Otherwise returns the flattened install arguments.
    #[must_use]
    pub fn install_args(&self) -> &InstallArgs {
        match &self.command {
            Some(Command::Install(args)) => args,
            Some(Command::Targets(_)) | None => &self.install,
        }
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
