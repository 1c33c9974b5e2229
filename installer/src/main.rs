//! Nping installer CLI entrypoint.
//!
//! This binary selects the release archive for the requested architecture,
//! downloads and verifies it, installs the `nping` executable and runs it
//! once as a smoke test. Failures are reported as a single diagnostic line
//! and mapped to a stable exit status.

use std::io::Write;

use camino::Utf8PathBuf;
use clap::Parser;
use log::warn;
use nping_installer::artefact::download::HttpDownloader;
use nping_installer::artefact::extraction::ArchiveExtractor;
use nping_installer::artefact::release::ReleaseTable;
use nping_installer::artefact::target::Architecture;
use nping_installer::cancel::CancellationToken;
use nping_installer::cli::{Cli, Command, InstallArgs, TargetsArgs};
use nping_installer::dirs::{SystemBaseDirs, default_install_dir};
use nping_installer::error::InstallerError;
use nping_installer::list_output::{format_human, format_json};
use nping_installer::output::{DryRunInfo, self_check_line, success_message, write_stderr_line};
use nping_installer::pipeline::{
    Collaborators, InstallConfig, PipelineError, SelfCheckStatus, Stage, plan, run_pipeline,
};
use nping_installer::self_check::VersionProbe;

const BUILTIN_TABLE_SOURCE: &str = "built-in";

fn main() {
    let cli = Cli::parse();
    init_logging(cli.install_args());

    let cancel = CancellationToken::new();
    install_interrupt_handler(&cancel);

    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let run_result = run(&cli, &cancel, &mut stdout, &mut stderr);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn run(
    cli: &Cli,
    cancel: &CancellationToken,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Result<(), PipelineError> {
    match &cli.command {
        Some(Command::Targets(args)) => list_targets(args, stdout),
        Some(Command::Install(args)) => install(args, cancel, stderr),
        None => install(&cli.install, cancel, stderr),
    }
}

/// Downloads, verifies and installs the binary, or previews the plan.
fn install(
    args: &InstallArgs,
    cancel: &CancellationToken,
    stderr: &mut dyn Write,
) -> Result<(), PipelineError> {
    let (table, table_source) = load_table(args.release_table.as_ref())?;
    let dest_dir = resolve_dest_dir(args.dest.clone())?;

    let mut config = InstallConfig::new(args.arch_tag(), dest_dir);
    config.skip_self_check = args.skip_self_check;

    if args.dry_run {
        let plan = plan(&table, &config)?;
        let info = DryRunInfo {
            package: table.package(),
            version: table.version(),
            plan: &plan,
            table_source: &table_source,
            skip_self_check: args.skip_self_check,
            timeout_secs: args.timeout,
        };
        write_stderr_line(stderr, info.display_text());
        return Ok(());
    }

    if !args.quiet {
        write_stderr_line(
            stderr,
            format!(
                "Installing {} {} for {} into {}...",
                table.package(),
                table.version(),
                config.arch,
                config.dest_dir
            ),
        );
    }

    let probe = VersionProbe::new(args.self_check_timeout());
    let collaborators = Collaborators {
        downloader: &HttpDownloader,
        extractor: &ArchiveExtractor,
        self_checker: &probe,
    };
    let report = run_pipeline(&table, &config, collaborators, cancel)?;

    if !args.quiet {
        write_stderr_line(
            stderr,
            success_message(
                table.package(),
                table.version(),
                report.installed().install_path(),
            ),
        );
    }

    if let SelfCheckStatus::Failed { error } = report.self_check() {
        return Err(PipelineError::at(Stage::SelfChecking, error.clone()));
    }
    if !args.quiet {
        write_stderr_line(stderr, self_check_line(&report));
    }

    Ok(())
}

/// Prints the release table to `stdout`.
fn list_targets(args: &TargetsArgs, stdout: &mut dyn Write) -> Result<(), PipelineError> {
    let (table, _) = load_table(args.release_table.as_ref())?;
    let host = Architecture::host().ok();

    let output = if args.json {
        format_json(&table, host)
    } else {
        format_human(&table, host)
    };

    writeln!(stdout, "{output}").map_err(|source| {
        PipelineError::at(Stage::Selecting, InstallerError::WriteFailed { source })
    })
}

/// Loads the release table and names where it came from.
fn load_table(path: Option<&Utf8PathBuf>) -> Result<(ReleaseTable, String), PipelineError> {
    let loaded = match path {
        Some(path) => ReleaseTable::load(path).map(|table| (table, path.to_string())),
        None => ReleaseTable::builtin().map(|table| (table, BUILTIN_TABLE_SOURCE.to_owned())),
    };
    loaded.map_err(|err| PipelineError::at(Stage::Selecting, err))
}

/// Determines the destination from the CLI or falls back to the default.
fn resolve_dest_dir(cli_dest: Option<Utf8PathBuf>) -> Result<Utf8PathBuf, PipelineError> {
    cli_dest
        .or_else(|| SystemBaseDirs::new().and_then(|dirs| default_install_dir(&dirs)))
        .ok_or_else(|| PipelineError::at(Stage::Selecting, InstallerError::NoInstallDir))
}

fn log_filter(args: &InstallArgs) -> &'static str {
    if args.quiet {
        return "error";
    }
    match args.verbosity {
        0 => "warn",
        1 => "warn,nping_installer=debug",
        _ => "warn,nping_installer=trace",
    }
}

/// Initializes `env_logger`; `RUST_LOG` overrides the verbosity flags.
fn init_logging(args: &InstallArgs) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_filter(args)))
        .format_timestamp(None)
        .init();
}

fn install_interrupt_handler(cancel: &CancellationToken) {
    let handle = cancel.clone();
    if let Err(err) = ctrlc::set_handler(move || handle.cancel()) {
        warn!("could not install Ctrl-C handler: {err}");
    }
}

fn exit_code_for_run_result(result: Result<(), PipelineError>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_stderr_line(stderr, err.diagnostic());
            err.exit_code()
        }
    }
}
