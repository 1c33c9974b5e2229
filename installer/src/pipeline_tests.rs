//! Unit tests for pipeline orchestration.
//!
//! The network and the installed binary are replaced by stubs and mocks;
//! extraction and placement run for real against temporary directories.

use super::*;
use crate::artefact::download::{DownloadError, MockArtefactDownloader};
use crate::artefact::extraction::ArchiveExtractor;
use crate::self_check::MockSelfChecker;
use crate::test_utils::{StubDownloader, StubResponse, StubSelfChecker, sha256_hex, zip_archive};
use rstest::{fixture, rstest};
use std::time::Duration;

const BINARY: &[u8] = b"#!/bin/sh\necho \"nping 0.2.0\"\n";

/// Temporary destination that does not exist until the pipeline creates it.
struct Scratch {
    _temp: tempfile::TempDir,
    dest: Utf8PathBuf,
}

#[fixture]
fn scratch() -> Scratch {
    let temp = tempfile::tempdir().expect("create temp dir");
    let dest = Utf8PathBuf::try_from(temp.path().join("bin")).expect("utf8 path");
    Scratch { _temp: temp, dest }
}

#[fixture]
fn nping_zip() -> Vec<u8> {
    zip_archive(&[("Nping/README.md", b"readme"), ("Nping/nping", BINARY)])
}

fn table_with_digest(tag: &str, digest: &str) -> ReleaseTable {
    let text = format!(
        concat!(
            "package = \"nping\"\n",
            "version = \"0.2.0\"\n\n",
            "[targets.{tag}]\n",
            "url = \"https://example.test/v0.2.0/Nping-{tag}.zip\"\n",
            "sha256 = \"{digest}\"\n",
        ),
        tag = tag,
        digest = digest,
    );
    ReleaseTable::from_toml_str(&text).expect("valid table")
}

fn table_for(tag: &str, archive: &[u8]) -> ReleaseTable {
    table_with_digest(tag, &sha256_hex(archive))
}

fn config(arch: &str, dest: &Utf8Path) -> InstallConfig {
    InstallConfig {
        retry: RetryPolicy::immediate(3),
        ..InstallConfig::new(arch, dest.to_owned())
    }
}

fn collaborators<'a>(
    downloader: &'a dyn ArtefactDownloader,
    self_checker: &'a dyn SelfChecker,
) -> Collaborators<'a> {
    Collaborators {
        downloader,
        extractor: &ArchiveExtractor,
        self_checker,
    }
}

fn assert_not_installed(dest: &Utf8Path) {
    assert!(!dest.join("nping").exists(), "no binary may be left at {dest}");
}

#[rstest]
fn installs_matching_x86_64_archive(scratch: Scratch, nping_zip: Vec<u8>) {
    let table = table_for("x86_64-apple-darwin", &nping_zip);
    let downloader = StubDownloader::serving(nping_zip);
    let checker = StubSelfChecker::passing("nping 0.2.0");

    let report = run_pipeline(
        &table,
        &config("x86_64", &scratch.dest),
        collaborators(&downloader, &checker),
        &CancellationToken::new(),
    )
    .expect("pipeline reaches Done");

    let install_path = scratch.dest.join("nping");
    assert_eq!(report.installed().install_path(), install_path);
    assert_eq!(report.installed().source_entry_name(), "nping");
    assert_eq!(
        report.self_check(),
        &SelfCheckStatus::Passed {
            version: "nping 0.2.0".to_owned()
        }
    );
    assert_eq!(std::fs::read(&install_path).expect("read binary"), BINARY);
    assert_eq!(downloader.calls(), 1);
    assert_eq!(
        downloader.requested_urls(),
        vec!["https://example.test/v0.2.0/Nping-x86_64-apple-darwin.zip".to_owned()]
    );
    assert_eq!(checker.probed(), vec![install_path]);
}

#[rstest]
fn corrupted_digest_fails_at_verifying(scratch: Scratch, nping_zip: Vec<u8>) {
    let mut digest = sha256_hex(&nping_zip);
    let flipped = if digest.starts_with('0') { "1" } else { "0" };
    digest.replace_range(0..1, flipped);
    let table = table_with_digest("aarch64-apple-darwin", &digest);
    let downloader = StubDownloader::serving(nping_zip);
    let mut checker = MockSelfChecker::new();
    checker.expect_check().never();

    let err = run_pipeline(
        &table,
        &config("arm64", &scratch.dest),
        collaborators(&downloader, &checker),
        &CancellationToken::new(),
    )
    .expect_err("digest mismatch");

    assert_eq!(err.stage(), Stage::Verifying);
    assert_eq!(err.kind(), ErrorKind::IntegrityMismatch);
    assert_eq!(err.exit_code(), 11);
    assert_eq!(downloader.calls(), 1, "integrity failures are not retried");
    assert_not_installed(&scratch.dest);
}

#[rstest]
fn archive_without_entry_fails_at_installing(scratch: Scratch) {
    let archive = zip_archive(&[("Nping/README.md", b"readme")]);
    let table = table_for("x86_64", &archive);
    let downloader = StubDownloader::serving(archive);
    let checker = StubSelfChecker::passing("unused");

    let err = run_pipeline(
        &table,
        &config("x86_64", &scratch.dest),
        collaborators(&downloader, &checker),
        &CancellationToken::new(),
    )
    .expect_err("missing entry");

    assert_eq!(err.stage(), Stage::Installing);
    assert_eq!(err.kind(), ErrorKind::MissingEntry);
    assert!(checker.probed().is_empty());
    assert_not_installed(&scratch.dest);
}

#[rstest]
fn not_found_fails_at_fetching_after_one_attempt(scratch: Scratch, nping_zip: Vec<u8>) {
    let table = table_for("x86_64", &nping_zip);
    let downloader = StubDownloader::new(vec![StubResponse::Error(DownloadError::NotFound {
        url: "https://example.test/v0.2.0/Nping-x86_64.zip".to_owned(),
    })]);
    let checker = StubSelfChecker::passing("unused");

    let err = run_pipeline(
        &table,
        &config("x86_64", &scratch.dest),
        collaborators(&downloader, &checker),
        &CancellationToken::new(),
    )
    .expect_err("404");

    assert_eq!(err.stage(), Stage::Fetching);
    assert_eq!(err.kind(), ErrorKind::NetworkError);
    assert!(!err.error().is_retryable());
    assert_eq!(downloader.calls(), 1);
    assert_not_installed(&scratch.dest);
}

#[rstest]
fn transient_failure_is_retried_then_installs(scratch: Scratch, nping_zip: Vec<u8>) {
    let table = table_for("x86_64", &nping_zip);
    let downloader = StubDownloader::new(vec![
        StubResponse::Error(DownloadError::Status {
            url: "https://example.test".to_owned(),
            code: 503,
        }),
        StubResponse::Body(nping_zip),
    ]);
    let checker = StubSelfChecker::passing("nping 0.2.0");

    let report = run_pipeline(
        &table,
        &config("x86_64", &scratch.dest),
        collaborators(&downloader, &checker),
        &CancellationToken::new(),
    )
    .expect("second attempt succeeds");

    assert_eq!(downloader.calls(), 2);
    assert!(report.installed().install_path().exists());
}

#[rstest]
fn repeated_transient_failures_exhaust_the_budget(scratch: Scratch, nping_zip: Vec<u8>) {
    let table = table_for("x86_64", &nping_zip);
    let transient = || {
        StubResponse::Error(DownloadError::Transport {
            url: "https://example.test".to_owned(),
            reason: "connection reset".to_owned(),
        })
    };
    let downloader = StubDownloader::new(vec![transient(), transient(), transient()]);
    let checker = StubSelfChecker::passing("unused");

    let err = run_pipeline(
        &table,
        &config("x86_64", &scratch.dest),
        collaborators(&downloader, &checker),
        &CancellationToken::new(),
    )
    .expect_err("all attempts fail");

    assert_eq!(err.stage(), Stage::Fetching);
    assert!(err.error().is_retryable());
    assert_eq!(downloader.calls(), 3);
}

#[rstest]
fn truncated_download_is_not_retried(scratch: Scratch, nping_zip: Vec<u8>) {
    let table = table_for("x86_64", &nping_zip);
    let mut downloader = MockArtefactDownloader::new();
    downloader.expect_fetch().times(1).returning(|url, _, _| {
        Err(DownloadError::Truncated {
            url: url.to_owned(),
            expected: 100,
            received: 40,
        })
    });
    let checker = StubSelfChecker::passing("unused");

    let err = run_pipeline(
        &table,
        &config("x86_64", &scratch.dest),
        collaborators(&downloader, &checker),
        &CancellationToken::new(),
    )
    .expect_err("truncated");

    assert_eq!(err.stage(), Stage::Fetching);
    assert_eq!(err.kind(), ErrorKind::TruncatedDownload);
    assert_eq!(err.exit_code(), 10);
}

#[rstest]
#[case::i686("i686")]
#[case::riscv("riscv64gc-unknown-linux-gnu")]
fn unsupported_architecture_fails_before_any_download(scratch: Scratch, #[case] arch: &str) {
    let table = ReleaseTable::builtin().expect("built-in table");
    let mut downloader = MockArtefactDownloader::new();
    downloader.expect_fetch().never();
    let checker = StubSelfChecker::passing("unused");

    let err = run_pipeline(
        &table,
        &config(arch, &scratch.dest),
        collaborators(&downloader, &checker),
        &CancellationToken::new(),
    )
    .expect_err("unsupported");

    assert_eq!(err.stage(), Stage::Selecting);
    assert_eq!(err.kind(), ErrorKind::UnsupportedArchitecture);
    assert_eq!(err.exit_code(), 2);
    assert!(!scratch.dest.exists(), "selection must not touch the filesystem");
}

#[rstest]
fn failing_self_check_keeps_the_binary(scratch: Scratch, nping_zip: Vec<u8>) {
    let table = table_for("x86_64", &nping_zip);
    let downloader = StubDownloader::serving(nping_zip);
    let failure = SelfCheckError::TimedOut {
        arg: "--version".to_owned(),
        timeout: Duration::from_secs(5),
    };
    let checker = StubSelfChecker::failing(failure.clone());

    let report = run_pipeline(
        &table,
        &config("x86_64", &scratch.dest),
        collaborators(&downloader, &checker),
        &CancellationToken::new(),
    )
    .expect("self-check failure is reported, not raised");

    assert_eq!(report.self_check(), &SelfCheckStatus::Failed { error: failure });
    assert!(report.installed().install_path().exists());
}

#[rstest]
fn skipped_self_check_does_not_probe(scratch: Scratch, nping_zip: Vec<u8>) {
    let table = table_for("x86_64", &nping_zip);
    let downloader = StubDownloader::serving(nping_zip);
    let mut checker = MockSelfChecker::new();
    checker.expect_check().never();
    let config = InstallConfig {
        skip_self_check: true,
        ..config("x86_64", &scratch.dest)
    };

    let report = run_pipeline(
        &table,
        &config,
        collaborators(&downloader, &checker),
        &CancellationToken::new(),
    )
    .expect("install without probe");

    assert_eq!(report.self_check(), &SelfCheckStatus::Skipped);
}

#[rstest]
fn repeated_installs_are_identical(scratch: Scratch, nping_zip: Vec<u8>) {
    let table = table_for("x86_64", &nping_zip);
    let checker = StubSelfChecker::passing("nping 0.2.0");
    let snapshot = |path: &Utf8Path| {
        let metadata = std::fs::metadata(path).expect("metadata");
        (
            std::fs::read(path).expect("read"),
            metadata.permissions().readonly(),
            permission_bits(&metadata),
        )
    };

    let mut snapshots = Vec::new();
    for _ in 0..2 {
        let downloader = StubDownloader::serving(nping_zip.clone());
        let report = run_pipeline(
            &table,
            &config("x86_64", &scratch.dest),
            collaborators(&downloader, &checker),
            &CancellationToken::new(),
        )
        .expect("install");
        snapshots.push(snapshot(report.installed().install_path()));
    }

    assert_eq!(snapshots.first(), snapshots.get(1));
}

#[cfg(unix)]
fn permission_bits(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;

    metadata.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn permission_bits(_metadata: &std::fs::Metadata) -> u32 {
    0
}

#[rstest]
fn cancelled_run_stops_before_fetching(scratch: Scratch, nping_zip: Vec<u8>) {
    let table = table_for("x86_64", &nping_zip);
    let mut downloader = MockArtefactDownloader::new();
    downloader.expect_fetch().never();
    let checker = StubSelfChecker::passing("unused");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = run_pipeline(
        &table,
        &config("x86_64", &scratch.dest),
        collaborators(&downloader, &checker),
        &cancel,
    )
    .expect_err("cancelled");

    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(err.exit_code(), 130);
    assert_not_installed(&scratch.dest);
}

#[rstest]
fn cancellation_during_fetch_leaves_no_binary(scratch: Scratch, nping_zip: Vec<u8>) {
    let table = table_for("x86_64", &nping_zip);
    let cancel = CancellationToken::new();
    let handle = cancel.clone();
    let mut downloader = MockArtefactDownloader::new();
    downloader.expect_fetch().times(1).returning(move |_, _, _| {
        handle.cancel();
        Err(DownloadError::Cancelled)
    });
    let checker = StubSelfChecker::passing("unused");

    let err = run_pipeline(
        &table,
        &config("x86_64", &scratch.dest),
        collaborators(&downloader, &checker),
        &cancel,
    )
    .expect_err("cancelled");

    assert_eq!(err.stage(), Stage::Fetching);
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_not_installed(&scratch.dest);
}

#[rstest]
fn plan_resolves_install_path_without_side_effects(scratch: Scratch) {
    let table = ReleaseTable::builtin().expect("built-in table");
    let plan = plan(&table, &config("aarch64", &scratch.dest)).expect("plan");
    assert_eq!(plan.target.architecture().as_str(), "arm64");
    assert_eq!(plan.format, ArchiveFormat::Zip);
    assert_eq!(plan.entry, "nping");
    assert_eq!(plan.install_path, scratch.dest.join("nping"));
    assert!(!scratch.dest.exists());
}

#[test]
fn diagnostic_names_kind_and_stage() {
    let err = PipelineError::at(
        Stage::Fetching,
        DownloadError::NotFound {
            url: "https://example.test/a.zip".to_owned(),
        },
    );
    assert_eq!(
        err.diagnostic(),
        "error[NetworkError] during Fetching: artefact not found: https://example.test/a.zip"
    );
}

#[cfg(unix)]
#[rstest]
fn real_version_probe_reads_installed_binary(scratch: Scratch, nping_zip: Vec<u8>) {
    use crate::self_check::VersionProbe;

    let table = table_for("x86_64", &nping_zip);
    let downloader = StubDownloader::serving(nping_zip);
    let probe = VersionProbe::default();

    let report = run_pipeline(
        &table,
        &config("x86_64", &scratch.dest),
        collaborators(&downloader, &probe),
        &CancellationToken::new(),
    )
    .expect("install");

    assert_eq!(
        report.self_check(),
        &SelfCheckStatus::Passed {
            version: "nping 0.2.0".to_owned()
        }
    );
}
