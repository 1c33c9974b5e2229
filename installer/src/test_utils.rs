//! Shared test utilities for the installer crate.
//!
//! Archive builders produce in-memory release archives, and the stub
//! collaborators stand in for the network and the installed binary so the
//! pipeline can be driven end to end without either.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io::{Cursor, Write};
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};

use crate::artefact::download::{ArtefactDownloader, DownloadError, FetchedArtefact, spool_hashed};
use crate::artefact::sha256_digest::Sha256Digest;
use crate::cancel::CancellationToken;
use crate::self_check::{SelfCheckError, SelfChecker};

/// Return the lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    Sha256Digest::of_bytes(bytes).into_inner()
}

/// Build a zip archive holding `entries` as `(path, contents)` pairs.
///
/// # Panics
///
/// Panics if the archive cannot be written.
pub fn zip_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default().unix_permissions(0o644);
    for (name, contents) in entries {
        writer.start_file(*name, options).expect("start zip entry");
        writer.write_all(contents).expect("write zip entry");
    }
    writer.finish().expect("finish zip").into_inner()
}

/// Build an uncompressed tar stream holding `entries`.
fn tar_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, contents) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, *contents)
            .expect("append tar entry");
    }
    builder.into_inner().expect("finish tar")
}

/// Build a gzip-compressed tarball holding `entries`.
///
/// # Panics
///
/// Panics if the archive cannot be written.
pub fn tar_gz_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut encoder =
        flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(&tar_bytes(entries))
        .expect("gzip tarball");
    encoder.finish().expect("finish gzip")
}

/// Build a zstd-compressed tarball holding `entries`.
///
/// # Panics
///
/// Panics if the archive cannot be written.
pub fn tar_zst_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    zstd::encode_all(Cursor::new(tar_bytes(entries)), 0).expect("zstd tarball")
}

/// A scripted reply for [`StubDownloader`].
#[derive(Debug)]
pub enum StubResponse {
    /// Serve these bytes as the response body.
    Body(Vec<u8>),
    /// Fail the attempt with this error.
    Error(DownloadError),
}

/// A downloader that replays scripted responses instead of using the network.
///
/// Bodies pass through [`spool_hashed`], so digests and spool files are
/// produced exactly as they would be for a real download. Once the script is
/// exhausted, the fallback body (if any) is served on every further call.
#[derive(Debug, Default)]
pub struct StubDownloader {
    script: RefCell<VecDeque<StubResponse>>,
    fallback: Option<Vec<u8>>,
    calls: Cell<usize>,
    urls: RefCell<Vec<String>>,
}

impl StubDownloader {
    /// Create a stub that replays `responses` in order.
    pub fn new(responses: Vec<StubResponse>) -> Self {
        Self {
            script: RefCell::new(responses.into()),
            ..Self::default()
        }
    }

    /// Create a stub that serves `body` on every call.
    pub fn serving(body: Vec<u8>) -> Self {
        Self {
            fallback: Some(body),
            ..Self::default()
        }
    }

    /// Return how many times [`ArtefactDownloader::fetch`] was called.
    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    /// Return the URLs requested so far.
    pub fn requested_urls(&self) -> Vec<String> {
        self.urls.borrow().clone()
    }
}

impl ArtefactDownloader for StubDownloader {
    fn fetch(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<FetchedArtefact, DownloadError> {
        self.calls.set(self.calls.get() + 1);
        self.urls.borrow_mut().push(url.to_owned());
        let next = self.script.borrow_mut().pop_front();
        match next {
            Some(StubResponse::Error(err)) => Err(err),
            Some(StubResponse::Body(body)) => {
                spool_hashed(&mut body.as_slice(), dest, Some(body.len() as u64), url, cancel)
            }
            None => match &self.fallback {
                Some(body) => {
                    spool_hashed(&mut body.as_slice(), dest, Some(body.len() as u64), url, cancel)
                }
                None => Err(DownloadError::Transport {
                    url: url.to_owned(),
                    reason: "stub has no response left".to_owned(),
                }),
            },
        }
    }
}

/// A self-checker that returns a fixed outcome and records what it probed.
#[derive(Debug)]
pub struct StubSelfChecker {
    outcome: Result<String, SelfCheckError>,
    probed: RefCell<Vec<Utf8PathBuf>>,
}

impl StubSelfChecker {
    /// Create a checker that reports `version` as the binary's output.
    pub fn passing(version: &str) -> Self {
        Self {
            outcome: Ok(version.to_owned()),
            probed: RefCell::new(Vec::new()),
        }
    }

    /// Create a checker that fails with `error`.
    pub fn failing(error: SelfCheckError) -> Self {
        Self {
            outcome: Err(error),
            probed: RefCell::new(Vec::new()),
        }
    }

    /// Return the binaries probed so far.
    pub fn probed(&self) -> Vec<Utf8PathBuf> {
        self.probed.borrow().clone()
    }
}

impl SelfChecker for StubSelfChecker {
    fn check(
        &self,
        binary: &Utf8Path,
        _cancel: &CancellationToken,
    ) -> Result<String, SelfCheckError> {
        self.probed.borrow_mut().push(binary.to_owned());
        self.outcome.clone()
    }
}
