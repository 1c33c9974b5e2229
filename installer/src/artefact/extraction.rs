//! Single-entry archive extraction for release artefacts.
//!
//! Only the named executable is read out of the archive, and it is written
//! to a caller-chosen file rather than to a path derived from the entry
//! name. Entries that do not match are never written, so hostile names
//! elsewhere in the archive cannot escape the destination. A matching entry
//! whose path is absolute or climbs with `..` is rejected outright.

use std::ffi::OsStr;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Component, Path};

use log::{debug, trace};

/// Archive container formats recognised by file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// A `.zip` archive.
    Zip,
    /// A gzip-compressed tarball (`.tar.gz`, `.tgz`).
    TarGz,
    /// A zstd-compressed tarball (`.tar.zst`, `.tzst`).
    TarZst,
}

impl ArchiveFormat {
    /// Detect the format from an archive file name.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::UnsupportedFormat`] for any other suffix.
    ///
    /// # Examples
    ///
    /// ```
    /// use nping_installer::artefact::extraction::ArchiveFormat;
    ///
    /// let format = ArchiveFormat::from_file_name("Nping-aarch64-apple-darwin.zip");
    /// assert_eq!(format.expect("zip"), ArchiveFormat::Zip);
    /// ```
    pub fn from_file_name(file_name: &str) -> Result<Self, ExtractionError> {
        let lower = file_name.to_ascii_lowercase();
        if lower.ends_with(".zip") {
            Ok(Self::Zip)
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Ok(Self::TarGz)
        } else if lower.ends_with(".tar.zst") || lower.ends_with(".tzst") {
            Ok(Self::TarZst)
        } else {
            Err(ExtractionError::UnsupportedFormat {
                file_name: file_name.to_owned(),
            })
        }
    }
}

/// Trait for extracting one entry from an archive, enabling test mocking.
#[cfg_attr(test, mockall::automock)]
pub trait ArtefactExtractor {
    /// Copy the entry called `entry_name` from the archive at
    /// `archive_path` into `dest_file`, returning the bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::MissingEntry`] if no regular file in the
    /// archive matches, [`ExtractionError::PathTraversal`] if the match
    /// would escape its directory, and [`ExtractionError::Archive`] or
    /// [`ExtractionError::Io`] on decoding or I/O failures.
    fn extract_entry(
        &self,
        archive_path: &Path,
        format: ArchiveFormat,
        entry_name: &str,
        dest_file: &Path,
    ) -> Result<u64, ExtractionError>;
}

/// Errors arising from archive extraction.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// I/O error during extraction.
    #[error("extraction I/O error: {0}")]
    Io(#[from] io::Error),

    /// The archive could not be decoded.
    #[error("corrupt archive: {reason}")]
    Archive {
        /// Description of the decoding failure.
        reason: String,
    },

    /// A matching entry attempts to traverse outside its directory.
    #[error("path traversal detected: {path}")]
    PathTraversal {
        /// The offending path from the archive entry.
        path: String,
    },

    /// No regular file in the archive matches the requested entry.
    #[error("archive does not contain an entry named \"{entry}\"")]
    MissingEntry {
        /// The requested entry name.
        entry: String,
    },

    /// The archive file name has no recognised suffix.
    #[error("unsupported archive format: {file_name}")]
    UnsupportedFormat {
        /// The archive file name.
        file_name: String,
    },
}

/// Default extractor backed by the `zip`, `tar`, `flate2` and `zstd` crates.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveExtractor;

impl ArtefactExtractor for ArchiveExtractor {
    fn extract_entry(
        &self,
        archive_path: &Path,
        format: ArchiveFormat,
        entry_name: &str,
        dest_file: &Path,
    ) -> Result<u64, ExtractionError> {
        debug!(
            "extracting {entry_name} from {} ({format:?})",
            archive_path.display()
        );
        let file = File::open(archive_path)?;
        let written = match format {
            ArchiveFormat::Zip => extract_from_zip(file, entry_name, dest_file),
            ArchiveFormat::TarGz => extract_from_tar(
                tar::Archive::new(flate2::read::GzDecoder::new(file)),
                entry_name,
                dest_file,
            ),
            ArchiveFormat::TarZst => extract_from_tar(
                tar::Archive::new(zstd::Decoder::new(file)?),
                entry_name,
                dest_file,
            ),
        }?;
        debug!("extracted {entry_name} ({written} bytes)");
        Ok(written)
    }
}

fn extract_from_zip(file: File, entry_name: &str, dest_file: &Path) -> Result<u64, ExtractionError> {
    let mut archive = zip::ZipArchive::new(file).map_err(archive_error)?;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(archive_error)?;
        if !entry.is_file() {
            continue;
        }
        let entry_path = Path::new(entry.name()).to_path_buf();
        trace!("zip entry {}", entry_path.display());
        if !entry_matches(&entry_path, entry_name) {
            continue;
        }
        validate_entry_path(&entry_path)?;
        return copy_to(&mut entry, dest_file);
    }
    Err(missing(entry_name))
}

fn extract_from_tar<R: Read>(
    mut archive: tar::Archive<R>,
    entry_name: &str,
    dest_file: &Path,
) -> Result<u64, ExtractionError> {
    for entry_result in archive.entries()? {
        let mut entry = entry_result?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let entry_path = entry.path()?.into_owned();
        trace!("tar entry {}", entry_path.display());
        if !entry_matches(&entry_path, entry_name) {
            continue;
        }
        validate_entry_path(&entry_path)?;
        return copy_to(&mut entry, dest_file);
    }
    Err(missing(entry_name))
}

/// Whether an archive path names the requested executable: either the
/// whole path or its final component must equal `entry_name`.
fn entry_matches(path: &Path, entry_name: &str) -> bool {
    path == Path::new(entry_name) || path.file_name() == Some(OsStr::new(entry_name))
}

fn copy_to(reader: &mut dyn Read, dest_file: &Path) -> Result<u64, ExtractionError> {
    let mut out = File::create(dest_file)?;
    let written = io::copy(reader, &mut out)?;
    out.sync_all()?;
    Ok(written)
}

/// Validate that an entry path does not escape its directory via `..`
/// components or absolute paths.
fn validate_entry_path(path: &Path) -> Result<(), ExtractionError> {
    let escapes = path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if escapes {
        return Err(ExtractionError::PathTraversal {
            path: path.display().to_string(),
        });
    }
    Ok(())
}

fn archive_error(err: zip::result::ZipError) -> ExtractionError {
    ExtractionError::Archive {
        reason: err.to_string(),
    }
}

fn missing(entry_name: &str) -> ExtractionError {
    ExtractionError::MissingEntry {
        entry: entry_name.to_owned(),
    }
}
