//! Placement of the verified binary in the destination directory.
//!
//! The executable is extracted into a temporary file created inside the
//! destination directory, made executable, and renamed over the final path.
//! Rename within one directory is atomic, so the final path only ever holds
//! a previous install or a complete new one. Installs into the same
//! directory are serialised through an advisory lock file.

use std::fs::{self, File, OpenOptions};
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use log::debug;

use crate::artefact::extraction::{ArchiveFormat, ArtefactExtractor, ExtractionError};
use crate::artefact::release::is_bare_file_name;
use crate::artefact::verification::VerifiedArtefact;
use crate::cancel::{CancellationToken, Cancelled};

/// Name of the lock file kept in the destination directory.
pub const LOCK_FILE_NAME: &str = ".nping-installer.lock";

/// Prefix of temporary files created in the destination directory.
const TEMP_PREFIX: &str = ".nping-installer-";

/// Permission bits applied to the installed executable.
#[cfg(unix)]
const EXECUTABLE_MODE: u32 = 0o755;

/// The binary placed by a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledBinary {
    source_entry_name: String,
    install_path: Utf8PathBuf,
}

impl InstalledBinary {
    /// Return the archive entry the binary came from.
    #[must_use]
    pub fn source_entry_name(&self) -> &str {
        &self.source_entry_name
    }

    /// Return where the binary was installed.
    #[must_use]
    pub fn install_path(&self) -> &Utf8Path {
        &self.install_path
    }
}

/// Errors arising while placing the binary.
#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    /// The destination directory cannot be created or written.
    #[error("install directory {path} is not writable: {reason}")]
    NotWritable {
        /// The destination directory.
        path: Utf8PathBuf,
        /// Description of the underlying I/O error.
        reason: String,
    },

    /// The entry name would place the binary outside the destination.
    #[error("entry name \"{entry}\" must be a bare file name")]
    InvalidEntryName {
        /// The rejected entry name.
        entry: String,
    },

    /// Extracting the entry from the archive failed.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// The install was interrupted before the rename.
    #[error("install cancelled")]
    Cancelled,

    /// An I/O operation on the destination failed.
    #[error("install I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<Cancelled> for StagingError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

/// Holds the destination lock until dropped.
#[derive(Debug)]
pub struct DestinationLock {
    _file: File,
}

/// Handles placement of the binary into a destination directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stager {
    dest_dir: Utf8PathBuf,
}

impl Stager {
    /// Create a stager targeting `dest_dir`.
    #[must_use]
    pub fn new(dest_dir: Utf8PathBuf) -> Self {
        Self { dest_dir }
    }

    /// Return the destination directory.
    #[must_use]
    pub fn dest_dir(&self) -> &Utf8Path {
        &self.dest_dir
    }

    /// Return the final path for `entry_name`.
    #[must_use]
    pub fn install_path(&self, entry_name: &str) -> Utf8PathBuf {
        self.dest_dir.join(entry_name)
    }

    /// Ensure the destination directory exists and is writable.
    ///
    /// # Errors
    ///
    /// Returns [`StagingError::NotWritable`] if the directory cannot be
    /// created or a probe file cannot be written inside it.
    pub fn prepare(&self) -> Result<(), StagingError> {
        fs::create_dir_all(&self.dest_dir).map_err(|e| self.not_writable(&e))?;
        tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(&self.dest_dir)
            .map_err(|e| self.not_writable(&e))?;
        Ok(())
    }

    /// Take the exclusive advisory lock for the destination, blocking until
    /// any concurrent install into the same directory finishes.
    ///
    /// # Errors
    ///
    /// Returns [`StagingError::NotWritable`] if the lock file cannot be
    /// opened or locked.
    pub fn lock(&self) -> Result<DestinationLock, StagingError> {
        let lock_path = self.dest_dir.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| self.not_writable(&e))?;
        fs2::FileExt::lock_exclusive(&file).map_err(|e| self.not_writable(&e))?;
        debug!("locked {lock_path}");
        Ok(DestinationLock { _file: file })
    }

    /// Extract `entry_name` from `artefact` and atomically place it at
    /// [`Self::install_path`], replacing any previous install.
    ///
    /// On any error, including cancellation, the temporary file is removed
    /// and the final path is left as it was.
    ///
    /// # Errors
    ///
    /// Returns [`StagingError::InvalidEntryName`] for names containing
    /// separators, [`StagingError::Extraction`] when the archive lacks the
    /// entry or is unsafe, [`StagingError::Cancelled`] when interrupted, and
    /// [`StagingError::NotWritable`] or [`StagingError::Io`] on filesystem
    /// failures.
    pub fn install(
        &self,
        artefact: &VerifiedArtefact,
        format: ArchiveFormat,
        entry_name: &str,
        extractor: &dyn ArtefactExtractor,
        cancel: &CancellationToken,
    ) -> Result<InstalledBinary, StagingError> {
        if !is_bare_file_name(entry_name) {
            return Err(StagingError::InvalidEntryName {
                entry: entry_name.to_owned(),
            });
        }
        let _lock = self.lock()?;
        cancel.check()?;

        let temp_path = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(&self.dest_dir)
            .map_err(|e| self.not_writable(&e))?
            .into_temp_path();
        extractor.extract_entry(artefact.path(), format, entry_name, &temp_path)?;
        cancel.check()?;
        make_executable(&temp_path)?;

        let install_path = self.install_path(entry_name);
        temp_path
            .persist(&install_path)
            .map_err(|e| self.replace_error(e.error))?;
        debug!("installed {entry_name} to {install_path}");
        Ok(InstalledBinary {
            source_entry_name: entry_name.to_owned(),
            install_path,
        })
    }

    /// Classify a failure to rename the temporary file over the final path.
    fn replace_error(&self, err: io::Error) -> StagingError {
        if err.kind() == io::ErrorKind::PermissionDenied {
            self.not_writable(&err)
        } else {
            StagingError::Io(err)
        }
    }

    fn not_writable(&self, err: &io::Error) -> StagingError {
        StagingError::NotWritable {
            path: self.dest_dir.clone(),
            reason: err.to_string(),
        }
    }
}

#[cfg(unix)]
fn make_executable(path: &std::path::Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(EXECUTABLE_MODE))
}

#[cfg(not(unix))]
fn make_executable(_path: &std::path::Path) -> io::Result<()> {
    Ok(())
}
