//! Directory resolution abstraction for platform-specific paths.
//!
//! [`BaseDirs`] lets tests substitute fixed directories for the user's real
//! home and executable directories.

use std::path::PathBuf;

use camino::Utf8PathBuf;

/// Source of per-user base directories.
pub trait BaseDirs {
    /// Return the user's home directory.
    fn home_dir(&self) -> Option<PathBuf>;

    /// Return the platform's per-user executable directory, if it has one.
    fn bin_dir(&self) -> Option<PathBuf>;
}

/// [`BaseDirs`] backed by `directories-next`.
#[derive(Debug, Clone)]
pub struct SystemBaseDirs {
    inner: directories_next::BaseDirs,
}

impl SystemBaseDirs {
    /// Resolve the current user's directories.
    ///
    /// Returns `None` when no home directory can be determined.
    #[must_use]
    pub fn new() -> Option<Self> {
        directories_next::BaseDirs::new().map(|inner| Self { inner })
    }
}

impl BaseDirs for SystemBaseDirs {
    fn home_dir(&self) -> Option<PathBuf> {
        Some(self.inner.home_dir().to_path_buf())
    }

    fn bin_dir(&self) -> Option<PathBuf> {
        self.inner.executable_dir().map(std::path::Path::to_path_buf)
    }
}

/// Return the default install directory.
///
/// Prefers the platform executable directory and falls back to
/// `~/.local/bin` where the platform has none (macOS, Windows). Non-UTF-8
/// paths are treated as unavailable.
#[must_use]
pub fn default_install_dir(dirs: &dyn BaseDirs) -> Option<Utf8PathBuf> {
    dirs.bin_dir()
        .or_else(|| dirs.home_dir().map(|home| home.join(".local").join("bin")))
        .and_then(|path| Utf8PathBuf::try_from(path).ok())
}
