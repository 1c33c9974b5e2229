//! Host architecture parsing for release target selection.
//!
//! Only the two architectures Nping publishes binaries for are accepted.
//! Any other tag is rejected at parse time with a descriptive error, so a
//! mismatched binary can never be chosen as a silent default.

use super::error::{ArtefactError, Result};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// The canonical tags of the supported architectures.
const SUPPORTED_ARCHITECTURES: &[&str] = &["x86_64", "arm64"];

/// A CPU architecture with a published release artefact.
///
/// # Examples
///
/// ```
/// use nping_installer::artefact::target::Architecture;
///
/// let arch: Architecture = "aarch64-apple-darwin".parse().expect("valid tag");
/// assert_eq!(arch, Architecture::Arm64);
/// assert_eq!(arch.triple_prefix(), "aarch64");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    /// 64-bit x86 (`x86_64`, `amd64`).
    X86_64,
    /// 64-bit ARM (`arm64`, `aarch64`).
    Arm64,
}

impl Architecture {
    /// Every supported architecture, in table order.
    pub const ALL: [Self; 2] = [Self::X86_64, Self::Arm64];

    /// Return the canonical tag for this architecture.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Arm64 => "arm64",
        }
    }

    /// Return the leading component of target triples built for this
    /// architecture, as used in release file names.
    #[must_use]
    pub fn triple_prefix(self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Arm64 => "aarch64",
        }
    }

    /// Return the canonical tags of all supported architectures.
    #[must_use]
    pub fn supported() -> &'static [&'static str] {
        SUPPORTED_ARCHITECTURES
    }

    /// Return the architecture this binary was compiled for.
    ///
    /// # Errors
    ///
    /// Returns [`ArtefactError::UnsupportedArchitecture`] when running on
    /// an architecture without published artefacts.
    pub fn host() -> Result<Self> {
        Self::parse_tag(std::env::consts::ARCH)
    }

    /// Parse an architecture tag or target triple.
    ///
    /// Bare tags (`x86_64`, `amd64`, `x64`, `arm64`, `aarch64`) and triples
    /// whose first component is one of them are accepted, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns [`ArtefactError::UnsupportedArchitecture`] for anything else.
    pub fn parse_tag(tag: &str) -> Result<Self> {
        let normalised = tag.trim().to_ascii_lowercase();
        let leading = normalised.split('-').next().unwrap_or_default();
        match leading {
            "x86_64" | "amd64" | "x64" => Ok(Self::X86_64),
            "arm64" | "aarch64" => Ok(Self::Arm64),
            _ => Err(unsupported(tag)),
        }
    }
}

/// Build the rejection error for `tag`.
pub(crate) fn unsupported(tag: &str) -> ArtefactError {
    ArtefactError::UnsupportedArchitecture {
        value: tag.to_owned(),
        expected: SUPPORTED_ARCHITECTURES.join(", "),
    }
}

impl FromStr for Architecture {
    type Err = ArtefactError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_tag(s)
    }
}

impl TryFrom<&str> for Architecture {
    type Error = ArtefactError;

    fn try_from(value: &str) -> Result<Self> {
        Self::parse_tag(value)
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
