//! Release table: the mapping from architecture to downloadable artefact.
//!
//! The table replaces a chain of per-architecture conditionals with a
//! lookup keyed by [`Architecture`]. A failed lookup is an explicit
//! [`ArtefactError::UnsupportedArchitecture`]; there is no default entry.
//!
//! The built-in table describes the Nping v0.2.0 macOS release. A TOML file
//! with the same shape may replace it:
//!
//! ```toml
//! package = "nping"
//! version = "0.2.0"
//! entry = "nping"
//!
//! [targets.x86_64-apple-darwin]
//! url = "https://example.com/Nping-x86_64-apple-darwin.zip"
//! sha256 = "6d2919f140a87a87a5f404eee28415485267720e41508591032257aaac07ef15"
//! ```

use super::error::{ArtefactError, Result};
use super::sha256_digest::Sha256Digest;
use super::target::{Architecture, unsupported};
use camino::Utf8Path;
use log::debug;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Package name of the built-in release.
const NPING_PACKAGE: &str = "nping";

/// Version of the built-in release.
const NPING_VERSION: &str = "0.2.0";

/// Archive entry holding the Nping executable.
const NPING_ENTRY: &str = "nping";

/// Built-in artefacts as `(architecture, url, sha256)`.
const NPING_RELEASES: &[(Architecture, &str, &str)] = &[
    (
        Architecture::X86_64,
        "https://github.com/hanshuaikang/Nping/releases/download/v0.2.0/Nping-x86_64-apple-darwin.zip",
        "6d2919f140a87a87a5f404eee28415485267720e41508591032257aaac07ef15",
    ),
    (
        Architecture::Arm64,
        "https://github.com/hanshuaikang/Nping/releases/download/v0.2.0/Nping-aarch64-apple-darwin.zip",
        "14d4d9a3944c5b40668ee02191335061ff5b8cec6fac4d984ab990d2273f891b",
    ),
];

/// One downloadable artefact for one architecture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseTarget {
    architecture: Architecture,
    url: String,
    expected_digest: Sha256Digest,
}

impl ReleaseTarget {
    /// Create a release target after validating the URL and digest.
    ///
    /// # Errors
    ///
    /// Returns [`ArtefactError::InvalidUrl`] when `url` is not HTTPS or has
    /// no file name, and [`ArtefactError::MalformedDigest`] when `sha256` is
    /// not exactly 64 hex characters.
    ///
    /// # Examples
    ///
    /// ```
    /// use nping_installer::artefact::release::ReleaseTarget;
    /// use nping_installer::artefact::target::Architecture;
    ///
    /// let target = ReleaseTarget::new(
    ///     Architecture::X86_64,
    ///     "https://example.com/tool-x86_64.zip",
    ///     &"0".repeat(64),
    /// )
    /// .expect("valid target");
    /// assert_eq!(target.file_name(), "tool-x86_64.zip");
    /// ```
    pub fn new(architecture: Architecture, url: &str, sha256: &str) -> Result<Self> {
        validate_url(url)?;
        let expected_digest = Sha256Digest::try_from(sha256)?;
        Ok(Self {
            architecture,
            url: url.to_owned(),
            expected_digest,
        })
    }

    /// Return the architecture this artefact was built for.
    #[must_use]
    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    /// Return the download URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Return the digest the downloaded archive must match.
    #[must_use]
    pub fn expected_digest(&self) -> &Sha256Digest {
        &self.expected_digest
    }

    /// Return the final path segment of the URL.
    #[must_use]
    pub fn file_name(&self) -> &str {
        url_file_name(&self.url).unwrap_or_default()
    }
}

/// The full set of artefacts for one release of one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseTable {
    package: String,
    version: String,
    entry: String,
    targets: BTreeMap<Architecture, ReleaseTarget>,
}

impl ReleaseTable {
    /// Return the built-in Nping release table.
    ///
    /// # Errors
    ///
    /// Never fails for the shipped data; the `Result` guards edits to the
    /// constants above.
    pub fn builtin() -> Result<Self> {
        let targets = NPING_RELEASES
            .iter()
            .map(|(arch, url, sha)| Ok((*arch, ReleaseTarget::new(*arch, url, sha)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(Self {
            package: NPING_PACKAGE.to_owned(),
            version: NPING_VERSION.to_owned(),
            entry: NPING_ENTRY.to_owned(),
            targets,
        })
    }

    /// Parse a release table from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ArtefactError::InvalidReleaseTable`] for syntax errors,
    /// unknown fields, duplicate architectures or an empty table, and the
    /// per-target validation errors of [`ReleaseTarget::new`].
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let raw: RawReleaseTable =
            toml::from_str(text).map_err(|e| ArtefactError::InvalidReleaseTable {
                reason: e.to_string(),
            })?;
        raw.into_table()
    }

    /// Read and parse a release table file.
    ///
    /// # Errors
    ///
    /// Returns [`ArtefactError::InvalidReleaseTable`] when the file cannot
    /// be read, plus every error of [`ReleaseTable::from_toml_str`].
    pub fn load(path: &Utf8Path) -> Result<Self> {
        debug!("loading release table from {path}");
        let text =
            std::fs::read_to_string(path).map_err(|e| ArtefactError::InvalidReleaseTable {
                reason: format!("failed to read {path}: {e}"),
            })?;
        Self::from_toml_str(&text)
    }

    /// Select the artefact for a host architecture string.
    ///
    /// This performs no I/O.
    ///
    /// # Errors
    ///
    /// Returns [`ArtefactError::UnsupportedArchitecture`] when `host_arch`
    /// is not a supported tag, or when the table lacks that architecture.
    ///
    /// # Examples
    ///
    /// ```
    /// use nping_installer::artefact::release::ReleaseTable;
    ///
    /// let table = ReleaseTable::builtin().expect("built-in table");
    /// let target = table.select_target("arm64").expect("arm64 is published");
    /// assert!(target.file_name().contains("aarch64"));
    /// assert!(table.select_target("riscv64").is_err());
    /// ```
    pub fn select_target(&self, host_arch: &str) -> Result<&ReleaseTarget> {
        let arch = Architecture::parse_tag(host_arch)?;
        self.targets.get(&arch).ok_or_else(|| unsupported(host_arch))
    }

    /// Return the package name.
    #[must_use]
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Return the release version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Return the archive entry holding the executable.
    #[must_use]
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Iterate over the targets in architecture order.
    pub fn targets(&self) -> impl Iterator<Item = &ReleaseTarget> {
        self.targets.values()
    }
}

/// On-disk shape of a release table.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawReleaseTable {
    package: String,
    version: String,
    #[serde(default = "default_entry")]
    entry: String,
    targets: BTreeMap<String, RawReleaseTarget>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawReleaseTarget {
    url: String,
    sha256: String,
}

fn default_entry() -> String {
    NPING_ENTRY.to_owned()
}

impl RawReleaseTable {
    fn into_table(self) -> Result<ReleaseTable> {
        if self.targets.is_empty() {
            return Err(ArtefactError::InvalidReleaseTable {
                reason: "no targets defined".to_owned(),
            });
        }
        if !is_bare_file_name(&self.entry) {
            return Err(ArtefactError::InvalidReleaseTable {
                reason: format!("entry \"{}\" must be a bare file name", self.entry),
            });
        }
        let mut targets = BTreeMap::new();
        for (tag, raw) in self.targets {
            let arch = Architecture::parse_tag(&tag)?;
            let target = ReleaseTarget::new(arch, &raw.url, &raw.sha256)?;
            if targets.insert(arch, target).is_some() {
                return Err(ArtefactError::InvalidReleaseTable {
                    reason: format!("architecture {arch} is listed more than once"),
                });
            }
        }
        Ok(ReleaseTable {
            package: self.package,
            version: self.version,
            entry: self.entry,
            targets,
        })
    }
}

/// Reject anything other than an HTTPS URL naming a file.
fn validate_url(url: &str) -> Result<()> {
    let invalid = |reason: &str| ArtefactError::InvalidUrl {
        url: url.to_owned(),
        reason: reason.to_owned(),
    };
    let Some(rest) = url.strip_prefix("https://") else {
        return Err(invalid("only https:// URLs are accepted"));
    };
    if url.chars().any(char::is_whitespace) {
        return Err(invalid("URL contains whitespace"));
    }
    let host = rest.split('/').next().unwrap_or_default();
    if host.is_empty() {
        return Err(invalid("URL has no host"));
    }
    if url_file_name(url).is_none() {
        return Err(invalid("URL does not name a file"));
    }
    Ok(())
}

/// Whether `name` is a single path component: non-empty, free of
/// separators, and neither `.` nor `..`.
pub(crate) fn is_bare_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

/// Return the last non-empty path segment of `url`, ignoring query and
/// fragment.
pub(crate) fn url_file_name(url: &str) -> Option<&str> {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path = without_scheme
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    let (_, path) = path.split_once('/')?;
    path.rsplit('/').next().filter(|segment| !segment.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const SHA: &str = "6d2919f140a87a87a5f404eee28415485267720e41508591032257aaac07ef15";

    fn table_toml(targets: &str) -> String {
        format!("package = \"nping\"\nversion = \"0.2.0\"\n\n{targets}")
    }

    #[rstest]
    #[case::x86(Architecture::X86_64)]
    #[case::arm(Architecture::Arm64)]
    fn builtin_url_file_name_encodes_architecture(#[case] arch: Architecture) {
        let table = ReleaseTable::builtin().expect("built-in table");
        let target = table.select_target(arch.as_str()).expect("published");
        assert_eq!(target.architecture(), arch);
        assert!(
            target.file_name().contains(arch.triple_prefix()),
            "{} does not encode {arch}",
            target.file_name()
        );
    }

    #[test]
    fn builtin_table_describes_nping() {
        let table = ReleaseTable::builtin().expect("built-in table");
        assert_eq!(table.package(), "nping");
        assert_eq!(table.version(), "0.2.0");
        assert_eq!(table.entry(), "nping");
        assert_eq!(table.targets().count(), 2);
    }

    #[rstest]
    #[case::i686("i686")]
    #[case::ppc("powerpc64le")]
    #[case::empty("")]
    fn select_target_rejects_unknown_architecture(#[case] arch: &str) {
        let table = ReleaseTable::builtin().expect("built-in table");
        let err = table.select_target(arch).expect_err("unsupported");
        assert!(matches!(err, ArtefactError::UnsupportedArchitecture { .. }));
    }

    #[test]
    fn select_target_rejects_architecture_missing_from_table() {
        let text = table_toml(&format!(
            "[targets.x86_64]\nurl = \"https://example.com/a-x86_64.zip\"\nsha256 = \"{SHA}\"\n"
        ));
        let table = ReleaseTable::from_toml_str(&text).expect("valid table");
        let err = table.select_target("aarch64").expect_err("no arm64 entry");
        assert!(matches!(err, ArtefactError::UnsupportedArchitecture { .. }));
    }

    #[test]
    fn parses_triple_keyed_table() {
        let text = table_toml(&format!(
            concat!(
                "[targets.x86_64-apple-darwin]\n",
                "url = \"https://example.com/v1/tool-x86_64-apple-darwin.zip\"\n",
                "sha256 = \"{sha}\"\n\n",
                "[targets.aarch64-apple-darwin]\n",
                "url = \"https://example.com/v1/tool-aarch64-apple-darwin.tar.gz\"\n",
                "sha256 = \"{sha}\"\n",
            ),
            sha = SHA.to_ascii_uppercase()
        ));
        let table = ReleaseTable::from_toml_str(&text).expect("valid table");
        let arm = table.select_target("arm64").expect("arm64 entry");
        assert_eq!(arm.file_name(), "tool-aarch64-apple-darwin.tar.gz");
        assert_eq!(arm.expected_digest().as_str(), SHA);
        assert_eq!(table.entry(), "nping");
    }

    #[test]
    fn rejects_duplicate_architecture() {
        let text = table_toml(&format!(
            concat!(
                "[targets.x86_64]\nurl = \"https://example.com/a.zip\"\nsha256 = \"{sha}\"\n",
                "[targets.amd64]\nurl = \"https://example.com/b.zip\"\nsha256 = \"{sha}\"\n",
            ),
            sha = SHA
        ));
        let err = ReleaseTable::from_toml_str(&text).expect_err("duplicate");
        assert!(matches!(err, ArtefactError::InvalidReleaseTable { .. }));
    }

    #[test]
    fn rejects_malformed_digest_in_table() {
        let text = table_toml(&format!(
            "[targets.x86_64]\nurl = \"https://example.com/a.zip\"\nsha256 = \"{SHA}ab\"\n"
        ));
        let err = ReleaseTable::from_toml_str(&text).expect_err("66 characters");
        assert!(matches!(err, ArtefactError::MalformedDigest { .. }));
    }

    #[test]
    fn rejects_empty_target_list() {
        let text = table_toml("[targets]\n");
        let err = ReleaseTable::from_toml_str(&text).expect_err("empty");
        assert!(matches!(err, ArtefactError::InvalidReleaseTable { .. }));
    }

    #[test]
    fn rejects_unknown_fields() {
        let text = format!("{}mirror = \"x\"\n", table_toml(""));
        let err = ReleaseTable::from_toml_str(&text).expect_err("unknown field");
        assert!(matches!(err, ArtefactError::InvalidReleaseTable { .. }));
    }

    #[rstest]
    #[case::nested("bin/nping")]
    #[case::parent("..")]
    #[case::backslash("bin\\nping")]
    #[case::empty("")]
    fn rejects_entry_that_is_not_a_bare_name(#[case] entry: &str) {
        let text = format!(
            "package = \"nping\"\nversion = \"0.2.0\"\nentry = \"{}\"\n\n[targets.x86_64]\nurl = \"https://example.com/a.zip\"\nsha256 = \"{SHA}\"\n",
            entry.replace('\\', "\\\\")
        );
        let err = ReleaseTable::from_toml_str(&text).expect_err("entry must be bare");
        assert!(matches!(err, ArtefactError::InvalidReleaseTable { .. }), "{err:?}");
    }

    #[rstest]
    #[case::plain_http("http://example.com/a.zip")]
    #[case::ftp("ftp://example.com/a.zip")]
    #[case::no_host("https:///a.zip")]
    #[case::no_file("https://example.com/")]
    #[case::bare_host("https://example.com")]
    #[case::whitespace("https://example.com/a b.zip")]
    fn rejects_invalid_urls(#[case] url: &str) {
        let err = ReleaseTarget::new(Architecture::X86_64, url, SHA).expect_err("invalid url");
        assert!(matches!(err, ArtefactError::InvalidUrl { .. }), "{err:?}");
    }

    #[rstest]
    #[case::plain("https://h/a/b/c.zip", Some("c.zip"))]
    #[case::query("https://h/c.tar.gz?x=1", Some("c.tar.gz"))]
    #[case::fragment("https://h/c.zip#frag", Some("c.zip"))]
    #[case::trailing_slash("https://h/dir/", None)]
    #[case::no_path("https://h", None)]
    fn url_file_name_extracts_last_segment(#[case] url: &str, #[case] expected: Option<&str>) {
        assert_eq!(url_file_name(url), expected);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = ReleaseTable::load(Utf8Path::new("/nonexistent/releases.toml"))
            .expect_err("missing file");
        assert!(matches!(err, ArtefactError::InvalidReleaseTable { ref reason } if reason.contains("failed to read")));
    }
}
