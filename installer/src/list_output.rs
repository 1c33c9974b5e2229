//! Output formatting for release target listing.
//!
//! This module renders a [`ReleaseTable`] for human-readable or JSON output.

use serde::Serialize;

use crate::artefact::release::ReleaseTable;
use crate::artefact::target::Architecture;

/// Format the release table for human-readable output.
///
/// The target matching `host` is marked.
///
/// # Examples
///
/// ```
/// use nping_installer::artefact::release::ReleaseTable;
/// use nping_installer::artefact::target::Architecture;
/// use nping_installer::list_output::format_human;
///
/// let table = ReleaseTable::builtin().expect("built-in table");
/// let output = format_human(&table, Some(Architecture::Arm64));
/// assert!(output.contains("arm64 (host)"));
/// ```
#[must_use]
pub fn format_human(table: &ReleaseTable, host: Option<Architecture>) -> String {
    let mut output = format!(
        "Release targets for {} {} (entry: {}):\n",
        table.package(),
        table.version(),
        table.entry()
    );

    for target in table.targets() {
        let host_marker = host
            .filter(|arch| *arch == target.architecture())
            .map_or("", |_| " (host)");
        output.push('\n');
        output.push_str(&format!("  {}{host_marker}\n", target.architecture()));
        output.push_str(&format!("    url:    {}\n", target.url()));
        output.push_str(&format!("    sha256: {}\n", target.expected_digest()));
    }

    output
}

/// Format the release table as JSON.
///
/// # Examples
///
/// ```
/// use nping_installer::artefact::release::ReleaseTable;
/// use nping_installer::list_output::format_json;
///
/// let table = ReleaseTable::builtin().expect("built-in table");
/// let json = format_json(&table, None);
/// assert!(json.contains("\"targets\""));
/// ```
#[must_use]
pub fn format_json(table: &ReleaseTable, host: Option<Architecture>) -> String {
    let json_data = ReleaseTableJson::from_table(table, host);

    serde_json::to_string_pretty(&json_data).unwrap_or_else(|_| "{}".to_owned())
}

/// JSON-serializable representation of the release table.
#[derive(Debug, Serialize)]
pub struct ReleaseTableJson {
    /// Package name.
    pub package: String,
    /// Package version.
    pub version: String,
    /// Archive entry holding the executable.
    pub entry: String,
    /// One entry per architecture.
    pub targets: Vec<TargetEntry>,
}

impl ReleaseTableJson {
    fn from_table(table: &ReleaseTable, host: Option<Architecture>) -> Self {
        let targets = table
            .targets()
            .map(|target| TargetEntry {
                architecture: target.architecture(),
                url: target.url().to_owned(),
                sha256: target.expected_digest().as_str().to_owned(),
                host: host == Some(target.architecture()),
            })
            .collect();

        Self {
            package: table.package().to_owned(),
            version: table.version().to_owned(),
            entry: table.entry().to_owned(),
            targets,
        }
    }
}

/// JSON entry for a release target.
#[derive(Debug, Serialize)]
pub struct TargetEntry {
    /// Target architecture.
    pub architecture: Architecture,
    /// Archive download URL.
    pub url: String,
    /// Expected SHA-256 of the archive.
    pub sha256: String,
    /// Whether this is the current machine's architecture.
    pub host: bool,
}
