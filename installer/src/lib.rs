//! Nping installer library.
//!
//! This crate fetches the prebuilt Nping release archive for a host
//! architecture, verifies its SHA-256 digest, installs the `nping` executable
//! atomically and runs a version self-check. It is used by the
//! `nping-installer` CLI binary and can be driven programmatically with
//! substitute downloaders and checkers for testing.
//!
//! # Modules
//!
//! - [`artefact`] - Release table, download, verification and extraction
//! - [`cancel`] - Cooperative cancellation token
//! - [`cli`] - Command-line argument definitions
//! - [`dirs`] - Directory resolution abstraction for platform-specific paths
//! - [`error`] - Error taxonomy, error kinds and exit codes
//! - [`list_output`] - Output formatting for release target listing
//! - [`output`] - Progress, success and dry-run text
//! - [`pipeline`] - Stage-by-stage install orchestration
//! - [`self_check`] - Post-install version probe
//! - [`stager`] - Atomic placement into the destination directory

pub mod artefact;
pub mod cancel;
pub mod cli;
pub mod dirs;
pub mod error;
pub mod list_output;
pub mod output;
pub mod pipeline;
pub mod self_check;
pub mod stager;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
