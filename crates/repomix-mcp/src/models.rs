//! MCP request types and the two pack operations.
//!
//! These types define the argument surface shared by the `pack` and
//! `pack-estimate` tools.

use rmcp::schemars;
use serde::Deserialize;
use strum::{AsRefStr, Display, EnumString};

// ============================================================================
// Request Types
// ============================================================================

/// Pack a local directory or remote repository with repomix.
///
/// Every field is optional; an empty request packs the server's working
/// directory with repomix defaults.
#[derive(Debug, Clone, Default, Deserialize, schemars::JsonSchema)]
pub struct PackRequest {
    /// Directory to pack (relative to the server's working directory)
    #[schemars(description = "Path to the directory to pack. Ignored for access checks when 'remote' is set.")]
    pub path: Option<String>,
    /// Output format
    #[schemars(description = "Output style: xml, markdown, or plain")]
    pub style: Option<OutputStyle>,
    /// Strip function bodies and comments to reduce token count
    #[schemars(description = "Compress output by extracting essential code structure")]
    pub compress: Option<bool>,
    /// Include patterns
    #[schemars(description = "Comma-separated glob patterns of files to include (e.g. \"src/**/*.rs,*.md\")")]
    pub include: Option<String>,
    /// Ignore patterns
    #[schemars(description = "Comma-separated glob patterns of files to ignore (e.g. \"target/**,*.lock\")")]
    pub ignore: Option<String>,
    /// Remote repository to pack instead of a local path
    #[schemars(description = "Remote repository URL or owner/repo shorthand to clone and pack")]
    pub remote: Option<String>,
}

impl PackRequest {
    /// Whether compression was requested. Absent means disabled.
    pub fn compress_enabled(&self) -> bool {
        self.compress.unwrap_or(false)
    }

    /// The local path that must pass the access check, if any.
    ///
    /// Remote packs fetch their own content, so `path` is not confined then.
    pub fn local_path(&self) -> Option<&str> {
        match (&self.path, &self.remote) {
            (Some(path), None) => Some(path.as_str()),
            _ => None,
        }
    }
}

/// Repomix output style.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Deserialize, schemars::JsonSchema, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OutputStyle {
    Xml,
    Markdown,
    Plain,
}

// ============================================================================
// Operations
// ============================================================================

/// Which of the two tools was called.
///
/// Both run the same command; they differ in what is read back from the
/// output file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, AsRefStr, Display)]
pub enum Operation {
    /// Return the packed output verbatim.
    #[strum(serialize = "pack")]
    Pack,
    /// Return only size and token figures.
    #[strum(serialize = "pack-estimate")]
    PackEstimate,
}

impl Operation {
    pub fn is_estimate(self) -> bool {
        matches!(self, Operation::PackEstimate)
    }
}
