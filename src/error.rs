use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure of one operation on one workbook.
///
/// `reason` carries the full `anyhow` context chain and is rendered with `{:#}`.
#[derive(Debug, Error)]
pub enum AppendError {
    /// The workbook could not be loaded: missing, corrupt, or not an OOXML package.
    #[error("Failed to open {}: {reason:#}", .path.display())]
    FileOpen { path: PathBuf, reason: anyhow::Error },

    /// No `config` sheet, or its headers are malformed.
    #[error("Failed to read config sheet in {}: {reason:#}", .path.display())]
    ConfigRead { path: PathBuf, reason: anyhow::Error },

    /// Mapping, writing or saving failed. The file on disk was not replaced.
    #[error("Error appending row to {sheet} in {}: {reason:#}", .path.display())]
    Append {
        path: PathBuf,
        sheet: String,
        reason: anyhow::Error,
    },
}

impl AppendError {
    pub fn path(&self) -> &Path {
        match self {
            Self::FileOpen { path, .. }
            | Self::ConfigRead { path, .. }
            | Self::Append { path, .. } => path,
        }
    }
}
