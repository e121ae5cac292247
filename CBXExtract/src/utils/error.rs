//! Error types shared by every extraction workflow

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, CbxError>;

/// Errors produced while staging, reading or post-processing a comic file
#[derive(Error, Debug)]
pub enum CbxError {
    /// Source file does not carry a comic archive extension.
    ///
    /// Non-fatal: callers treat it as an empty result.
    #[error("not a comic archive: {0}")]
    InvalidSourceType(String),

    /// Extension does not map to any archive kind
    #[error("unsupported archive format: {0}")]
    UnsupportedFormat(String),

    /// File content does not match the archive kind its extension claims
    #[error("unreadable archive {path}: {reason}")]
    UnreadableArchive { path: PathBuf, reason: String },

    /// Corrupt entry or failure while unpacking
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// Requested entry is not present in the archive
    #[error("entry not found in archive: {0}")]
    EntryNotFound(String),

    /// Copy, rename, mkdir or delete of staging state failed
    #[error("staging failed for {path}: {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Archive or document contains no page images
    #[error("no page images found")]
    NoImagesFound,

    /// Image decode/encode failure
    #[error("image processing failed: {0}")]
    Image(String),

    /// PDF rendering collaborator failure
    #[error("PDF rendering failed: {0}")]
    Pdf(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CbxError {
    /// Wrap an I/O error raised while touching staging state at `path`
    pub fn staging(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Staging {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn unreadable(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::UnreadableArchive {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Returns `true` when the caller should report an empty result rather
    /// than a failure.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::InvalidSourceType(_) | Self::NoImagesFound)
    }
}
