//! Archive format handling
//!
//! Supports RAR, ZIP and TAR comic book archives behind one reader trait.
//! PDF is classified here but rendered elsewhere (see [`crate::pdf`]).

use std::path::{Path, PathBuf};

use crate::utils::error::{CbxError, Result};

pub mod format;
pub mod magic;
mod rar;
mod tar;
mod zip;

pub use format::{classify, is_valid_comic_file, normalize_extension};
pub use magic::detect_archive_kind_from_bytes;
pub use self::rar::{RarBackend, RarReader};
pub use self::tar::TarReader;
pub use self::zip::ZipReader;

/// Represents an entry in an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Path of the entry inside the archive, as stored
    pub name: String,
    /// Uncompressed size in bytes
    pub size: u64,
    pub is_directory: bool,
}

/// Container format of a comic file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveKind {
    Rar,
    Zip,
    Tar,
    Pdf,
}

impl ArchiveKind {
    /// Detect archive kind from a file extension (without the dot)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "rar" | "cbr" => Some(Self::Rar),
            "zip" | "cbz" => Some(Self::Zip),
            "tar" | "cbt" => Some(Self::Tar),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    /// Extension the underlying reader expects
    pub fn canonical_extension(&self) -> &'static str {
        match self {
            Self::Rar => "rar",
            Self::Zip => "zip",
            Self::Tar => "tar",
            Self::Pdf => "pdf",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rar => "RAR",
            Self::Zip => "ZIP",
            Self::Tar => "TAR",
            Self::Pdf => "PDF",
        }
    }
}

impl std::fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read side of one archive kind.
///
/// Handles are not shared between threads; each workflow opens its own.
pub trait ArchiveReader {
    /// Entries in the archive's own directory order
    fn list_entries(&mut self) -> Result<Vec<ArchiveEntry>>;

    /// Extract every entry below `dest`, keeping relative paths.
    ///
    /// On error `dest` may hold a partial result; the caller owns cleanup.
    fn extract_all(&mut self, dest: &Path) -> Result<()>;

    /// Extract a single entry below `dest` and return where it was written
    fn extract_one(&mut self, name: &str, dest: &Path) -> Result<PathBuf>;

    /// Release file handles. Safe to call more than once.
    fn close(&mut self);

    fn kind(&self) -> ArchiveKind;
}

/// Constructs readers for the orchestrator
pub trait ArchiveOpener: Send + Sync {
    fn open(&self, path: &Path, kind: ArchiveKind) -> Result<Box<dyn ArchiveReader>>;
}

/// Opens the built-in reader for each kind
#[derive(Debug, Clone, Default)]
pub struct DefaultOpener {
    rar_backend: RarBackend,
}

impl DefaultOpener {
    pub fn new(rar_backend: RarBackend) -> Self {
        Self { rar_backend }
    }
}

impl ArchiveOpener for DefaultOpener {
    fn open(&self, path: &Path, kind: ArchiveKind) -> Result<Box<dyn ArchiveReader>> {
        open_archive(path, kind, &self.rar_backend)
    }
}

/// Open an archive of a known kind from a file path
pub fn open_archive(
    path: &Path,
    kind: ArchiveKind,
    rar_backend: &RarBackend,
) -> Result<Box<dyn ArchiveReader>> {
    tracing::debug!(path = %path.display(), %kind, "opening archive");

    match kind {
        ArchiveKind::Zip => Ok(Box::new(ZipReader::open(path)?)),
        ArchiveKind::Rar => Ok(Box::new(RarReader::open(path, rar_backend.clone())?)),
        ArchiveKind::Tar => Ok(Box::new(TarReader::open(path)?)),
        ArchiveKind::Pdf => Err(CbxError::UnsupportedFormat(
            "PDF documents are rendered, not unpacked".to_string(),
        )),
    }
}

fn closed_error() -> CbxError {
    CbxError::Extraction("archive is closed".to_string())
}
