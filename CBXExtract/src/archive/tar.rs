//! TAR/CBT reader
//!
//! Tar has no central directory, so every operation streams the file from
//! the start with a fresh handle.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{closed_error, magic, ArchiveEntry, ArchiveKind, ArchiveReader};
use crate::utils::error::{CbxError, Result};
use crate::utils::fs::join_entry;

pub struct TarReader {
    path: PathBuf,
    closed: bool,
}

impl TarReader {
    pub fn open(path: &Path) -> Result<Self> {
        magic::verify(path, ArchiveKind::Tar)?;
        Ok(Self {
            path: path.to_path_buf(),
            closed: false,
        })
    }

    fn archive(&self) -> Result<::tar::Archive<File>> {
        if self.closed {
            return Err(closed_error());
        }
        Ok(::tar::Archive::new(File::open(&self.path)?))
    }

    fn extraction_error(&self, err: impl std::fmt::Display) -> CbxError {
        CbxError::Extraction(format!("{}: {err}", self.path.display()))
    }
}

fn entry_name(entry: &::tar::Entry<'_, File>) -> std::io::Result<String> {
    Ok(entry.path()?.to_string_lossy().into_owned())
}

fn is_regular(entry_type: ::tar::EntryType) -> bool {
    entry_type.is_file() || entry_type.is_dir()
}

impl ArchiveReader for TarReader {
    fn list_entries(&mut self) -> Result<Vec<ArchiveEntry>> {
        let mut archive = self.archive()?;
        let mut entries = Vec::new();

        for entry in archive.entries().map_err(|e| self.extraction_error(e))? {
            let entry = entry.map_err(|e| self.extraction_error(e))?;
            let name = entry_name(&entry).map_err(|e| self.extraction_error(e))?;
            let header = entry.header();
            let entry_type = header.entry_type();

            // Same rule as extraction: links and devices are never pages
            if !is_regular(entry_type) {
                debug!(entry = %name, ?entry_type, "not listing non-regular tar entry");
                continue;
            }

            entries.push(ArchiveEntry {
                name,
                size: header.size().unwrap_or(0),
                is_directory: entry_type.is_dir(),
            });
        }

        Ok(entries)
    }

    fn extract_all(&mut self, dest: &Path) -> Result<()> {
        fs::create_dir_all(dest).map_err(|e| CbxError::staging(dest, e))?;
        let mut archive = self.archive()?;

        for entry in archive.entries().map_err(|e| self.extraction_error(e))? {
            let mut entry = entry.map_err(|e| self.extraction_error(e))?;
            let name = entry_name(&entry).map_err(|e| self.extraction_error(e))?;
            let entry_type = entry.header().entry_type();

            // Links could point anywhere; comics only need files and folders
            if !is_regular(entry_type) {
                warn!(entry = %name, ?entry_type, "skipping non-regular tar entry");
                continue;
            }

            let unpacked = entry
                .unpack_in(dest)
                .map_err(|e| self.extraction_error(format!("{name}: {e}")))?;
            if !unpacked {
                warn!(entry = %name, "skipping entry outside of extraction directory");
            }
        }

        Ok(())
    }

    fn extract_one(&mut self, name: &str, dest: &Path) -> Result<PathBuf> {
        let out_path = join_entry(dest, name).ok_or_else(|| {
            self.extraction_error(format!("{name}: entry path escapes the destination"))
        })?;
        let mut archive = self.archive()?;

        for entry in archive.entries().map_err(|e| self.extraction_error(e))? {
            let mut entry = entry.map_err(|e| self.extraction_error(e))?;
            if entry_name(&entry).map_err(|e| self.extraction_error(e))? != name {
                continue;
            }
            let entry_type = entry.header().entry_type();
            if !entry_type.is_file() {
                return Err(self.extraction_error(format!(
                    "{name}: not a regular file ({entry_type:?})"
                )));
            }

            fs::create_dir_all(dest).map_err(|e| CbxError::staging(dest, e))?;
            entry
                .unpack_in(dest)
                .map_err(|e| self.extraction_error(format!("{name}: {e}")))?;
            return Ok(out_path);
        }

        Err(CbxError::EntryNotFound(name.to_string()))
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn kind(&self) -> ArchiveKind {
        ArchiveKind::Tar
    }
}
