//! ZIP/CBZ reader

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;
use ::zip::result::ZipError;

use super::{closed_error, magic, ArchiveEntry, ArchiveKind, ArchiveReader};
use crate::utils::error::{CbxError, Result};
use crate::utils::fs::join_entry;

/// ZIP archive handle; the central directory is parsed once on open
pub struct ZipReader {
    path: PathBuf,
    archive: Option<::zip::ZipArchive<File>>,
}

impl ZipReader {
    pub fn open(path: &Path) -> Result<Self> {
        magic::verify(path, ArchiveKind::Zip)?;

        let file = File::open(path)?;
        let archive = ::zip::ZipArchive::new(file)
            .map_err(|e| CbxError::unreadable(path, format!("failed to open ZIP: {e}")))?;

        Ok(Self {
            path: path.to_path_buf(),
            archive: Some(archive),
        })
    }

    fn archive(&mut self) -> Result<&mut ::zip::ZipArchive<File>> {
        self.archive.as_mut().ok_or_else(closed_error)
    }
}

fn extraction_error(path: &Path, entry: &str, err: impl std::fmt::Display) -> CbxError {
    CbxError::Extraction(format!("{}: {entry}: {err}", path.display()))
}

impl ArchiveReader for ZipReader {
    fn list_entries(&mut self) -> Result<Vec<ArchiveEntry>> {
        let path = self.path.clone();
        let archive = self.archive()?;

        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            // Raw access so encrypted entries can still be listed
            let file = archive
                .by_index_raw(i)
                .map_err(|e| extraction_error(&path, &format!("entry {i}"), e))?;
            entries.push(ArchiveEntry {
                name: file.name().to_string(),
                size: file.size(),
                is_directory: file.is_dir(),
            });
        }

        Ok(entries)
    }

    fn extract_all(&mut self, dest: &Path) -> Result<()> {
        fs::create_dir_all(dest).map_err(|e| CbxError::staging(dest, e))?;

        let path = self.path.clone();
        let archive = self.archive()?;
        for i in 0..archive.len() {
            let mut file = archive
                .by_index(i)
                .map_err(|e| extraction_error(&path, &format!("entry {i}"), e))?;
            let name = file.name().to_string();

            let Some(out_path) = join_entry(dest, &name) else {
                warn!(entry = %name, "skipping entry outside of extraction directory");
                continue;
            };

            if file.is_dir() {
                fs::create_dir_all(&out_path).map_err(|e| CbxError::staging(&out_path, e))?;
                continue;
            }

            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent).map_err(|e| CbxError::staging(parent, e))?;
            }
            let mut out_file = File::create(&out_path).map_err(|e| CbxError::staging(&out_path, e))?;
            io::copy(&mut file, &mut out_file).map_err(|e| extraction_error(&path, &name, e))?;
        }

        Ok(())
    }

    fn extract_one(&mut self, name: &str, dest: &Path) -> Result<PathBuf> {
        let path = self.path.clone();
        let out_path = join_entry(dest, name)
            .ok_or_else(|| extraction_error(&path, name, "entry path escapes the destination"))?;

        let archive = self.archive()?;
        let mut file = archive.by_name(name).map_err(|e| match e {
            ZipError::FileNotFound => CbxError::EntryNotFound(name.to_string()),
            e => extraction_error(&path, name, e),
        })?;

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|e| CbxError::staging(parent, e))?;
        }
        let mut out_file = File::create(&out_path).map_err(|e| CbxError::staging(&out_path, e))?;
        io::copy(&mut file, &mut out_file).map_err(|e| extraction_error(&path, name, e))?;

        Ok(out_path)
    }

    fn close(&mut self) {
        self.archive = None;
    }

    fn kind(&self) -> ArchiveKind {
        ArchiveKind::Zip
    }
}
