//! RAR/CBR reader
//!
//! Uses the bundled libunrar through the `unrar` crate, or an external
//! `unrar` executable when one is configured.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf, MAIN_SEPARATOR_STR};
use std::process::{Command, Output};
use tracing::{debug, warn};

use super::{closed_error, magic, ArchiveEntry, ArchiveKind, ArchiveReader};
use crate::utils::error::{CbxError, Result};
use crate::utils::fs::join_entry;

/// `unrar` exit code for "no files to extract"
const UNRAR_NO_FILES: i32 = 10;

/// How RAR archives are read, resolved once per process
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RarBackend {
    /// libunrar linked into the binary
    #[default]
    Library,
    /// External `unrar` command at the given path
    Tool(PathBuf),
}

impl RarBackend {
    /// An explicit tool path wins; otherwise use the bundled library.
    pub fn resolve(tool_override: Option<String>) -> Self {
        match tool_override {
            Some(path) if !path.trim().is_empty() => Self::Tool(PathBuf::from(path.trim())),
            _ => Self::Library,
        }
    }
}

pub struct RarReader {
    path: PathBuf,
    backend: RarBackend,
    closed: bool,
}

impl RarReader {
    pub fn open(path: &Path, backend: RarBackend) -> Result<Self> {
        magic::verify(path, ArchiveKind::Rar)?;

        if backend == RarBackend::Library {
            // Opening reads the main header, catching damaged archives early
            unrar::Archive::new(path)
                .open_for_listing()
                .map_err(|e| CbxError::unreadable(path, format!("failed to open RAR: {e}")))?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            backend,
            closed: false,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(closed_error())
        } else {
            Ok(())
        }
    }

    fn extraction_error(&self, err: impl std::fmt::Display) -> CbxError {
        CbxError::Extraction(format!("{}: {err}", self.path.display()))
    }

    fn library_list(&self) -> Result<Vec<ArchiveEntry>> {
        let archive = unrar::Archive::new(&self.path)
            .open_for_listing()
            .map_err(|e| CbxError::unreadable(&self.path, e.to_string()))?;

        let mut entries = Vec::new();
        for header in archive {
            let header = header.map_err(|e| self.extraction_error(e))?;
            entries.push(ArchiveEntry {
                name: header.filename.to_string_lossy().into_owned(),
                size: header.unpacked_size,
                is_directory: header.is_directory(),
            });
        }
        Ok(entries)
    }

    /// Walk the archive, extracting entries accepted by `wanted`. Returns the
    /// paths written.
    fn library_extract(&self, dest: &Path, wanted: impl Fn(&str) -> bool) -> Result<Vec<PathBuf>> {
        let mut archive = unrar::Archive::new(&self.path)
            .open_for_processing()
            .map_err(|e| CbxError::unreadable(&self.path, e.to_string()))?;

        let mut written = Vec::new();
        while let Some(header) = archive.read_header().map_err(|e| self.extraction_error(e))? {
            let name = header.entry().filename.to_string_lossy().into_owned();

            if !header.entry().is_file() || !wanted(&name) {
                archive = header.skip().map_err(|e| self.extraction_error(e))?;
                continue;
            }

            let Some(out_path) = join_entry(dest, &name) else {
                warn!(entry = %name, "skipping entry outside of extraction directory");
                archive = header.skip().map_err(|e| self.extraction_error(e))?;
                continue;
            };

            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent).map_err(|e| CbxError::staging(parent, e))?;
            }
            archive = header
                .extract_to(&out_path)
                .map_err(|e| self.extraction_error(format!("{name}: {e}")))?;
            written.push(out_path);
        }

        Ok(written)
    }

    fn run_tool(&self, tool: &Path, args: &[OsString]) -> Result<Output> {
        debug!(tool = %tool.display(), ?args, "running unrar");
        Command::new(tool)
            .args(args)
            .output()
            .map_err(|e| self.extraction_error(format!("failed to run {}: {e}", tool.display())))
    }

    fn tool_list(&self, tool: &Path) -> Result<Vec<ArchiveEntry>> {
        let args: Vec<OsString> = vec!["lb".into(), "-p-".into(), "--".into(), self.path.clone().into()];
        let output = self.run_tool(tool, &args)?;
        if !output.status.success() {
            return Err(CbxError::unreadable(
                &self.path,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Ok(parse_bare_listing(&String::from_utf8_lossy(&output.stdout)))
    }

    fn tool_extract(&self, tool: &Path, entry: Option<&str>, dest: &Path) -> Result<Output> {
        fs::create_dir_all(dest).map_err(|e| CbxError::staging(dest, e))?;

        // Trailing separator tells unrar the destination is a directory
        let mut dest_arg = dest.as_os_str().to_os_string();
        dest_arg.push(MAIN_SEPARATOR_STR);

        let mut args: Vec<OsString> = vec![
            "x".into(),
            "-o+".into(),
            "-p-".into(),
            "-y".into(),
            "--".into(),
            self.path.clone().into(),
        ];
        if let Some(entry) = entry {
            args.push(entry.into());
        }
        args.push(dest_arg);

        self.run_tool(tool, &args)
    }
}

/// Parse `unrar lb` output: one entry name per line
fn parse_bare_listing(stdout: &str) -> Vec<ArchiveEntry> {
    stdout
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(|line| ArchiveEntry {
            name: line.to_string(),
            size: 0,
            is_directory: line.ends_with('/') || line.ends_with('\\'),
        })
        .collect()
}

impl ArchiveReader for RarReader {
    fn list_entries(&mut self) -> Result<Vec<ArchiveEntry>> {
        self.ensure_open()?;
        match &self.backend {
            RarBackend::Library => self.library_list(),
            RarBackend::Tool(tool) => self.tool_list(tool),
        }
    }

    fn extract_all(&mut self, dest: &Path) -> Result<()> {
        self.ensure_open()?;
        match &self.backend {
            RarBackend::Library => {
                fs::create_dir_all(dest).map_err(|e| CbxError::staging(dest, e))?;
                self.library_extract(dest, |_| true)?;
            }
            RarBackend::Tool(tool) => {
                let output = self.tool_extract(tool, None, dest)?;
                if !output.status.success() {
                    return Err(self.extraction_error(String::from_utf8_lossy(&output.stderr).trim()));
                }
            }
        }
        Ok(())
    }

    fn extract_one(&mut self, name: &str, dest: &Path) -> Result<PathBuf> {
        self.ensure_open()?;
        match &self.backend {
            RarBackend::Library => self
                .library_extract(dest, |entry| entry == name)?
                .into_iter()
                .next()
                .ok_or_else(|| CbxError::EntryNotFound(name.to_string())),
            RarBackend::Tool(tool) => {
                let out_path = join_entry(dest, name).ok_or_else(|| {
                    self.extraction_error(format!("{name}: entry path escapes the destination"))
                })?;

                // unrar reads the name as a wildcard mask, so it may write
                // several entries. Keep only the one asked for.
                fs::create_dir_all(dest).map_err(|e| CbxError::staging(dest, e))?;
                let scratch = tempfile::Builder::new()
                    .prefix(".unrar-")
                    .tempdir_in(dest)
                    .map_err(|e| CbxError::staging(dest, e))?;
                let output = self.tool_extract(tool, Some(name), scratch.path())?;
                let written = join_entry(scratch.path(), name).filter(|p| p.is_file());
                let written = match written {
                    Some(written) if output.status.success() => written,
                    _ if output.status.code() == Some(UNRAR_NO_FILES) || output.status.success() => {
                        return Err(CbxError::EntryNotFound(name.to_string()));
                    }
                    _ => {
                        return Err(self.extraction_error(String::from_utf8_lossy(&output.stderr).trim()));
                    }
                };

                if let Some(parent) = out_path.parent() {
                    fs::create_dir_all(parent).map_err(|e| CbxError::staging(parent, e))?;
                }
                fs::rename(&written, &out_path).map_err(|e| CbxError::staging(&written, e))?;
                if let Err(e) = scratch.close() {
                    warn!(archive = %self.path.display(), error = %e, "failed to remove unrar scratch directory");
                }
                Ok(out_path)
            }
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn kind(&self) -> ArchiveKind {
        ArchiveKind::Rar
    }
}
