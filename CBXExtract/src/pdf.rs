//! PDF rendering collaborator
//!
//! PDF comics bypass the archive readers entirely. The default renderer
//! drives poppler's `pdftoppm` and `pdfinfo`.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::debug;

use crate::config::PdfTools;
use crate::utils::error::{CbxError, Result};

/// Resolution used when rasterizing pages
const RENDER_DPI: &str = "150";

pub trait PdfRenderer: Send + Sync {
    /// Render every page of `source` as an image into `dest`
    fn render_pages(&self, source: &Path, dest: &Path) -> Result<()>;

    /// Render page one into `dest` and return the file name written
    fn render_first_page(&self, source: &Path, dest: &Path) -> Result<String>;

    fn count_pages(&self, source: &Path) -> Result<usize>;
}

#[derive(Debug, Clone, Default)]
pub struct PopplerRenderer {
    tools: PdfTools,
}

impl PopplerRenderer {
    pub fn new(tools: PdfTools) -> Self {
        Self { tools }
    }

    fn run<I, S>(&self, program: &Path, args: I) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| CbxError::Pdf(format!("failed to run {}: {e}", program.display())))?;

        if !output.status.success() {
            return Err(CbxError::Pdf(format!(
                "{} exited with {}: {}",
                program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output)
    }
}

fn source_stem(source: &Path) -> String {
    source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "page".to_string())
}

impl PdfRenderer for PopplerRenderer {
    fn render_pages(&self, source: &Path, dest: &Path) -> Result<()> {
        // pdftoppm succeeds silently on an empty document
        if self.count_pages(source)? == 0 {
            return Err(CbxError::NoImagesFound);
        }
        fs::create_dir_all(dest).map_err(|e| CbxError::staging(dest, e))?;
        let prefix: PathBuf = dest.join("page");

        debug!(source = %source.display(), dest = %dest.display(), "rendering PDF pages");
        self.run(
            &self.tools.pdftoppm,
            [
                OsStr::new("-jpeg"),
                OsStr::new("-r"),
                OsStr::new(RENDER_DPI),
                source.as_os_str(),
                prefix.as_os_str(),
            ],
        )?;
        Ok(())
    }

    fn render_first_page(&self, source: &Path, dest: &Path) -> Result<String> {
        if self.count_pages(source)? == 0 {
            return Err(CbxError::NoImagesFound);
        }
        fs::create_dir_all(dest).map_err(|e| CbxError::staging(dest, e))?;

        let stem = source_stem(source);
        let prefix = dest.join(&stem);
        self.run(
            &self.tools.pdftoppm,
            [
                OsStr::new("-jpeg"),
                OsStr::new("-r"),
                OsStr::new(RENDER_DPI),
                OsStr::new("-f"),
                OsStr::new("1"),
                OsStr::new("-l"),
                OsStr::new("1"),
                OsStr::new("-singlefile"),
                source.as_os_str(),
                prefix.as_os_str(),
            ],
        )?;

        Ok(format!("{stem}.jpg"))
    }

    fn count_pages(&self, source: &Path) -> Result<usize> {
        let output = self.run(&self.tools.pdfinfo, [source.as_os_str()])?;
        parse_page_count(&String::from_utf8_lossy(&output.stdout))
            .ok_or_else(|| CbxError::Pdf(format!("no page count reported for {}", source.display())))
    }
}

/// Pull `Pages:` out of `pdfinfo` output
fn parse_page_count(info: &str) -> Option<usize> {
    info.lines()
        .filter_map(|line| line.strip_prefix("Pages:"))
        .find_map(|value| value.trim().parse().ok())
}
