//! Extension based format resolution

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::ArchiveKind;
use crate::utils::error::{CbxError, Result};

/// Extensions accepted as comic sources
pub const COMIC_EXTENSIONS: &[&str] = &["cbr", "cbz", "cbt", "rar", "zip", "tar", "pdf"];

/// Lower-cased extension of `path`, without the dot
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(str::to_ascii_lowercase)
}

/// Check if a file name carries a comic archive extension
pub fn is_valid_comic_file(name: &str) -> bool {
    extension_of(Path::new(name)).map_or(false, |ext| COMIC_EXTENSIONS.contains(&ext.as_str()))
}

/// Map a path to its archive kind by extension
pub fn classify(path: &Path) -> Result<ArchiveKind> {
    let ext = extension_of(path)
        .ok_or_else(|| CbxError::UnsupportedFormat(path.display().to_string()))?;
    ArchiveKind::from_extension(&ext).ok_or(CbxError::UnsupportedFormat(ext))
}

/// Rename a staged `.cbr`/`.cbz`/`.cbt` copy to `.rar`/`.zip`/`.tar`.
///
/// Returns the path the file lives at afterwards. Files already carrying the
/// canonical extension are left untouched.
pub fn normalize_extension(staged: &Path) -> Result<(PathBuf, ArchiveKind)> {
    let kind = classify(staged)?;
    let canonical = kind.canonical_extension();

    if extension_of(staged).as_deref() == Some(canonical) {
        return Ok((staged.to_path_buf(), kind));
    }

    let target = staged.with_extension(canonical);
    fs::rename(staged, &target).map_err(|e| CbxError::staging(staged, e))?;
    debug!(from = %staged.display(), to = %target.display(), "normalized archive extension");

    Ok((target, kind))
}
