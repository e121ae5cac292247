//! Comic file workflows: full extraction, cover extraction, page counting
//!
//! Every workflow follows the same shape:
//!
//! 1. validate the source extension
//! 2. stage a private copy of the source (full extraction first checks for
//!    already-extracted pages and returns early on a hit)
//! 3. extract through the archive reader or the PDF renderer
//! 4. post-process (renumber, optimize)
//! 5. delete the staged copy, whatever happened before

use std::fs;
use std::io;
use std::ops::{Deref, DerefMut};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

use crate::archive::format::is_valid_comic_file;
use crate::archive::{classify, normalize_extension, ArchiveKind, ArchiveOpener, ArchiveReader, DefaultOpener};
use crate::config::{self, CbxConfig, OptimizeSettings};
use crate::image_processor::{ImageOptimizer, ResizingOptimizer};
use crate::pages::{
    count_pages, encode_reference, normalize_cover_name, renumber_directory, select_cover, PageList,
};
use crate::pdf::{PdfRenderer, PopplerRenderer};
use crate::utils::error::{CbxError, Result};
use crate::utils::fs::{dir_is_non_empty, make_permissive, remove_file_if_exists};

/// One input comic file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComicSource {
    pub path: PathBuf,
    pub file_name: String,
    pub stem: String,
    pub kind: ArchiveKind,
}

impl ComicSource {
    /// Validate `path` as a comic source. Unknown extensions are
    /// [`CbxError::InvalidSourceType`]; nothing on disk is touched.
    pub fn new(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| CbxError::InvalidSourceType(path.display().to_string()))?;

        if !is_valid_comic_file(&file_name) {
            return Err(CbxError::InvalidSourceType(file_name));
        }

        let kind = crate::archive::classify(path)
            .map_err(|_| CbxError::InvalidSourceType(file_name.clone()))?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            path: path.to_path_buf(),
            file_name,
            stem,
            kind,
        })
    }
}

/// Working copy of a source archive. `path` always points at wherever the
/// copy currently lives, including after an extension rename.
#[derive(Debug)]
struct Staged {
    path: PathBuf,
}

impl Staged {
    /// Copy `source` into `dir` under a name no other call can pick
    /// (`.<stem>-XXXXXX.<canonical ext>`).
    fn copy(source: &ComicSource, dir: &Path) -> Result<Self> {
        let prefix = format!(".{}-", source.stem);
        let suffix = format!(".{}", classify(&source.path)?.canonical_extension());

        let mut copy = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(&suffix)
            .tempfile_in(dir)
            .map_err(|e| CbxError::staging(dir, e))?;
        let mut input = fs::File::open(&source.path).map_err(|e| CbxError::staging(&source.path, e))?;
        io::copy(&mut input, copy.as_file_mut()).map_err(|e| CbxError::staging(&source.path, e))?;

        // From here on removal is explicit, so it can follow extension renames
        let (_, path) = copy.keep().map_err(|e| CbxError::staging(dir, e.error))?;
        let staged = Self { path };
        if let Err(e) = make_permissive(&staged.path) {
            let _ = staged.remove();
            return Err(CbxError::staging(&staged.path, e));
        }

        Ok(staged)
    }

    /// Give the copy the extension its reader expects
    fn normalize(&mut self) -> Result<ArchiveKind> {
        let (path, kind) = normalize_extension(&self.path)?;
        self.path = path;
        Ok(kind)
    }

    fn remove(&self) -> Result<()> {
        remove_file_if_exists(&self.path)
            .map(|_| ())
            .map_err(|e| CbxError::staging(&self.path, e))
    }
}

/// Delete the staged copy and merge its outcome with the workflow's. The
/// workflow error wins; a cleanup failure alone is still reported.
fn finish<T>(staged: &Staged, result: Result<T>) -> Result<T> {
    let cleanup = staged.remove();
    match (result, cleanup) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(cleanup_err)) => Err(cleanup_err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(cleanup_err)) => {
            warn!(staged = %staged.path.display(), error = %cleanup_err, "failed to remove staged copy");
            Err(err)
        }
    }
}

/// Reader that is closed when it goes out of scope
struct OpenReader(Box<dyn ArchiveReader>);

impl Deref for OpenReader {
    type Target = dyn ArchiveReader;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl DerefMut for OpenReader {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.as_mut()
    }
}

impl Drop for OpenReader {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Result of a full extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComicPages {
    /// `<media_url>temp/<identifier>/`, prefix for every page reference
    pub media_url: String,
    pub pages: PageList,
}

/// An extracted cover image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cover {
    pub path: PathBuf,
    /// `<media_url>images/<cover file name>`
    pub url: String,
}

/// Extraction engine. Holds configuration and collaborators only, so one
/// handler can serve many threads as long as identifiers differ.
pub struct ComicFileHandler {
    config: CbxConfig,
    opener: Box<dyn ArchiveOpener>,
    optimizer: Box<dyn ImageOptimizer>,
    pdf: Box<dyn PdfRenderer>,
}

impl ComicFileHandler {
    /// Handler with the built-in readers, optimizer and PDF renderer
    pub fn new(config: CbxConfig) -> Self {
        Self::builder(config).build()
    }

    /// Handler configured from the process-wide configuration
    pub fn from_env() -> Self {
        Self::new(config::global().clone())
    }

    pub fn builder(config: CbxConfig) -> ComicFileHandlerBuilder {
        ComicFileHandlerBuilder {
            config,
            opener: None,
            optimizer: None,
            pdf: None,
        }
    }

    pub fn config(&self) -> &CbxConfig {
        &self.config
    }

    /// Extract every page of `source` into `<root>/temp/<id>/` and return
    /// them renumbered in reading order.
    ///
    /// Pages already extracted for `id` are reused without opening the
    /// archive. After a failure the output directory may hold partial
    /// results; it is not removed.
    pub fn extract_comic(&self, source: &Path, id: &str) -> Result<ComicPages> {
        let source = ComicSource::new(source)?;
        check_identifier(id)?;

        let temp_root = self.config.temp_dir();
        let out_dir = temp_root.join(id);
        let media_url = format!("{}temp/{}/", self.config.media_url, encode_reference(id));

        if dir_is_non_empty(&out_dir).map_err(|e| CbxError::staging(&out_dir, e))? {
            let pages = renumber_directory(&out_dir, &self.config.image_filter, self.config.page_order)?;
            info!(id, pages = pages.len(), "reusing extracted pages");
            return Ok(ComicPages {
                media_url,
                pages: PageList::from(pages.as_slice()),
            });
        }

        fs::create_dir_all(&out_dir).map_err(|e| CbxError::staging(&out_dir, e))?;
        let mut staged = Staged::copy(&source, &temp_root)?;
        debug!(id, source = %source.path.display(), staged = %staged.path.display(), "staged comic");

        let result = self.unpack_all(&source, &mut staged, &out_dir);
        finish(&staged, result)?;

        let pages = renumber_directory(&out_dir, &self.config.image_filter, self.config.page_order)?;
        for page in &pages {
            self.optimize(&page.path, self.config.pages);
        }

        info!(id, kind = %source.kind, pages = pages.len(), "extracted comic");
        Ok(ComicPages {
            media_url,
            pages: PageList::from(pages.as_slice()),
        })
    }

    /// Extract the cover of `source` into `<root>/images/`.
    ///
    /// Returns `None` when the archive holds no page images. A cover left by
    /// an earlier run for the same file is replaced.
    pub fn extract_cover(&self, source: &Path) -> Result<Option<Cover>> {
        let source = ComicSource::new(source)?;

        let images = self.config.images_dir();
        fs::create_dir_all(&images).map_err(|e| CbxError::staging(&images, e))?;
        let mut staged = Staged::copy(&source, &images)?;

        let result = self.produce_cover(&source, &mut staged, &images);
        let Some(path) = finish(&staged, result)? else {
            info!(source = %source.path.display(), "no cover image found");
            return Ok(None);
        };

        let file_name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let url = format!("{}images/{}", self.config.media_url, encode_reference(&file_name));

        info!(source = %source.path.display(), cover = %path.display(), "extracted cover");
        Ok(Some(Cover { path, url }))
    }

    /// Count page images without extracting anything
    pub fn page_count(&self, source: &Path) -> Result<usize> {
        let source = ComicSource::new(source)?;

        let images = self.config.images_dir();
        fs::create_dir_all(&images).map_err(|e| CbxError::staging(&images, e))?;
        let mut staged = Staged::copy(&source, &images)?;

        let result = match source.kind {
            ArchiveKind::Pdf => match self.pdf.count_pages(&source.path) {
                Err(CbxError::NoImagesFound) => Ok(0),
                other => other,
            },
            _ => self.open_staged(&mut staged).and_then(|mut reader| {
                let entries = reader.list_entries()?;
                Ok(count_pages(&entries, &self.config.image_filter))
            }),
        };

        let count = finish(&staged, result)?;
        debug!(source = %source.path.display(), count, "counted pages");
        Ok(count)
    }

    fn open_staged(&self, staged: &mut Staged) -> Result<OpenReader> {
        let kind = staged.normalize()?;
        Ok(OpenReader(self.opener.open(&staged.path, kind)?))
    }

    fn unpack_all(&self, source: &ComicSource, staged: &mut Staged, out_dir: &Path) -> Result<()> {
        match source.kind {
            ArchiveKind::Pdf => match self.pdf.render_pages(&source.path, out_dir) {
                Err(CbxError::NoImagesFound) => Ok(()),
                other => other,
            },
            _ => self.open_staged(staged)?.extract_all(out_dir),
        }
    }

    fn produce_cover(
        &self,
        source: &ComicSource,
        staged: &mut Staged,
        images: &Path,
    ) -> Result<Option<PathBuf>> {
        let cover_path = match source.kind {
            ArchiveKind::Pdf => match self.pdf.render_first_page(&source.path, images) {
                Ok(name) => images.join(name),
                Err(CbxError::NoImagesFound) => return Ok(None),
                Err(err) => return Err(err),
            },
            _ => {
                let mut reader = self.open_staged(staged)?;
                let entries = reader.list_entries()?;
                let Some(first) =
                    select_cover(&entries, &self.config.image_filter, self.config.page_order)
                else {
                    return Ok(None);
                };

                let cover_path = images.join(normalize_cover_name(&first.name, &source.stem));
                if remove_file_if_exists(&cover_path).map_err(|e| CbxError::staging(&cover_path, e))? {
                    debug!(cover = %cover_path.display(), "removed previous cover");
                }

                // Unpack into a private directory so the entry's own path can
                // never collide with other files in the images folder
                let scratch = tempfile::Builder::new()
                    .prefix(".extract-")
                    .tempdir_in(images)
                    .map_err(|e| CbxError::staging(images, e))?;
                let moved = reader
                    .extract_one(&first.name, scratch.path())
                    .and_then(|written| {
                        ensure_regular_file(&written)?;
                        fs::rename(&written, &cover_path).map_err(|e| CbxError::staging(&written, e))
                    });
                let scratch_path = scratch.path().to_path_buf();
                if let Err(e) = scratch.close() {
                    warn!(dir = %scratch_path.display(), error = %e, "failed to remove scratch directory");
                }
                moved?;

                cover_path
            }
        };

        self.optimize(&cover_path, self.config.covers);
        Ok(Some(cover_path))
    }

    fn optimize(&self, path: &Path, settings: OptimizeSettings) {
        if let Err(e) = self
            .optimizer
            .optimize(path, settings.quality, settings.max_dimension)
        {
            warn!(path = %path.display(), error = %e, "image optimization failed, keeping original");
        }
    }
}

/// Covers are published as-is, so only plain files may become one
fn ensure_regular_file(path: &Path) -> Result<()> {
    let file_type = fs::symlink_metadata(path)
        .map_err(|e| CbxError::staging(path, e))?
        .file_type();
    if file_type.is_file() {
        Ok(())
    } else {
        Err(CbxError::Extraction(format!(
            "{}: extracted entry is not a regular file",
            path.display()
        )))
    }
}

/// Identifiers name a directory under `temp/` and must not leave it
fn check_identifier(id: &str) -> Result<()> {
    let mut components = Path::new(id).components();
    let single_component = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );

    if single_component && !id.contains(['/', '\\']) {
        Ok(())
    } else {
        Err(CbxError::staging(
            id,
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "identifier must be a single path component",
            ),
        ))
    }
}

/// Swaps collaborators in and out of a [`ComicFileHandler`]
pub struct ComicFileHandlerBuilder {
    config: CbxConfig,
    opener: Option<Box<dyn ArchiveOpener>>,
    optimizer: Option<Box<dyn ImageOptimizer>>,
    pdf: Option<Box<dyn PdfRenderer>>,
}

impl ComicFileHandlerBuilder {
    pub fn opener(mut self, opener: impl ArchiveOpener + 'static) -> Self {
        self.opener = Some(Box::new(opener));
        self
    }

    pub fn optimizer(mut self, optimizer: impl ImageOptimizer + 'static) -> Self {
        self.optimizer = Some(Box::new(optimizer));
        self
    }

    pub fn pdf_renderer(mut self, renderer: impl PdfRenderer + 'static) -> Self {
        self.pdf = Some(Box::new(renderer));
        self
    }

    pub fn build(self) -> ComicFileHandler {
        let opener = self
            .opener
            .unwrap_or_else(|| Box::new(DefaultOpener::new(self.config.rar_backend.clone())));
        let optimizer = self.optimizer.unwrap_or_else(|| Box::new(ResizingOptimizer));
        let pdf = self
            .pdf
            .unwrap_or_else(|| Box::new(PopplerRenderer::new(self.config.pdf_tools.clone())));

        ComicFileHandler {
            config: self.config,
            opener,
            optimizer,
            pdf,
        }
    }
}
