//! Process-wide configuration
//!
//! Resolved once at startup from the environment and then handed to
//! [`ComicFileHandler`](crate::handler::ComicFileHandler). Nothing below the
//! handler reads environment variables on its own.

use once_cell::sync::OnceCell;
use std::env;
use std::path::PathBuf;

use crate::archive::RarBackend;
use crate::pages::{ImageFilter, PageOrder};

pub const ENV_MEDIA_ROOT: &str = "CBX_MEDIA_ROOT";
pub const ENV_MEDIA_URL: &str = "CBX_MEDIA_URL";
pub const ENV_UNRAR_PATH: &str = "CBX_UNRAR_PATH";
pub const ENV_NATURAL_SORT: &str = "CBX_NATURAL_SORT";
pub const ENV_IMAGE_EXTENSIONS: &str = "CBX_IMAGE_EXTENSIONS";
pub const ENV_PDFTOPPM: &str = "CBX_PDFTOPPM";
pub const ENV_PDFINFO: &str = "CBX_PDFINFO";

static GLOBAL: OnceCell<CbxConfig> = OnceCell::new();

/// Target quality and bounding box handed to the image optimizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizeSettings {
    pub quality: u8,
    pub max_dimension: u32,
}

/// Locations of the poppler tools used by the default PDF renderer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfTools {
    pub pdftoppm: PathBuf,
    pub pdfinfo: PathBuf,
}

impl Default for PdfTools {
    fn default() -> Self {
        Self {
            pdftoppm: PathBuf::from("pdftoppm"),
            pdfinfo: PathBuf::from("pdfinfo"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CbxConfig {
    /// Root holding `temp/` (pages, staged copies) and `images/` (covers)
    pub media_root: PathBuf,
    /// URL prefix prepended to media references; always ends with `/`
    pub media_url: String,
    pub rar_backend: RarBackend,
    pub page_order: PageOrder,
    pub image_filter: ImageFilter,
    pub pages: OptimizeSettings,
    pub covers: OptimizeSettings,
    pub pdf_tools: PdfTools,
}

impl Default for CbxConfig {
    fn default() -> Self {
        Self {
            media_root: PathBuf::from("media"),
            media_url: "/media/".to_string(),
            rar_backend: RarBackend::Library,
            page_order: PageOrder::Lexicographic,
            image_filter: ImageFilter::default(),
            pages: OptimizeSettings {
                quality: 75,
                max_dimension: 1920,
            },
            covers: OptimizeSettings {
                quality: 75,
                max_dimension: 540,
            },
            pdf_tools: PdfTools::default(),
        }
    }
}

impl CbxConfig {
    /// Build a configuration from `CBX_*` environment variables, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(root) = lookup(ENV_MEDIA_ROOT) {
            config.media_root = PathBuf::from(root);
        }
        if let Some(url) = lookup(ENV_MEDIA_URL) {
            config = config.with_media_url(url);
        }
        config.rar_backend = RarBackend::resolve(lookup(ENV_UNRAR_PATH));
        if let Some(flag) = lookup(ENV_NATURAL_SORT) {
            if matches!(flag.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on") {
                config.page_order = PageOrder::Natural;
            }
        }
        if let Some(list) = lookup(ENV_IMAGE_EXTENSIONS) {
            config.image_filter = ImageFilter::new(list.split(','));
        }
        if let Some(path) = lookup(ENV_PDFTOPPM) {
            config.pdf_tools.pdftoppm = PathBuf::from(path);
        }
        if let Some(path) = lookup(ENV_PDFINFO) {
            config.pdf_tools.pdfinfo = PathBuf::from(path);
        }

        config
    }

    pub fn with_media_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.media_root = root.into();
        self
    }

    pub fn with_media_url(mut self, url: impl Into<String>) -> Self {
        let mut url = url.into();
        if !url.ends_with('/') {
            url.push('/');
        }
        self.media_url = url;
        self
    }

    /// `<media_root>/temp`
    pub fn temp_dir(&self) -> PathBuf {
        self.media_root.join("temp")
    }

    /// `<media_root>/images`
    pub fn images_dir(&self) -> PathBuf {
        self.media_root.join("images")
    }
}

/// Configuration shared by the whole process, read from the environment on
/// first use.
pub fn global() -> &'static CbxConfig {
    GLOBAL.get_or_init(CbxConfig::from_env)
}

/// Install `config` as the process-wide configuration. Returns it back if one
/// was already resolved.
pub fn init_global(config: CbxConfig) -> std::result::Result<&'static CbxConfig, CbxConfig> {
    GLOBAL.set(config)?;
    Ok(global())
}
