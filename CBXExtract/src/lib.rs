//! Comic book archive extraction engine
//!
//! Turns CBZ/ZIP, CBR/RAR, CBT/TAR and PDF comics into ordered, web-servable
//! page images under a media root:
//!
//! - [`ComicFileHandler::extract_comic`] unpacks every page into
//!   `<root>/temp/<id>/` as `000.jpg`, `001.png`, ...
//! - [`ComicFileHandler::extract_cover`] writes the first page to
//!   `<root>/images/<page>-<comic>.<ext>`
//! - [`ComicFileHandler::page_count`] counts page images without extracting

pub mod archive;
pub mod config;
pub mod handler;
pub mod image_processor;
pub mod pages;
pub mod pdf;
pub mod utils;

pub use archive::{ArchiveEntry, ArchiveKind, ArchiveOpener, ArchiveReader, DefaultOpener};
pub use config::{CbxConfig, OptimizeSettings};
pub use handler::{ComicFileHandler, ComicFileHandlerBuilder, ComicPages, ComicSource, Cover};
pub use pages::{ImageFilter, PageList, PageOrder};
pub use utils::error::{CbxError, Result};
