//! Shared fixtures for the integration tests: archive builders, real page
//! images and recording collaborators.

#![allow(dead_code)]

use cbxextract::archive::{ArchiveKind, ArchiveOpener, ArchiveReader, DefaultOpener};
use cbxextract::image_processor::ImageOptimizer;
use cbxextract::pdf::PdfRenderer;
use cbxextract::{CbxConfig, CbxError, Result};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Encoded image of the given size, filled with one colour
pub fn image_bytes(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([180, 40, 40])));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).unwrap();
    out.into_inner()
}

pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
    image_bytes(width, height, ImageFormat::Jpeg)
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    image_bytes(width, height, ImageFormat::Png)
}

/// Write a stored (uncompressed) ZIP archive
pub fn write_zip(path: &Path, entries: &[(&str, Vec<u8>)]) {
    let file = fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);

    for (name, data) in entries {
        if name.ends_with('/') {
            zip.add_directory(*name, options).unwrap();
        } else {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
    }
    zip.finish().unwrap();
}

/// Write a GNU TAR archive
pub fn write_tar(path: &Path, entries: &[(&str, Vec<u8>)]) {
    let file = fs::File::create(path).unwrap();
    let mut ar = tar::Builder::new(file);
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        ar.append_data(&mut header, name, data.as_slice()).unwrap();
    }
    ar.into_inner().unwrap().flush().unwrap();
}

/// Write a TAR archive whose `link` entry is a symlink to `target`,
/// followed by regular `pages`
pub fn write_tar_with_symlink(path: &Path, link: &str, target: &str, pages: &[(&str, Vec<u8>)]) {
    let file = fs::File::create(path).unwrap();
    let mut ar = tar::Builder::new(file);

    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Symlink);
    header.set_size(0);
    header.set_mode(0o777);
    header.set_link_name(target).unwrap();
    header.set_cksum();
    ar.append_data(&mut header, link, std::io::empty()).unwrap();

    for (name, data) in pages {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        ar.append_data(&mut header, name, data.as_slice()).unwrap();
    }
    ar.into_inner().unwrap().flush().unwrap();
}

/// Configuration rooted in a test directory, served under `/media/`
pub fn test_config(media_root: &Path) -> CbxConfig {
    CbxConfig::default()
        .with_media_root(media_root)
        .with_media_url("/media/")
}

/// Every file below `dir`, relative and sorted
pub fn list_files(dir: &Path) -> Vec<String> {
    let mut files: Vec<String> = walkdir::WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(dir)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    files.sort();
    files
}

/// Names of the direct children of `dir`, hidden ones included, sorted.
/// A missing directory has none.
pub fn entry_names(dir: &Path) -> Vec<String> {
    let Ok(read) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = read
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Default opener that counts how many readers it constructs
#[derive(Clone, Default)]
pub struct CountingOpener {
    inner: DefaultOpener,
    opened: Arc<AtomicUsize>,
}

impl CountingOpener {
    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.opened)
    }
}

impl ArchiveOpener for CountingOpener {
    fn open(&self, path: &Path, kind: ArchiveKind) -> Result<Box<dyn ArchiveReader>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.inner.open(path, kind)
    }
}

/// Records every optimize call and leaves files alone
#[derive(Clone, Default)]
pub struct RecordingOptimizer {
    calls: Arc<Mutex<Vec<(PathBuf, u8, u32)>>>,
}

impl RecordingOptimizer {
    pub fn calls(&self) -> Arc<Mutex<Vec<(PathBuf, u8, u32)>>> {
        Arc::clone(&self.calls)
    }
}

impl ImageOptimizer for RecordingOptimizer {
    fn optimize(&self, path: &Path, quality: u8, max_dimension: u32) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((path.to_path_buf(), quality, max_dimension));
        Ok(())
    }
}

/// Optimizer that always fails
pub struct FailingOptimizer;

impl ImageOptimizer for FailingOptimizer {
    fn optimize(&self, _path: &Path, _quality: u8, _max_dimension: u32) -> Result<()> {
        Err(CbxError::Image("refusing to optimize".to_string()))
    }
}

/// PDF renderer that writes small JPEGs instead of calling poppler
pub struct FakePdfRenderer {
    pub pages: usize,
}

impl PdfRenderer for FakePdfRenderer {
    fn render_pages(&self, _source: &Path, dest: &Path) -> Result<()> {
        fs::create_dir_all(dest)?;
        for page in 1..=self.pages {
            fs::write(dest.join(format!("page-{page:02}.jpg")), jpeg(8, 12))?;
        }
        Ok(())
    }

    fn render_first_page(&self, source: &Path, dest: &Path) -> Result<String> {
        if self.pages == 0 {
            return Err(CbxError::NoImagesFound);
        }
        let stem = source.file_stem().unwrap().to_string_lossy();
        let name = format!("{stem}.jpg");
        fs::write(dest.join(&name), jpeg(8, 12))?;
        Ok(name)
    }

    fn count_pages(&self, _source: &Path) -> Result<usize> {
        Ok(self.pages)
    }
}
