//! Page detection, ordering and renumbering
//!
//! Decides which archive entries are pages, picks the cover and turns an
//! extraction directory into a flat `000.jpg, 001.jpg, ...` sequence.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::archive::ArchiveEntry;
use crate::utils::error::{CbxError, Result};

/// Extensions treated as pages unless configured otherwise
pub const DEFAULT_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp"];

/// Minimum width of the numeric page names
const PAGE_NUMBER_WIDTH: usize = 3;

/// Characters left untouched in page references (`quote()` compatible)
const PAGE_REFERENCE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b'/');

/// Image extension allow-list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFilter {
    extensions: Vec<String>,
}

impl Default for ImageFilter {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_EXTENSIONS.iter().copied())
    }
}

impl ImageFilter {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        Self { extensions }
    }

    /// Check if an archive entry (or file) name is a page image.
    ///
    /// Directory markers and macOS resource forks never count, whatever their
    /// extension.
    pub fn is_page_image(&self, name: &str) -> bool {
        if name.ends_with('/') || name.ends_with('\\') {
            return false;
        }

        let normalized = name.replace('\\', "/");
        if normalized.split('/').any(|part| part == "__MACOSX") {
            return false;
        }

        let path = Path::new(&normalized);
        let is_resource_fork = path
            .file_name()
            .and_then(|s| s.to_str())
            .map_or(true, |file_name| file_name.starts_with("._"));
        if is_resource_fork {
            return false;
        }

        path.extension()
            .and_then(|s| s.to_str())
            .map_or(false, |ext| {
                let ext = ext.to_ascii_lowercase();
                self.extensions.iter().any(|allowed| *allowed == ext)
            })
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }
}

/// How page names are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageOrder {
    /// Byte-wise ascending; archives are expected to use sortable prefixes
    #[default]
    Lexicographic,
    /// Digit runs compared numerically (`page2` before `page10`)
    Natural,
}

impl PageOrder {
    pub fn compare(self, a: &str, b: &str) -> Ordering {
        match self {
            Self::Lexicographic => a.as_bytes().cmp(b.as_bytes()),
            Self::Natural => natord::compare(a, b),
        }
    }
}

/// Pick the cover: the first page image under `order`.
pub fn select_cover(
    entries: &[ArchiveEntry],
    filter: &ImageFilter,
    order: PageOrder,
) -> Option<ArchiveEntry> {
    entries
        .iter()
        .filter(|entry| !entry.is_directory && filter.is_page_image(&entry.name))
        .min_by(|a, b| order.compare(&a.name, &b.name))
        .cloned()
}

/// Number of entries that are page images
pub fn count_pages(entries: &[ArchiveEntry], filter: &ImageFilter) -> usize {
    entries
        .iter()
        .filter(|entry| !entry.is_directory && filter.is_page_image(&entry.name))
        .count()
}

/// Build the cover file name `<entryStem>-<sourceStem><entryExt>` from the
/// final component of an archive entry name.
pub fn normalize_cover_name(original: &str, source_stem: &str) -> String {
    let file_name = original
        .split(|c: char| c == '/' || c == '\\')
        .filter(|part| !part.is_empty())
        .last()
        .unwrap_or_default();

    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    format!("{stem}-{source_stem}{ext}")
}

/// URL-encode an output file name for use as a page reference
pub fn encode_reference(file_name: &str) -> String {
    utf8_percent_encode(file_name, PAGE_REFERENCE).to_string()
}

/// A page after renumbering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenumberedPage {
    /// Final location on disk
    pub path: PathBuf,
    /// Sequence file name, e.g. `004.png`
    pub file_name: String,
}

impl RenumberedPage {
    pub fn reference(&self) -> String {
        encode_reference(&self.file_name)
    }
}

/// Ordered, URL-encoded page references for one comic
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageList {
    pages: Vec<String>,
}

impl PageList {
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.pages
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.pages.iter()
    }
}

impl From<&[RenumberedPage]> for PageList {
    fn from(pages: &[RenumberedPage]) -> Self {
        Self {
            pages: pages.iter().map(RenumberedPage::reference).collect(),
        }
    }
}

impl<'a> IntoIterator for &'a PageList {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.pages.iter()
    }
}

/// Flatten and renumber every page image below `dir`.
///
/// Pages are collected from `dir` and all subdirectories, sorted by file name
/// (relative path breaks ties) and moved to `dir/NNN.<ext>`. The list is
/// frozen before anything moves. Files not already at their target go through
/// a scratch name first so a target can never overwrite a page that has not
/// been moved yet.
///
/// Past 999 pages the names grow to four digits and stop sorting as strings
/// against the three-digit ones; the returned order stays correct.
pub fn renumber_directory(
    dir: &Path,
    filter: &ImageFilter,
    order: PageOrder,
) -> Result<Vec<RenumberedPage>> {
    let mut found: Vec<(String, PathBuf)> = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).follow_links(false) {
        let entry = entry.map_err(|e| CbxError::staging(dir, e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        if filter.is_page_image(&relative.to_string_lossy()) {
            found.push((name, entry.into_path()));
        }
    }

    found.sort_by(|a, b| order.compare(&a.0, &b.0).then_with(|| a.1.cmp(&b.1)));

    let plan: Vec<(PathBuf, RenumberedPage)> = found
        .into_iter()
        .enumerate()
        .map(|(index, (name, source))| {
            let ext = Path::new(&name)
                .extension()
                .map(|e| e.to_string_lossy().to_ascii_lowercase())
                .unwrap_or_default();
            let file_name = format!("{index:0width$}.{ext}", width = PAGE_NUMBER_WIDTH);
            let page = RenumberedPage {
                path: dir.join(&file_name),
                file_name,
            };
            (source, page)
        })
        .collect();

    // Phase one: park everything that moves
    let mut parked = Vec::new();
    for (index, (source, page)) in plan.iter().enumerate() {
        if *source == page.path {
            continue;
        }
        let scratch = dir.join(format!(".cbx-renumber-{index}"));
        fs::rename(source, &scratch).map_err(|e| CbxError::staging(source, e))?;
        parked.push((scratch, &page.path));
    }

    // Phase two: parked files to their final names
    for (scratch, target) in &parked {
        fs::rename(scratch, target).map_err(|e| CbxError::staging(target, e))?;
    }

    debug!(
        dir = %dir.display(),
        pages = plan.len(),
        moved = parked.len(),
        "renumbered pages"
    );

    Ok(plan.into_iter().map(|(_, page)| page).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(name: &str) -> ArchiveEntry {
        ArchiveEntry {
            name: name.to_string(),
            size: 0,
            is_directory: name.ends_with('/'),
        }
    }

    #[test]
    fn test_is_page_image() {
        let filter = ImageFilter::default();

        assert!(filter.is_page_image("test.jpg"));
        assert!(filter.is_page_image("TEST.PNG"));
        assert!(filter.is_page_image("image.webp"));
        assert!(filter.is_page_image("photo.JPEG"));
        assert!(filter.is_page_image("graphic.bmp"));
        assert!(filter.is_page_image("chapter1/page.gif"));

        assert!(!filter.is_page_image("readme.txt"));
        assert!(!filter.is_page_image("ComicInfo.xml"));
        assert!(!filter.is_page_image("scan.tiff"));
        assert!(!filter.is_page_image("noextension"));
        assert!(!filter.is_page_image("images.jpg/"));
        assert!(!filter.is_page_image("__MACOSX/001.jpg"));
        assert!(!filter.is_page_image("chapter1/._001.jpg"));
    }

    #[test]
    fn test_custom_filter() {
        let filter = ImageFilter::new([".JPG", " png ", ""]);
        assert_eq!(filter.extensions(), &["jpg".to_string(), "png".to_string()]);
        assert!(filter.is_page_image("a.jpg"));
        assert!(!filter.is_page_image("a.webp"));
    }

    #[test]
    fn test_page_order() {
        assert_eq!(
            PageOrder::Lexicographic.compare("page10.jpg", "page2.jpg"),
            Ordering::Less
        );
        assert_eq!(
            PageOrder::Natural.compare("page10.jpg", "page2.jpg"),
            Ordering::Greater
        );
        assert_eq!(PageOrder::Lexicographic.compare("B.jpg", "a.jpg"), Ordering::Less);
    }

    #[test]
    fn test_select_cover_is_lexicographic() {
        let entries = vec![entry("page10.jpg"), entry("page02.jpg"), entry("notes.txt")];
        let cover = select_cover(&entries, &ImageFilter::default(), PageOrder::Lexicographic);
        assert_eq!(cover.unwrap().name, "page02.jpg");

        let entries = vec![entry("page10.jpg"), entry("page2.jpg")];
        let cover = select_cover(&entries, &ImageFilter::default(), PageOrder::Lexicographic);
        assert_eq!(cover.unwrap().name, "page10.jpg");

        let cover = select_cover(&entries, &ImageFilter::default(), PageOrder::Natural);
        assert_eq!(cover.unwrap().name, "page2.jpg");
    }

    #[test]
    fn test_select_cover_skips_directories_and_junk() {
        let entries = vec![
            entry("000/"),
            entry("__MACOSX/._000.jpg"),
            entry("scans/010.jpg"),
            entry("scans/002.png"),
        ];
        let cover = select_cover(&entries, &ImageFilter::default(), PageOrder::Lexicographic);
        assert_eq!(cover.unwrap().name, "scans/002.png");
    }

    #[test]
    fn test_select_cover_no_images() {
        let entries = vec![entry("readme.txt"), entry("license.md")];
        assert!(select_cover(&entries, &ImageFilter::default(), PageOrder::Lexicographic).is_none());
        assert!(select_cover(&[], &ImageFilter::default(), PageOrder::Lexicographic).is_none());
    }

    #[test]
    fn test_count_pages() {
        let entries = vec![entry("a/"), entry("a/1.jpg"), entry("2.png"), entry("info.txt")];
        assert_eq!(count_pages(&entries, &ImageFilter::default()), 2);
        assert_eq!(count_pages(&[entry("info.txt")], &ImageFilter::default()), 0);
    }

    #[test]
    fn test_normalize_cover_name() {
        assert_eq!(normalize_cover_name("001.jpg", "Saga 01"), "001-Saga 01.jpg");
        assert_eq!(
            normalize_cover_name("Saga//scans\\\\cover.PNG", "saga"),
            "cover-saga.PNG"
        );
        assert_eq!(normalize_cover_name("../../etc/page.gif", "x"), "page-x.gif");
        assert_eq!(normalize_cover_name("dir/noext", "x"), "noext-x");
    }

    #[test]
    fn test_encode_reference() {
        assert_eq!(encode_reference("000.jpg"), "000.jpg");
        assert_eq!(encode_reference("a b#.png"), "a%20b%23.png");
        assert_eq!(encode_reference("dir/~x_y-z.gif"), "dir/~x_y-z.gif");
    }

    #[test]
    fn test_renumber_orders_lexicographically() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("b.jpg"), b"b").unwrap();
        fs::write(temp.path().join("a.png"), b"a").unwrap();
        fs::write(temp.path().join("c.gif"), b"c").unwrap();
        fs::write(temp.path().join("notes.txt"), b"n").unwrap();

        let pages =
            renumber_directory(temp.path(), &ImageFilter::default(), PageOrder::Lexicographic)
                .unwrap();
        let names: Vec<&str> = pages.iter().map(|p| p.file_name.as_str()).collect();
        assert_eq!(names, ["000.png", "001.jpg", "002.gif"]);

        assert_eq!(fs::read(temp.path().join("000.png")).unwrap(), b"a");
        assert_eq!(fs::read(temp.path().join("001.jpg")).unwrap(), b"b");
        assert_eq!(fs::read(temp.path().join("002.gif")).unwrap(), b"c");
        assert!(temp.path().join("notes.txt").exists());
    }

    #[test]
    fn test_renumber_flattens_subdirectories() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("issue/extras")).unwrap();
        fs::write(temp.path().join("issue/p2.jpg"), b"2").unwrap();
        fs::write(temp.path().join("issue/extras/p1.JPG"), b"1").unwrap();

        let pages =
            renumber_directory(temp.path(), &ImageFilter::default(), PageOrder::Lexicographic)
                .unwrap();
        let list = PageList::from(pages.as_slice());
        assert_eq!(list.as_slice(), ["000.jpg", "001.jpg"]);
        assert_eq!(fs::read(temp.path().join("000.jpg")).unwrap(), b"1");
        assert_eq!(fs::read(temp.path().join("001.jpg")).unwrap(), b"2");
    }

    #[test]
    fn test_renumber_ignores_resource_forks() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("__MACOSX")).unwrap();
        fs::write(temp.path().join("__MACOSX/a.jpg"), b"fork").unwrap();
        fs::write(temp.path().join("._b.jpg"), b"fork").unwrap();
        fs::write(temp.path().join("c.jpg"), b"page").unwrap();

        let pages =
            renumber_directory(temp.path(), &ImageFilter::default(), PageOrder::Lexicographic)
                .unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(fs::read(temp.path().join("000.jpg")).unwrap(), b"page");
        assert!(temp.path().join("__MACOSX/a.jpg").exists());
    }

    #[test]
    fn test_renumber_does_not_clobber_colliding_names() {
        let temp = TempDir::new().unwrap();
        // "0.jpg" sorts first and targets "000.jpg", which is still occupied
        fs::write(temp.path().join("0.jpg"), b"first").unwrap();
        fs::write(temp.path().join("000.jpg"), b"second").unwrap();

        let pages =
            renumber_directory(temp.path(), &ImageFilter::default(), PageOrder::Lexicographic)
                .unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(fs::read(temp.path().join("000.jpg")).unwrap(), b"first");
        assert_eq!(fs::read(temp.path().join("001.jpg")).unwrap(), b"second");
    }

    #[test]
    fn test_renumber_is_stable_on_numbered_directory() {
        let temp = TempDir::new().unwrap();
        for name in ["x.jpg", "y.png"] {
            fs::write(temp.path().join(name), name.as_bytes()).unwrap();
        }

        let first =
            renumber_directory(temp.path(), &ImageFilter::default(), PageOrder::Lexicographic)
                .unwrap();
        let second =
            renumber_directory(temp.path(), &ImageFilter::default(), PageOrder::Lexicographic)
                .unwrap();
        assert_eq!(first, second);
        assert_eq!(fs::read(temp.path().join("001.png")).unwrap(), b"y.png");
    }

    #[test]
    fn test_renumber_past_three_digits() {
        let temp = TempDir::new().unwrap();
        for i in 0..1001 {
            fs::write(temp.path().join(format!("p{i:05}.jpg")), b"").unwrap();
        }

        let pages =
            renumber_directory(temp.path(), &ImageFilter::default(), PageOrder::Lexicographic)
                .unwrap();
        assert_eq!(pages.len(), 1001);
        assert_eq!(pages[999].file_name, "999.jpg");
        assert_eq!(pages[1000].file_name, "1000.jpg");
    }

    #[test]
    fn test_renumber_empty_directory() {
        let temp = TempDir::new().unwrap();
        let pages =
            renumber_directory(temp.path(), &ImageFilter::default(), PageOrder::Lexicographic)
                .unwrap();
        assert!(pages.is_empty());
        assert!(PageList::from(pages.as_slice()).is_empty());
    }
}
