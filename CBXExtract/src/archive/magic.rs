//! Magic byte checks
//!
//! Extensions decide which reader is used; the signature decides whether the
//! file is actually readable as that kind. A `.cbz` that is really a RAR is
//! reported as [`CbxError::UnreadableArchive`] instead of failing somewhere
//! inside the zip parser.
//!
//! # Magic Bytes
//! - ZIP: `50 4B 03 04`, `50 4B 05 06` (empty archive) or `50 4B 07 08`
//! - RAR: `52 61 72 21 1A 07` (`Rar!\x1A\x07`), followed by `00` (4.x) or `01 00` (5.x)
//! - PDF: `25 50 44 46 2D` (`%PDF-`)
//! - TAR: `ustar` at offset 257, or a pre-POSIX header whose checksum adds up

use std::fs::File;
use std::io::Read;
use std::path::Path;

use super::ArchiveKind;
use crate::utils::error::{CbxError, Result};

/// Size of one tar header block
const TAR_BLOCK: usize = 512;
const TAR_MAGIC_OFFSET: usize = 257;
const TAR_CHECKSUM: std::ops::Range<usize> = 148..156;

/// Detect archive kind from the leading bytes of a file
///
/// `data` should hold the first 512 bytes when available; shorter input can
/// still match the ZIP, RAR and PDF signatures.
pub fn detect_archive_kind_from_bytes(data: &[u8]) -> Option<ArchiveKind> {
    if data.len() >= 4 {
        let magic = &data[0..4];
        if magic == b"PK\x03\x04" || magic == b"PK\x05\x06" || magic == b"PK\x07\x08" {
            return Some(ArchiveKind::Zip);
        }
    }

    if data.starts_with(b"Rar!\x1A\x07\x00") || data.starts_with(b"Rar!\x1A\x07\x01\x00") {
        return Some(ArchiveKind::Rar);
    }

    if data.starts_with(b"%PDF-") {
        return Some(ArchiveKind::Pdf);
    }

    if data.len() >= TAR_BLOCK && is_tar_header(&data[..TAR_BLOCK]) {
        return Some(ArchiveKind::Tar);
    }

    None
}

fn is_tar_header(block: &[u8]) -> bool {
    if block[TAR_MAGIC_OFFSET..].starts_with(b"ustar") {
        return true;
    }
    if block.iter().all(|b| *b == 0) {
        return false;
    }

    // v7 archives carry no magic, only the header checksum
    let stored = std::str::from_utf8(&block[TAR_CHECKSUM])
        .ok()
        .map(|s| s.trim_matches(|c: char| c == '\0' || c == ' '))
        .and_then(|s| u32::from_str_radix(s, 8).ok());

    let computed: u32 = block
        .iter()
        .enumerate()
        .map(|(i, b)| if TAR_CHECKSUM.contains(&i) { u32::from(b' ') } else { u32::from(*b) })
        .sum();

    stored == Some(computed)
}

/// Check that the file at `path` really is a `claimed` archive.
pub fn verify(path: &Path, claimed: ArchiveKind) -> Result<()> {
    let mut head = Vec::with_capacity(TAR_BLOCK);
    File::open(path)?
        .take(TAR_BLOCK as u64)
        .read_to_end(&mut head)?;

    match detect_archive_kind_from_bytes(&head) {
        Some(found) if found == claimed => Ok(()),
        Some(found) => Err(CbxError::unreadable(
            path,
            format!("content is {found}, not {claimed}"),
        )),
        None if head.is_empty() => Err(CbxError::unreadable(path, "file is empty")),
        None => Err(CbxError::unreadable(
            path,
            format!("no {claimed} signature found"),
        )),
    }
}
