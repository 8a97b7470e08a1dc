//! Signature sniffing helpers for format detection.
//!
//! Backends decide whether they can open a path by looking at the first few
//! bytes of a file, or at the layout of a directory for multi-file formats.
//! This module provides the shared pieces:
//!
//! - **Signatures**: [`read_signature`] reads a file prefix, [`sniff`]
//!   classifies it (TIFF/BigTIFF, CZI, PNG, JPEG, BMP)
//! - **Directories**: [`resolve_root`] picks the file a backend should open
//!   for a directory, using [`find_root_file`] for multi-file layouts
//!
//! Nothing here decodes pixels; every check reads at most a few kilobytes.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Bytes read from the start of a file for detection.
pub const SIGNATURE_BYTES: usize = 64;

/// Minimum bytes of a classic TIFF header.
pub const TIFF_HEADER_SIZE: usize = 8;

/// Magic word opening every CZI segment.
pub const CZI_MAGIC: &[u8] = b"ZISRAWFILE";

// =============================================================================
// Signature
// =============================================================================

/// File type recognized from leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature {
    Tiff,
    BigTiff,
    Czi,
    Png,
    Jpeg,
    Bmp,
    Directory,
    Unknown,
}

impl Signature {
    /// Get a human-readable name for the signature.
    pub const fn name(&self) -> &'static str {
        match self {
            Signature::Tiff => "TIFF",
            Signature::BigTiff => "BigTIFF",
            Signature::Czi => "Zeiss CZI",
            Signature::Png => "PNG",
            Signature::Jpeg => "JPEG",
            Signature::Bmp => "BMP",
            Signature::Directory => "directory",
            Signature::Unknown => "unknown",
        }
    }

    /// Classify a file prefix.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        if is_tiff_header(bytes) {
            if bytes[2] == 0x2B || bytes[3] == 0x2B {
                Signature::BigTiff
            } else {
                Signature::Tiff
            }
        } else if bytes.starts_with(CZI_MAGIC) {
            Signature::Czi
        } else if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            Signature::Png
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Signature::Jpeg
        } else if bytes.starts_with(b"BM") && bytes.len() >= 14 {
            Signature::Bmp
        } else {
            Signature::Unknown
        }
    }
}

/// Read up to `len` leading bytes of a regular file.
///
/// Returns `None` for directories and unreadable paths.
pub fn read_signature(path: &Path, len: usize) -> Option<Vec<u8>> {
    if !path.is_file() {
        return None;
    }
    let file = File::open(path).ok()?;
    let mut buf = Vec::with_capacity(len);
    file.take(len as u64).read_to_end(&mut buf).ok()?;
    Some(buf)
}

/// Classify the file or directory at `path`.
pub fn sniff(path: &Path) -> Signature {
    if path.is_dir() {
        return Signature::Directory;
    }
    read_signature(path, SIGNATURE_BYTES)
        .map(|bytes| Signature::from_bytes(&bytes))
        .unwrap_or(Signature::Unknown)
}

/// Check if bytes represent a valid TIFF or BigTIFF header.
///
/// This is a quick check that can be used before attempting full parsing.
pub fn is_tiff_header(bytes: &[u8]) -> bool {
    if bytes.len() < TIFF_HEADER_SIZE {
        return false;
    }

    let version = match (bytes[0], bytes[1]) {
        (0x49, 0x49) => u16::from_le_bytes([bytes[2], bytes[3]]),
        (0x4D, 0x4D) => u16::from_be_bytes([bytes[2], bytes[3]]),
        _ => return false,
    };
    version == 42 || version == 43
}

// =============================================================================
// Multi-file layouts
// =============================================================================

/// Directory layouts recognized by [`resolve_root`]: the root file's
/// extension and the companion file stored under the root's stem.
pub const MULTI_FILE_LAYOUTS: [(&str, &str); 1] = [("mrxs", "Slidedat.ini")];

/// Find the index file of a directory-based slide.
///
/// `dir` qualifies when it holds exactly one file with extension `extension`
/// (case-insensitive) and a sibling directory named after that file's stem
/// containing `companion`. For example a MIRAX slide directory holds
/// `slide.mrxs` and `slide/Slidedat.ini`.
pub fn find_root_file(dir: &Path, extension: &str, companion: &str) -> Option<PathBuf> {
    if !dir.is_dir() {
        return None;
    }

    let mut candidates = fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
        });

    let root = candidates.next()?;
    if candidates.next().is_some() {
        return None;
    }

    let stem = root.file_stem()?;
    dir.join(stem).join(companion).is_file().then_some(root)
}

/// Resolve a directory to the file a backend should open.
///
/// A known multi-file layout wins. Otherwise the directory must hold exactly
/// one file with a recognized signature. Returns `None` for anything else,
/// regular files included.
pub fn resolve_root(dir: &Path) -> Option<PathBuf> {
    if !dir.is_dir() {
        return None;
    }

    if let Some(root) = MULTI_FILE_LAYOUTS
        .iter()
        .find_map(|(extension, companion)| find_root_file(dir, extension, companion))
    {
        return Some(root);
    }

    let mut images = fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && sniff(path) != Signature::Unknown);

    let root = images.next()?;
    images.next().is_none().then_some(root)
}

// =============================================================================
// Tests
// =============================================================================
