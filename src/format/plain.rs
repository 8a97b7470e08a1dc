//! Backend for conventional single-resolution images.
//!
//! PNG, JPEG, TIFF and BMP files are decoded whole with the `image` crate
//! when opened. The pyramid tiers the reader asks for are produced on demand
//! by repeated 2x2 box-filter halving and kept for the life of the handle.
//! The image is a single concrete channel whose samples are its colour
//! components; an alpha component is passed through flagged as alpha.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use image::{DynamicImage, ImageFormat, ImageReader};
use serde_json::json;
use tracing::debug;

use super::backend::{BackendHandle, DecoderBackend, NativeGeometry, RegionRequest};
use super::detect::{read_signature, SIGNATURE_BYTES};
use crate::error::{OpenError, ParseError, ReadError};
use crate::pyramid::DEFAULT_TILE_SIZE;
use crate::raster::{PixelType, Raster};

/// Deepest level a plain image serves.
const MAX_LEVEL: usize = 32;

/// Formats this backend accepts.
const SUPPORTED: [ImageFormat; 4] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Tiff,
    ImageFormat::Bmp,
];

// =============================================================================
// Backend
// =============================================================================

/// Decoder backend for PNG, JPEG, TIFF and BMP files.
#[derive(Debug, Clone)]
pub struct PlainImageBackend {
    tile_size: u32,
}

impl Default for PlainImageBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl PlainImageBackend {
    pub fn new() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
        }
    }

    /// Use a different tile size for the pyramid of opened images.
    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size.max(1);
        self
    }

    fn guess(path: &Path) -> Option<ImageFormat> {
        let bytes = read_signature(path, SIGNATURE_BYTES)?;
        image::guess_format(&bytes)
            .ok()
            .filter(|format| SUPPORTED.contains(format))
    }
}

impl DecoderBackend for PlainImageBackend {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn matches(&self, path: &Path) -> bool {
        Self::guess(path).is_some()
    }

    fn open(&self, path: &Path) -> Result<Box<dyn BackendHandle>, OpenError> {
        let format = Self::guess(path).ok_or_else(|| OpenError::UnsupportedFormat {
            path: path.display().to_string(),
        })?;

        let mut reader = ImageReader::open(path).map_err(|e| OpenError::Io(e.to_string()))?;
        reader.set_format(format);
        let img = reader.decode().map_err(|e| match e {
            image::ImageError::IoError(io) => OpenError::Io(io.to_string()),
            other => OpenError::Corrupt {
                path: path.display().to_string(),
                message: other.to_string(),
            },
        })?;

        let color_type = format!("{:?}", img.color());
        let base = raster_from_image(img).map_err(|e| OpenError::Corrupt {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        debug!(
            "Decoded {} as {:?} ({}x{}, {} bands)",
            path.display(),
            format,
            base.width(),
            base.height(),
            base.bands()
        );

        Ok(Box::new(PlainImageHandle {
            format,
            color_type,
            tile_size: self.tile_size,
            levels: Mutex::new(vec![Arc::new(base)]),
        }))
    }
}

// =============================================================================
// Handle
// =============================================================================

struct PlainImageHandle {
    format: ImageFormat,
    color_type: String,
    tile_size: u32,

    /// Level 0 is the decoded image; deeper levels are appended on demand
    levels: Mutex<Vec<Arc<Raster>>>,
}

impl PlainImageHandle {
    fn base(&self) -> Arc<Raster> {
        self.level(0)
    }

    fn level(&self, level: usize) -> Arc<Raster> {
        let mut levels = self.levels.lock().unwrap_or_else(PoisonError::into_inner);
        while levels.len() <= level {
            let next = match levels.last() {
                Some(last) => last.halve(),
                None => break,
            };
            levels.push(Arc::new(next));
        }
        levels[level.min(levels.len() - 1)].clone()
    }
}

impl BackendHandle for PlainImageHandle {
    fn native_geometry(&self) -> Result<NativeGeometry, ParseError> {
        let base = self.base();
        Ok(NativeGeometry {
            width: Some(base.width()),
            height: Some(base.height()),
            pixel_type: Some(base.pixel_type()),
            significant_bits: Some(base.pixel_type().bits()),
            n_concrete_channels: 1,
            n_samples: base.color_bands(),
            depth: 1,
            duration: 1,
            ..Default::default()
        })
    }

    fn tile_size(&self) -> u32 {
        self.tile_size
    }

    fn read_region(&self, request: &RegionRequest) -> Result<Raster, ReadError> {
        if request.concrete_channel != 0 || request.z != 0 || request.t != 0 {
            return Err(ReadError::backend(format!(
                "plain images have a single channel and plane, got c={} z={} t={}",
                request.concrete_channel, request.z, request.t
            )));
        }
        if request.level > MAX_LEVEL {
            return Err(ReadError::backend(format!(
                "level {} beyond the deepest level {}",
                request.level, MAX_LEVEL
            )));
        }

        let level = self.level(request.level);
        level.crop(request.x, request.y, request.width, request.height)
    }

    fn raw_metadata(&self) -> Option<serde_json::Value> {
        let base = self.base();
        Some(json!({
            "Image": {
                "Format": format!("{:?}", self.format),
                "ColorType": self.color_type,
                "SizeX": base.width(),
                "SizeY": base.height(),
            }
        }))
    }
}

/// Convert a decoded image into an interleaved raster.
pub fn raster_from_image(img: DynamicImage) -> Result<Raster, ReadError> {
    let (width, height) = (img.width(), img.height());
    let (bands, pixel_type, has_alpha, data): (usize, PixelType, bool, Vec<u8>) = match img {
        DynamicImage::ImageLuma8(buf) => (1, PixelType::U8, false, buf.into_raw()),
        DynamicImage::ImageLumaA8(buf) => (2, PixelType::U8, true, buf.into_raw()),
        DynamicImage::ImageRgb8(buf) => (3, PixelType::U8, false, buf.into_raw()),
        DynamicImage::ImageRgba8(buf) => (4, PixelType::U8, true, buf.into_raw()),
        DynamicImage::ImageLuma16(buf) => (1, PixelType::U16, false, le_bytes_u16(buf.into_raw())),
        DynamicImage::ImageLumaA16(buf) => (2, PixelType::U16, true, le_bytes_u16(buf.into_raw())),
        DynamicImage::ImageRgb16(buf) => (3, PixelType::U16, false, le_bytes_u16(buf.into_raw())),
        DynamicImage::ImageRgba16(buf) => (4, PixelType::U16, true, le_bytes_u16(buf.into_raw())),
        DynamicImage::ImageRgb32F(buf) => (3, PixelType::F32, false, le_bytes_f32(buf.into_raw())),
        DynamicImage::ImageRgba32F(buf) => (4, PixelType::F32, true, le_bytes_f32(buf.into_raw())),
        other => (4, PixelType::U8, true, other.to_rgba8().into_raw()),
    };
    Ok(Raster::new(width, height, bands, pixel_type, data)?.with_alpha(has_alpha))
}

fn le_bytes_u16(samples: Vec<u16>) -> Vec<u8> {
    samples.into_iter().flat_map(u16::to_le_bytes).collect()
}

fn le_bytes_f32(samples: Vec<f32>) -> Vec<u8> {
    samples.into_iter().flat_map(f32::to_le_bytes).collect()
}
