//! Raster to PNG/JPEG encoder.
//!
//! Composed windows come out of the reader as raw sample buffers. This module
//! turns them into image files for the command-line tool.
//!
//! # Design Decisions
//!
//! - **Layouts**: 1 band is grayscale, 3 bands are RGB, 2 and 4 bands are
//!   only accepted when the last one is alpha. Other band counts must be
//!   reduced with a channel selection first.
//!
//! - **Sample types**: 8 and 16 bit unsigned samples are supported. JPEG
//!   output is always 8 bit without alpha.
//!
//! - **Optional resize**: the reader never resamples; a caller wanting an
//!   exact output size asks the encoder to resize.

use std::io::Cursor;
use std::path::Path;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageBuffer, ImageFormat, Luma, LumaA, Rgb, Rgba};

use super::{PixelType, Raster};
use crate::error::EncodeError;

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

// =============================================================================
// Output Format
// =============================================================================

/// Encoded file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Png,
    Jpeg,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
        }
    }

    /// Guess the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "png" => Some(OutputFormat::Png),
            "jpg" | "jpeg" => Some(OutputFormat::Jpeg),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            OutputFormat::Png => "PNG",
            OutputFormat::Jpeg => "JPEG",
        }
    }
}

// =============================================================================
// Encoder
// =============================================================================

/// Encoder for composed rasters.
///
/// # Example
///
/// ```
/// use wsi_window::raster::{OutputFormat, PixelType, Raster, RasterEncoder};
///
/// let raster = Raster::filled(4, 4, 3, PixelType::U8, 128.0);
/// let png = RasterEncoder::new().encode(&raster, OutputFormat::Png).unwrap();
/// assert_eq!(&png[1..4], b"PNG");
/// ```
#[derive(Debug, Clone)]
pub struct RasterEncoder {
    quality: u8,
}

impl Default for RasterEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RasterEncoder {
    pub fn new() -> Self {
        Self {
            quality: DEFAULT_JPEG_QUALITY,
        }
    }

    /// Set the JPEG quality, clamped to 1-100.
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = clamp_quality(quality);
        self
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Encode a raster at its own size.
    pub fn encode(&self, raster: &Raster, format: OutputFormat) -> Result<Bytes, EncodeError> {
        let img = to_dynamic_image(raster, format)?;
        self.write(img, format)
    }

    /// Encode a raster resized to exactly `width` x `height`.
    pub fn encode_resized(
        &self,
        raster: &Raster,
        format: OutputFormat,
        width: u32,
        height: u32,
    ) -> Result<Bytes, EncodeError> {
        let mut img = to_dynamic_image(raster, format)?;
        if (img.width(), img.height()) != (width, height) && width > 0 && height > 0 {
            img = img.resize_exact(width, height, FilterType::Triangle);
        }
        self.write(img, format)
    }

    fn write(&self, img: DynamicImage, format: OutputFormat) -> Result<Bytes, EncodeError> {
        let mut output = Vec::new();
        match format {
            OutputFormat::Png => img
                .write_to(&mut Cursor::new(&mut output), ImageFormat::Png)
                .map_err(|e| EncodeError::Encode {
                    message: e.to_string(),
                })?,
            OutputFormat::Jpeg => {
                // JPEG has neither alpha nor 16 bit samples
                let img = if img.color().has_color() {
                    DynamicImage::ImageRgb8(img.to_rgb8())
                } else {
                    DynamicImage::ImageLuma8(img.to_luma8())
                };
                let mut encoder = JpegEncoder::new_with_quality(&mut output, self.quality);
                encoder
                    .encode_image(&img)
                    .map_err(|e| EncodeError::Encode {
                        message: e.to_string(),
                    })?;
            }
        }
        Ok(Bytes::from(output))
    }
}

/// Convert a raster into an `image` buffer.
pub fn to_dynamic_image(raster: &Raster, format: OutputFormat) -> Result<DynamicImage, EncodeError> {
    let unsupported = || EncodeError::UnsupportedLayout {
        bands: raster.bands(),
        pixel_type: raster.pixel_type().to_string(),
        format: format.name(),
    };

    let (w, h) = (raster.width(), raster.height());
    let alpha = raster.has_alpha();
    let data = raster.data();

    let img = match raster.pixel_type() {
        PixelType::U8 => {
            let buf = data.to_vec();
            match (raster.bands(), alpha) {
                (1, _) => ImageBuffer::<Luma<u8>, _>::from_raw(w, h, buf).map(DynamicImage::ImageLuma8),
                (2, true) => {
                    ImageBuffer::<LumaA<u8>, _>::from_raw(w, h, buf).map(DynamicImage::ImageLumaA8)
                }
                (3, _) => ImageBuffer::<Rgb<u8>, _>::from_raw(w, h, buf).map(DynamicImage::ImageRgb8),
                (4, true) => {
                    ImageBuffer::<Rgba<u8>, _>::from_raw(w, h, buf).map(DynamicImage::ImageRgba8)
                }
                _ => None,
            }
        }
        PixelType::U16 => {
            let buf: Vec<u16> = data
                .chunks_exact(2)
                .map(|b| u16::from_le_bytes([b[0], b[1]]))
                .collect();
            match (raster.bands(), alpha) {
                (1, _) => ImageBuffer::<Luma<u16>, _>::from_raw(w, h, buf).map(DynamicImage::ImageLuma16),
                (2, true) => {
                    ImageBuffer::<LumaA<u16>, _>::from_raw(w, h, buf).map(DynamicImage::ImageLumaA16)
                }
                (3, _) => ImageBuffer::<Rgb<u16>, _>::from_raw(w, h, buf).map(DynamicImage::ImageRgb16),
                (4, true) => {
                    ImageBuffer::<Rgba<u16>, _>::from_raw(w, h, buf).map(DynamicImage::ImageRgba16)
                }
                _ => None,
            }
        }
        _ => None,
    };

    img.ok_or_else(unsupported)
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Validate JPEG quality parameter.
///
/// Returns `true` if quality is in the valid range (1-100).
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&quality)
}

/// Clamp quality to valid range.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}
