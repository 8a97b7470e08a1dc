//! Raster buffers and band composition.
//!
//! A [`Raster`] is an interleaved, little-endian sample buffer: pixel `(x, y)`
//! band `b` starts at byte `((y * width + x) * bands + b) * sample_size`.
//! Backends hand back one raster per concrete channel; the windowed reader
//! then flattens alpha, extracts the requested samples and joins them.
//!
//! ```text
//! backend plane (BGRA)       flatten          extract [2, 0]     bandjoin
//! ┌──┬──┬──┬──┐            ┌──┬──┬──┐          ┌──┬──┐          ┌──┬──┬──┐
//! │B │G │R │A │  ───────►  │B │G │R │  ──────► │R │B │ + [L] ─► │R │B │L │
//! └──┴──┴──┴──┘            └──┴──┴──┘          └──┴──┘          └──┴──┴──┘
//! ```

use std::fmt;

use bytes::{Bytes, BytesMut};
use serde::Serialize;

use crate::error::ReadError;

pub mod encode;

pub use encode::{
    clamp_quality, is_valid_quality, OutputFormat, RasterEncoder, DEFAULT_JPEG_QUALITY,
    MAX_JPEG_QUALITY, MIN_JPEG_QUALITY,
};

// =============================================================================
// Pixel Type
// =============================================================================

/// Sample type of a raster band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelType {
    U8,
    U16,
    U32,
    I8,
    I16,
    I32,
    F32,
    F64,
}

impl PixelType {
    /// Size of one sample in bytes.
    pub const fn sample_size(self) -> usize {
        match self {
            PixelType::U8 | PixelType::I8 => 1,
            PixelType::U16 | PixelType::I16 => 2,
            PixelType::U32 | PixelType::I32 | PixelType::F32 => 4,
            PixelType::F64 => 8,
        }
    }

    pub const fn bits(self) -> u32 {
        self.sample_size() as u32 * 8
    }

    pub const fn is_float(self) -> bool {
        matches!(self, PixelType::F32 | PixelType::F64)
    }

    /// Full-scale value, used as opaque alpha and as the white background.
    ///
    /// Floating-point samples are normalized to `[0, 1]`.
    pub fn max_value(self) -> f64 {
        match self {
            PixelType::U8 => u8::MAX as f64,
            PixelType::U16 => u16::MAX as f64,
            PixelType::U32 => u32::MAX as f64,
            PixelType::I8 => i8::MAX as f64,
            PixelType::I16 => i16::MAX as f64,
            PixelType::I32 => i32::MAX as f64,
            PixelType::F32 | PixelType::F64 => 1.0,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            PixelType::U8 => "uint8",
            PixelType::U16 => "uint16",
            PixelType::U32 => "uint32",
            PixelType::I8 => "int8",
            PixelType::I16 => "int16",
            PixelType::I32 => "int32",
            PixelType::F32 => "float32",
            PixelType::F64 => "float64",
        }
    }

    /// Decode one little-endian sample.
    fn read(self, bytes: &[u8]) -> f64 {
        let mut buf = [0u8; 8];
        let n = self.sample_size().min(bytes.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        match self {
            PixelType::U8 => buf[0] as f64,
            PixelType::I8 => buf[0] as i8 as f64,
            PixelType::U16 => u16::from_le_bytes([buf[0], buf[1]]) as f64,
            PixelType::I16 => i16::from_le_bytes([buf[0], buf[1]]) as f64,
            PixelType::U32 => u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            PixelType::I32 => i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            PixelType::F32 => f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            PixelType::F64 => f64::from_le_bytes(buf),
        }
    }

    /// Append one sample, rounding and saturating integer types.
    fn write(self, value: f64, out: &mut BytesMut) {
        match self {
            PixelType::U8 => out.extend_from_slice(&[value.round() as u8]),
            PixelType::I8 => out.extend_from_slice(&(value.round() as i8).to_le_bytes()),
            PixelType::U16 => out.extend_from_slice(&(value.round() as u16).to_le_bytes()),
            PixelType::I16 => out.extend_from_slice(&(value.round() as i16).to_le_bytes()),
            PixelType::U32 => out.extend_from_slice(&(value.round() as u32).to_le_bytes()),
            PixelType::I32 => out.extend_from_slice(&(value.round() as i32).to_le_bytes()),
            PixelType::F32 => out.extend_from_slice(&(value as f32).to_le_bytes()),
            PixelType::F64 => out.extend_from_slice(&value.to_le_bytes()),
        }
    }
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Interpretation / Background
// =============================================================================

/// Colour-space hint attached to a composed raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorInterpretation {
    #[default]
    Multiband,
    Grayscale,
    Rgb,
}

/// Colour alpha planes are composited against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Background {
    #[default]
    Black,
    White,
}

impl Background {
    pub fn value(self, pixel_type: PixelType) -> f64 {
        match self {
            Background::Black => 0.0,
            Background::White => pixel_type.max_value(),
        }
    }
}

// =============================================================================
// Raster
// =============================================================================

/// Interleaved pixel buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    width: u32,
    height: u32,
    bands: usize,
    pixel_type: PixelType,
    data: Bytes,
    has_alpha: bool,
    interpretation: ColorInterpretation,
}

impl Raster {
    /// Wrap a sample buffer, checking its length against the geometry.
    pub fn new(
        width: u32,
        height: u32,
        bands: usize,
        pixel_type: PixelType,
        data: impl Into<Bytes>,
    ) -> Result<Self, ReadError> {
        let data = data.into();
        let expected = Self::byte_len(width, height, bands, pixel_type);
        if data.len() != expected {
            return Err(ReadError::BufferSize {
                expected,
                actual: data.len(),
            });
        }
        if bands == 0 {
            return Err(ReadError::Layout {
                message: "raster has no bands".to_string(),
            });
        }
        Ok(Self {
            width,
            height,
            bands,
            pixel_type,
            data,
            has_alpha: false,
            interpretation: ColorInterpretation::Multiband,
        })
    }

    /// A raster with every sample set to `value`.
    ///
    /// A raster always has at least one band; `bands == 0` yields one.
    pub fn filled(width: u32, height: u32, bands: usize, pixel_type: PixelType, value: f64) -> Self {
        let bands = bands.max(1);
        let samples = width as usize * height as usize * bands;
        let mut one = BytesMut::with_capacity(pixel_type.sample_size());
        pixel_type.write(value, &mut one);
        let data = one.repeat(samples);
        Self {
            width,
            height,
            bands,
            pixel_type,
            data: Bytes::from(data),
            has_alpha: false,
            interpretation: ColorInterpretation::Multiband,
        }
    }

    /// Number of bytes a raster of this geometry occupies.
    pub fn byte_len(width: u32, height: u32, bands: usize, pixel_type: PixelType) -> usize {
        width as usize * height as usize * bands * pixel_type.sample_size()
    }

    /// Mark the last band as alpha.
    pub fn with_alpha(mut self, has_alpha: bool) -> Self {
        self.has_alpha = has_alpha && self.bands > 1;
        self
    }

    pub fn with_interpretation(mut self, interpretation: ColorInterpretation) -> Self {
        self.interpretation = interpretation;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bands(&self) -> usize {
        self.bands
    }

    pub fn pixel_type(&self) -> PixelType {
        self.pixel_type
    }

    pub fn has_alpha(&self) -> bool {
        self.has_alpha
    }

    pub fn interpretation(&self) -> ColorInterpretation {
        self.interpretation
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn into_data(self) -> Bytes {
        self.data
    }

    /// Bands carrying colour, i.e. all bands but a trailing alpha.
    pub fn color_bands(&self) -> usize {
        self.bands - usize::from(self.has_alpha)
    }

    fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Sample value of band `band` at `(x, y)`.
    pub fn sample(&self, x: u32, y: u32, band: usize) -> Option<f64> {
        if x >= self.width || y >= self.height || band >= self.bands {
            return None;
        }
        let size = self.pixel_type.sample_size();
        let offset = ((y as usize * self.width as usize + x as usize) * self.bands + band) * size;
        self.data
            .get(offset..offset + size)
            .map(|bytes| self.pixel_type.read(bytes))
    }

    /// New raster holding the listed bands, in the listed order.
    ///
    /// Indices may repeat. The result never carries alpha.
    pub fn extract_bands(&self, indices: &[usize]) -> Result<Raster, ReadError> {
        if indices.is_empty() {
            return Err(ReadError::Layout {
                message: "no bands to extract".to_string(),
            });
        }
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.bands) {
            return Err(ReadError::Layout {
                message: format!("band {} requested from a {}-band plane", bad, self.bands),
            });
        }

        // Identity selection keeps the buffer shared.
        if !self.has_alpha && indices.iter().copied().eq(0..self.bands) {
            return Ok(self.clone().with_interpretation(ColorInterpretation::Multiband));
        }

        let size = self.pixel_type.sample_size();
        let stride = self.bands * size;
        let mut out = BytesMut::with_capacity(self.pixel_count() * indices.len() * size);
        for pixel in self.data.chunks_exact(stride) {
            for &band in indices {
                out.extend_from_slice(&pixel[band * size..(band + 1) * size]);
            }
        }
        Raster::new(
            self.width,
            self.height,
            indices.len(),
            self.pixel_type,
            out.freeze(),
        )
    }

    /// Concatenate rasters band-wise, in order.
    ///
    /// All inputs must share width, height and pixel type.
    pub fn bandjoin(rasters: &[Raster]) -> Result<Raster, ReadError> {
        let Some(first) = rasters.first() else {
            return Err(ReadError::Layout {
                message: "nothing to join".to_string(),
            });
        };
        if rasters.len() == 1 {
            return Ok(first.clone().with_alpha(false));
        }
        for raster in &rasters[1..] {
            if raster.width != first.width
                || raster.height != first.height
                || raster.pixel_type != first.pixel_type
            {
                return Err(ReadError::Layout {
                    message: format!(
                        "cannot join {}x{} {} with {}x{} {}",
                        first.width,
                        first.height,
                        first.pixel_type,
                        raster.width,
                        raster.height,
                        raster.pixel_type
                    ),
                });
            }
        }

        let size = first.pixel_type.sample_size();
        let bands: usize = rasters.iter().map(|r| r.bands).sum();
        let mut out = BytesMut::with_capacity(first.pixel_count() * bands * size);
        for pixel in 0..first.pixel_count() {
            for raster in rasters {
                let stride = raster.bands * size;
                out.extend_from_slice(&raster.data[pixel * stride..(pixel + 1) * stride]);
            }
        }
        Raster::new(first.width, first.height, bands, first.pixel_type, out.freeze())
    }

    /// Copy out a sub-rectangle.
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Result<Raster, ReadError> {
        if x as u64 + width as u64 > self.width as u64
            || y as u64 + height as u64 > self.height as u64
        {
            return Err(ReadError::Layout {
                message: format!(
                    "crop {}x{}+{}+{} outside {}x{} raster",
                    width, height, x, y, self.width, self.height
                ),
            });
        }
        if (x, y, width, height) == (0, 0, self.width, self.height) {
            return Ok(self.clone());
        }

        let stride = self.bands * self.pixel_type.sample_size();
        let row_len = self.width as usize * stride;
        let mut out = BytesMut::with_capacity(width as usize * height as usize * stride);
        for row in y as usize..(y + height) as usize {
            let start = row * row_len + x as usize * stride;
            out.extend_from_slice(&self.data[start..start + width as usize * stride]);
        }
        Ok(Raster {
            width,
            height,
            data: out.freeze(),
            ..self.clone()
        })
    }

    /// Halve both dimensions (rounding up) with a 2x2 box filter.
    ///
    /// Blocks on the right and bottom edges of odd-sized rasters average the
    /// pixels they actually cover.
    pub fn halve(&self) -> Raster {
        let (w, h) = (self.width.div_ceil(2), self.height.div_ceil(2));
        let size = self.pixel_type.sample_size();
        let stride = self.bands * size;
        let mut out = BytesMut::with_capacity(w as usize * h as usize * stride);

        for oy in 0..h {
            let rows = (oy * 2)..(oy * 2 + 2).min(self.height);
            for ox in 0..w {
                let cols = (ox * 2)..(ox * 2 + 2).min(self.width);
                let count = (rows.len() * cols.len()) as f64;
                for band in 0..self.bands {
                    let mut sum = 0.0;
                    for sy in rows.clone() {
                        for sx in cols.clone() {
                            let offset = (sy as usize * self.width as usize + sx as usize) * stride
                                + band * size;
                            sum += self.pixel_type.read(&self.data[offset..offset + size]);
                        }
                    }
                    self.pixel_type.write(sum / count, &mut out);
                }
            }
        }

        Raster {
            width: w,
            height: h,
            data: out.freeze(),
            ..self.clone()
        }
    }

    /// Composite the alpha band against `background` and drop it.
    ///
    /// Rasters without alpha are returned unchanged.
    pub fn flatten(&self, background: Background) -> Raster {
        if !self.has_alpha {
            return self.clone();
        }

        let pixel_type = self.pixel_type;
        let size = pixel_type.sample_size();
        let max = pixel_type.max_value();
        let bg = background.value(pixel_type);
        let color = self.color_bands();
        let mut out = BytesMut::with_capacity(self.pixel_count() * color * size);

        for pixel in self.data.chunks_exact(self.bands * size) {
            let alpha = (pixel_type.read(&pixel[color * size..]) / max).clamp(0.0, 1.0);
            for band in 0..color {
                let value = pixel_type.read(&pixel[band * size..(band + 1) * size]);
                pixel_type.write(value * alpha + bg * (1.0 - alpha), &mut out);
            }
        }

        Raster {
            width: self.width,
            height: self.height,
            bands: color,
            pixel_type,
            data: out.freeze(),
            has_alpha: false,
            interpretation: self.interpretation,
        }
    }
}
