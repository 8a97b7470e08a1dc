//! Test utilities for integration tests.
//!
//! This module provides stub decoder backends that count their calls, and
//! helpers for writing fixture images to disk.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage, Rgba, RgbaImage};
use serde_json::{json, Value};

use wsi_window::error::{OpenError, ParseError, ReadError};
use wsi_window::format::{
    AssociatedImage, AssociatedImages, BackendHandle, ChannelOrder, DecoderBackend,
    ExclusiveHandle, NativeChannel, NativeGeometry, RegionRequest, Serialized,
};
use wsi_window::raster::{PixelType, Raster};

/// Extension the stub backend claims.
pub const STUB_EXTENSION: &str = "stub";

/// Deterministic 8-bit sample at tier coordinates.
pub fn synthetic_value(x: u32, y: u32, sample: usize, concrete: usize, level: usize) -> u8 {
    ((x as usize + 7 * y as usize) + 31 * sample + 67 * concrete + 13 * level) as u8
}

// =============================================================================
// Stub Slide Description
// =============================================================================

/// Shape of the images a [`StubBackend`] opens.
#[derive(Clone)]
pub struct StubSlide {
    pub width: u32,
    pub height: u32,
    pub tile_size: u32,
    pub n_concrete: usize,
    pub n_samples: usize,
    pub depth: u32,
    pub channel_names: Vec<String>,
    pub raw: Option<Value>,
    pub thumbnail: Option<Arc<dyn AssociatedImage>>,
    pub label: Option<Arc<dyn AssociatedImage>>,
    pub overview: Option<Arc<dyn AssociatedImage>>,
}

impl StubSlide {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            tile_size: 256,
            n_concrete: 1,
            n_samples: 3,
            depth: 1,
            channel_names: Vec::new(),
            raw: None,
            thumbnail: None,
            label: None,
            overview: None,
        }
    }

    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn with_channels(mut self, n_concrete: usize, n_samples: usize) -> Self {
        self.n_concrete = n_concrete;
        self.n_samples = n_samples;
        self
    }

    pub fn with_channel_names(mut self, names: &[&str]) -> Self {
        self.channel_names = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = Some(raw);
        self
    }

    pub fn with_thumbnail(mut self, image: FlatImage) -> Self {
        self.thumbnail = Some(Arc::new(image));
        self
    }

    pub fn with_label(mut self, image: FlatImage) -> Self {
        self.label = Some(Arc::new(image));
        self
    }

    pub fn with_overview(mut self, image: FlatImage) -> Self {
        self.overview = Some(Arc::new(image));
        self
    }

    fn geometry(&self) -> NativeGeometry {
        NativeGeometry {
            width: Some(self.width),
            height: Some(self.height),
            pixel_type: Some(PixelType::U8),
            n_concrete_channels: self.n_concrete,
            n_samples: self.n_samples,
            depth: self.depth,
            duration: 1,
            channels: self
                .channel_names
                .iter()
                .map(|name| NativeChannel {
                    name: Some(name.clone()),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    fn render(&self, request: &RegionRequest) -> Result<Raster, ReadError> {
        let mut data = Vec::with_capacity(
            request.width as usize * request.height as usize * self.n_samples,
        );
        for y in 0..request.height {
            for x in 0..request.width {
                for s in 0..self.n_samples {
                    data.push(synthetic_value(
                        request.x + x,
                        request.y + y,
                        s,
                        request.concrete_channel,
                        request.level,
                    ));
                }
            }
        }
        Raster::new(
            request.width,
            request.height,
            self.n_samples,
            PixelType::U8,
            data,
        )
    }

    fn associated(&self) -> AssociatedImages {
        AssociatedImages {
            thumbnail: self.thumbnail.clone(),
            label: self.label.clone(),
            macro_image: None,
            overview: self.overview.clone(),
        }
    }
}

/// Single-colour associated image.
pub struct FlatImage {
    pub width: u32,
    pub height: u32,
    pub value: u8,
}

impl FlatImage {
    pub fn new(width: u32, height: u32, value: u8) -> Self {
        Self {
            width,
            height,
            value,
        }
    }
}

impl AssociatedImage for FlatImage {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn n_components(&self) -> usize {
        3
    }

    fn read(&self) -> Result<Raster, ReadError> {
        Ok(Raster::filled(
            self.width,
            self.height,
            3,
            PixelType::U8,
            self.value as f64,
        ))
    }
}

// =============================================================================
// Call Counters
// =============================================================================

/// Counters shared between a backend and the handles it opens.
#[derive(Default, Clone)]
pub struct Counters {
    opens: Arc<AtomicUsize>,
    reads: Arc<Mutex<Vec<RegionRequest>>>,
}

impl Counters {
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn read_count(&self) -> usize {
        self.requests().len()
    }

    pub fn requests(&self) -> Vec<RegionRequest> {
        self.reads.lock().unwrap().clone()
    }

    pub fn reset_reads(&self) {
        self.reads.lock().unwrap().clear();
    }

    fn record(&self, request: &RegionRequest) {
        self.reads.lock().unwrap().push(*request);
    }
}

// =============================================================================
// Stub Backend
// =============================================================================

/// Backend claiming `*.stub` files and serving synthetic pixels.
pub struct StubBackend {
    slide: StubSlide,
    order: ChannelOrder,
    open_delay: Duration,
    fail_open: bool,
    missing_width: bool,
    counters: Counters,
}

impl StubBackend {
    pub fn new(slide: StubSlide) -> Self {
        Self {
            slide,
            order: ChannelOrder::Rgb,
            open_delay: Duration::ZERO,
            fail_open: false,
            missing_width: false,
            counters: Counters::default(),
        }
    }

    pub fn with_order(mut self, order: ChannelOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Open successfully but report geometry without a width.
    pub fn missing_width(mut self) -> Self {
        self.missing_width = true;
        self
    }

    pub fn counters(&self) -> Counters {
        self.counters.clone()
    }
}

impl DecoderBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn matches(&self, path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()) == Some(STUB_EXTENSION)
    }

    fn open(&self, path: &Path) -> Result<Box<dyn BackendHandle>, OpenError> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.open_delay);
        if self.fail_open {
            return Err(OpenError::Corrupt {
                path: path.display().to_string(),
                message: "stub refuses to open".to_string(),
            });
        }
        Ok(Box::new(StubHandle {
            slide: self.slide.clone(),
            missing_width: self.missing_width,
            counters: self.counters.clone(),
        }))
    }

    fn channel_order(&self) -> ChannelOrder {
        self.order
    }
}

struct StubHandle {
    slide: StubSlide,
    missing_width: bool,
    counters: Counters,
}

impl BackendHandle for StubHandle {
    fn native_geometry(&self) -> Result<NativeGeometry, ParseError> {
        if self.missing_width {
            return Err(ParseError::MissingField("width"));
        }
        Ok(self.slide.geometry())
    }

    fn tile_size(&self) -> u32 {
        self.slide.tile_size
    }

    fn read_region(&self, request: &RegionRequest) -> Result<Raster, ReadError> {
        self.counters.record(request);
        self.slide.render(request)
    }

    fn associated_images(&self) -> AssociatedImages {
        self.slide.associated()
    }

    fn raw_metadata(&self) -> Option<Value> {
        self.slide.raw.clone()
    }
}

// =============================================================================
// Non-reentrant Backend
// =============================================================================

/// Backend whose decoder must not be entered concurrently.
///
/// Handles are wrapped in [`Serialized`]; an overlapping call is recorded.
pub struct ExclusiveBackend {
    slide: StubSlide,
    overlapped: Arc<AtomicBool>,
    counters: Counters,
}

impl ExclusiveBackend {
    pub fn new(slide: StubSlide) -> Self {
        Self {
            slide,
            overlapped: Arc::new(AtomicBool::new(false)),
            counters: Counters::default(),
        }
    }

    pub fn overlapped(&self) -> Arc<AtomicBool> {
        self.overlapped.clone()
    }

    pub fn counters(&self) -> Counters {
        self.counters.clone()
    }
}

impl DecoderBackend for ExclusiveBackend {
    fn name(&self) -> &'static str {
        "exclusive"
    }

    fn matches(&self, path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()) == Some("excl")
    }

    fn open(&self, _path: &Path) -> Result<Box<dyn BackendHandle>, OpenError> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(Serialized::new(ExclusiveStub {
            slide: self.slide.clone(),
            busy: Arc::new(AtomicBool::new(false)),
            overlapped: self.overlapped.clone(),
            counters: self.counters.clone(),
        })))
    }
}

struct ExclusiveStub {
    slide: StubSlide,
    busy: Arc<AtomicBool>,
    overlapped: Arc<AtomicBool>,
    counters: Counters,
}

impl ExclusiveHandle for ExclusiveStub {
    fn native_geometry(&mut self) -> Result<NativeGeometry, ParseError> {
        Ok(self.slide.geometry())
    }

    fn tile_size(&self) -> u32 {
        self.slide.tile_size
    }

    fn read_region(&mut self, request: &RegionRequest) -> Result<Raster, ReadError> {
        if self.busy.swap(true, Ordering::SeqCst) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        thread::sleep(Duration::from_millis(2));
        self.counters.record(request);
        let raster = self.slide.render(request);
        self.busy.store(false, Ordering::SeqCst);
        raster
    }
}

// =============================================================================
// Fixture Files
// =============================================================================

/// Create an empty file with the stub extension.
pub fn stub_file(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(format!("{}.{}", name, STUB_EXTENSION));
    std::fs::write(&path, b"stub").unwrap();
    path
}

pub fn write_rgb_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    })
    .save(&path)
    .unwrap();
    path
}

pub fn write_rgba_png(dir: &Path, name: &str, width: u32, height: u32, alpha: u8) -> PathBuf {
    let path = dir.join(name);
    RgbaImage::from_pixel(width, height, Rgba([200, 100, 50, alpha]))
        .save(&path)
        .unwrap();
    path
}

pub fn write_gray_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    GrayImage::from_fn(width, height, |x, _| Luma([(x % 256) as u8]))
        .save(&path)
        .unwrap();
    path
}

pub fn write_gray16_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    let img: ImageBuffer<Luma<u16>, Vec<u16>> =
        ImageBuffer::from_fn(width, height, |x, y| Luma([(x * 100 + y) as u16]));
    img.save(&path).unwrap();
    path
}

/// Vendor tree in the shape slide scanners commonly export.
pub fn vendor_metadata() -> Value {
    json!({
        "openslide.mpp-x": "0.2527",
        "openslide.mpp-y": "0.2531",
        "aperio.AppMag": 40,
        "tiff.DateTime": "2021:03:04 10:20:30",
        "Instrument": {
            "Microscope": { "Model": "Aperio GT 450" }
        }
    })
}
