//! Decoder backend traits.
//!
//! A decoder backend knows how to recognize and open one file format. Opening
//! yields a [`BackendHandle`], the only object the rest of the crate talks to
//! for geometry, pixel reads and associated images.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             WindowedReader              │
//! └────────────────────┬────────────────────┘
//!                      │ RegionRequest (tier-relative)
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │          BackendHandle Trait            │
//! │  (format-agnostic handle interface)     │
//! └────────────────────┬────────────────────┘
//!                      │
//!          ┌───────────┴───────────┐
//!          ▼                       ▼
//! ┌─────────────────┐    ┌─────────────────────┐
//! │  thread-safe    │    │ Serialized<H>       │
//! │  handle         │    │ (per-handle mutex)  │
//! └─────────────────┘    └─────────────────────┘
//! ```
//!
//! Decoders that cannot be called from several threads at once implement
//! [`ExclusiveHandle`] instead and are wrapped in [`Serialized`].

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use crate::error::{OpenError, ParseError, ReadError};
use crate::metadata::PhysicalSize;
use crate::pyramid::DEFAULT_TILE_SIZE;
use crate::raster::{PixelType, Raster};

// =============================================================================
// Channel Order
// =============================================================================

/// Native component order of a backend's multi-sample planes.
///
/// Drives the naming of unnamed channels: 3-sample planes are named after
/// this order, and 2-3 single-sample concrete channels take its letters by
/// index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

impl ChannelOrder {
    pub const fn letters(self) -> [&'static str; 3] {
        match self {
            ChannelOrder::Rgb => ["R", "G", "B"],
            ChannelOrder::Bgr => ["B", "G", "R"],
        }
    }
}

// =============================================================================
// Native Geometry
// =============================================================================

/// Per concrete channel information reported by a backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NativeChannel {
    pub name: Option<String>,

    /// Colour name or `#rrggbb` hex string
    pub color: Option<String>,

    pub emission_wavelength: Option<f64>,
    pub excitation_wavelength: Option<f64>,
}

/// Geometry and descriptive fields as the file format stores them.
///
/// Width, height and pixel type are mandatory for metadata extraction; every
/// other field may be left at its default. Counts of 0 are read as 1.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NativeGeometry {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub pixel_type: Option<PixelType>,
    pub significant_bits: Option<u32>,

    pub n_concrete_channels: usize,
    pub n_samples: usize,
    pub depth: u32,
    pub duration: u32,
    pub frame_rate: Option<f64>,

    pub physical_size_x: Option<PhysicalSize>,
    pub physical_size_y: Option<PhysicalSize>,
    pub physical_size_z: Option<PhysicalSize>,

    /// Indexed by concrete channel; may be shorter than the channel count
    pub channels: Vec<NativeChannel>,

    /// RFC 3339 or `YYYY:MM:DD HH:MM:SS` timestamp
    pub acquisition_datetime: Option<String>,
    pub nominal_magnification: Option<f64>,
    pub calibrated_magnification: Option<f64>,
    pub device_model: Option<String>,
}

// =============================================================================
// Region Request
// =============================================================================

/// A tier-relative pixel read for one concrete channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionRequest {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,

    /// Pyramid level the coordinates refer to
    pub level: usize,

    pub concrete_channel: usize,
    pub z: u32,
    pub t: u32,
}

// =============================================================================
// Associated Images
// =============================================================================

/// Kinds of auxiliary images stored next to the main pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AssociatedKind {
    Thumbnail,
    Label,
    Macro,
    Overview,
}

impl AssociatedKind {
    pub const ALL: [AssociatedKind; 4] = [
        AssociatedKind::Thumbnail,
        AssociatedKind::Label,
        AssociatedKind::Macro,
        AssociatedKind::Overview,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            AssociatedKind::Thumbnail => "thumbnail",
            AssociatedKind::Label => "label",
            AssociatedKind::Macro => "macro",
            AssociatedKind::Overview => "overview",
        }
    }
}

impl fmt::Display for AssociatedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A small single-resolution image attached to the slide.
pub trait AssociatedImage: Send + Sync {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn n_components(&self) -> usize;

    /// Decode the whole image.
    fn read(&self) -> Result<Raster, ReadError>;
}

/// The associated images a handle exposes, any of which may be absent.
#[derive(Clone, Default)]
pub struct AssociatedImages {
    pub thumbnail: Option<Arc<dyn AssociatedImage>>,
    pub label: Option<Arc<dyn AssociatedImage>>,
    pub macro_image: Option<Arc<dyn AssociatedImage>>,
    pub overview: Option<Arc<dyn AssociatedImage>>,
}

impl AssociatedImages {
    pub fn get(&self, kind: AssociatedKind) -> Option<&Arc<dyn AssociatedImage>> {
        match kind {
            AssociatedKind::Thumbnail => self.thumbnail.as_ref(),
            AssociatedKind::Label => self.label.as_ref(),
            AssociatedKind::Macro => self.macro_image.as_ref(),
            AssociatedKind::Overview => self.overview.as_ref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        AssociatedKind::ALL.iter().all(|&kind| self.get(kind).is_none())
    }
}

impl fmt::Debug for AssociatedImages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for kind in AssociatedKind::ALL {
            if let Some(image) = self.get(kind) {
                list.entry(&format_args!(
                    "{} {}x{}x{}",
                    kind,
                    image.width(),
                    image.height(),
                    image.n_components()
                ));
            }
        }
        list.finish()
    }
}

// =============================================================================
// Backend Traits
// =============================================================================

/// An opened image, safe to share between threads.
///
/// Coordinates passed to [`read_region`](BackendHandle::read_region) are
/// relative to the requested level, whose size is `ceil(size / 2^level)` of
/// the full-resolution image.
pub trait BackendHandle: Send + Sync {
    /// Geometry as stored in the file.
    fn native_geometry(&self) -> Result<NativeGeometry, ParseError>;

    /// Tile size used to build the pyramid of this image.
    fn tile_size(&self) -> u32 {
        DEFAULT_TILE_SIZE
    }

    /// Read one concrete channel of a tier-relative rectangle.
    ///
    /// The returned raster is `width x height` with `n_samples` bands, plus a
    /// trailing alpha band when the plane has one (flagged on the raster).
    fn read_region(&self, request: &RegionRequest) -> Result<Raster, ReadError>;

    fn associated_images(&self) -> AssociatedImages {
        AssociatedImages::default()
    }

    /// Vendor metadata tree, if the format has one.
    fn raw_metadata(&self) -> Option<serde_json::Value> {
        None
    }
}

/// A file format implementation.
pub trait DecoderBackend: Send + Sync {
    /// Short format name, e.g. `"png"` or `"czi"`.
    fn name(&self) -> &'static str;

    /// Whether this backend recognizes the file or directory at `path`.
    ///
    /// Must be cheap: look at a signature or directory layout, never decode.
    fn matches(&self, path: &Path) -> bool;

    fn open(&self, path: &Path) -> Result<Box<dyn BackendHandle>, OpenError>;

    /// Component order used to name unnamed channels.
    fn channel_order(&self) -> ChannelOrder {
        ChannelOrder::Rgb
    }
}

// =============================================================================
// Serialized Access
// =============================================================================

/// A decoder handle that must not be used by two threads at the same time.
pub trait ExclusiveHandle: Send {
    fn native_geometry(&mut self) -> Result<NativeGeometry, ParseError>;

    fn tile_size(&self) -> u32 {
        DEFAULT_TILE_SIZE
    }

    fn read_region(&mut self, request: &RegionRequest) -> Result<Raster, ReadError>;

    fn associated_images(&mut self) -> AssociatedImages {
        AssociatedImages::default()
    }

    fn raw_metadata(&mut self) -> Option<serde_json::Value> {
        None
    }
}

/// Adapter serializing every call to an [`ExclusiveHandle`] through a mutex.
///
/// Reads on different handles still run in parallel.
pub struct Serialized<H> {
    inner: Mutex<H>,
    tile_size: u32,
}

impl<H: ExclusiveHandle> Serialized<H> {
    pub fn new(handle: H) -> Self {
        let tile_size = handle.tile_size();
        Self {
            inner: Mutex::new(handle),
            tile_size,
        }
    }

    fn with<T>(&self, f: impl FnOnce(&mut H) -> T) -> T {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl<H: ExclusiveHandle> BackendHandle for Serialized<H> {
    fn native_geometry(&self) -> Result<NativeGeometry, ParseError> {
        self.with(|h| h.native_geometry())
    }

    fn tile_size(&self) -> u32 {
        self.tile_size
    }

    fn read_region(&self, request: &RegionRequest) -> Result<Raster, ReadError> {
        self.with(|h| h.read_region(request))
    }

    fn associated_images(&self) -> AssociatedImages {
        self.with(|h| h.associated_images())
    }

    fn raw_metadata(&self) -> Option<serde_json::Value> {
        self.with(|h| h.raw_metadata())
    }
}
