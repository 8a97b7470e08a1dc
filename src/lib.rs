//! # wsi-window
//!
//! Windowed, multi-resolution reads from gigapixel microscopy images.
//!
//! Whole slide and other microscopy images are far too large to decode
//! whole. This library opens them through pluggable decoder backends,
//! describes their resolution pyramid, and reads any region at the coarsest
//! pyramid tier that still satisfies the requested output size.
//!
//! ## Features
//!
//! - **Format registry**: ordered decoder backends, first match wins
//! - **Canonical metadata**: dimensions, channels, physical sizes and
//!   acquisition details extracted from vendor metadata trees
//! - **Tier selection**: windows are never upsampled and never read at more
//!   detail than needed
//! - **Band composition**: channel selections are read once per stored plane
//!   and reassembled in request order
//! - **Handle cache**: single-flight opens keyed by canonical path with LRU
//!   eviction
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`mod@format`] - Decoder backend traits, format detection and registry
//! - [`metadata`] - Canonical metadata and vendor tree lookup
//! - [`pyramid`] - Resolution tiers and tier selection
//! - [`geometry`] - Regions, tiles and area arithmetic
//! - [`raster`] - Pixel buffers, band operations and encoding
//! - [`slide`] - Image handles, the handle cache and the windowed reader
//! - [`service`] - The service tying cache and reader together
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use wsi_window::{ImageService, PlaneSelection, ReaderConfig};
//!
//! let service = ImageService::new(&ReaderConfig::default());
//! let handle = service.open_or_get("scans/sample.tif")?;
//!
//! // Tile (3, 2) of level 1
//! let tile = service.read_tile(&handle, 1, 3, 2, &PlaneSelection::all())?;
//!
//! // The same pixels through a window
//! let pyramid = service.get_pyramid(&handle)?;
//! let rect = pyramid.tile(1, 3, 2)?.full_resolution_region();
//! let window = service.read_window(&handle, &rect, tile.width(), tile.height(), &PlaneSelection::all())?;
//! assert_eq!(tile, window);
//! # Ok::<(), wsi_window::ImageError>(())
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod geometry;
pub mod metadata;
pub mod pyramid;
pub mod raster;
pub mod service;
pub mod slide;

// Re-export commonly used types
pub use config::{Cli, Command, ReaderConfig};
pub use error::{
    EncodeError, ErrorClass, GeometryError, ImageError, OpenError, ParseError, ReadError,
};
pub use format::{
    AssociatedImage, AssociatedImages, AssociatedKind, BackendHandle, ChannelOrder,
    DecoderBackend, ExclusiveHandle, FormatRegistry, NativeChannel, NativeGeometry,
    PlainImageBackend, RegionRequest, Serialized,
};
pub use geometry::{ImageArea, Region, Tile};
pub use metadata::{ChannelColor, ChannelInfo, ImageMetadata, PhysicalSize};
pub use pyramid::{build_pyramid, Pyramid, Tier, DEFAULT_TILE_SIZE};
pub use raster::{
    Background, ColorInterpretation, OutputFormat, PixelType, Raster, RasterEncoder,
    DEFAULT_JPEG_QUALITY,
};
pub use service::ImageService;
pub use slide::{HandleCache, ImageHandle, PlaneSelection, WindowedReader};
