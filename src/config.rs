//! Configuration management for wsi-window.
//!
//! This module provides:
//! - [`ReaderConfig`], the library-side settings of an [`ImageService`](crate::ImageService)
//! - The command-line interface via clap, with environment variable fallbacks
//!
//! # Example
//!
//! ```
//! use wsi_window::config::ReaderConfig;
//!
//! let config = ReaderConfig::default().with_cache_capacity(16);
//! assert!(config.validate().is_ok());
//! ```
//!
//! # Environment Variables
//!
//! Shared reader options can be set via environment variables with the `WSI_` prefix:
//!
//! - `WSI_CACHE_IMAGES` - Max images to keep open (default: 100)
//! - `WSI_TILE_SIZE` - Pyramid tile size for plain images (default: 256)
//! - `WSI_SILENT_FAIL` - Memoize open failures instead of retrying (default: false)
//! - `WSI_BACKGROUND` - Colour transparent pixels are flattened onto (default: black)
//! - `WSI_JPEG_QUALITY` - JPEG output quality (default: 80)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::format::AssociatedKind;
use crate::geometry::Region;
use crate::pyramid::DEFAULT_TILE_SIZE;
use crate::raster::{is_valid_quality, Background, OutputFormat, DEFAULT_JPEG_QUALITY};
use crate::slide::DEFAULT_HANDLE_CACHE_CAPACITY;

// =============================================================================
// Default Values
// =============================================================================

/// Smallest accepted tile size.
pub const MIN_TILE_SIZE: u32 = 16;

/// Largest accepted tile size.
pub const MAX_TILE_SIZE: u32 = 8192;

/// Default thumbnail bounding box.
pub const DEFAULT_THUMBNAIL_SIZE: u32 = 512;

// =============================================================================
// Reader Configuration
// =============================================================================

/// Settings of an image service.
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderConfig {
    /// Maximum number of images kept open
    pub cache_capacity: usize,

    /// Tile size of the pyramid built for plain images
    pub tile_size: u32,

    /// Memoize open failures as unavailable instead of reporting them
    pub silent_fail: bool,

    /// Colour that transparent pixels are flattened onto
    pub background: Background,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_HANDLE_CACHE_CAPACITY,
            tile_size: DEFAULT_TILE_SIZE,
            silent_fail: false,
            background: Background::default(),
        }
    }
}

impl ReaderConfig {
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn with_silent_fail(mut self, silent_fail: bool) -> Self {
        self.silent_fail = silent_fail;
        self
    }

    pub fn with_background(mut self, background: Background) -> Self {
        self.background = background;
        self
    }

    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_capacity == 0 {
            return Err("cache_capacity must be greater than 0".to_string());
        }

        if !(MIN_TILE_SIZE..=MAX_TILE_SIZE).contains(&self.tile_size) {
            return Err(format!(
                "tile_size must be between {} and {}",
                MIN_TILE_SIZE, MAX_TILE_SIZE
            ));
        }

        Ok(())
    }
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// wsi-window - Windowed reads from gigapixel microscopy images.
///
/// Opens slide and plain raster images, builds their resolution pyramid and
/// reads regions at the tier that best matches the requested output size.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsi-window")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the canonical metadata and pyramid of an image as JSON.
    Info(InfoConfig),

    /// Read a full-resolution region at a target output size.
    Window(WindowConfig),

    /// Read one tile of a pyramid level.
    Tile(TileConfig),

    /// Write the thumbnail, label or macro image.
    Associated(AssociatedConfig),

    /// List the registered decoder backends.
    Formats,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

/// Options shared by every command that opens an image.
#[derive(Args, Debug, Clone)]
pub struct ReaderArgs {
    /// Maximum number of images to keep open.
    #[arg(long, default_value_t = DEFAULT_HANDLE_CACHE_CAPACITY, env = "WSI_CACHE_IMAGES")]
    pub cache_images: usize,

    /// Pyramid tile size for plain images.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "WSI_TILE_SIZE")]
    pub tile_size: u32,

    /// Report unreadable images as unavailable and never retry them.
    #[arg(long, default_value_t = false, env = "WSI_SILENT_FAIL")]
    pub silent_fail: bool,

    /// Colour transparent pixels are flattened onto.
    #[arg(long, value_enum, default_value_t = Background::Black, env = "WSI_BACKGROUND")]
    pub background: Background,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl ReaderArgs {
    pub fn reader_config(&self) -> ReaderConfig {
        ReaderConfig {
            cache_capacity: self.cache_images,
            tile_size: self.tile_size,
            silent_fail: self.silent_fail,
            background: self.background,
        }
    }
}

/// Options of commands that write an image file.
#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
    /// Output file; PNG unless the extension says JPEG.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Output format, overriding the file extension.
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// JPEG quality (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "WSI_JPEG_QUALITY")]
    pub quality: u8,
}

impl OutputArgs {
    pub fn output_format(&self) -> OutputFormat {
        self.format
            .or_else(|| OutputFormat::from_path(&self.output))
            .unwrap_or(OutputFormat::Png)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !is_valid_quality(self.quality) {
            return Err("quality must be between 1 and 100".to_string());
        }
        Ok(())
    }
}

/// Plane options of commands that read pixels.
#[derive(Args, Debug, Clone)]
pub struct PlaneArgs {
    /// Channels to read, in output order (comma-separated). Defaults to all.
    #[arg(short, long, value_delimiter = ',')]
    pub channels: Option<Vec<usize>>,

    /// Focal plane.
    #[arg(short, long, default_value_t = 0)]
    pub z: u32,

    /// Time point.
    #[arg(short, long, default_value_t = 0)]
    pub t: u32,
}

#[derive(Args, Debug, Clone)]
pub struct InfoConfig {
    /// Image to inspect.
    pub path: PathBuf,

    /// Also print the flattened vendor metadata.
    #[arg(long, default_value_t = false)]
    pub raw: bool,

    /// Prefix for flattened vendor metadata keys.
    #[arg(long, default_value = "")]
    pub namespace: String,

    #[command(flatten)]
    pub reader: ReaderArgs,
}

#[derive(Args, Debug, Clone)]
pub struct WindowConfig {
    /// Image to read.
    pub path: PathBuf,

    /// Left edge of the region at full resolution.
    #[arg(short = 'x', long)]
    pub left: u32,

    /// Top edge of the region at full resolution.
    #[arg(short = 'y', long)]
    pub top: u32,

    /// Region width at full resolution.
    #[arg(long)]
    pub width: u32,

    /// Region height at full resolution.
    #[arg(long)]
    pub height: u32,

    /// Output width.
    #[arg(long)]
    pub out_width: u32,

    /// Output height.
    #[arg(long)]
    pub out_height: u32,

    /// Write the tier read without resizing it to the output size.
    #[arg(long, default_value_t = false)]
    pub no_resize: bool,

    #[command(flatten)]
    pub plane: PlaneArgs,

    #[command(flatten)]
    pub output: OutputArgs,

    #[command(flatten)]
    pub reader: ReaderArgs,
}

impl WindowConfig {
    pub fn region(&self) -> Region {
        Region::new(self.left, self.top, self.width, self.height)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err("region width and height must be greater than 0".to_string());
        }
        if self.out_width == 0 || self.out_height == 0 {
            return Err("out_width and out_height must be greater than 0".to_string());
        }
        self.output.validate()?;
        self.reader.reader_config().validate()
    }
}

#[derive(Args, Debug, Clone)]
pub struct TileConfig {
    /// Image to read.
    pub path: PathBuf,

    /// Pyramid level (0 = full resolution).
    #[arg(short, long)]
    pub level: usize,

    /// Tile column.
    #[arg(long)]
    pub tx: u32,

    /// Tile row.
    #[arg(long)]
    pub ty: u32,

    #[command(flatten)]
    pub plane: PlaneArgs,

    #[command(flatten)]
    pub output: OutputArgs,

    #[command(flatten)]
    pub reader: ReaderArgs,
}

impl TileConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.output.validate()?;
        self.reader.reader_config().validate()
    }
}

#[derive(Args, Debug, Clone)]
pub struct AssociatedConfig {
    /// Image to read.
    pub path: PathBuf,

    /// Which associated image to write.
    #[arg(short, long, value_enum, default_value_t = AssociatedKind::Thumbnail)]
    pub kind: AssociatedKind,

    /// Largest output width.
    #[arg(long, default_value_t = DEFAULT_THUMBNAIL_SIZE)]
    pub max_width: u32,

    /// Largest output height.
    #[arg(long, default_value_t = DEFAULT_THUMBNAIL_SIZE)]
    pub max_height: u32,

    #[command(flatten)]
    pub output: OutputArgs,

    #[command(flatten)]
    pub reader: ReaderArgs,
}

impl AssociatedConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_width == 0 || self.max_height == 0 {
            return Err("max_width and max_height must be greater than 0".to_string());
        }
        self.output.validate()?;
        self.reader.reader_config().validate()
    }
}

// =============================================================================
// Tests
// =============================================================================
