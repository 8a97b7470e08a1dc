//! Canonical image metadata.
//!
//! [`ImageMetadata`] is the format-independent description of an image that
//! every read is validated against. It is built once per opened handle by
//! [`extract_metadata`] from the backend's [`NativeGeometry`] and raw
//! metadata tree.
//!
//! Raster channels are addressed by a flat index `c`. Each concrete channel
//! carries `n_samples` samples, so `c` maps to concrete channel
//! `c / n_samples` and sample `c % n_samples`.
//!
//! [`NativeGeometry`]: crate::format::NativeGeometry

use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::{Serialize, Serializer};

use crate::error::GeometryError;
use crate::format::AssociatedKind;
use crate::raster::PixelType;

mod extractor;
pub mod tree;

pub use extractor::{extract_metadata, parse_datetime};

// =============================================================================
// Channel Descriptors
// =============================================================================

/// Display colour of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl ChannelColor {
    pub const RED: ChannelColor = ChannelColor::new(255, 0, 0);
    pub const GREEN: ChannelColor = ChannelColor::new(0, 255, 0);
    pub const BLUE: ChannelColor = ChannelColor::new(0, 0, 255);
    pub const CYAN: ChannelColor = ChannelColor::new(0, 255, 255);
    pub const MAGENTA: ChannelColor = ChannelColor::new(255, 0, 255);
    pub const YELLOW: ChannelColor = ChannelColor::new(255, 255, 0);
    pub const WHITE: ChannelColor = ChannelColor::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse a colour name, single-letter component name or `#rrggbb`.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if let Some(hex) = value.strip_prefix('#') {
            if !hex.is_ascii() {
                return None;
            }
            // #aarrggbb
            let hex = if hex.len() == 8 { &hex[2..] } else { hex };
            if hex.len() != 6 {
                return None;
            }
            let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
            return Some(Self::new(channel(0)?, channel(2)?, channel(4)?));
        }
        match value.to_ascii_lowercase().as_str() {
            "r" | "red" => Some(Self::RED),
            "g" | "green" => Some(Self::GREEN),
            "b" | "blue" => Some(Self::BLUE),
            "c" | "cyan" => Some(Self::CYAN),
            "m" | "magenta" => Some(Self::MAGENTA),
            "y" | "yellow" => Some(Self::YELLOW),
            "white" | "gray" | "grey" => Some(Self::WHITE),
            _ => None,
        }
    }
}

impl fmt::Display for ChannelColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl Serialize for ChannelColor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One addressable raster channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelInfo {
    /// Flat channel index `concrete_channel * n_samples + sample`
    pub index: usize,
    pub name: Option<String>,
    pub color: Option<ChannelColor>,
    pub emission_wavelength: Option<f64>,
    pub excitation_wavelength: Option<f64>,
}

// =============================================================================
// Descriptive Fields
// =============================================================================

/// Physical length with its unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhysicalSize {
    pub value: f64,
    pub unit: String,
}

impl PhysicalSize {
    pub fn micrometers(value: f64) -> Self {
        Self {
            value,
            unit: "µm".to_string(),
        }
    }
}

/// Size of an associated image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AssociatedInfo {
    pub width: u32,
    pub height: u32,
    pub n_channels: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssociatedMetadata {
    pub thumbnail: Option<AssociatedInfo>,
    pub label: Option<AssociatedInfo>,
    #[serde(rename = "macro")]
    pub macro_image: Option<AssociatedInfo>,
    pub overview: Option<AssociatedInfo>,
}

impl AssociatedMetadata {
    pub fn get(&self, kind: AssociatedKind) -> Option<&AssociatedInfo> {
        match kind {
            AssociatedKind::Thumbnail => self.thumbnail.as_ref(),
            AssociatedKind::Label => self.label.as_ref(),
            AssociatedKind::Macro => self.macro_image.as_ref(),
            AssociatedKind::Overview => self.overview.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ObjectiveInfo {
    pub nominal_magnification: Option<f64>,
    pub calibrated_magnification: Option<f64>,
}

// =============================================================================
// ImageMetadata
// =============================================================================

/// Format-independent description of an image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageMetadata {
    /// Name of the backend that opened the image
    pub format: String,

    pub width: u32,
    pub height: u32,
    pub n_concrete_channels: usize,
    pub n_samples: usize,
    pub significant_bits: u32,
    pub pixel_type: PixelType,

    /// Number of focal planes
    pub depth: u32,

    /// Number of time points
    pub duration: u32,
    pub frame_rate: Option<f64>,

    pub physical_size_x: Option<PhysicalSize>,
    pub physical_size_y: Option<PhysicalSize>,
    pub physical_size_z: Option<PhysicalSize>,

    pub channels: Vec<ChannelInfo>,
    pub associated: AssociatedMetadata,

    pub acquisition_datetime: Option<DateTime<FixedOffset>>,
    pub objective: ObjectiveInfo,
    pub microscope_model: Option<String>,
}

impl ImageMetadata {
    /// Total number of addressable raster channels.
    pub fn n_channels(&self) -> usize {
        self.n_concrete_channels * self.n_samples
    }

    /// `(concrete channel, sample)` of a flat channel index.
    pub fn concrete_channel_of(&self, channel: usize) -> (usize, usize) {
        (channel / self.n_samples, channel % self.n_samples)
    }

    /// All flat channel indexes, in order.
    pub fn all_channels(&self) -> Vec<usize> {
        (0..self.n_channels()).collect()
    }

    pub fn validate_channels(&self, channels: &[usize]) -> Result<(), GeometryError> {
        if channels.is_empty() {
            return Err(GeometryError::NoChannels);
        }
        let max = self.n_channels();
        match channels.iter().find(|&&c| c >= max) {
            Some(&index) => Err(GeometryError::InvalidChannel { index, max }),
            None => Ok(()),
        }
    }

    /// Check a focal plane and a time point.
    pub fn validate_plane(&self, z: u32, t: u32) -> Result<(), GeometryError> {
        if z >= self.depth {
            return Err(GeometryError::InvalidPlane {
                axis: "z",
                index: z,
                max: self.depth,
            });
        }
        if t >= self.duration {
            return Err(GeometryError::InvalidPlane {
                axis: "t",
                index: t,
                max: self.duration,
            });
        }
        Ok(())
    }

    pub fn channel(&self, index: usize) -> Option<&ChannelInfo> {
        self.channels.get(index)
    }

    pub fn channel_name(&self, index: usize) -> Option<&str> {
        self.channel(index)?.name.as_deref()
    }
}
