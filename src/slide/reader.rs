//! Windowed reads at the best pyramid tier.
//!
//! A window is a full-resolution region plus the output size the caller
//! wants. The reader picks the coarsest tier that still has at least the
//! requested pixel density, maps the region into that tier, and asks the
//! backend for each concrete channel involved exactly once. The per-channel
//! planes are then cut into the requested bands and concatenated in request
//! order.
//!
//! ```text
//!   region (level 0) ──► most_appropriate_tier ──► scale_to_tier
//!                                                       │
//!              ┌────────────────────────────────────────┘
//!              ▼
//!   one read_region per concrete channel ──► flatten alpha
//!                                                │
//!              extract_bands + bandjoin ◄────────┘
//! ```
//!
//! No resampling happens here: the returned raster has the tier-relative
//! size of the region, which is at least the requested output size unless
//! the deepest tier is already smaller.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::{GeometryError, ImageError, ReadError};
use crate::format::{AssociatedKind, RegionRequest};
use crate::geometry::Region;
use crate::metadata::ImageMetadata;
use crate::pyramid::Tier;
use crate::raster::{Background, ColorInterpretation, Raster};

use super::handle::ImageHandle;

// =============================================================================
// Plane Selection
// =============================================================================

/// Which channels, focal plane and time point to read.
///
/// Without explicit channels every channel of the image is returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaneSelection {
    pub channels: Option<Vec<usize>>,
    pub z: u32,
    pub t: u32,
}

impl PlaneSelection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_channels(mut self, channels: Vec<usize>) -> Self {
        self.channels = Some(channels);
        self
    }

    pub fn at_z(mut self, z: u32) -> Self {
        self.z = z;
        self
    }

    pub fn at_t(mut self, t: u32) -> Self {
        self.t = t;
        self
    }
}

// =============================================================================
// WindowedReader
// =============================================================================

/// Reads windows, tiles and associated images from opened handles.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowedReader {
    background: Background,
}

impl WindowedReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Colour that transparent pixels are composited against.
    pub fn with_background(mut self, background: Background) -> Self {
        self.background = background;
        self
    }

    pub fn background(&self) -> Background {
        self.background
    }

    /// Read `region` (full-resolution coordinates) for display at
    /// `out_width` x `out_height`.
    ///
    /// The origin of the region must lie inside the image; a region spilling
    /// over the right or bottom edge is clipped. Either the whole window is
    /// returned or an error, never a partial result.
    pub fn read_window(
        &self,
        handle: &ImageHandle,
        region: &Region,
        out_width: u32,
        out_height: u32,
        selection: &PlaneSelection,
    ) -> Result<Raster, ImageError> {
        let metadata = handle.metadata()?;
        let pyramid = handle.pyramid()?;

        // Validates the output size and that the region is non-empty
        let tier = pyramid.most_appropriate_tier(region, out_width, out_height)?;
        region.clip(metadata.width, metadata.height)?;

        let channels = match &selection.channels {
            Some(channels) => channels.clone(),
            None => metadata.all_channels(),
        };
        metadata.validate_channels(&channels)?;
        metadata.validate_plane(selection.z, selection.t)?;

        let tier_region = region.scale_to_tier(tier)?;
        debug!(
            "Reading {}x{}+{}+{} of {} at level {} ({}x{}) for {}x{} output",
            region.width,
            region.height,
            region.left,
            region.top,
            handle.path().display(),
            tier.level,
            tier_region.width,
            tier_region.height,
            out_width,
            out_height
        );

        let raster = self.read_tier_region(handle, &metadata, tier, &tier_region, &channels, selection)?;
        Ok(raster.with_interpretation(interpretation(&metadata, &channels)))
    }

    /// Read tile `(tx, ty)` of pyramid level `level`.
    ///
    /// Equivalent to [`read_window`](Self::read_window) over the tile's
    /// full-resolution rectangle with the tile's pixel size as output.
    pub fn read_tile(
        &self,
        handle: &ImageHandle,
        level: usize,
        tx: u32,
        ty: u32,
        selection: &PlaneSelection,
    ) -> Result<Raster, ImageError> {
        let tile = handle.pyramid()?.tile(level, tx, ty)?;
        self.read_window(
            handle,
            &tile.full_resolution_region(),
            tile.width(),
            tile.height(),
            selection,
        )
    }

    /// Stored thumbnail, or the whole image read at the tier best matching
    /// `out_width` x `out_height` when the format has none.
    pub fn read_thumbnail(
        &self,
        handle: &ImageHandle,
        out_width: u32,
        out_height: u32,
    ) -> Result<Raster, ImageError> {
        if out_width == 0 || out_height == 0 {
            return Err(GeometryError::InvalidOutputSize {
                width: out_width,
                height: out_height,
            }
            .into());
        }

        if let Some(thumbnail) = self.read_associated(handle, AssociatedKind::Thumbnail)? {
            return Ok(thumbnail);
        }

        let metadata = handle.metadata()?;
        debug!(
            "No stored thumbnail for {}, reading whole image",
            handle.path().display()
        );
        self.read_window(
            handle,
            &Region::full(metadata.width, metadata.height),
            out_width,
            out_height,
            &PlaneSelection::all(),
        )
    }

    pub fn read_label(&self, handle: &ImageHandle) -> Result<Option<Raster>, ImageError> {
        self.read_associated(handle, AssociatedKind::Label)
    }

    /// Macro image, falling back to the overview image.
    pub fn read_macro(&self, handle: &ImageHandle) -> Result<Option<Raster>, ImageError> {
        match self.read_associated(handle, AssociatedKind::Macro)? {
            Some(raster) => Ok(Some(raster)),
            None => self.read_associated(handle, AssociatedKind::Overview),
        }
    }

    /// Decode one associated image, flattened and with its colour hint set.
    pub fn read_associated(
        &self,
        handle: &ImageHandle,
        kind: AssociatedKind,
    ) -> Result<Option<Raster>, ImageError> {
        let images = handle.associated_images();
        let Some(image) = images.get(kind) else {
            return Ok(None);
        };

        let raster = image.read()?.flatten(self.background);
        let interpretation = match raster.bands() {
            1 => ColorInterpretation::Grayscale,
            3 => ColorInterpretation::Rgb,
            _ => ColorInterpretation::Multiband,
        };
        Ok(Some(raster.with_interpretation(interpretation)))
    }

    fn read_tier_region(
        &self,
        handle: &ImageHandle,
        metadata: &ImageMetadata,
        tier: &Tier,
        region: &Region,
        channels: &[usize],
        selection: &PlaneSelection,
    ) -> Result<Raster, ReadError> {
        // Concrete channels in first-appearance order, each read once
        let mut order: Vec<usize> = Vec::new();
        for &channel in channels {
            let (concrete, _) = metadata.concrete_channel_of(channel);
            if !order.contains(&concrete) {
                order.push(concrete);
            }
        }

        let mut planes = HashMap::with_capacity(order.len());
        for concrete in order {
            let request = RegionRequest {
                x: region.left,
                y: region.top,
                width: region.width,
                height: region.height,
                level: tier.level,
                concrete_channel: concrete,
                z: selection.z,
                t: selection.t,
            };
            let plane = handle.backend().read_region(&request).map_err(|e| {
                warn!(
                    "Backend read of {} failed (level {}, channel {}): {}",
                    handle.path().display(),
                    tier.level,
                    concrete,
                    e
                );
                e
            })?;
            check_plane(&plane, &request, metadata)?;
            planes.insert(concrete, plane.flatten(self.background));
        }

        // Consecutive channels of one concrete channel are cut in one go
        let mut pieces = Vec::new();
        let mut run: Option<(usize, Vec<usize>)> = None;
        for &channel in channels {
            let (concrete, sample) = metadata.concrete_channel_of(channel);
            match &mut run {
                Some((current, samples)) if *current == concrete => samples.push(sample),
                _ => {
                    if let Some((current, samples)) = run.take() {
                        pieces.push(extract(&planes, current, &samples)?);
                    }
                    run = Some((concrete, vec![sample]));
                }
            }
        }
        if let Some((current, samples)) = run {
            pieces.push(extract(&planes, current, &samples)?);
        }

        match pieces.len() {
            1 => Ok(pieces.remove(0)),
            _ => Raster::bandjoin(&pieces),
        }
    }
}

fn extract(
    planes: &HashMap<usize, Raster>,
    concrete: usize,
    samples: &[usize],
) -> Result<Raster, ReadError> {
    let plane = planes.get(&concrete).ok_or_else(|| ReadError::Layout {
        message: format!("concrete channel {} was not read", concrete),
    })?;
    if samples.len() == plane.bands() && samples.iter().enumerate().all(|(i, &s)| i == s) {
        return Ok(plane.clone());
    }
    plane.extract_bands(samples)
}

/// Check that a backend buffer has the geometry that was asked for.
fn check_plane(
    plane: &Raster,
    request: &RegionRequest,
    metadata: &ImageMetadata,
) -> Result<(), ReadError> {
    if plane.width() != request.width || plane.height() != request.height {
        return Err(ReadError::Layout {
            message: format!(
                "backend returned {}x{} for a {}x{} request",
                plane.width(),
                plane.height(),
                request.width,
                request.height
            ),
        });
    }
    if plane.color_bands() != metadata.n_samples {
        return Err(ReadError::Layout {
            message: format!(
                "backend returned {} colour bands, expected {}",
                plane.color_bands(),
                metadata.n_samples
            ),
        });
    }
    if plane.pixel_type() != metadata.pixel_type {
        return Err(ReadError::Layout {
            message: format!(
                "backend returned {} samples, expected {}",
                plane.pixel_type(),
                metadata.pixel_type
            ),
        });
    }
    Ok(())
}

/// Colour hint for a composed window.
fn interpretation(metadata: &ImageMetadata, channels: &[usize]) -> ColorInterpretation {
    let names: Vec<Option<&str>> = channels
        .iter()
        .map(|&channel| metadata.channel_name(channel))
        .collect();
    if names == [Some("R"), Some("G"), Some("B")] {
        ColorInterpretation::Rgb
    } else if channels.len() == 1 {
        ColorInterpretation::Grayscale
    } else {
        ColorInterpretation::Multiband
    }
}

// =============================================================================
// Tests
// =============================================================================
