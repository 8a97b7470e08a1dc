//! Regions and tiles.
//!
//! A [`Region`] is expressed in full-resolution pixel coordinates unless it was
//! produced by [`Region::scale_to_tier`], in which case it is relative to that
//! tier. A [`Tile`] addresses a fixed-size cell of a tier's tile grid.

use serde::Serialize;

use crate::error::GeometryError;
use crate::pyramid::Tier;

use super::area::ImageArea;

// =============================================================================
// Region
// =============================================================================

/// Axis-aligned pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Region {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub const fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Region covering a whole image of the given size.
    pub const fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u64 {
        self.left as u64 + self.width as u64
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u64 {
        self.top as u64 + self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Shrink the region so it fits in a `width` x `height` image.
    ///
    /// The origin never moves: a region spilling over the right or bottom
    /// edge keeps `left`/`top` and loses width/height. Fails when nothing of
    /// the region remains inside the image.
    pub fn clip(&self, width: u32, height: u32) -> Result<Region, GeometryError> {
        let bounds = ImageArea::new((0, 0), (width as i64, height as i64));
        let area = ImageArea::from_region(self);
        if !self.is_empty() && bounds.covers(&area) {
            return Ok(*self);
        }
        area.intersection(&bounds)
            .and_then(|area| area.to_region())
            .filter(|clipped| clipped.left == self.left && clipped.top == self.top)
            .ok_or(GeometryError::EmptyRegion {
                left: self.left,
                top: self.top,
                width: self.width,
                height: self.height,
            })
    }

    /// Express this full-resolution region in the coordinates of `tier`.
    ///
    /// Coordinates are divided by the tier scale factor (origin floored, far
    /// edge ceiled) and the result is clipped to the tier bounds.
    pub fn scale_to_tier(&self, tier: &Tier) -> Result<Region, GeometryError> {
        if self.is_empty() {
            return Err(self.empty_error());
        }
        let scaled = ImageArea::from_region(self).to_scale(tier.level as u32);
        scaled
            .to_region()
            .ok_or_else(|| self.empty_error())?
            .clip(tier.width, tier.height)
    }

    /// Map a tier-relative region back to full-resolution coordinates.
    ///
    /// This does not clip: the far edge of a region at the border of a
    /// downsampled tier may land past the full-resolution bounds.
    pub fn scale_from_tier(&self, tier: &Tier) -> Region {
        let scaled = ImageArea::from_scaled_area(&ImageArea::from_region(self), tier.level as u32);
        Region::new(
            saturate(scaled.coord.0),
            saturate(scaled.coord.1),
            saturate(scaled.size.0),
            saturate(scaled.size.1),
        )
    }

    fn empty_error(&self) -> GeometryError {
        GeometryError::EmptyRegion {
            left: self.left,
            top: self.top,
            width: self.width,
            height: self.height,
        }
    }
}

fn saturate(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

// =============================================================================
// Tile
// =============================================================================

/// A cell of a tier's tile grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub tier: Tier,
    pub tx: u32,
    pub ty: u32,
}

impl Tile {
    /// Create a tile, checking that it lies on the tier's grid.
    pub fn new(tier: Tier, tx: u32, ty: u32) -> Result<Self, GeometryError> {
        let (max_x, max_y) = (tier.tiles_x(), tier.tiles_y());
        if tx >= max_x || ty >= max_y {
            return Err(GeometryError::TileOutOfBounds {
                level: tier.level,
                x: tx,
                y: ty,
                max_x,
                max_y,
            });
        }
        Ok(Self { tier, tx, ty })
    }

    /// Tier-relative pixel rectangle, clipped at the tier's far edges.
    pub fn region(&self) -> Region {
        let ts = self.tier.tile_size;
        let left = self.tx * ts;
        let top = self.ty * ts;
        Region::new(
            left,
            top,
            ts.min(self.tier.width - left),
            ts.min(self.tier.height - top),
        )
    }

    /// The tile's rectangle in full-resolution coordinates.
    pub fn full_resolution_region(&self) -> Region {
        self.region().scale_from_tier(&self.tier)
    }

    pub fn width(&self) -> u32 {
        self.region().width
    }

    pub fn height(&self) -> u32 {
        self.region().height
    }
}
