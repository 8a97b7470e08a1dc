//! Resolution pyramid model and tier selection.
//!
//! A pyramid is an ordered list of tiers. Tier 0 is the full-resolution
//! image; each following tier halves both dimensions, rounding half away from
//! zero (for pixel counts this is `ceil(n / 2)`). Because halving always
//! rounds up, the size of tier `k` equals `ceil(size / 2^k)`, which keeps
//! tier-relative and full-resolution coordinates exactly convertible.
//!
//! # Example
//!
//! ```
//! use wsi_window::pyramid::Pyramid;
//! use wsi_window::geometry::Region;
//!
//! let pyramid = Pyramid::build(10_000, 7_000, 256).unwrap();
//! assert_eq!(pyramid.n_levels(), 8);
//!
//! let region = Region::new(42_872, 123_655, 528, 455);
//! let tier = pyramid.most_appropriate_tier(&region, 256, 256).unwrap();
//! assert_eq!(tier.level, 1);
//! ```

use serde::Serialize;

use crate::error::GeometryError;
use crate::geometry::{Region, Tile};

/// Default tile edge length in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

// =============================================================================
// Tier
// =============================================================================

/// One resolution level of a pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Tier {
    /// Level index (0 = full resolution)
    pub level: usize,

    /// Width of this tier in pixels
    pub width: u32,

    /// Height of this tier in pixels
    pub height: u32,

    /// Tile edge length, identical for every tier of a pyramid
    pub tile_size: u32,
}

impl Tier {
    /// Scale factor relative to tier 0 (`2^level`).
    pub fn factor(&self) -> u32 {
        1u32 << self.level
    }

    /// Downsample factor as a float, for display and comparisons.
    pub fn downsample(&self) -> f64 {
        self.factor() as f64
    }

    /// Number of tile columns.
    pub fn tiles_x(&self) -> u32 {
        self.width.div_ceil(self.tile_size)
    }

    /// Number of tile rows.
    pub fn tiles_y(&self) -> u32 {
        self.height.div_ceil(self.tile_size)
    }

    pub fn tile_count(&self) -> u64 {
        self.tiles_x() as u64 * self.tiles_y() as u64
    }

    /// Tier-relative rectangle of tile `(tx, ty)`, or `None` off the grid.
    pub fn tile_region(&self, tx: u32, ty: u32) -> Option<Region> {
        Tile::new(*self, tx, ty).ok().map(|tile| tile.region())
    }
}

// =============================================================================
// Pyramid
// =============================================================================

/// Ordered list of tiers, tier 0 first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pyramid {
    tiers: Vec<Tier>,
}

impl Pyramid {
    /// Build a pyramid from full-resolution dimensions and a tile size.
    ///
    /// Halving continues until a tier fits in a single tile on both axes;
    /// one further sub-tile tier is then appended and construction stops.
    /// A 10000x7000 image with 256 px tiles therefore yields 8 tiers, the
    /// last being 79x55.
    pub fn build(width: u32, height: u32, tile_size: u32) -> Result<Self, GeometryError> {
        if width == 0 || height == 0 || tile_size == 0 {
            return Err(GeometryError::InvalidDimensions {
                width,
                height,
                tile_size,
            });
        }

        let mut tiers = Vec::new();
        let (mut w, mut h) = (width, height);
        let mut previous_fits = false;
        loop {
            tiers.push(Tier {
                level: tiers.len(),
                width: w,
                height: h,
                tile_size,
            });
            if previous_fits {
                break;
            }
            previous_fits = w <= tile_size && h <= tile_size;
            w = half(w);
            h = half(h);
        }

        Ok(Self { tiers })
    }

    pub fn n_levels(&self) -> usize {
        self.tiers.len()
    }

    pub fn max_level(&self) -> usize {
        self.tiers.len() - 1
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    /// Full-resolution tier.
    pub fn base(&self) -> &Tier {
        &self.tiers[0]
    }

    pub fn tier(&self, level: usize) -> Result<&Tier, GeometryError> {
        self.tiers.get(level).ok_or(GeometryError::InvalidLevel {
            level,
            max_levels: self.tiers.len(),
        })
    }

    pub fn tile_size(&self) -> u32 {
        self.base().tile_size
    }

    /// Tile `(tx, ty)` of tier `level`.
    pub fn tile(&self, level: usize, tx: u32, ty: u32) -> Result<Tile, GeometryError> {
        Tile::new(*self.tier(level)?, tx, ty)
    }

    /// Pick the lowest-resolution tier that still provides at least the
    /// pixel density asked for, so a window is never upsampled.
    ///
    /// With `f = max(region.width / out_width, region.height / out_height)`
    /// clamped to at least 1, the level is `floor(log2(f))` clamped to the
    /// pyramid. The comparison is done in integers so that exact powers of
    /// two select their tier without floating-point drift.
    pub fn most_appropriate_tier(
        &self,
        region: &Region,
        out_width: u32,
        out_height: u32,
    ) -> Result<&Tier, GeometryError> {
        if out_width == 0 || out_height == 0 {
            return Err(GeometryError::InvalidOutputSize {
                width: out_width,
                height: out_height,
            });
        }
        if region.is_empty() {
            return Err(GeometryError::EmptyRegion {
                left: region.left,
                top: region.top,
                width: region.width,
                height: region.height,
            });
        }

        // f >= 2^k  <=>  width >= out_width * 2^k  or  height >= out_height * 2^k
        let (rw, rh) = (region.width as u64, region.height as u64);
        let (ow, oh) = (out_width as u64, out_height as u64);
        let mut level = 0;
        while level < self.max_level() {
            let next = (level + 1) as u32;
            if rw >= ow << next || rh >= oh << next {
                level += 1;
            } else {
                break;
            }
        }

        Ok(&self.tiers[level])
    }
}

/// Build a pyramid, see [`Pyramid::build`].
pub fn build_pyramid(width: u32, height: u32, tile_size: u32) -> Result<Pyramid, GeometryError> {
    Pyramid::build(width, height, tile_size)
}

/// Half a pixel count, rounding half away from zero.
fn half(value: u32) -> u32 {
    value.div_ceil(2)
}
