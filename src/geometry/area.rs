//! Lightweight rectangle values for geometric queries.
//!
//! [`ImageArea`] carries signed coordinates so that intermediate results of
//! intersections and offsets never wrap. It is used to clip regions against
//! image bounds and to find the tiles a window touches.

use std::fmt;

use super::region::Region;

/// A rectangular area of an image given by its top-left corner and size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageArea {
    /// Top-left pixel `(x, y)`
    pub coord: (i64, i64),

    /// `(width, height)` in pixels
    pub size: (i64, i64),
}

impl ImageArea {
    pub const fn new(coord: (i64, i64), size: (i64, i64)) -> Self {
        Self { coord, size }
    }

    pub fn from_region(region: &Region) -> Self {
        Self::new(
            (region.left as i64, region.top as i64),
            (region.width as i64, region.height as i64),
        )
    }

    /// Convert back into a [`Region`].
    ///
    /// Returns `None` for areas with negative origin or no pixels.
    pub fn to_region(&self) -> Option<Region> {
        if self.is_empty() || self.coord.0 < 0 || self.coord.1 < 0 {
            return None;
        }
        Some(Region::new(
            u32::try_from(self.coord.0).ok()?,
            u32::try_from(self.coord.1).ok()?,
            u32::try_from(self.size.0).ok()?,
            u32::try_from(self.size.1).ok()?,
        ))
    }

    /// Area at full resolution for an area expressed at pyramid order `order`.
    pub fn from_scaled_area(area: &ImageArea, order: u32) -> Self {
        let scale = 1i64 << order;
        Self::new(
            (area.coord.0 * scale, area.coord.1 * scale),
            (area.size.0 * scale, area.size.1 * scale),
        )
    }

    /// Express this full-resolution area at pyramid order `order`.
    ///
    /// The origin is floored and the far edge ceiled, so the scaled area
    /// always covers every source pixel.
    pub fn to_scale(&self, order: u32) -> Self {
        let scale = 1i64 << order;
        let x0 = self.coord.0.div_euclid(scale);
        let y0 = self.coord.1.div_euclid(scale);
        let x1 = ceil_div(self.coord.0 + self.size.0, scale);
        let y1 = ceil_div(self.coord.1 + self.size.1, scale);
        Self::new((x0, y0), (x1 - x0, y1 - y0))
    }

    pub fn top_left(&self) -> (i64, i64) {
        self.coord
    }

    /// Bottom-right pixel, inclusive.
    pub fn bottom_right(&self) -> (i64, i64) {
        (
            self.coord.0 + self.size.0 - 1,
            self.coord.1 + self.size.1 - 1,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.size.0 <= 0 || self.size.1 <= 0
    }

    /// Whether the two areas share at least one pixel.
    pub fn intersects(&self, other: &ImageArea) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        let (sx1, sy1) = self.bottom_right();
        let (ox1, oy1) = other.bottom_right();
        let dx = sx1.min(ox1) - self.coord.0.max(other.coord.0);
        let dy = sy1.min(oy1) - self.coord.1.max(other.coord.1);
        dx >= 0 && dy >= 0
    }

    /// The overlapping part of two areas, if any.
    pub fn intersection(&self, other: &ImageArea) -> Option<ImageArea> {
        if !self.intersects(other) {
            return None;
        }
        let (sx1, sy1) = self.bottom_right();
        let (ox1, oy1) = other.bottom_right();
        let min_x = self.coord.0.max(other.coord.0);
        let min_y = self.coord.1.max(other.coord.1);
        let max_x = sx1.min(ox1);
        let max_y = sy1.min(oy1);
        Some(ImageArea::new(
            (min_x, min_y),
            (max_x - min_x + 1, max_y - min_y + 1),
        ))
    }

    /// Whether this area entirely contains `other`.
    pub fn covers(&self, other: &ImageArea) -> bool {
        self.coord.0 <= other.coord.0
            && self.coord.1 <= other.coord.1
            && self.coord.0 + self.size.0 >= other.coord.0 + other.size.0
            && self.coord.1 + self.size.1 >= other.coord.1 + other.size.1
    }
}

impl fmt::Display for ImageArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(pos: ({}, {}), size: ({}, {}))",
            self.coord.0, self.coord.1, self.size.0, self.size.1
        )
    }
}

fn ceil_div(value: i64, divisor: i64) -> i64 {
    -((-value).div_euclid(divisor))
}
