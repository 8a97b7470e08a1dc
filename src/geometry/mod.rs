//! Region, tile and area geometry.
//!
//! Coordinates come in two flavours:
//!
//! - **full-resolution**: pixels of pyramid tier 0
//! - **tier-relative**: pixels of a downsampled tier, obtained by dividing
//!   full-resolution coordinates by the tier scale factor `2^level`
//!
//! [`Region::scale_to_tier`] and [`Region::scale_from_tier`] convert between
//! the two. [`ImageArea`] provides the rectangle predicates used for clipping
//! and tile lookup.

mod area;
mod region;

pub use area::ImageArea;
pub use region::{Region, Tile};
