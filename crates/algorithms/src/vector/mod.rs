//! Vector analysis algorithms
//!
//! - Overlay: intersect, clip to mask, union, dissolve
//! - Rasterize: burn an attribute onto a grid
//! - Measurements: area, layer extent

mod measurements;
mod overlay;
mod rasterize;

pub use measurements::{area, layer_extent};
pub use overlay::{clip_to_mask, dissolve, intersect, union_all, MIN_PART_AREA};
pub use rasterize::rasterize;
