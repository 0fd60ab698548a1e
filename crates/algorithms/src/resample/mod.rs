//! Raster resampling
//!
//! - Clip: cut a window without resampling
//! - Warp: resample onto a new grid, optionally in another CRS
//! - Mosaic: merge tiles onto one grid

mod clip;
mod mosaic;
mod sample;
mod warp;

pub use clip::clip_to_extent;
pub use mosaic::mosaic;
pub use sample::{sample_bilinear, sample_nearest, Sampling};
pub use warp::{warp, WarpParams};
