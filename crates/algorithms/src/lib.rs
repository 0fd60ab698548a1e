//! # heldet Algorithms
//!
//! Raster and vector algorithms behind the HEL determination pipeline.
//!
//! ## Available Algorithm Categories
//!
//! - **terrain**: Slope
//! - **hydrology**: Fill sinks, flow direction, upstream flow length
//! - **statistics**: Focal statistics, zonal tabulation
//! - **algebra**: Band math, reclassification
//! - **resample**: Clip, warp, mosaic
//! - **vector**: Intersect, dissolve, rasterize, area

mod maybe_rayon;

pub mod algebra;
pub mod hydrology;
pub mod resample;
pub mod statistics;
pub mod terrain;
pub mod vector;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::algebra::{
        band_math, band_math_binary, combine, reclassify, BandMathOp, RangeBoundary,
        ReclassEntry, ReclassifyParams,
    };
    pub use crate::hydrology::{
        fill_sinks, flow_direction, flow_length_upstream, FillSinks, FillSinksParams,
        FlowDirection, FlowDirectionParams, FlowLength,
    };
    pub use crate::resample::{clip_to_extent, mosaic, warp, Sampling, WarpParams};
    pub use crate::statistics::{
        focal_statistics, tabulate_area, zonal_summary, FocalParams, FocalStatistic,
    };
    pub use crate::terrain::{slope, Slope, SlopeParams, SlopeUnits};
    pub use crate::vector::{clip_to_mask, dissolve, intersect, rasterize, union_all};
    pub use heldet_core::prelude::*;
}
