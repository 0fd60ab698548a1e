//! Statistical analysis algorithms for raster data
//!
//! - **focal**: Moving window (focal) statistics
//! - **zonal**: Tabulated areas and summaries inside polygon zones

pub mod focal;
pub mod zonal;

pub use focal::{focal_statistics, FocalParams, FocalStatistic};
pub use zonal::{tabulate_area, zonal_summary, zone_cells, ZoneSummary};
