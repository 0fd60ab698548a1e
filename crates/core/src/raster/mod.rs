//! Raster data structures

mod element;
mod extent;
mod geotransform;
mod grid;
mod neighborhood;

pub use element::RasterElement;
pub use extent::Extent;
pub use geotransform::GeoTransform;
pub use grid::{Raster, RasterStatistics};
pub use neighborhood::{d8, Neighborhood};
