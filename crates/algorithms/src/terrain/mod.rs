//! Terrain analysis algorithms

mod slope;

pub use slope::{slope, Slope, SlopeParams, SlopeUnits};
