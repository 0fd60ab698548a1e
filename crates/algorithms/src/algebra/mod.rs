//! Raster algebra
//!
//! - Band math: unary, binary and n-ary cell expressions
//! - Reclassify: range-based reclassification

mod band_math;
mod reclassify;

pub use band_math::{band_math, band_math_binary, combine, BandMathOp};
pub use reclassify::{reclassify, RangeBoundary, ReclassEntry, ReclassifyParams};
