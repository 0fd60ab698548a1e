//! Raster reclassification
//!
//! Map value ranges onto class values.

use ndarray::Array2;
use crate::maybe_rayon::*;
use heldet_core::raster::Raster;
use heldet_core::{Error, Result};

/// A reclassification entry mapping an input range to an output value
#[derive(Debug, Clone)]
pub struct ReclassEntry {
    pub min: f64,
    pub max: f64,
    pub value: f64,
}

impl ReclassEntry {
    pub fn new(min: f64, max: f64, value: f64) -> Self {
        Self { min, max, value }
    }
}

/// How range boundaries are matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RangeBoundary {
    /// `min <= v < max`
    #[default]
    LowerInclusive,
    /// `min <= v <= max`, except that a `min` equal to the previous entry's
    /// `max` is exclusive. With ranges `0-8` and `8-100`, 8 falls in the
    /// first class.
    UpperInclusive,
}

/// Parameters for reclassification
#[derive(Debug, Clone)]
pub struct ReclassifyParams {
    /// Reclassification table, sorted by min value
    pub classes: Vec<ReclassEntry>,
    /// Value for cells that don't match any class (NaN writes NoData)
    pub default_value: f64,
    pub boundary: RangeBoundary,
}

impl Default for ReclassifyParams {
    fn default() -> Self {
        Self {
            classes: Vec::new(),
            default_value: f64::NAN,
            boundary: RangeBoundary::LowerInclusive,
        }
    }
}

fn classify(v: f64, classes: &[ReclassEntry], boundary: RangeBoundary) -> Option<f64> {
    let mut prev_max: Option<f64> = None;
    for entry in classes {
        let hit = match boundary {
            RangeBoundary::LowerInclusive => v >= entry.min && v < entry.max,
            RangeBoundary::UpperInclusive => {
                let lower_ok = if prev_max == Some(entry.min) {
                    v > entry.min
                } else {
                    v >= entry.min
                };
                lower_ok && v <= entry.max
            }
        };
        if hit {
            return Some(entry.value);
        }
        prev_max = Some(entry.max);
    }
    None
}

/// Reclassify raster values based on a classification table.
///
/// NoData cells stay NoData. Cells matching no class get `default_value`.
pub fn reclassify(raster: &Raster<f64>, params: ReclassifyParams) -> Result<Raster<f64>> {
    let (rows, cols) = raster.shape();
    let classes = &params.classes;
    let default = params.default_value;

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                if let Some(v) = raster.value_at(row, col) {
                    *out = classify(v, classes, params.boundary).unwrap_or(default);
                }
            }
            row_data
        })
        .collect();

    let data = Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    raster.with_data(data, Some(f64::NAN))
}
