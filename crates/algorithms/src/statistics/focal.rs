//! Focal (moving window) statistics
//!
//! Statistics over a rectangular window centered on each cell. NoData
//! cells inside the window are ignored; a cell gets a value whenever at
//! least one cell of its window holds data.

use ndarray::Array2;
use crate::maybe_rayon::*;
use heldet_core::raster::{Neighborhood, Raster};
use heldet_core::{Error, Result};

/// Available focal statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocalStatistic {
    Mean,
    Min,
    Max,
    Sum,
}

/// Parameters for focal statistics
#[derive(Debug, Clone)]
pub struct FocalParams {
    pub neighborhood: Neighborhood,
    pub statistic: FocalStatistic,
}

impl Default for FocalParams {
    fn default() -> Self {
        Self {
            neighborhood: Neighborhood::RECT_3X3,
            statistic: FocalStatistic::Mean,
        }
    }
}

/// Compute focal statistics on a raster
pub fn focal_statistics(raster: &Raster<f64>, params: FocalParams) -> Result<Raster<f64>> {
    if params.neighborhood.rows == 0 || params.neighborhood.cols == 0 {
        return Err(Error::Algorithm("Focal window must be at least 1x1".into()));
    }

    let (rows, cols) = raster.shape();
    let offsets = params.neighborhood.offsets();

    let output_data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];

            for (col, out) in row_data.iter_mut().enumerate() {
                let mut count = 0usize;
                let mut acc = match params.statistic {
                    FocalStatistic::Mean | FocalStatistic::Sum => 0.0,
                    FocalStatistic::Min => f64::INFINITY,
                    FocalStatistic::Max => f64::NEG_INFINITY,
                };

                for &(dr, dc) in &offsets {
                    let nr = row as isize + dr;
                    let nc = col as isize + dc;
                    if nr < 0 || nc < 0 {
                        continue;
                    }
                    let Some(v) = raster.value_at(nr as usize, nc as usize) else {
                        continue;
                    };
                    count += 1;
                    acc = match params.statistic {
                        FocalStatistic::Mean | FocalStatistic::Sum => acc + v,
                        FocalStatistic::Min => acc.min(v),
                        FocalStatistic::Max => acc.max(v),
                    };
                }

                if count > 0 {
                    *out = match params.statistic {
                        FocalStatistic::Mean => acc / count as f64,
                        _ => acc,
                    };
                }
            }

            row_data
        })
        .collect();

    let data = Array2::from_shape_vec((rows, cols), output_data)
        .map_err(|e| Error::Other(e.to_string()))?;
    raster.with_data(data, Some(f64::NAN))
}
