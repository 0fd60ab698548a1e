//! Slope from DEMs
//!
//! Rate of change of elevation by Horn's (1981) 3x3 method. Missing
//! neighbours (raster edge or NoData) take the center value, so every
//! valid cell gets a slope.

use ndarray::Array2;
use crate::maybe_rayon::*;
use heldet_core::raster::Raster;
use heldet_core::{Algorithm, Error, Result};

/// Units for slope output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlopeUnits {
    #[default]
    Degrees,
    /// Percent rise (100 * rise / run)
    Percent,
}

/// Parameters for slope calculation
#[derive(Debug, Clone)]
pub struct SlopeParams {
    pub units: SlopeUnits,
    /// Multiplier converting Z units into XY units
    pub z_factor: f64,
}

impl Default for SlopeParams {
    fn default() -> Self {
        Self {
            units: SlopeUnits::Degrees,
            z_factor: 1.0,
        }
    }
}

/// Slope algorithm
#[derive(Debug, Clone, Default)]
pub struct Slope;

impl Algorithm for Slope {
    type Input = Raster<f64>;
    type Output = Raster<f64>;
    type Params = SlopeParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Slope"
    }

    fn description(&self) -> &'static str {
        "Calculate slope from a DEM using Horn's method"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        slope(&input, params)
    }
}

/// Calculate slope from a DEM
///
/// ```text
/// a b c
/// d e f
/// g h i
/// ```
///
/// dz/dx = ((c + 2f + i) - (a + 2d + g)) * z_factor / (8 * cellsize)
/// dz/dy = ((g + 2h + i) - (a + 2b + c)) * z_factor / (8 * cellsize)
pub fn slope(dem: &Raster<f64>, params: SlopeParams) -> Result<Raster<f64>> {
    let (rows, cols) = dem.shape();
    let eight_cell_size = 8.0 * dem.cell_size();
    let z_factor = params.z_factor;

    let at = |row: usize, col: usize, dr: isize, dc: isize, center: f64| -> f64 {
        let r = row as isize + dr;
        let c = col as isize + dc;
        if r < 0 || c < 0 {
            return center;
        }
        dem.value_at(r as usize, c as usize).unwrap_or(center)
    };

    let output_data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];

            for (col, out) in row_data.iter_mut().enumerate() {
                let Some(e) = dem.value_at(row, col) else {
                    continue;
                };

                let a = at(row, col, -1, -1, e);
                let b = at(row, col, -1, 0, e);
                let c = at(row, col, -1, 1, e);
                let d = at(row, col, 0, -1, e);
                let f = at(row, col, 0, 1, e);
                let g = at(row, col, 1, -1, e);
                let h = at(row, col, 1, 0, e);
                let i = at(row, col, 1, 1, e);

                let dz_dx = ((c + 2.0 * f + i) - (a + 2.0 * d + g)) * z_factor / eight_cell_size;
                let dz_dy = ((g + 2.0 * h + i) - (a + 2.0 * b + c)) * z_factor / eight_cell_size;
                let rise = (dz_dx * dz_dx + dz_dy * dz_dy).sqrt();

                *out = match params.units {
                    SlopeUnits::Degrees => rise.atan().to_degrees(),
                    SlopeUnits::Percent => rise * 100.0,
                };
            }

            row_data
        })
        .collect();

    let data = Array2::from_shape_vec((rows, cols), output_data)
        .map_err(|e| Error::Other(e.to_string()))?;
    dem.with_data(data, Some(f64::NAN))
}
