//! D8 flow direction
//!
//! Each cell drains to its steepest downslope neighbour using the D8
//! (deterministic eight-node) method.
//!
//! Flow direction encoding:
//! ```text
//!   4  3  2
//!   5  0  1
//!   6  7  8
//! ```
//! 0 = pit (no outflow), 1-8 = direction to the receiving neighbour,
//! 255 = NoData.

use std::collections::VecDeque;

use ndarray::Array2;
use crate::maybe_rayon::*;
use heldet_core::raster::{d8, Raster};
use heldet_core::{Algorithm, Error, Result};

/// Direction code written to NoData cells
pub const NODATA_DIRECTION: u8 = u8::MAX;

const FLAT_TOLERANCE: f64 = 1e-9;

/// Parameters for D8 flow direction
#[derive(Debug, Clone)]
pub struct FlowDirectionParams {
    /// Cells on the raster edge or next to NoData flow outward
    pub force_edge_outflow: bool,
    /// Route flat areas toward their draining edge instead of leaving pits
    pub resolve_flats: bool,
}

impl Default for FlowDirectionParams {
    fn default() -> Self {
        Self {
            force_edge_outflow: true,
            resolve_flats: true,
        }
    }
}

/// Flow direction algorithm (D8)
#[derive(Debug, Clone, Default)]
pub struct FlowDirection;

impl Algorithm for FlowDirection {
    type Input = Raster<f64>;
    type Output = Raster<u8>;
    type Params = FlowDirectionParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Flow Direction (D8)"
    }

    fn description(&self) -> &'static str {
        "Calculate D8 flow direction from a filled DEM"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        flow_direction(&input, params)
    }
}

/// Calculate D8 flow direction from a (filled) DEM.
pub fn flow_direction(dem: &Raster<f64>, params: FlowDirectionParams) -> Result<Raster<u8>> {
    let (rows, cols) = dem.shape();
    let cell_size = dem.cell_size();

    let output_data: Vec<u8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![NODATA_DIRECTION; cols];

            for (col, out) in row_data.iter_mut().enumerate() {
                let Some(center) = dem.value_at(row, col) else {
                    continue;
                };

                if params.force_edge_outflow
                    && let Some(dir) = outward_direction(dem, row, col)
                {
                    *out = dir;
                    continue;
                }

                let mut max_drop = 0.0_f64;
                let mut best_dir = 0u8;
                for dir in 1..=8u8 {
                    let Some((nr, nc)) = d8::step(row, col, dir, rows, cols) else {
                        continue;
                    };
                    let Some(neighbor) = dem.value_at(nr, nc) else {
                        continue;
                    };
                    let drop = (center - neighbor) / (d8::DISTANCES[dir as usize] * cell_size);
                    if drop > max_drop {
                        max_drop = drop;
                        best_dir = dir;
                    }
                }
                *out = best_dir;
            }

            row_data
        })
        .collect();

    let mut dirs = Array2::from_shape_vec((rows, cols), output_data)
        .map_err(|e| Error::Other(e.to_string()))?;

    if params.resolve_flats {
        route_flats(dem, &mut dirs);
    }

    dem.with_data(dirs, Some(NODATA_DIRECTION))
}

/// Outward direction for a cell on the raster edge or beside NoData
fn outward_direction(dem: &Raster<f64>, row: usize, col: usize) -> Option<u8> {
    let (rows, cols) = dem.shape();
    let dr = if row == 0 {
        -1
    } else if row == rows - 1 {
        1
    } else {
        0
    };
    let dc = if col == 0 {
        -1
    } else if col == cols - 1 {
        1
    } else {
        0
    };
    if dr != 0 || dc != 0 {
        return direction_of(dr, dc);
    }

    (1..=8u8).find(|&dir| {
        d8::step(row, col, dir, rows, cols).is_some_and(|(r, c)| dem.value_at(r, c).is_none())
    })
}

fn direction_of(dr: isize, dc: isize) -> Option<u8> {
    (1..=8u8).find(|&d| d8::OFFSETS[d as usize] == (dr, dc))
}

/// Breadth-first routing of flat cells toward already-draining cells of
/// equal elevation. True pits keep code 0.
fn route_flats(dem: &Raster<f64>, dirs: &mut Array2<u8>) {
    let (rows, cols) = dem.shape();
    let mut queue: VecDeque<(usize, usize)> = dirs
        .indexed_iter()
        .filter(|&(_, &d)| d != 0 && d != NODATA_DIRECTION)
        .map(|((r, c), _)| (r, c))
        .collect();

    while let Some((r, c)) = queue.pop_front() {
        let z = unsafe { dem.get_unchecked(r, c) };
        for dir in 1..=8u8 {
            let Some((nr, nc)) = d8::step(r, c, dir, rows, cols) else {
                continue;
            };
            if dirs[(nr, nc)] != 0 {
                continue;
            }
            let zn = unsafe { dem.get_unchecked(nr, nc) };
            if (zn - z).abs() <= FLAT_TOLERANCE {
                dirs[(nr, nc)] = d8::opposite(dir);
                queue.push_back((nr, nc));
            }
        }
    }
}
