//! Upstream flow length
//!
//! For every cell, the length of the longest flow path from a drainage
//! divide down to that cell, following D8 directions. Cells with no inflow
//! have length 0. Diagonal steps count `sqrt(2)` cell widths.

use std::collections::VecDeque;

use ndarray::Array2;
use heldet_core::raster::{d8, Raster};
use heldet_core::{Algorithm, Error, Result};

use super::flow_direction::NODATA_DIRECTION;

/// Upstream flow length algorithm
#[derive(Debug, Clone, Default)]
pub struct FlowLength;

impl Algorithm for FlowLength {
    type Input = Raster<u8>;
    type Output = Raster<f64>;
    type Params = ();
    type Error = Error;

    fn name(&self) -> &'static str {
        "Flow Length (upstream)"
    }

    fn description(&self) -> &'static str {
        "Longest upstream flow path length to each cell"
    }

    fn execute(&self, input: Self::Input, _params: Self::Params) -> Result<Self::Output> {
        flow_length_upstream(&input)
    }
}

/// Compute upstream flow length in map units from a D8 direction raster.
///
/// Cells are visited in topological order (Kahn's algorithm), so each cell's
/// length is final once all of its donors have been processed.
pub fn flow_length_upstream(flow_dir: &Raster<u8>) -> Result<Raster<f64>> {
    let (rows, cols) = flow_dir.shape();
    let cell_size = flow_dir.cell_size();

    let receiver = |r: usize, c: usize| -> Option<(usize, usize)> {
        let dir = unsafe { flow_dir.get_unchecked(r, c) };
        if dir == NODATA_DIRECTION {
            return None;
        }
        let (nr, nc) = d8::step(r, c, dir, rows, cols)?;
        (unsafe { flow_dir.get_unchecked(nr, nc) } != NODATA_DIRECTION).then_some((nr, nc))
    };

    let mut inflow = Array2::<u8>::zeros((rows, cols));
    for r in 0..rows {
        for c in 0..cols {
            if let Some((nr, nc)) = receiver(r, c) {
                inflow[(nr, nc)] += 1;
            }
        }
    }

    let mut length = Array2::<f64>::from_elem((rows, cols), f64::NAN);
    let mut queue = VecDeque::new();
    for r in 0..rows {
        for c in 0..cols {
            if unsafe { flow_dir.get_unchecked(r, c) } == NODATA_DIRECTION {
                continue;
            }
            length[(r, c)] = 0.0;
            if inflow[(r, c)] == 0 {
                queue.push_back((r, c));
            }
        }
    }

    while let Some((r, c)) = queue.pop_front() {
        let Some((nr, nc)) = receiver(r, c) else {
            continue;
        };
        let dir = unsafe { flow_dir.get_unchecked(r, c) };
        let candidate = length[(r, c)] + d8::DISTANCES[dir as usize] * cell_size;
        if candidate > length[(nr, nc)] {
            length[(nr, nc)] = candidate;
        }
        inflow[(nr, nc)] -= 1;
        if inflow[(nr, nc)] == 0 {
            queue.push_back((nr, nc));
        }
    }

    flow_dir.with_data(length, Some(f64::NAN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use heldet_core::GeoTransform;

    #[test]
    fn test_straight_channel() {
        // One row flowing east: lengths 0, 3, 6, 9 with 3-unit cells
        let mut fd: Raster<u8> = Raster::filled(1, 4, 1);
        fd.set_transform(GeoTransform::new(0.0, 3.0, 3.0, -3.0));
        let fl = flow_length_upstream(&fd).unwrap();
        assert_relative_eq!(fl.get(0, 0).unwrap(), 0.0);
        assert_relative_eq!(fl.get(0, 3).unwrap(), 9.0);
    }

    #[test]
    fn test_longest_path_wins() {
        // (0,0) -> SE -> (1,1) <- W (1,2) <- W (1,3)
        let mut fd: Raster<u8> = Raster::filled(2, 4, 0);
        fd.set(0, 0, 8).unwrap();
        fd.set(1, 2, 5).unwrap();
        fd.set(1, 3, 5).unwrap();
        let fl = flow_length_upstream(&fd).unwrap();
        assert_relative_eq!(fl.get(1, 1).unwrap(), 2.0);
        assert_relative_eq!(fl.get(1, 2).unwrap(), 1.0);
    }

    #[test]
    fn test_diagonal_step() {
        let mut fd: Raster<u8> = Raster::filled(2, 2, 0);
        fd.set(0, 0, 8).unwrap();
        let fl = flow_length_upstream(&fd).unwrap();
        assert_relative_eq!(fl.get(1, 1).unwrap(), std::f64::consts::SQRT_2);
    }

    #[test]
    fn test_nodata_propagates() {
        let mut fd: Raster<u8> = Raster::filled(1, 3, 1);
        fd.set(0, 1, NODATA_DIRECTION).unwrap();
        let fl = flow_length_upstream(&fd).unwrap();
        assert!(fl.get(0, 1).unwrap().is_nan());
        assert_relative_eq!(fl.get(0, 2).unwrap(), 0.0);
    }
}
