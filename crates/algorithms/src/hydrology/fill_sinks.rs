//! Depression filling with an optional maximum fill depth
//!
//! Depressions are first filled to their spill elevation with the
//! Priority-Flood algorithm (Barnes et al., 2014). When a `z_limit` is set,
//! every connected depression whose deepest fill exceeds the limit is
//! restored to its original surface, so only shallow noise pits are removed.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

use ndarray::Array2;
use heldet_core::raster::{d8, Raster};
use heldet_core::{Algorithm, Error, Result};

#[derive(Debug, Clone, Copy)]
struct Cell {
    elevation: f64,
    row: usize,
    col: usize,
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.elevation == other.elevation
    }
}

impl Eq for Cell {}

impl PartialOrd for Cell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cell {
    // Reversed so the max-heap pops the lowest cell first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .elevation
            .partial_cmp(&self.elevation)
            .unwrap_or(Ordering::Equal)
    }
}

/// Parameters for sink filling
#[derive(Debug, Clone, Default)]
pub struct FillSinksParams {
    /// Maximum depth of a depression that will be filled, in Z units.
    /// `None` fills every depression.
    pub z_limit: Option<f64>,
}

/// Sink filling algorithm
#[derive(Debug, Clone, Default)]
pub struct FillSinks;

impl Algorithm for FillSinks {
    type Input = Raster<f64>;
    type Output = Raster<f64>;
    type Params = FillSinksParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Fill Sinks"
    }

    fn description(&self) -> &'static str {
        "Fill depressions no deeper than a z-limit using Priority-Flood"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        fill_sinks(&input, params)
    }
}

/// Fill sinks in a DEM.
///
/// Cells on the raster border and cells next to NoData are outlets. Filled
/// areas are flat at their spill elevation; flow routing across them is left
/// to flow direction's flat resolution.
pub fn fill_sinks(dem: &Raster<f64>, params: FillSinksParams) -> Result<Raster<f64>> {
    if let Some(z) = params.z_limit
        && (z.is_nan() || z < 0.0)
    {
        return Err(Error::InvalidParameter {
            name: "z_limit",
            value: z.to_string(),
            reason: "must be non-negative".into(),
        });
    }

    let (rows, cols) = dem.shape();
    let is_valid = |r: usize, c: usize| dem.value_at(r, c).is_some();

    let mut filled = Array2::<f64>::from_elem((rows, cols), f64::NAN);
    let mut visited = Array2::<bool>::from_elem((rows, cols), false);
    let mut heap = BinaryHeap::new();

    for row in 0..rows {
        for col in 0..cols {
            let Some(z) = dem.value_at(row, col) else {
                visited[(row, col)] = true;
                continue;
            };
            let on_edge = row == 0 || col == 0 || row == rows - 1 || col == cols - 1;
            let near_nodata = !on_edge
                && (1..=8u8).any(|dir| {
                    d8::step(row, col, dir, rows, cols).is_some_and(|(r, c)| !is_valid(r, c))
                });
            if on_edge || near_nodata {
                visited[(row, col)] = true;
                filled[(row, col)] = z;
                heap.push(Cell {
                    elevation: z,
                    row,
                    col,
                });
            }
        }
    }

    while let Some(cell) = heap.pop() {
        for dir in 1..=8u8 {
            let Some((nr, nc)) = d8::step(cell.row, cell.col, dir, rows, cols) else {
                continue;
            };
            if visited[(nr, nc)] {
                continue;
            }
            visited[(nr, nc)] = true;
            let z = unsafe { dem.get_unchecked(nr, nc) };
            let level = z.max(cell.elevation);
            filled[(nr, nc)] = level;
            heap.push(Cell {
                elevation: level,
                row: nr,
                col: nc,
            });
        }
    }

    if let Some(z_limit) = params.z_limit {
        restore_deep_depressions(dem, &mut filled, z_limit);
    }

    dem.with_data(filled, Some(f64::NAN))
}

/// Undo the fill of every 8-connected depression deeper than `z_limit`.
fn restore_deep_depressions(dem: &Raster<f64>, filled: &mut Array2<f64>, z_limit: f64) {
    let (rows, cols) = dem.shape();
    let raised = |r: usize, c: usize, filled: &Array2<f64>| {
        dem.value_at(r, c)
            .is_some_and(|z| filled[(r, c)] > z)
    };

    let mut seen = Array2::<bool>::from_elem((rows, cols), false);
    let mut queue = VecDeque::new();
    let mut members = Vec::new();

    for row in 0..rows {
        for col in 0..cols {
            if seen[(row, col)] || !raised(row, col, filled) {
                continue;
            }
            members.clear();
            seen[(row, col)] = true;
            queue.push_back((row, col));
            let mut depth = 0.0_f64;

            while let Some((r, c)) = queue.pop_front() {
                let z = unsafe { dem.get_unchecked(r, c) };
                depth = depth.max(filled[(r, c)] - z);
                members.push((r, c));
                for dir in 1..=8u8 {
                    if let Some((nr, nc)) = d8::step(r, c, dir, rows, cols)
                        && !seen[(nr, nc)]
                        && raised(nr, nc, filled)
                    {
                        seen[(nr, nc)] = true;
                        queue.push_back((nr, nc));
                    }
                }
            }

            if depth > z_limit {
                for &(r, c) in &members {
                    filled[(r, c)] = unsafe { dem.get_unchecked(r, c) };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use heldet_core::GeoTransform;

    fn bowl(pit_depth: f64) -> Raster<f64> {
        let mut dem = Raster::filled(5, 5, 10.0);
        dem.set_transform(GeoTransform::new(0.0, 5.0, 1.0, -1.0));
        dem.set(2, 2, 10.0 - pit_depth).unwrap();
        dem
    }

    #[test]
    fn test_fills_single_pit() {
        let filled = fill_sinks(&bowl(2.0), FillSinksParams::default()).unwrap();
        assert_relative_eq!(filled.get(2, 2).unwrap(), 10.0);
    }

    #[test]
    fn test_z_limit_keeps_deep_pit() {
        let params = FillSinksParams { z_limit: Some(0.3048) };
        let filled = fill_sinks(&bowl(2.0), params).unwrap();
        assert_relative_eq!(filled.get(2, 2).unwrap(), 8.0);
    }

    #[test]
    fn test_z_limit_fills_shallow_pit() {
        let params = FillSinksParams { z_limit: Some(0.3048) };
        let filled = fill_sinks(&bowl(0.2), params).unwrap();
        assert_relative_eq!(filled.get(2, 2).unwrap(), 10.0);
    }

    #[test]
    fn test_never_lowers_surface() {
        let mut dem = Raster::new(6, 6);
        for r in 0..6 {
            for c in 0..6 {
                dem.set(r, c, ((r * 7 + c * 3) % 5) as f64).unwrap();
            }
        }
        let filled = fill_sinks(&dem, FillSinksParams::default()).unwrap();
        for r in 0..6 {
            for c in 0..6 {
                assert!(filled.get(r, c).unwrap() >= dem.get(r, c).unwrap());
            }
        }
    }

    #[test]
    fn test_nodata_neighbours_drain() {
        let mut dem = bowl(2.0);
        dem.set(1, 2, f64::NAN).unwrap();
        let filled = fill_sinks(&dem, FillSinksParams::default()).unwrap();
        assert_relative_eq!(filled.get(2, 2).unwrap(), 8.0);
        assert!(filled.get(1, 2).unwrap().is_nan());
    }
}
