//! Band math operations
//!
//! Cell-by-cell raster algebra over one, two or many aligned rasters.

use ndarray::Array2;
use crate::maybe_rayon::*;
use heldet_core::raster::Raster;
use heldet_core::{Error, Result};

/// Binary operations for band math
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandMathOp {
    Add,
    Subtract,
    Multiply,
    /// Division by zero yields NoData
    Divide,
    Power,
    Min,
    Max,
}

impl BandMathOp {
    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BandMathOp::Add => a + b,
            BandMathOp::Subtract => a - b,
            BandMathOp::Multiply => a * b,
            BandMathOp::Divide => {
                if b == 0.0 {
                    f64::NAN
                } else {
                    a / b
                }
            }
            BandMathOp::Power => a.powf(b),
            BandMathOp::Min => a.min(b),
            BandMathOp::Max => a.max(b),
        }
    }
}

/// Apply a unary function to every cell in a raster.
///
/// NoData cells are preserved.
///
/// ```ignore
/// let radians = band_math(&slope_pct, |v| (v * 0.01).atan())?;
/// ```
pub fn band_math<F>(raster: &Raster<f64>, f: F) -> Result<Raster<f64>>
where
    F: Fn(f64) -> f64 + Sync + Send,
{
    combine(&[raster], |values| values[0].map(&f))
}

/// Apply a binary operation between two rasters element-wise.
///
/// NoData in either input produces NoData in the output.
pub fn band_math_binary(a: &Raster<f64>, b: &Raster<f64>, op: BandMathOp) -> Result<Raster<f64>> {
    combine(&[a, b], |values| match (values[0], values[1]) {
        (Some(va), Some(vb)) => Some(op.apply(va, vb)),
        _ => None,
    })
}

/// Evaluate `f` over the stacked cell values of several aligned rasters.
///
/// Each input contributes `None` where it holds NoData, so `f` decides how
/// missing inputs propagate. Returning `None` (or NaN) writes NoData. The
/// output takes the georeferencing of the first input.
pub fn combine<F>(inputs: &[&Raster<f64>], f: F) -> Result<Raster<f64>>
where
    F: Fn(&[Option<f64>]) -> Option<f64> + Sync + Send,
{
    let Some(first) = inputs.first() else {
        return Err(Error::Algorithm("combine needs at least one raster".into()));
    };
    let (rows, cols) = first.shape();
    for other in &inputs[1..] {
        if other.shape() != (rows, cols) {
            return Err(Error::SizeMismatch {
                er: rows,
                ec: cols,
                ar: other.rows(),
                ac: other.cols(),
            });
        }
    }

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            let mut stack = vec![None; inputs.len()];
            for (col, out) in row_data.iter_mut().enumerate() {
                for (slot, raster) in stack.iter_mut().zip(inputs) {
                    *slot = raster.value_at(row, col);
                }
                if let Some(v) = f(&stack) {
                    *out = v;
                }
            }
            row_data
        })
        .collect();

    let data = Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    first.with_data(data, Some(f64::NAN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use heldet_core::GeoTransform;

    fn make_band(value: f64) -> Raster<f64> {
        let mut r = Raster::filled(5, 5, value);
        r.set_transform(GeoTransform::new(0.0, 5.0, 1.0, -1.0));
        r
    }

    #[test]
    fn test_band_math_unary() {
        let input = make_band(100.0);
        let result = band_math(&input, |v| v.sqrt()).unwrap();
        let val = result.get(2, 2).unwrap();
        assert!((val - 10.0).abs() < 1e-10);
    }

    #[test]
    fn test_band_math_preserves_nan() {
        let mut input = make_band(100.0);
        input.set(2, 2, f64::NAN).unwrap();

        let result = band_math(&input, |v| v * 2.0).unwrap();
        assert!(result.get(2, 2).unwrap().is_nan());
    }

    #[test]
    fn test_band_math_binary_divide_by_zero() {
        let a = make_band(10.0);
        let b = make_band(0.0);

        let result = band_math_binary(&a, &b, BandMathOp::Divide).unwrap();
        assert!(result.get(2, 2).unwrap().is_nan());
    }

    #[test]
    fn test_band_math_binary_multiply() {
        let a = make_band(3.0);
        let b = make_band(7.0);

        let result = band_math_binary(&a, &b, BandMathOp::Multiply).unwrap();
        assert!((result.get(0, 0).unwrap() - 21.0).abs() < 1e-10);
    }

    #[test]
    fn test_combine_sees_nodata_as_none() {
        let mut a = make_band(2.0);
        a.set(1, 1, f64::NAN).unwrap();
        let b = make_band(5.0);

        let result = combine(&[&a, &b], |v| match v[0] {
            Some(x) => Some(x + v[1].unwrap_or(0.0)),
            None => Some(-1.0),
        })
        .unwrap();
        assert!((result.get(0, 0).unwrap() - 7.0).abs() < 1e-10);
        assert!((result.get(1, 1).unwrap() + 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_combine_shape_mismatch() {
        let a = make_band(1.0);
        let b: Raster<f64> = Raster::filled(3, 3, 1.0);
        assert!(combine(&[&a, &b], |v| v[0]).is_err());
    }
}
