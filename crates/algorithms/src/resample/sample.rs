//! Point sampling of a raster at map coordinates

use heldet_core::raster::Raster;

/// Sampling kernel used when resampling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sampling {
    Nearest,
    #[default]
    Bilinear,
}

/// Value of the cell containing `(x, y)`
pub fn sample_nearest(raster: &Raster<f64>, x: f64, y: f64) -> Option<f64> {
    let (row, col) = raster.cell_at(x, y)?;
    raster.value_at(row, col)
}

/// Bilinear interpolation between the four cell centers around `(x, y)`.
///
/// NoData corners are dropped and the remaining weights renormalized.
/// Points outside the outer cell centers clamp to the edge cells.
pub fn sample_bilinear(raster: &Raster<f64>, x: f64, y: f64) -> Option<f64> {
    let (rows, cols) = raster.shape();
    if rows == 0 || cols == 0 {
        return None;
    }
    // Reject points outside the grid itself
    raster.cell_at(x, y)?;

    let (col_f, row_f) = raster.transform().geo_to_pixel(x, y);
    let fc = (col_f - 0.5).clamp(0.0, (cols - 1) as f64);
    let fr = (row_f - 0.5).clamp(0.0, (rows - 1) as f64);

    let c0 = fc.floor() as usize;
    let r0 = fr.floor() as usize;
    let c1 = (c0 + 1).min(cols - 1);
    let r1 = (r0 + 1).min(rows - 1);
    let dx = fc - c0 as f64;
    let dy = fr - r0 as f64;

    let corners = [
        (r0, c0, (1.0 - dx) * (1.0 - dy)),
        (r0, c1, dx * (1.0 - dy)),
        (r1, c0, (1.0 - dx) * dy),
        (r1, c1, dx * dy),
    ];

    let mut sum = 0.0;
    let mut weight = 0.0;
    for (r, c, w) in corners {
        if w <= 0.0 {
            continue;
        }
        if let Some(v) = raster.value_at(r, c) {
            sum += v * w;
            weight += w;
        }
    }
    (weight > 0.0).then(|| sum / weight)
}

pub(crate) fn sample(raster: &Raster<f64>, x: f64, y: f64, method: Sampling) -> Option<f64> {
    match method {
        Sampling::Nearest => sample_nearest(raster, x, y),
        Sampling::Bilinear => sample_bilinear(raster, x, y),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use heldet_core::GeoTransform;

    fn grid() -> Raster<f64> {
        let mut r = Raster::from_vec(vec![0.0, 10.0, 20.0, 30.0], 2, 2).unwrap();
        r.set_transform(GeoTransform::new(0.0, 2.0, 1.0, -1.0));
        r
    }

    #[test]
    fn test_bilinear_center() {
        // Midway between the four centers
        assert_relative_eq!(sample_bilinear(&grid(), 1.0, 1.0).unwrap(), 15.0);
    }

    #[test]
    fn test_bilinear_at_cell_center() {
        assert_relative_eq!(sample_bilinear(&grid(), 1.5, 1.5).unwrap(), 10.0);
    }

    #[test]
    fn test_bilinear_skips_nodata() {
        let mut r = grid();
        r.set(1, 1, f64::NAN).unwrap();
        assert_relative_eq!(sample_bilinear(&r, 1.0, 1.0).unwrap(), 10.0);
    }

    #[test]
    fn test_outside() {
        assert!(sample_bilinear(&grid(), 5.0, 1.0).is_none());
        assert!(sample_nearest(&grid(), -1.0, 1.0).is_none());
    }
}
