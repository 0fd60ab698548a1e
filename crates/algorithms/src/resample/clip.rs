//! Clip a raster to a map extent

use ndarray::s;
use heldet_core::raster::{Extent, GeoTransform, Raster};
use heldet_core::{Error, Result};

/// Cut the window of `raster` covering `extent`.
///
/// The window is snapped outward to whole source cells, so values are
/// copied without resampling.
pub fn clip_to_extent(raster: &Raster<f64>, extent: &Extent) -> Result<Raster<f64>> {
    let overlap = raster
        .extent()
        .intersection(extent)
        .ok_or_else(|| Error::Algorithm("Clip extent does not overlap the raster".into()))?;

    let gt = raster.transform();
    let (rows, cols) = raster.shape();
    let (c0, r0) = gt.geo_to_pixel(overlap.min_x, overlap.max_y);
    let (c1, r1) = gt.geo_to_pixel(overlap.max_x, overlap.min_y);

    let col_lo = (c0.min(c1) + 1e-9).floor().max(0.0) as usize;
    let row_lo = (r0.min(r1) + 1e-9).floor().max(0.0) as usize;
    let col_hi = ((c0.max(c1) - 1e-9).ceil().max(0.0) as usize).min(cols);
    let row_hi = ((r0.max(r1) - 1e-9).ceil().max(0.0) as usize).min(rows);

    if col_hi <= col_lo || row_hi <= row_lo {
        return Err(Error::Algorithm("Clip window is empty".into()));
    }

    let window = raster.data().slice(s![row_lo..row_hi, col_lo..col_hi]).to_owned();
    let (x, y) = gt.pixel_to_geo_corner(col_lo, row_lo);
    let mut out = Raster::from_array(window);
    out.set_transform(GeoTransform::new(x, y, gt.pixel_width, gt.pixel_height));
    out.set_crs(raster.crs().cloned());
    out.set_nodata(raster.nodata());
    Ok(out)
}
