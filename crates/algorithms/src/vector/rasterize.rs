//! Burn polygon attributes onto a raster grid

use heldet_core::raster::Raster;
use heldet_core::vector::FeatureCollection;
use heldet_core::Result;

use crate::statistics::zone_cells;

/// Rasterize a numeric attribute of a polygon layer onto the grid of
/// `template`.
///
/// A cell takes the value of the first feature containing its center.
/// Features whose attribute is missing or non-numeric are skipped; cells
/// covered by no feature are NoData.
pub fn rasterize(layer: &FeatureCollection, field: &str, template: &Raster<f64>) -> Result<Raster<f64>> {
    let mut out = template.like(f64::NAN);
    out.set_nodata(Some(f64::NAN));

    for feature in layer.iter() {
        let Some(value) = feature.property_ci(field).and_then(|v| v.as_f64()) else {
            continue;
        };
        let Some(poly) = feature.polygons() else { continue };
        for (row, col) in zone_cells(&poly, &out) {
            if out.value_at(row, col).is_none() {
                out.set(row, col, value)?;
            }
        }
    }
    Ok(out)
}
