//! Mosaic adjacent tiles into one raster

use heldet_core::raster::{Extent, Raster};
use heldet_core::{Error, Result};

use super::sample::sample_nearest;

/// Merge `tiles` onto a single grid.
///
/// The output grid uses the first tile's cell size, origin alignment and
/// CRS, and spans the union of all tile extents (or `extent` when given).
/// Where tiles overlap, the first tile holding data wins.
pub fn mosaic(tiles: &[Raster<f64>], extent: Option<Extent>) -> Result<Raster<f64>> {
    let Some(first) = tiles.first() else {
        return Err(Error::Algorithm("Mosaic needs at least one tile".into()));
    };
    let crs = first.crs().cloned();
    for tile in &tiles[1..] {
        if let (Some(a), Some(b)) = (&crs, tile.crs())
            && !a.is_equivalent(b)
        {
            return Err(Error::CrsMismatch(a.identifier(), b.identifier()));
        }
    }

    let cell = first.cell_size();
    let union = tiles
        .iter()
        .skip(1)
        .fold(first.extent(), |acc, t| acc.union(&t.extent()));
    let wanted = match extent {
        Some(e) => e.intersection(&union).ok_or_else(|| {
            Error::Algorithm("Requested extent does not overlap any tile".into())
        })?,
        None => union,
    };

    // Snap to the first tile's cell alignment
    let gt = first.transform();
    let snap_down = |v: f64, origin: f64| origin + ((v - origin) / cell + 1e-9).floor() * cell;
    let snap_up = |v: f64, origin: f64| origin + ((v - origin) / cell - 1e-9).ceil() * cell;
    let aligned = Extent::new(
        snap_down(wanted.min_x, gt.origin_x),
        snap_down(wanted.min_y, gt.origin_y),
        snap_up(wanted.max_x, gt.origin_x),
        snap_up(wanted.max_y, gt.origin_y),
    );

    let mut out: Raster<f64> = Raster::for_extent(&aligned, cell, crs)?;
    let (rows, cols) = out.shape();
    for row in 0..rows {
        for col in 0..cols {
            let (x, y) = out.cell_center(row, col);
            if let Some(v) = tiles.iter().find_map(|t| sample_nearest(t, x, y)) {
                out.set(row, col, v)?;
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use heldet_core::{GeoTransform, CRS};

    fn tile(x0: f64, value: f64, epsg: u32) -> Raster<f64> {
        let mut r = Raster::filled(4, 4, value);
        r.set_transform(GeoTransform::new(x0, 12.0, 3.0, -3.0));
        r.set_crs(Some(CRS::from_epsg(epsg)));
        r
    }

    #[test]
    fn test_side_by_side() {
        let out = mosaic(&[tile(0.0, 1.0, 32615), tile(12.0, 2.0, 32615)], None).unwrap();
        assert_eq!(out.shape(), (4, 8));
        assert_relative_eq!(out.get(0, 0).unwrap(), 1.0);
        assert_relative_eq!(out.get(0, 7).unwrap(), 2.0);
    }

    #[test]
    fn test_first_tile_wins_overlap() {
        let out = mosaic(&[tile(0.0, 1.0, 32615), tile(6.0, 2.0, 32615)], None).unwrap();
        assert_eq!(out.shape(), (4, 6));
        assert_relative_eq!(out.get(0, 3).unwrap(), 1.0);
        assert_relative_eq!(out.get(0, 5).unwrap(), 2.0);
    }

    #[test]
    fn test_gap_is_nodata() {
        let out = mosaic(&[tile(0.0, 1.0, 32615), tile(18.0, 2.0, 32615)], None).unwrap();
        assert!(out.get(0, 4).unwrap().is_nan());
    }

    #[test]
    fn test_crs_mismatch() {
        assert!(mosaic(&[tile(0.0, 1.0, 32615), tile(12.0, 2.0, 32614)], None).is_err());
    }

    #[test]
    fn test_clipped_to_extent() {
        let tiles = [tile(0.0, 1.0, 32615), tile(12.0, 2.0, 32615)];
        let out = mosaic(&tiles, Some(Extent::new(10.0, 0.0, 14.0, 12.0))).unwrap();
        assert_eq!(out.shape(), (4, 2));
        assert_relative_eq!(out.get(0, 0).unwrap(), 1.0);
        assert_relative_eq!(out.get(0, 1).unwrap(), 2.0);
    }
}
