//! Zonal statistics over polygon zones
//!
//! Zones are polygons; a cell belongs to a zone when its center falls
//! inside the polygon.

use std::collections::BTreeMap;

use geo::{BoundingRect, Contains, MultiPolygon, Point};
use crate::maybe_rayon::*;
use heldet_core::raster::Raster;
use heldet_core::Result;

/// Cells of `raster` whose centers fall inside `zone`, as (row, col)
pub fn zone_cells<T: heldet_core::RasterElement>(zone: &MultiPolygon<f64>, raster: &Raster<T>) -> Vec<(usize, usize)> {
    let Some(bbox) = zone.bounding_rect() else {
        return Vec::new();
    };
    let (rows, cols) = raster.shape();
    let gt = raster.transform();

    // Window of candidate cells from the zone's bounding box
    let (c0, r0) = gt.geo_to_pixel(bbox.min().x, bbox.max().y);
    let (c1, r1) = gt.geo_to_pixel(bbox.max().x, bbox.min().y);
    if [c0, r0, c1, r1].iter().any(|v| v.is_nan()) {
        return Vec::new();
    }
    let col_lo = c0.min(c1).floor().max(0.0) as usize;
    let row_lo = r0.min(r1).floor().max(0.0) as usize;
    let col_hi = (c0.max(c1).ceil().max(0.0) as usize).min(cols);
    let row_hi = (r0.max(r1).ceil().max(0.0) as usize).min(rows);

    let mut cells = Vec::new();
    for row in row_lo..row_hi {
        for col in col_lo..col_hi {
            let (x, y) = raster.cell_center(row, col);
            if zone.contains(&Point::new(x, y)) {
                cells.push((row, col));
            }
        }
    }
    cells
}

/// Tabulate the area of each class of `classes` inside every zone.
///
/// Class values are truncated to integers; NoData cells are not counted.
/// Returns, per zone in input order, a map class → area in squared map
/// units. Zones covering no classified cell get an empty map.
pub fn tabulate_area(zones: &[MultiPolygon<f64>], classes: &Raster<f64>) -> Result<Vec<BTreeMap<i64, f64>>> {
    let cell_area = {
        let gt = classes.transform();
        (gt.pixel_width * gt.pixel_height).abs()
    };

    let tables = zones
        .into_par_iter()
        .map(|zone| {
            let mut table: BTreeMap<i64, f64> = BTreeMap::new();
            for (row, col) in zone_cells(zone, classes) {
                if let Some(v) = classes.value_at(row, col) {
                    *table.entry(v as i64).or_insert(0.0) += cell_area;
                }
            }
            table
        })
        .collect();

    Ok(tables)
}

/// Count and sum of valid cells of `values` inside each zone
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ZoneSummary {
    pub cells: usize,
    pub nodata_cells: usize,
    pub sum: f64,
}

/// Summarize `values` inside each zone.
pub fn zonal_summary(zones: &[MultiPolygon<f64>], values: &Raster<f64>) -> Vec<ZoneSummary> {
    zones
        .into_par_iter()
        .map(|zone| {
            let mut summary = ZoneSummary::default();
            for (row, col) in zone_cells(zone, values) {
                match values.value_at(row, col) {
                    Some(v) => {
                        summary.cells += 1;
                        summary.sum += v;
                    }
                    None => summary.nodata_cells += 1,
                }
            }
            summary
        })
        .collect()
}
