//! DEM preparation
//!
//! Brings an elevation source onto a projected grid matching the field
//! layer, clipped to the fields' bounding box buffered by 500 feet:
//!
//! - local rasters must be projected, in feet or meters, and no coarser
//!   than 3.1 m; finer rasters are resampled to 3 map units (bilinear)
//! - local tiles are validated, clipped and mosaicked first
//! - geographic image services are queried with the buffered box in WGS84
//!   and the result projected onto the field CRS at 3 map units

use std::path::Path;

use heldet_algorithms::resample::{clip_to_extent, mosaic, warp, Sampling, WarpParams};
use heldet_algorithms::statistics::zone_cells;
use heldet_algorithms::vector::layer_extent;
use heldet_core::crs::{CoordinateTransform, LinearUnit, CRS};
use heldet_core::raster::{Extent, Raster};
use heldet_core::vector::FeatureCollection;
use tracing::{info, warn};

use crate::error::{DeterminationError, InputError, Result};
use crate::units::{resolve_z_unit, z_factor, ZUnit};

/// Coarsest cell accepted for an individual DEM tile
pub const MAX_TILE_CELL_METERS: f64 = 3.0;

/// A remote (or remote-like) elevation service queried by bounding box
pub trait ImageService {
    fn name(&self) -> &str;

    /// Coordinate system the service serves elevations in
    fn crs(&self) -> Option<&CRS>;

    /// Elevations covering `extent`, given in the service CRS
    fn extract(&self, extent: &Extent) -> std::result::Result<Raster<f64>, String>;
}

/// An elevation service backed by a single GeoTIFF
#[derive(Debug, Clone)]
pub struct GeoTiffImageService {
    name: String,
    raster: Raster<f64>,
}

impl GeoTiffImageService {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raster = heldet_core::io::read_geotiff(path)?;
        Ok(Self::from_raster(path.display().to_string(), raster))
    }

    pub fn from_raster(name: impl Into<String>, raster: Raster<f64>) -> Self {
        Self {
            name: name.into(),
            raster,
        }
    }
}

impl ImageService for GeoTiffImageService {
    fn name(&self) -> &str {
        &self.name
    }

    fn crs(&self) -> Option<&CRS> {
        self.raster.crs()
    }

    fn extract(&self, extent: &Extent) -> std::result::Result<Raster<f64>, String> {
        clip_to_extent(&self.raster, extent).map_err(|e| e.to_string())
    }
}

/// Where elevations come from
pub enum ElevationSource {
    Local(Raster<f64>),
    LocalTiles(Vec<Raster<f64>>),
    ImageService(Box<dyn ImageService>),
}

impl std::fmt::Debug for ElevationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElevationSource::Local(r) => write!(f, "Local({}x{})", r.rows(), r.cols()),
            ElevationSource::LocalTiles(t) => write!(f, "LocalTiles({})", t.len()),
            ElevationSource::ImageService(s) => write!(f, "ImageService({})", s.name()),
        }
    }
}

/// DEM ready for the erosion-index pipeline
#[derive(Debug, Clone)]
pub struct PreparedDem {
    /// Horizontal unit of the prepared grid
    pub linear_unit: LinearUnit,
    pub z_unit: ZUnit,
    pub z_factor: f64,
    pub raster: Raster<f64>,
}

/// DEM preparation settings
#[derive(Debug, Clone, Copy)]
pub struct DemPreparer {
    /// Buffer around the fields' bounding box, in feet
    pub aoi_buffer_feet: f64,
    /// Output cell size, in field map units, when resampling
    pub target_cell_size: f64,
    /// Coarsest accepted local DEM cell, in meters
    pub max_cell_size_meters: f64,
}

impl Default for DemPreparer {
    fn default() -> Self {
        Self {
            aoi_buffer_feet: 500.0,
            target_cell_size: 3.0,
            max_cell_size_meters: 3.1,
        }
    }
}

/// Horizontal unit of a projected DEM, restricted to feet and meters
fn projected_unit(raster: &Raster<f64>, name: &str) -> std::result::Result<(CRS, LinearUnit), InputError> {
    let crs = match raster.crs() {
        Some(crs) if crs.is_projected() => crs.clone(),
        _ => return Err(InputError::NotProjected(name.to_string())),
    };
    let unit = crs
        .linear_unit()
        .ok_or_else(|| InputError::UnknownLinearUnits(name.to_string()))?;
    if !matches!(unit, LinearUnit::Meter | LinearUnit::Foot | LinearUnit::FootUs) {
        return Err(InputError::UnsupportedLinearUnits {
            name: name.to_string(),
            unit: unit.name().to_string(),
        });
    }
    Ok((crs, unit))
}

fn check_cell_size(raster: &Raster<f64>, name: &str, unit: LinearUnit, limit_meters: f64) -> std::result::Result<(), InputError> {
    let limit = unit.convert_from(limit_meters, LinearUnit::Meter);
    let cell = raster.cell_size();
    if cell > limit + 1e-9 {
        return Err(InputError::CellSizeExceedsLimit {
            name: name.to_string(),
            cell_size: cell,
            limit,
            unit: unit.name().to_string(),
        });
    }
    Ok(())
}

/// `extent` (in `from`) as seen in `to`
fn extent_in(extent: &Extent, from: &CRS, to: &CRS) -> heldet_core::Result<Extent> {
    Ok(CoordinateTransform::new(from, to)?.transform_extent(extent))
}

impl DemPreparer {
    /// Area of interest in the field CRS and the field layer's CRS and unit
    fn area_of_interest(&self, fields: &FeatureCollection) -> Result<(Extent, CRS, LinearUnit)> {
        let crs = match &fields.crs {
            Some(crs) if crs.is_projected() => crs.clone(),
            _ => return Err(InputError::NotProjected("field layer".into()).into()),
        };
        let unit = crs
            .linear_unit()
            .ok_or_else(|| InputError::UnknownLinearUnits("field layer".into()))?;
        let extent = layer_extent(fields).ok_or(InputError::NoFields)?;
        let buffer = unit.convert_from(self.aoi_buffer_feet, LinearUnit::Foot);
        Ok((extent.buffer(buffer), crs, unit))
    }

    /// Validate and normalize `source` for the fields in `fields`.
    pub fn prepare(
        &self,
        fields: &FeatureCollection,
        source: &ElevationSource,
        z_units: Option<ZUnit>,
    ) -> Result<PreparedDem> {
        let (aoi, field_crs, field_unit) = self.area_of_interest(fields)?;

        let raster = match source {
            ElevationSource::Local(raster) => self.prepare_local(raster, "DEM", &aoi, &field_crs)?,
            ElevationSource::LocalTiles(tiles) => {
                let merged = self.mosaic_tiles(tiles, &aoi, &field_crs)?;
                self.prepare_local(&merged, "DEM mosaic", &aoi, &field_crs)?
            }
            ElevationSource::ImageService(service) => {
                self.prepare_service(service.as_ref(), &aoi, &field_crs)?
            }
        };

        let linear_unit = raster
            .crs()
            .and_then(CRS::linear_unit)
            .unwrap_or(field_unit);
        let z_unit = resolve_z_unit(linear_unit, z_units);
        let z_factor = z_factor(linear_unit, z_unit);
        info!(
            "Prepared DEM: {}x{} cells of {:.2} {}, Z-units {}, Z-factor {}",
            raster.rows(),
            raster.cols(),
            raster.cell_size(),
            linear_unit,
            z_unit,
            z_factor
        );

        Ok(PreparedDem {
            linear_unit,
            z_unit,
            z_factor,
            raster,
        })
    }

    fn prepare_local(&self, raster: &Raster<f64>, name: &str, aoi: &Extent, field_crs: &CRS) -> Result<Raster<f64>> {
        info!("Validating {}", name);
        let (dem_crs, dem_unit) = projected_unit(raster, name)?;
        check_cell_size(raster, name, dem_unit, self.max_cell_size_meters)?;

        let aoi_dem = extent_in(aoi, field_crs, &dem_crs)?;
        if raster.extent().intersection(&aoi_dem).is_none() {
            return Err(InputError::DemOutsideAoi.into());
        }
        info!("Clipping {} to the buffered fields", name);
        let clipped = clip_to_extent(raster, &aoi_dem)?;

        let tolerance = dem_unit.convert_from(self.max_cell_size_meters, LinearUnit::Meter);
        let cell = raster.cell_size();
        let same_crs = dem_crs.is_equivalent(field_crs);
        let at_target = (cell - self.target_cell_size).abs() < 1e-6;

        if same_crs && (cell >= tolerance || at_target) {
            return Ok(clipped);
        }
        info!(
            "Resampling {} from {:.2} {} to {} unit cells in {}",
            name,
            cell,
            dem_unit,
            self.target_cell_size,
            field_crs.identifier()
        );
        self.warp_to_fields(&clipped, aoi, field_crs)
    }

    fn warp_to_fields(&self, clipped: &Raster<f64>, aoi: &Extent, field_crs: &CRS) -> Result<Raster<f64>> {
        let from = clipped
            .crs()
            .ok_or_else(|| InputError::NotProjected("DEM".into()))?;
        let footprint = extent_in(&clipped.extent(), from, field_crs)?;
        let extent = footprint.intersection(aoi).ok_or(InputError::DemOutsideAoi)?;
        let out = warp(
            clipped,
            WarpParams {
                extent: Some(extent),
                cell_size: self.target_cell_size,
                crs: Some(field_crs.clone()),
                sampling: Sampling::Bilinear,
            },
        )?;
        Ok(out)
    }

    fn mosaic_tiles(&self, tiles: &[Raster<f64>], aoi: &Extent, field_crs: &CRS) -> Result<Raster<f64>> {
        let Some(first) = tiles.first() else {
            return Err(InputError::DemRequired.into());
        };
        let (tile_crs, _) = projected_unit(first, "DEM tile 1")?;

        let mut clipped = Vec::with_capacity(tiles.len());
        for (i, tile) in tiles.iter().enumerate() {
            let name = format!("DEM tile {}", i + 1);
            let (crs, unit) = projected_unit(tile, &name)?;
            if !crs.is_equivalent(&tile_crs) {
                return Err(InputError::MixedTileCrs(tile_crs.identifier(), crs.identifier()).into());
            }
            check_cell_size(tile, &name, unit, MAX_TILE_CELL_METERS)?;

            let aoi_tile = extent_in(aoi, field_crs, &crs)?;
            if tile.extent().intersection(&aoi_tile).is_some() {
                clipped.push(clip_to_extent(tile, &aoi_tile)?);
            } else {
                info!("{} lies outside the area of interest", name);
            }
        }
        if clipped.is_empty() {
            return Err(InputError::DemOutsideAoi.into());
        }
        info!("Mosaicking {} DEM tile(s)", clipped.len());
        let aoi_tiles = extent_in(aoi, field_crs, &tile_crs)?;
        Ok(mosaic(&clipped, Some(aoi_tiles))?)
    }

    fn prepare_service(&self, service: &dyn ImageService, aoi: &Extent, field_crs: &CRS) -> Result<Raster<f64>> {
        let service_crs = service
            .crs()
            .cloned()
            .ok_or_else(|| InputError::UnknownLinearUnits(service.name().to_string()))?;

        if !service_crs.is_geographic() {
            let request = extent_in(aoi, field_crs, &service_crs)?;
            let raster = service
                .extract(&request)
                .map_err(DeterminationError::ExternalService)?;
            return self.prepare_local(&raster, service.name(), aoi, field_crs);
        }

        let request = extent_in(aoi, field_crs, &CRS::wgs84())?;
        info!(
            "Requesting elevations from {} for ({:.6}, {:.6}) - ({:.6}, {:.6})",
            service.name(),
            request.min_x,
            request.min_y,
            request.max_x,
            request.max_y
        );
        let raster = service
            .extract(&request)
            .map_err(DeterminationError::ExternalService)?;
        info!("Projecting {} to {} at {} unit cells", service.name(), field_crs.identifier(), self.target_cell_size);
        self.warp_to_fields(&raster, aoi, field_crs)
    }
}

/// DEM cells under the fields that hold no usable elevation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coverage {
    pub cells: usize,
    pub invalid_cells: usize,
}

impl Coverage {
    pub fn is_complete(&self) -> bool {
        self.invalid_cells == 0
    }
}

/// Count DEM cells under the fields that are NoData or exactly zero,
/// warning when any are found.
pub fn check_coverage(dem: &Raster<f64>, fields: &FeatureCollection) -> Coverage {
    let mut coverage = Coverage {
        cells: 0,
        invalid_cells: 0,
    };
    for poly in fields.iter().filter_map(|f| f.polygons()) {
        for (row, col) in zone_cells(&poly, dem) {
            coverage.cells += 1;
            match dem.value_at(row, col) {
                Some(z) if z != 0.0 => {}
                _ => coverage.invalid_cells += 1,
            }
        }
    }
    if !coverage.is_complete() {
        warn!(
            "WARNING: {} of {} DEM cells under the fields have no elevation; PHEL results are likely invalid",
            coverage.invalid_cells,
            coverage.cells
        );
    }
    coverage
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::polygon;
    use heldet_core::raster::GeoTransform;
    use heldet_core::vector::Feature;

    const UTM15N: u32 = 26915;

    fn fields() -> FeatureCollection {
        let mut fc = FeatureCollection::with_crs(Some(CRS::from_epsg(UTM15N)));
        fc.push(Feature::new(polygon![
            (x: 500_000.0, y: 4_600_000.0),
            (x: 500_300.0, y: 4_600_000.0),
            (x: 500_300.0, y: 4_600_300.0),
            (x: 500_000.0, y: 4_600_300.0),
        ]));
        fc
    }

    fn dem(cell: f64, crs: CRS) -> Raster<f64> {
        let n = (1000.0 / cell) as usize;
        let mut r = Raster::filled(n, n, 300.0);
        r.set_transform(GeoTransform::new(499_650.0, 4_600_650.0, cell, -cell));
        r.set_crs(Some(crs));
        r
    }

    #[test]
    fn test_coarse_dem_rejected() {
        let source = ElevationSource::Local(dem(5.0, CRS::from_epsg(UTM15N)));
        let err = DemPreparer::default().prepare(&fields(), &source, None).unwrap_err();
        assert!(matches!(
            err,
            DeterminationError::InputValidation(InputError::CellSizeExceedsLimit { .. })
        ));
    }

    #[test]
    fn test_fine_dem_resampled() {
        let source = ElevationSource::Local(dem(2.5, CRS::from_epsg(UTM15N)));
        let prepared = DemPreparer::default().prepare(&fields(), &source, None).unwrap();
        assert_relative_eq!(prepared.raster.cell_size(), 3.0);
        assert_eq!(prepared.linear_unit, LinearUnit::Meter);
        assert_eq!(prepared.z_unit, ZUnit::Meter);
        assert_eq!(prepared.z_factor, 1.0);
        let (x, y) = prepared.raster.cell_center(0, 0);
        assert!(x >= 500_000.0 - 152.4 - 3.0 && y <= 4_600_300.0 + 152.4 + 3.0);
    }

    #[test]
    fn test_geographic_dem_rejected() {
        let source = ElevationSource::Local(dem(2.0, CRS::from_epsg(4326)));
        let err = DemPreparer::default().prepare(&fields(), &source, None).unwrap_err();
        assert!(matches!(err, DeterminationError::InputValidation(InputError::NotProjected(_))));
    }

    #[test]
    fn test_feet_z_units() {
        let source = ElevationSource::Local(dem(3.0, CRS::from_epsg(UTM15N)));
        let prepared = DemPreparer::default()
            .prepare(&fields(), &source, Some(ZUnit::Foot))
            .unwrap();
        assert_eq!(prepared.z_factor, 0.3048);
        assert_relative_eq!(prepared.raster.cell_size(), 3.0);
    }

    #[test]
    fn test_tiles_must_share_crs() {
        let source = ElevationSource::LocalTiles(vec![
            dem(2.0, CRS::from_epsg(UTM15N)),
            dem(2.0, CRS::from_epsg(32615)),
        ]);
        let err = DemPreparer::default().prepare(&fields(), &source, None).unwrap_err();
        assert!(matches!(err, DeterminationError::InputValidation(InputError::MixedTileCrs(..))));
    }

    #[test]
    fn test_tile_mosaic() {
        let mut west = Raster::filled(400, 200, 310.0);
        west.set_transform(GeoTransform::new(499_600.0, 4_600_700.0, 2.0, -2.0));
        west.set_crs(Some(CRS::from_epsg(UTM15N)));
        let mut east = Raster::filled(400, 200, 320.0);
        east.set_transform(GeoTransform::new(500_000.0, 4_600_700.0, 2.0, -2.0));
        east.set_crs(Some(CRS::from_epsg(UTM15N)));

        let source = ElevationSource::LocalTiles(vec![west, east]);
        let prepared = DemPreparer::default().prepare(&fields(), &source, None).unwrap();
        assert_relative_eq!(prepared.raster.cell_size(), 3.0);
        let stats = prepared.raster.statistics();
        assert!(stats.min.unwrap() >= 310.0 - 1e-9);
        assert!(stats.max.unwrap() <= 320.0 + 1e-9);
    }

    #[test]
    fn test_coverage_warns_on_gaps() {
        let mut r = dem(3.0, CRS::from_epsg(UTM15N));
        let full = check_coverage(&r, &fields());
        assert!(full.is_complete());
        assert_eq!(full.cells, 100 * 100);

        // Row 117 is the northernmost row inside the fields
        r.set(117, 150, 0.0).unwrap();
        r.set(117, 151, f64::NAN).unwrap();
        let gaps = check_coverage(&r, &fields());
        assert_eq!(gaps.invalid_cells, 2);
    }

    #[test]
    fn test_image_service_branch() {
        // One arc-second-ish grid around 93 W, 41.55 N
        let mut geo = Raster::filled(200, 200, 280.0);
        geo.set_transform(GeoTransform::new(-93.05, 41.6, 0.0005, -0.0005));
        geo.set_crs(Some(CRS::from_epsg(4326)));
        let service = GeoTiffImageService::from_raster("3DEP", geo);

        let source = ElevationSource::ImageService(Box::new(service));
        let prepared = DemPreparer::default().prepare(&fields(), &source, None).unwrap();
        assert_relative_eq!(prepared.raster.cell_size(), 3.0);
        assert!(prepared.raster.crs().unwrap().is_equivalent(&CRS::from_epsg(UTM15N)));
        assert_relative_eq!(prepared.raster.statistics().mean.unwrap(), 280.0, epsilon = 1e-9);
    }
}
