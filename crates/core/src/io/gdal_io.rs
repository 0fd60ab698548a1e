//! GeoTIFF reading and writing using GDAL

use crate::crs::{CrsKind, LinearUnit, CRS};
use crate::error::Result;
use crate::raster::{GeoTransform, Raster, RasterElement};
use gdal::cpl::CslStringList;
use gdal::raster::Buffer;
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager};
use std::path::Path;

/// Read the first band of a raster dataset
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let dataset = Dataset::open(path.as_ref())?;
    let band = dataset.rasterband(1)?;
    let (cols, rows) = dataset.raster_size();

    let buffer = band.read_as::<f64>((0, 0), (cols, rows), (cols, rows), None)?;
    let file_nodata = band.no_data_value();
    let fallback = T::default_nodata();
    let data: Vec<T> = buffer
        .data()
        .iter()
        .map(|&v| {
            if file_nodata.is_some_and(|nd| v == nd) {
                fallback
            } else {
                T::from_f64(v).unwrap_or(fallback)
            }
        })
        .collect();

    let mut raster = Raster::from_vec(data, rows, cols)?;
    raster.set_nodata(Some(fallback));

    if let Ok(gt) = dataset.geo_transform() {
        raster.set_transform(GeoTransform::from_gdal(gt));
    }

    if let Ok(srs) = dataset.spatial_ref() {
        raster.set_crs(crs_from_spatial_ref(&srs));
    }

    Ok(raster)
}

fn crs_from_spatial_ref(srs: &SpatialRef) -> Option<CRS> {
    let mut crs = match (srs.auth_code(), srs.to_wkt()) {
        (Ok(code), _) if code > 0 => CRS::from_epsg(code as u32),
        (_, Ok(wkt)) => CRS::from_wkt(wkt),
        _ => return None,
    };
    if srs.is_projected() {
        crs = crs.with_kind(CrsKind::Projected);
        if let Ok(name) = srs.linear_units_name()
            && let Some(unit) = LinearUnit::from_name(&name)
        {
            crs = crs.with_linear_unit(unit);
        }
    } else if srs.is_geographic() {
        crs = crs.with_kind(CrsKind::Geographic);
    }
    Some(crs)
}

/// Write a Raster to a DEFLATE-compressed, tiled Float32 GeoTIFF
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let (rows, cols) = raster.shape();

    let mut options = CslStringList::new();
    options.set_name_value("COMPRESS", "DEFLATE")?;
    options.set_name_value("TILED", "YES")?;

    let mut dataset =
        driver.create_with_band_type_with_options::<f32, _>(path.as_ref(), cols, rows, 1, &options)?;
    dataset.set_geo_transform(&raster.transform().to_gdal())?;

    if let Some(crs) = raster.crs() {
        if let Some(epsg) = crs.epsg() {
            dataset.set_spatial_ref(&SpatialRef::from_epsg(epsg)?)?;
        } else if let Some(wkt) = crs.wkt() {
            dataset.set_spatial_ref(&SpatialRef::from_wkt(wkt)?)?;
        }
    }

    let mut band = dataset.rasterband(1)?;
    band.set_no_data_value(Some(f64::NAN))?;

    let data: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| {
            if raster.is_nodata(v) {
                f32::NAN
            } else {
                v.to_f64().map_or(f32::NAN, |f| f as f32)
            }
        })
        .collect();
    let mut buffer = Buffer::new((cols, rows), data);
    band.write((0, 0), (cols, rows), &mut buffer)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_write_read_roundtrip() {
        let mut raster: Raster<f64> = Raster::filled(20, 30, 7.0);
        raster.set_transform(GeoTransform::new(400_000.0, 4_500_000.0, 3.0, -3.0));
        raster.set_crs(Some(CRS::from_epsg(32615)));

        let tmp = NamedTempFile::with_suffix(".tif").unwrap();
        write_geotiff(&raster, tmp.path()).unwrap();
        let loaded: Raster<f64> = read_geotiff(tmp.path()).unwrap();

        assert_eq!(loaded.shape(), raster.shape());
        assert_eq!(loaded.value_at(5, 5), Some(7.0));
        assert_eq!(loaded.crs().and_then(|c| c.epsg()), Some(32615));
    }
}
