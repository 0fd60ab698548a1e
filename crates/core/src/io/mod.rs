//! Reading and writing GeoTIFF rasters and GeoJSON features

#[cfg(feature = "gdal")]
mod gdal_io;
mod geojson_io;
mod native;

#[cfg(feature = "gdal")]
pub use gdal_io::{read_geotiff, write_geotiff};

#[cfg(not(feature = "gdal"))]
pub use native::{read_geotiff, write_geotiff};

pub use geojson_io::{parse_geojson, read_geojson, to_geojson_string, write_geojson};
pub use native::{read_geotiff_from_buffer, write_geotiff_to_buffer};
