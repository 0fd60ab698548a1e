//! Native GeoTIFF reading/writing (without GDAL dependency)
//!
//! Uses the `tiff` crate. Georeferencing is carried by the ModelPixelScale and
//! ModelTiepoint tags, the CRS by the GeoKey directory (EPSG code, model type
//! and linear units) and nodata by the GDAL_NODATA ASCII tag.

use crate::crs::{CrsKind, LinearUnit, CRS};
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const KEY_MODEL_TYPE: u16 = 1024;
const KEY_RASTER_TYPE: u16 = 1025;
const KEY_GEOGRAPHIC_TYPE: u16 = 2048;
const KEY_PROJECTED_CS_TYPE: u16 = 3072;
const KEY_PROJ_LINEAR_UNITS: u16 = 3076;

const MODEL_PROJECTED: u16 = 1;
const MODEL_GEOGRAPHIC: u16 = 2;
const USER_DEFINED: u16 = 32767;

fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Read the first band of a GeoTIFF file into a Raster
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    decode_geotiff(BufReader::new(file))
}

/// Read a GeoTIFF from an in-memory buffer
pub fn read_geotiff_from_buffer<T: RasterElement>(data: &[u8]) -> Result<Raster<T>> {
    decode_geotiff(Cursor::new(data))
}

fn decode_geotiff<T, R>(reader: R) -> Result<Raster<T>>
where
    T: RasterElement,
    R: Read + Seek,
{
    let mut decoder =
        Decoder::new(reader).map_err(|e| Error::Other(format!("TIFF decode error: {}", e)))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| Error::Other(format!("Cannot read dimensions: {}", e)))?;
    let (rows, cols) = (height as usize, width as usize);

    let result = decoder
        .read_image()
        .map_err(|e| Error::Other(format!("Cannot read image data: {}", e)))?;

    let values: Vec<f64> = match result {
        DecodingResult::F32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::F64(buf) => buf,
        DecodingResult::U8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(f64::from).collect(),
        _ => {
            return Err(Error::UnsupportedDataType(
                "Unsupported TIFF pixel format".to_string(),
            ));
        }
    };

    if values.len() != rows * cols {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    let file_nodata = decoder
        .get_tag_ascii_string(tag(GDAL_NODATA))
        .ok()
        .and_then(|s| s.trim_matches(char::from(0)).trim().parse::<f64>().ok());

    let fallback = T::default_nodata();
    let data: Vec<T> = values
        .into_iter()
        .map(|v| {
            if file_nodata.is_some_and(|nd| v == nd || (v.is_nan() && nd.is_nan())) {
                fallback
            } else {
                T::from_f64(v).unwrap_or(fallback)
            }
        })
        .collect();

    let mut raster = Raster::from_vec(data, rows, cols)?;
    raster.set_nodata(Some(fallback));

    if let Some(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }
    raster.set_crs(read_crs(&mut decoder));

    Ok(raster)
}

fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(tag(MODEL_PIXEL_SCALE)).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(tag(MODEL_TIEPOINT)).ok()?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }
    // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

fn read_crs<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<CRS> {
    let dir = decoder.get_tag_u16_vec(tag(GEO_KEY_DIRECTORY)).ok()?;
    let keys = parse_geokeys(&dir);
    let lookup = |k: u16| keys.iter().find(|(key, _)| *key == k).map(|(_, v)| *v);

    let model = lookup(KEY_MODEL_TYPE);
    let code = match model {
        Some(MODEL_GEOGRAPHIC) => lookup(KEY_GEOGRAPHIC_TYPE),
        _ => lookup(KEY_PROJECTED_CS_TYPE),
    }
    .filter(|&c| c != 0 && c != USER_DEFINED);

    let mut crs = match code {
        Some(c) => CRS::from_epsg(c as u32),
        None => CRS::unknown(),
    };
    match model {
        Some(MODEL_PROJECTED) if crs.kind().is_none() => crs = crs.with_kind(CrsKind::Projected),
        Some(MODEL_GEOGRAPHIC) if crs.kind().is_none() => crs = crs.with_kind(CrsKind::Geographic),
        _ => {}
    }
    if crs.linear_unit().is_none()
        && let Some(unit) = lookup(KEY_PROJ_LINEAR_UNITS).and_then(unit_from_epsg)
    {
        crs = crs.with_linear_unit(unit);
    }
    if code.is_none() && crs.kind().is_none() {
        return None;
    }
    Some(crs)
}

/// Inline (SHORT) entries of a GeoKey directory as (key, value) pairs
fn parse_geokeys(dir: &[u16]) -> Vec<(u16, u16)> {
    if dir.len() < 4 {
        return Vec::new();
    }
    dir[4..]
        .chunks_exact(4)
        .take(dir[3] as usize)
        .filter(|e| e[1] == 0 && e[2] == 1)
        .map(|e| (e[0], e[3]))
        .collect()
}

fn unit_from_epsg(code: u16) -> Option<LinearUnit> {
    match code {
        9001 => Some(LinearUnit::Meter),
        9002 => Some(LinearUnit::Foot),
        9003 => Some(LinearUnit::FootUs),
        _ => None,
    }
}

fn unit_to_epsg(unit: LinearUnit) -> Option<u16> {
    match unit {
        LinearUnit::Meter => Some(9001),
        LinearUnit::Foot => Some(9002),
        LinearUnit::FootUs => Some(9003),
        LinearUnit::Centimeter | LinearUnit::Inch => None,
    }
}

/// Write a Raster to a single-band 32-bit float GeoTIFF file
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::create(path.as_ref())?;
    encode_geotiff(raster, BufWriter::new(file))
}

/// Write a Raster to an in-memory GeoTIFF buffer
pub fn write_geotiff_to_buffer<T: RasterElement>(raster: &Raster<T>) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_geotiff(raster, Cursor::new(&mut buf))?;
    Ok(buf)
}

fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W) -> Result<()>
where
    T: RasterElement,
    W: Write + Seek,
{
    let map_err = |what: &str| {
        let what = what.to_string();
        move |e: tiff::TiffError| Error::Other(format!("Cannot write {}: {}", what, e))
    };

    let mut encoder = TiffEncoder::new(writer).map_err(map_err("TIFF header"))?;
    let (rows, cols) = raster.shape();

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

    let mut image = encoder
        .new_image::<Gray32Float>(cols as u32, rows as u32)
        .map_err(map_err("image"))?;

    let gt = raster.transform();
    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(tag(MODEL_PIXEL_SCALE), &scale[..])
        .map_err(map_err("pixel scale"))?;

    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(tag(MODEL_TIEPOINT), &tiepoint[..])
        .map_err(map_err("tiepoint"))?;

    let geokeys = build_geokeys(raster.crs());
    image
        .encoder()
        .write_tag(tag(GEO_KEY_DIRECTORY), geokeys.as_slice())
        .map_err(map_err("geokeys"))?;

    image
        .encoder()
        .write_tag(tag(GDAL_NODATA), "nan")
        .map_err(map_err("nodata"))?;

    image.write_data(&data).map_err(map_err("image data"))?;
    Ok(())
}

fn build_geokeys(crs: Option<&CRS>) -> Vec<u16> {
    let mut keys: Vec<(u16, u16)> = Vec::new();
    let geographic = crs.is_some_and(|c| c.is_geographic());
    keys.push((
        KEY_MODEL_TYPE,
        if geographic { MODEL_GEOGRAPHIC } else { MODEL_PROJECTED },
    ));
    keys.push((KEY_RASTER_TYPE, 1));
    if let Some(crs) = crs {
        let code = crs
            .epsg()
            .and_then(|c| u16::try_from(c).ok())
            .unwrap_or(USER_DEFINED);
        if geographic {
            keys.push((KEY_GEOGRAPHIC_TYPE, code));
        } else {
            keys.push((KEY_PROJECTED_CS_TYPE, code));
            if let Some(unit) = crs.linear_unit().and_then(unit_to_epsg) {
                keys.push((KEY_PROJ_LINEAR_UNITS, unit));
            }
        }
    }
    let mut dir = vec![1, 1, 0, keys.len() as u16];
    for (key, value) in keys {
        dir.extend_from_slice(&[key, 0, 1, value]);
    }
    dir
}
