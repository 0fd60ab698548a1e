//! GeoJSON feature collection I/O
//!
//! The legacy `crs` member (`{"type":"name","properties":{"name":"EPSG:26915"}}`
//! or the OGC URN form) carries the coordinate system of projected data.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::vector::{AttributeValue, Feature, FeatureCollection};
use geojson::{GeoJson, JsonObject, JsonValue};
use std::fs;
use std::path::Path;

/// Read a GeoJSON file into a feature collection
pub fn read_geojson<P: AsRef<Path>>(path: P) -> Result<FeatureCollection> {
    let text = fs::read_to_string(path.as_ref())?;
    parse_geojson(&text)
}

/// Parse GeoJSON text. A bare Feature or Geometry becomes a one-element
/// collection.
pub fn parse_geojson(text: &str) -> Result<FeatureCollection> {
    let gj: GeoJson = text.parse()?;
    let (features, foreign) = match gj {
        GeoJson::FeatureCollection(fc) => (fc.features, fc.foreign_members),
        GeoJson::Feature(f) => (vec![f], None),
        GeoJson::Geometry(g) => (
            vec![geojson::Feature {
                bbox: None,
                geometry: Some(g),
                id: None,
                properties: None,
                foreign_members: None,
            }],
            None,
        ),
    };

    let mut out = FeatureCollection::with_crs(foreign.as_ref().and_then(crs_member));
    for f in features {
        out.push(convert_feature(f)?);
    }
    Ok(out)
}

fn convert_feature(f: geojson::Feature) -> Result<Feature> {
    let geometry = f
        .geometry
        .map(geo_types::Geometry::<f64>::try_from)
        .transpose()
        .map_err(|e| Error::GeoJson(e.to_string()))?;
    let properties = f
        .properties
        .unwrap_or_default()
        .iter()
        .map(|(k, v)| (k.clone(), AttributeValue::from(v)))
        .collect();
    let id = f.id.map(|id| match id {
        geojson::feature::Id::String(s) => s,
        geojson::feature::Id::Number(n) => n.to_string(),
    });
    Ok(Feature {
        geometry,
        properties,
        id,
    })
}

fn crs_member(members: &JsonObject) -> Option<CRS> {
    let name = members
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()?;
    let code = name.rsplit(|c: char| c == ':' || c == '/').find(|s| !s.is_empty())?;
    match code.parse::<u32>() {
        Ok(epsg) => Some(CRS::from_epsg(epsg)),
        // OGC:CRS84 is lon/lat WGS84
        Err(_) if code.eq_ignore_ascii_case("CRS84") => Some(CRS::wgs84()),
        Err(_) => None,
    }
}

/// Serialize a feature collection to GeoJSON text
pub fn to_geojson_string(fc: &FeatureCollection) -> Result<String> {
    let features = fc
        .features
        .iter()
        .map(|f| {
            let properties: JsonObject = f
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), JsonValue::from(v)))
                .collect();
            geojson::Feature {
                bbox: None,
                geometry: f
                    .geometry
                    .as_ref()
                    .map(|g| geojson::Geometry::new(geojson::Value::from(g))),
                id: f.id.clone().map(geojson::feature::Id::String),
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    let foreign_members = fc.crs.as_ref().and_then(|c| c.epsg()).map(|epsg| {
        let mut members = JsonObject::new();
        members.insert(
            "crs".to_string(),
            serde_json::json!({
                "type": "name",
                "properties": { "name": format!("urn:ogc:def:crs:EPSG::{}", epsg) }
            }),
        );
        members
    });

    let gj = GeoJson::FeatureCollection(geojson::FeatureCollection {
        bbox: None,
        features,
        foreign_members,
    });
    Ok(gj.to_string())
}

/// Write a feature collection to a GeoJSON file
pub fn write_geojson<P: AsRef<Path>>(fc: &FeatureCollection, path: P) -> Result<()> {
    fs::write(path.as_ref(), to_geojson_string(fc)?)?;
    Ok(())
}
