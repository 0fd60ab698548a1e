//! Soil layer validation and merge

use geo::{MapCoords, MultiPolygon};
use heldet_algorithms::vector::clip_to_mask;
use heldet_core::crs::{CoordinateTransform, CRS};
use heldet_core::vector::{Feature, FeatureCollection};
use tracing::info;

use crate::error::{InputError, Result};

/// Attributes every soil layer must carry, matched ignoring case
pub const SOIL_SCHEMA: [&str; 8] = [
    "areasymbol",
    "spatialver",
    "musym",
    "muname",
    "muhelcl",
    "t",
    "k",
    "r",
];

/// A soil survey layer and the name it is reported under
#[derive(Debug, Clone)]
pub struct SoilLayer {
    pub name: String,
    pub features: FeatureCollection,
}

impl SoilLayer {
    pub fn new(name: impl Into<String>, features: FeatureCollection) -> Self {
        Self {
            name: name.into(),
            features,
        }
    }
}

/// Check that `layer` carries every [`SOIL_SCHEMA`] attribute.
pub fn validate_soil_schema(layer: &SoilLayer) -> std::result::Result<(), InputError> {
    match SOIL_SCHEMA.iter().find(|f| !layer.features.has_field(f)) {
        Some(field) => Err(InputError::MissingSoilField {
            layer: layer.name.clone(),
            field,
        }),
        None => Ok(()),
    }
}

/// Reproject every feature geometry of `layer` into `to`.
pub fn reproject_layer(layer: &FeatureCollection, to: &CRS) -> heldet_core::Result<FeatureCollection> {
    let Some(from) = &layer.crs else {
        return Ok(FeatureCollection {
            features: layer.features.clone(),
            crs: Some(to.clone()),
        });
    };
    let transform = CoordinateTransform::new(from, to)?;
    if transform.is_identity() {
        return Ok(layer.clone());
    }

    let mut out = FeatureCollection::with_crs(Some(to.clone()));
    for feature in layer.iter() {
        let geometry = feature.geometry.as_ref().map(|g| {
            g.map_coords(|c| {
                let (x, y) = transform.transform(c.x, c.y);
                geo::coord! { x: x, y: y }
            })
        });
        out.push(Feature {
            geometry,
            properties: feature.properties.clone(),
            id: feature.id.clone(),
        });
    }
    Ok(out)
}

/// Validate, reproject and clip each soil layer to the field footprint,
/// then concatenate them into a single layer in the field CRS.
pub fn merge_soil_layers(layers: &[SoilLayer], mask: &MultiPolygon<f64>, crs: Option<&CRS>) -> Result<FeatureCollection> {
    if layers.is_empty() {
        return Err(InputError::NoSoilLayers.into());
    }
    for layer in layers {
        validate_soil_schema(layer)?;
    }

    let mut merged = FeatureCollection::with_crs(crs.cloned());
    for layer in layers {
        let features = match crs {
            Some(target) => reproject_layer(&layer.features, target)?,
            None => layer.features.clone(),
        };
        let clipped = clip_to_mask(&features, mask);
        info!("Soil layer {}: {} polygon(s) within the fields", layer.name, clipped.len());
        merged.features.extend(clipped);
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeterminationError;
    use geo::polygon;

    fn soil(x0: f64, x1: f64, rating: &str) -> Feature {
        Feature::new(polygon![(x: x0, y: 0.0), (x: x1, y: 0.0), (x: x1, y: 10.0), (x: x0, y: 10.0)])
            .with_property("AREASYMBOL", "IA001")
            .with_property("SPATIALVER", 3i64)
            .with_property("MUSYM", "A1")
            .with_property("MUNAME", "Loam")
            .with_property("MUHELCL", rating)
            .with_property("T", 5.0)
            .with_property("K", 0.32)
            .with_property("R", 160.0)
    }

    fn layer(name: &str, features: Vec<Feature>) -> SoilLayer {
        SoilLayer::new(name, FeatureCollection { features, crs: None })
    }

    fn mask() -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0)]])
    }

    #[test]
    fn test_merge_clips_and_concatenates() {
        let a = layer("a", vec![soil(-5.0, 5.0, "HEL")]);
        let b = layer("b", vec![soil(5.0, 20.0, "PHEL"), soil(30.0, 40.0, "NHEL")]);
        let merged = merge_soil_layers(&[a, b], &mask(), None).unwrap();
        assert_eq!(merged.len(), 2);
        let ratings: Vec<_> = merged
            .iter()
            .filter_map(|f| f.property_ci("muhelcl").and_then(|v| v.to_text()))
            .collect();
        assert_eq!(ratings, vec!["HEL", "PHEL"]);
    }

    #[test]
    fn test_schema_case_insensitive() {
        let mut f = soil(0.0, 10.0, "HEL");
        let k = f.properties.remove("K").unwrap();
        f.properties.insert("k".into(), k);
        assert!(validate_soil_schema(&layer("lower", vec![f])).is_ok());
    }

    #[test]
    fn test_missing_field_is_fatal() {
        let mut f = soil(0.0, 10.0, "HEL");
        f.properties.remove("SPATIALVER");
        let err = merge_soil_layers(&[layer("ssurgo", vec![f])], &mask(), None).unwrap_err();
        assert!(matches!(
            err,
            DeterminationError::InputValidation(InputError::MissingSoilField { field: "spatialver", .. })
        ));
    }

    #[test]
    fn test_no_layers() {
        let err = merge_soil_layers(&[], &mask(), None).unwrap_err();
        assert!(matches!(err, DeterminationError::InputValidation(InputError::NoSoilLayers)));
    }
}
