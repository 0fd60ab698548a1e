//! Polygon overlay: intersect, clip and dissolve
//!
//! Boolean operations come from `geo::BooleanOps`. Results are exploded
//! into single-part features and slivers with no area are dropped.

use std::collections::BTreeMap;

use geo::{Area, BooleanOps, BoundingRect, MultiPolygon, Polygon};
use heldet_core::vector::{AttributeValue, Feature, FeatureCollection};
use heldet_core::{Error, Result};

/// Parts smaller than this (squared map units) are discarded
pub const MIN_PART_AREA: f64 = 1e-9;

fn check_crs(a: &FeatureCollection, b: &FeatureCollection) -> Result<()> {
    if let (Some(ca), Some(cb)) = (&a.crs, &b.crs)
        && !ca.is_equivalent(cb)
    {
        return Err(Error::CrsMismatch(ca.identifier(), cb.identifier()));
    }
    Ok(())
}

fn bbox_overlap(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> bool {
    match (a.bounding_rect(), b.bounding_rect()) {
        (Some(ra), Some(rb)) => {
            ra.min().x <= rb.max().x
                && ra.max().x >= rb.min().x
                && ra.min().y <= rb.max().y
                && ra.max().y >= rb.min().y
        }
        _ => false,
    }
}

fn explode(mp: MultiPolygon<f64>) -> impl Iterator<Item = Polygon<f64>> {
    mp.0.into_iter().filter(|p| p.unsigned_area() > MIN_PART_AREA)
}

/// Intersect two polygon layers.
///
/// Every overlapping pair yields one feature per output part, carrying the
/// attributes of both inputs. On a name clash the `left` attribute wins.
pub fn intersect(left: &FeatureCollection, right: &FeatureCollection) -> Result<FeatureCollection> {
    check_crs(left, right)?;

    let right_polys: Vec<Option<MultiPolygon<f64>>> = right.iter().map(Feature::polygons).collect();
    let mut out = FeatureCollection::with_crs(left.crs.clone());

    for lf in left.iter() {
        let Some(lp) = lf.polygons() else { continue };
        for (rf, rp) in right.iter().zip(&right_polys) {
            let Some(rp) = rp else { continue };
            if !bbox_overlap(&lp, rp) {
                continue;
            }
            let mut properties: BTreeMap<String, AttributeValue> = rf.properties.clone();
            properties.extend(lf.properties.clone());
            for part in explode(lp.intersection(rp)) {
                out.push(Feature {
                    geometry: Some(part.into()),
                    properties: properties.clone(),
                    id: None,
                });
            }
        }
    }
    Ok(out)
}

/// Clip every feature of `layer` to `mask`, keeping its attributes.
pub fn clip_to_mask(layer: &FeatureCollection, mask: &MultiPolygon<f64>) -> FeatureCollection {
    let mut out = FeatureCollection::with_crs(layer.crs.clone());
    for feature in layer.iter() {
        let Some(poly) = feature.polygons() else { continue };
        if !bbox_overlap(&poly, mask) {
            continue;
        }
        for part in explode(poly.intersection(mask)) {
            out.push(Feature {
                geometry: Some(part.into()),
                properties: feature.properties.clone(),
                id: feature.id.clone(),
            });
        }
    }
    out
}

/// Union of all polygons in a layer
pub fn union_all(layer: &FeatureCollection) -> MultiPolygon<f64> {
    layer
        .iter()
        .filter_map(Feature::polygons)
        .fold(MultiPolygon(Vec::new()), |acc, mp| {
            if acc.0.is_empty() { mp } else { acc.union(&mp) }
        })
}

/// Merge features sharing the same values of `fields` (case-insensitive).
///
/// Output features carry only the dissolve fields, under the names given.
/// Groups come out ordered by their first appearance in the input. With
/// `single_part`, each group is exploded into one feature per part.
pub fn dissolve(layer: &FeatureCollection, fields: &[&str], single_part: bool) -> FeatureCollection {
    let mut order: Vec<Vec<String>> = Vec::new();
    let mut groups: BTreeMap<Vec<String>, (Vec<AttributeValue>, MultiPolygon<f64>)> = BTreeMap::new();

    for feature in layer.iter() {
        let Some(poly) = feature.polygons() else { continue };
        let values: Vec<AttributeValue> = fields
            .iter()
            .map(|f| feature.property_ci(f).cloned().unwrap_or(AttributeValue::Null))
            .collect();
        let key: Vec<String> = values.iter().map(|v| v.to_text().unwrap_or_default()).collect();

        match groups.get_mut(&key) {
            Some((_, geom)) => *geom = geom.union(&poly),
            None => {
                order.push(key.clone());
                groups.insert(key, (values, poly));
            }
        }
    }

    let mut out = FeatureCollection::with_crs(layer.crs.clone());
    for key in order {
        let Some((values, geom)) = groups.remove(&key) else { continue };
        let properties: BTreeMap<String, AttributeValue> = fields
            .iter()
            .map(|f| f.to_string())
            .zip(values)
            .collect();
        if single_part {
            for part in explode(geom) {
                out.push(Feature {
                    geometry: Some(part.into()),
                    properties: properties.clone(),
                    id: None,
                });
            }
        } else {
            out.push(Feature {
                geometry: Some(geom.into()),
                properties,
                id: None,
            });
        }
    }
    out
}
