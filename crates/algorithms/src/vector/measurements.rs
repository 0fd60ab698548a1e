//! Geometric measurements: area and extent

use geo::{Area as GeoArea, BoundingRect, Geometry};
use heldet_core::raster::Extent;
use heldet_core::vector::FeatureCollection;

/// Calculate the area of a geometry.
///
/// Returns unsigned area in CRS units squared. Non-polygonal geometries
/// have no area.
pub fn area(geom: &Geometry<f64>) -> f64 {
    match geom {
        Geometry::Polygon(p) => p.unsigned_area(),
        Geometry::MultiPolygon(mp) => mp.unsigned_area(),
        Geometry::Rect(r) => r.unsigned_area(),
        Geometry::GeometryCollection(gc) => gc.iter().map(area).sum(),
        _ => 0.0,
    }
}

/// Bounding extent of every geometry in a layer
pub fn layer_extent(layer: &FeatureCollection) -> Option<Extent> {
    layer
        .iter()
        .filter_map(|f| f.geometry.as_ref()?.bounding_rect())
        .map(Extent::from)
        .reduce(|a, b| a.union(&b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::{polygon, Point};
    use heldet_core::vector::Feature;

    #[test]
    fn test_polygon_area() {
        let poly = polygon![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0)];
        assert_relative_eq!(area(&Geometry::Polygon(poly)), 100.0, epsilon = 1e-10);
    }

    #[test]
    fn test_point_has_no_area() {
        assert_eq!(area(&Geometry::Point(Point::new(1.0, 1.0))), 0.0);
    }

    #[test]
    fn test_layer_extent() {
        let mut layer = FeatureCollection::new();
        layer.push(Feature::new(polygon![(x: 0.0, y: 0.0), (x: 4.0, y: 0.0), (x: 4.0, y: 3.0)]));
        layer.push(Feature::new(Point::new(-2.0, 7.0)));
        let ext = layer_extent(&layer).unwrap();
        assert_relative_eq!(ext.min_x, -2.0);
        assert_relative_eq!(ext.max_x, 4.0);
        assert_relative_eq!(ext.max_y, 7.0);
        assert!(layer_extent(&FeatureCollection::new()).is_none());
    }
}
