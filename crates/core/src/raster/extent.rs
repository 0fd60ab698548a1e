//! Axis-aligned rectangular extents in map units

use serde::{Deserialize, Serialize};

/// An axis-aligned bounding rectangle in map coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Extent {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Envelope of a set of points, `None` when the iterator is empty
    pub fn from_points(points: impl IntoIterator<Item = (f64, f64)>) -> Option<Self> {
        let mut iter = points.into_iter();
        let (x0, y0) = iter.next()?;
        let mut ext = Self::new(x0, y0, x0, y0);
        for (x, y) in iter {
            ext.min_x = ext.min_x.min(x);
            ext.min_y = ext.min_y.min(y);
            ext.max_x = ext.max_x.max(x);
            ext.max_y = ext.max_y.max(y);
        }
        Some(ext)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// True when the extent has no area
    pub fn is_empty(&self) -> bool {
        !(self.width() > 0.0 && self.height() > 0.0)
    }

    /// Grow (or shrink, for negative distances) the extent on every side
    pub fn buffer(&self, distance: f64) -> Self {
        Self::new(
            self.min_x - distance,
            self.min_y - distance,
            self.max_x + distance,
            self.max_y + distance,
        )
    }

    pub fn intersects(&self, other: &Extent) -> bool {
        self.min_x < other.max_x
            && self.max_x > other.min_x
            && self.min_y < other.max_y
            && self.max_y > other.min_y
    }

    /// Overlapping region, `None` when the extents do not overlap
    pub fn intersection(&self, other: &Extent) -> Option<Extent> {
        if !self.intersects(other) {
            return None;
        }
        Some(Extent::new(
            self.min_x.max(other.min_x),
            self.min_y.max(other.min_y),
            self.max_x.min(other.max_x),
            self.max_y.min(other.max_y),
        ))
    }

    pub fn union(&self, other: &Extent) -> Extent {
        Extent::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Whether `other` lies entirely inside this extent
    pub fn contains(&self, other: &Extent) -> bool {
        other.min_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.max_y <= self.max_y
    }

    /// Points along the boundary, `per_side` segments per edge
    pub fn densify(&self, per_side: usize) -> Vec<(f64, f64)> {
        let n = per_side.max(1);
        let mut pts = Vec::with_capacity(4 * n);
        for i in 0..n {
            let t = i as f64 / n as f64;
            let x = self.min_x + t * self.width();
            let y = self.min_y + t * self.height();
            pts.push((x, self.min_y));
            pts.push((self.max_x, y));
            pts.push((self.max_x - t * self.width(), self.max_y));
            pts.push((self.min_x, self.max_y - t * self.height()));
        }
        pts
    }

    pub fn to_rect(&self) -> geo_types::Rect<f64> {
        geo_types::Rect::new(
            geo_types::coord! { x: self.min_x, y: self.min_y },
            geo_types::coord! { x: self.max_x, y: self.max_y },
        )
    }
}

impl From<geo_types::Rect<f64>> for Extent {
    fn from(r: geo_types::Rect<f64>) -> Self {
        Extent::new(r.min().x, r.min().y, r.max().x, r.max().y)
    }
}
