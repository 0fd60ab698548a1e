//! Geographic <-> UTM coordinate transforms (Snyder 1987, USGS Prof. Paper 1395).
//!
//! Supports WGS84 and NAD83 geographic (EPSG 4326, 4269) and their UTM
//! zones (EPSG 326xx, 327xx, 269xx). The two datums are treated as
//! coincident; the shift between them is below DEM resolution.

use super::CRS;
use crate::error::{Error, Result};
use crate::raster::Extent;

const A: f64 = 6_378_137.0;
const F: f64 = 1.0 / 298.257_223_563;
const E2: f64 = 2.0 * F - F * F;
const E_PRIME2: f64 = E2 / (1.0 - E2);
const K0: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Projection {
    Geographic,
    Utm { zone: u32, north: bool },
}

impl Projection {
    fn from_crs(crs: &CRS) -> Option<Self> {
        let code = crs.epsg()?;
        match code {
            4326 | 4269 => Some(Projection::Geographic),
            32601..=32660 => Some(Projection::Utm {
                zone: code - 32600,
                north: true,
            }),
            32701..=32760 => Some(Projection::Utm {
                zone: code - 32700,
                north: false,
            }),
            26901..=26923 => Some(Projection::Utm {
                zone: code - 26900,
                north: true,
            }),
            _ => None,
        }
    }

    fn to_lonlat(self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Projection::Geographic => (x, y),
            Projection::Utm { zone, north } => utm_to_lonlat(x, y, zone, north),
        }
    }

    fn from_lonlat(self, lon: f64, lat: f64) -> (f64, f64) {
        match self {
            Projection::Geographic => (lon, lat),
            Projection::Utm { zone, north } => lonlat_to_utm(lon, lat, zone, north),
        }
    }
}

/// A point transform between two coordinate reference systems.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateTransform {
    steps: Option<(Projection, Projection)>,
}

impl CoordinateTransform {
    /// Build a transform from `from` to `to`.
    ///
    /// Equivalent systems produce the identity. Otherwise both systems must
    /// be geographic WGS84/NAD83 or one of their UTM zones.
    pub fn new(from: &CRS, to: &CRS) -> Result<Self> {
        if from.is_equivalent(to) {
            return Ok(Self::identity());
        }
        let unsupported = || Error::UnsupportedTransform {
            from: from.identifier(),
            to: to.identifier(),
        };
        let src = Projection::from_crs(from).ok_or_else(unsupported)?;
        let dst = Projection::from_crs(to).ok_or_else(unsupported)?;
        if src == dst {
            return Ok(Self::identity());
        }
        Ok(Self {
            steps: Some((src, dst)),
        })
    }

    pub fn identity() -> Self {
        Self { steps: None }
    }

    pub fn is_identity(&self) -> bool {
        self.steps.is_none()
    }

    /// Transform a single coordinate pair
    pub fn transform(&self, x: f64, y: f64) -> (f64, f64) {
        match self.steps {
            None => (x, y),
            Some((src, dst)) => {
                let (lon, lat) = src.to_lonlat(x, y);
                dst.from_lonlat(lon, lat)
            }
        }
    }

    /// Envelope of a transformed extent, sampled along its boundary.
    pub fn transform_extent(&self, extent: &Extent) -> Extent {
        if self.is_identity() {
            return *extent;
        }
        let pts = extent
            .densify(20)
            .into_iter()
            .map(|(x, y)| self.transform(x, y));
        Extent::from_points(pts).unwrap_or(*extent)
    }
}

fn central_meridian(zone: u32) -> f64 {
    ((zone as f64 - 1.0) * 6.0 - 180.0 + 3.0).to_radians()
}

fn lonlat_to_utm(lon_deg: f64, lat_deg: f64, zone: u32, north: bool) -> (f64, f64) {
    let lat = lat_deg.to_radians();
    let lon = lon_deg.to_radians();
    let lon0 = central_meridian(zone);

    let sin_lat = lat.sin();
    let cos_lat = lat.cos();
    let tan_lat = lat.tan();

    let n = A / (1.0 - E2 * sin_lat * sin_lat).sqrt();
    let t = tan_lat * tan_lat;
    let c = E_PRIME2 * cos_lat * cos_lat;
    let a = cos_lat * (lon - lon0);
    let m = meridional_arc(lat);

    let a2 = a * a;
    let a4 = a2 * a2;
    let a6 = a4 * a2;

    let easting = K0
        * n
        * (a + (1.0 - t + c) * a2 * a / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * E_PRIME2) * a4 * a / 120.0)
        + FALSE_EASTING;

    let northing = K0
        * (m + n
            * tan_lat
            * (a2 / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * E_PRIME2) * a6 / 720.0));

    if north {
        (easting, northing)
    } else {
        (easting, northing + FALSE_NORTHING_SOUTH)
    }
}

fn utm_to_lonlat(easting: f64, northing: f64, zone: u32, north: bool) -> (f64, f64) {
    let x = easting - FALSE_EASTING;
    let y = if north {
        northing
    } else {
        northing - FALSE_NORTHING_SOUTH
    };

    let e4 = E2 * E2;
    let e6 = e4 * E2;
    let m = y / K0;
    let mu = m / (A * (1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));

    let sqrt_1_e2 = (1.0 - E2).sqrt();
    let e1 = (1.0 - sqrt_1_e2) / (1.0 + sqrt_1_e2);
    let e1_2 = e1 * e1;
    let e1_3 = e1_2 * e1;
    let e1_4 = e1_3 * e1;

    // Footpoint latitude (Snyder eq. 3-26)
    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1_3 / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1_2 / 16.0 - 55.0 * e1_4 / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1_3 / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1_4 / 512.0) * (8.0 * mu).sin();

    let sin_phi = phi1.sin();
    let cos_phi = phi1.cos();
    let tan_phi = phi1.tan();

    let c1 = E_PRIME2 * cos_phi * cos_phi;
    let t1 = tan_phi * tan_phi;
    let w = 1.0 - E2 * sin_phi * sin_phi;
    let n1 = A / w.sqrt();
    let r1 = A * (1.0 - E2) / w.powf(1.5);
    let d = x / (n1 * K0);

    let d2 = d * d;
    let d4 = d2 * d2;
    let d6 = d4 * d2;

    // Snyder eqs. 8-17, 8-18
    let lat = phi1
        - (n1 * tan_phi / r1)
            * (d2 / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * E_PRIME2) * d4 / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1
                    - 252.0 * E_PRIME2
                    - 3.0 * c1 * c1)
                    * d6
                    / 720.0);

    let lon = central_meridian(zone)
        + (d - (1.0 + 2.0 * t1 + c1) * d2 * d / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * E_PRIME2 + 24.0 * t1 * t1)
                * d4
                * d
                / 120.0)
            / cos_phi;

    (lon.to_degrees(), lat.to_degrees())
}

/// Meridional arc from the equator to `lat` radians (Snyder eq. 3-21)
fn meridional_arc(lat: f64) -> f64 {
    let e4 = E2 * E2;
    let e6 = e4 * E2;

    A * ((1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * lat
        - (3.0 * E2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * lat).sin()
        + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * lat).sin()
        - (35.0 * e6 / 3072.0) * (6.0 * lat).sin())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    // pyproj: Transformer.from_crs(4326, 32630, always_xy=True)
    //   (-3.7037, 40.4168) -> (440298.94, 4474257.31)
    #[test]
    fn forward_utm_north() {
        let t = CoordinateTransform::new(&CRS::wgs84(), &CRS::from_epsg(32630)).unwrap();
        let (e, n) = t.transform(-3.7037, 40.4168);
        assert_abs_diff_eq!(e, 440_298.94, epsilon = 1.0);
        assert_abs_diff_eq!(n, 4_474_257.31, epsilon = 1.0);
    }

    // (-58.3816, -34.6037) -> (373317.50, 6170036.17) in 32721
    #[test]
    fn forward_utm_south() {
        let t = CoordinateTransform::new(&CRS::wgs84(), &CRS::from_epsg(32721)).unwrap();
        let (e, n) = t.transform(-58.3816, -34.6037);
        assert_abs_diff_eq!(e, 373_317.50, epsilon = 1.0);
        assert_abs_diff_eq!(n, 6_170_036.17, epsilon = 1.0);
    }

    #[test]
    fn equator_on_central_meridian() {
        let (e, n) = lonlat_to_utm(-3.0, 0.0, 30, true);
        assert_abs_diff_eq!(e, 500_000.0, epsilon = 0.01);
        assert_abs_diff_eq!(n, 0.0, epsilon = 0.01);
    }

    #[test]
    fn inverse_recovers_lonlat() {
        for &(lon, lat, zone, north) in &[
            (-93.6, 42.0, 15, true),
            (-3.7037, 40.4168, 30, true),
            (-58.3816, -34.6037, 21, false),
        ] {
            let (e, n) = lonlat_to_utm(lon, lat, zone, north);
            let (lon2, lat2) = utm_to_lonlat(e, n, zone, north);
            assert_abs_diff_eq!(lon2, lon, epsilon = 1e-7);
            assert_abs_diff_eq!(lat2, lat, epsilon = 1e-7);
        }
    }

    #[test]
    fn nad83_utm_matches_wgs84_utm() {
        let t = CoordinateTransform::new(&CRS::from_epsg(26915), &CRS::from_epsg(32615)).unwrap();
        assert!(t.is_identity());
    }

    #[test]
    fn unsupported_pair_is_error() {
        let err = CoordinateTransform::new(&CRS::from_epsg(3857), &CRS::wgs84());
        assert!(matches!(err, Err(Error::UnsupportedTransform { .. })));
    }

    #[test]
    fn extent_to_utm_is_metric() {
        let t = CoordinateTransform::new(&CRS::wgs84(), &CRS::from_epsg(32630)).unwrap();
        let ext = t.transform_extent(&Extent::new(-3.75, 40.40, -3.70, 40.45));
        assert!(ext.min_x > 100_000.0);
        assert!(ext.width() > 3_000.0 && ext.width() < 6_000.0);
        assert!(ext.height() > 4_000.0 && ext.height() < 7_000.0);
    }
}
