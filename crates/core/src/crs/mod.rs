//! Coordinate Reference System handling
//!
//! A [`CRS`] carries whatever identification is available (EPSG code, WKT,
//! PROJ string) plus the two properties the HEL workflow validates: whether
//! the system is projected or geographic, and its horizontal linear unit.

mod transform;

pub use transform::CoordinateTransform;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a coordinate system is planar or angular
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrsKind {
    Projected,
    Geographic,
}

/// Horizontal (or vertical) linear unit of measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinearUnit {
    Meter,
    Foot,
    /// US survey foot
    FootUs,
    Centimeter,
    Inch,
}

impl LinearUnit {
    /// Resolve a unit name as reported by GIS software.
    ///
    /// Accepts singular and plural spellings (`Meter`/`Meters`, `Foot`/`Feet`,
    /// `Centimeter`/`Centimeters`, `Inch`/`Inches`), `Foot_US`, and the WKT
    /// spellings `metre` and `US survey foot`. Matching is case-insensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "meter" | "meters" | "metre" | "metres" | "m" => Some(LinearUnit::Meter),
            "foot" | "feet" | "ft" | "foot_intl" | "international foot" => Some(LinearUnit::Foot),
            "foot_us" | "us survey foot" | "us_survey_foot" | "ftus" => Some(LinearUnit::FootUs),
            "centimeter" | "centimeters" | "centimetre" | "cm" => Some(LinearUnit::Centimeter),
            "inch" | "inches" | "in" => Some(LinearUnit::Inch),
            _ => None,
        }
    }

    /// Canonical name, matching the spelling used in unit tables and logs
    pub fn name(&self) -> &'static str {
        match self {
            LinearUnit::Meter => "Meter",
            LinearUnit::Foot => "Foot",
            LinearUnit::FootUs => "Foot_US",
            LinearUnit::Centimeter => "Centimeter",
            LinearUnit::Inch => "Inch",
        }
    }

    /// Length of one unit in meters
    pub fn meters_per_unit(&self) -> f64 {
        match self {
            LinearUnit::Meter => 1.0,
            LinearUnit::Foot => 0.3048,
            LinearUnit::FootUs => 1200.0 / 3937.0,
            LinearUnit::Centimeter => 0.01,
            LinearUnit::Inch => 0.0254,
        }
    }

    /// Whether this is one of the foot variants
    pub fn is_feet(&self) -> bool {
        matches!(self, LinearUnit::Foot | LinearUnit::FootUs)
    }

    /// Convert a length expressed in `from` units into this unit
    pub fn convert_from(&self, value: f64, from: LinearUnit) -> f64 {
        value * from.meters_per_unit() / self.meters_per_unit()
    }
}

impl fmt::Display for LinearUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Coordinate Reference System representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CRS {
    /// WKT representation (primary)
    wkt: Option<String>,
    /// EPSG code if known
    epsg: Option<u32>,
    /// PROJ string if available
    proj: Option<String>,
    /// Projected or geographic, when it could be determined
    kind: Option<CrsKind>,
    /// Horizontal linear unit of a projected system
    linear_unit: Option<LinearUnit>,
}

impl CRS {
    /// Create a CRS from an EPSG code.
    ///
    /// Kind and linear unit are filled in for the codes the workflow knows
    /// about: WGS84/NAD83 geographic, WGS84 UTM, NAD83 UTM and Web Mercator.
    pub fn from_epsg(code: u32) -> Self {
        let (kind, linear_unit) = match code {
            4326 | 4269 => (Some(CrsKind::Geographic), None),
            32601..=32660 | 32701..=32760 | 26901..=26923 | 3857 => {
                (Some(CrsKind::Projected), Some(LinearUnit::Meter))
            }
            _ => (None, None),
        };
        Self {
            wkt: None,
            epsg: Some(code),
            proj: None,
            kind,
            linear_unit,
        }
    }

    /// Create a CRS from a WKT string.
    ///
    /// The kind is read from the root keyword (`PROJCS`/`PROJCRS` versus
    /// `GEOGCS`/`GEOGCRS`) and the linear unit from the last `UNIT` entry of a
    /// projected definition. A trailing `AUTHORITY["EPSG", ...]` is kept as the
    /// EPSG code.
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        let wkt = wkt.into();
        let upper = wkt.trim_start().to_ascii_uppercase();
        let kind = if upper.starts_with("PROJCS") || upper.starts_with("PROJCRS") {
            Some(CrsKind::Projected)
        } else if upper.starts_with("GEOGCS") || upper.starts_with("GEOGCRS") {
            Some(CrsKind::Geographic)
        } else {
            None
        };
        let linear_unit = match kind {
            Some(CrsKind::Projected) => last_unit_name(&wkt).and_then(|n| LinearUnit::from_name(&n)),
            _ => None,
        };
        let epsg = last_epsg_authority(&wkt);
        Self {
            wkt: Some(wkt),
            epsg,
            proj: None,
            kind,
            linear_unit,
        }
    }

    /// Create a CRS from a PROJ string
    pub fn from_proj(proj: impl Into<String>) -> Self {
        let proj = proj.into();
        let kind = if proj.contains("+proj=longlat") {
            Some(CrsKind::Geographic)
        } else if proj.contains("+proj=") {
            Some(CrsKind::Projected)
        } else {
            None
        };
        let linear_unit = proj
            .split_whitespace()
            .find_map(|tok| tok.strip_prefix("+units="))
            .and_then(|u| match u {
                "m" => Some(LinearUnit::Meter),
                "ft" => Some(LinearUnit::Foot),
                "us-ft" => Some(LinearUnit::FootUs),
                "cm" => Some(LinearUnit::Centimeter),
                "in" => Some(LinearUnit::Inch),
                _ => None,
            });
        Self {
            wkt: None,
            epsg: None,
            proj: Some(proj),
            kind,
            linear_unit,
        }
    }

    /// A CRS with no identification; kind and unit may be attached later
    pub fn unknown() -> Self {
        Self {
            wkt: None,
            epsg: None,
            proj: None,
            kind: None,
            linear_unit: None,
        }
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    /// Override the kind, for sources whose definition does not carry it
    pub fn with_kind(mut self, kind: CrsKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Override the linear unit, for sources whose definition does not carry it
    pub fn with_linear_unit(mut self, unit: LinearUnit) -> Self {
        self.linear_unit = Some(unit);
        self
    }

    /// Get EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// Get WKT representation
    pub fn wkt(&self) -> Option<&str> {
        self.wkt.as_deref()
    }

    /// Get PROJ string
    pub fn proj(&self) -> Option<&str> {
        self.proj.as_deref()
    }

    /// Projected or geographic, if known
    pub fn kind(&self) -> Option<CrsKind> {
        self.kind
    }

    /// Whether the CRS is known to be projected
    pub fn is_projected(&self) -> bool {
        self.kind == Some(CrsKind::Projected)
    }

    /// Whether the CRS is known to be geographic
    pub fn is_geographic(&self) -> bool {
        self.kind == Some(CrsKind::Geographic)
    }

    /// Horizontal linear unit, if known
    pub fn linear_unit(&self) -> Option<LinearUnit> {
        self.linear_unit
    }

    /// Check if two CRS are equivalent
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        if let (Some(a), Some(b)) = (self.epsg, other.epsg) {
            return a == b;
        }

        // Textual comparison is imperfect but avoids needing a full parser
        if let (Some(a), Some(b)) = (&self.wkt, &other.wkt) {
            return a == b;
        }

        if let (Some(a), Some(b)) = (&self.proj, &other.proj) {
            return a == b;
        }

        false
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{}", code);
        }
        if let Some(proj) = &self.proj {
            return proj.clone();
        }
        if let Some(wkt) = &self.wkt {
            let end = wkt.char_indices().nth(50).map_or(wkt.len(), |(i, _)| i);
            return format!("WKT:{}", &wkt[..end]);
        }
        "Unknown".to_string()
    }
}

/// Name of the last `UNIT["..."` entry in a WKT string.
fn last_unit_name(wkt: &str) -> Option<String> {
    let upper = wkt.to_ascii_uppercase();
    let idx = upper.rfind("UNIT[")?;
    let rest = &wkt[idx + 5..];
    let start = rest.find('"')? + 1;
    let len = rest[start..].find('"')?;
    Some(rest[start..start + len].to_string())
}

/// EPSG code of the last `AUTHORITY["EPSG","nnnn"]` / `ID["EPSG",nnnn]` entry.
fn last_epsg_authority(wkt: &str) -> Option<u32> {
    let upper = wkt.to_ascii_uppercase();
    let idx = upper.rfind("\"EPSG\"")?;
    let digits: String = wkt[idx + 6..]
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

impl Default for CRS {
    fn default() -> Self {
        Self::wgs84()
    }
}
