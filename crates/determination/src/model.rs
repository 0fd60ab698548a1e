//! Records flowing through a determination run

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use geo::MultiPolygon;
use serde::{Deserialize, Serialize};

/// HEL share of a field (percent) at or above which the field is HEL
pub const HEL_PERCENT_THRESHOLD: f64 = 33.33;
/// HEL acres at or above which a field is HEL regardless of share
pub const HEL_ACRES_THRESHOLD: f64 = 50.0;
/// NHEL share of a field (percent) above which the field is NHEL
pub const NHEL_PERCENT_THRESHOLD: f64 = 66.67;
/// HEL factor above which a cell is HEL
pub const EI_HEL_THRESHOLD: f64 = 8.0;
/// Polygon HEL share (percent) above which the polygon is HEL
pub const POLYGON_MAJORITY_PERCENT: f64 = 50.0;

/// Field layer attribute names
pub mod attr {
    pub const CLU_NUMBER: &str = "CLUNBR";
    pub const TRACT: &str = "TRACTNBR";
    pub const FARM: &str = "FARMNBR";
    pub const COUNTY: &str = "COUNTYCD";
    pub const CALC_ACRES: &str = "CALCACRES";
    pub const HEL_RATING: &str = "MUHELCL";
    pub const K: &str = "K";
    pub const T: &str = "T";
    pub const R: &str = "R";
    pub const OG_HEL_CODE: &str = "Og_HELcode";
    pub const OG_HEL_ACRES: &str = "Og_HEL_Acres";
    pub const OG_HEL_PCT: &str = "Og_HEL_AcrePct";
    pub const POLYGON_ACRES: &str = "Polygon_Acres";
    pub const FINAL_HEL_VALUE: &str = "Final_HEL_Value";
    pub const FINAL_HEL_ACRES: &str = "Final_HEL_Acres";
    pub const FINAL_HEL_PERCENT: &str = "Final_HEL_Percent";
    pub const HEL_YES: &str = "HEL_YES";
    pub const HEL_ACRES: &str = "HEL_Acres";
    pub const HEL_PCT: &str = "HEL_Pct";
}

/// Soil map unit HEL classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HelRating {
    #[serde(rename = "HEL")]
    Hel,
    #[serde(rename = "NA")]
    Na,
    #[serde(rename = "NHEL")]
    Nhel,
    #[serde(rename = "PHEL")]
    Phel,
}

impl HelRating {
    pub const ALL: [HelRating; 4] = [HelRating::Hel, HelRating::Na, HelRating::Nhel, HelRating::Phel];

    pub fn as_str(&self) -> &'static str {
        match self {
            HelRating::Hel => "HEL",
            HelRating::Na => "NA",
            HelRating::Nhel => "NHEL",
            HelRating::Phel => "PHEL",
        }
    }

    /// Integer code burned into the HEL-code raster
    pub fn raster_code(&self) -> i64 {
        match self {
            HelRating::Hel => 0,
            HelRating::Nhel | HelRating::Na => 1,
            HelRating::Phel => 2,
        }
    }
}

impl FromStr for HelRating {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HEL" => Ok(HelRating::Hel),
            "NHEL" => Ok(HelRating::Nhel),
            "PHEL" => Ok(HelRating::Phel),
            "NA" => Ok(HelRating::Na),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for HelRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field (CLU) number. Numeric numbers order numerically, others by text.
/// Numbers of equal value but different text ("1", "01") stay distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CluNumber(pub String);

impl CluNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Ord for CluNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.0.parse::<i64>(), other.0.parse::<i64>()) {
            (Ok(a), Ok(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            _ => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for CluNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CluNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One administrative field
#[derive(Debug, Clone)]
pub struct CluRecord {
    pub clu_number: CluNumber,
    pub tract: String,
    pub farm: String,
    pub county: String,
    /// Area computed from the geometry, in acres
    pub calc_acres: f64,
    pub geometry: MultiPolygon<f64>,
}

/// A single-part intersection of one field with one soil polygon
#[derive(Debug, Clone)]
pub struct SummaryPolygon {
    pub clu_number: CluNumber,
    pub rating: HelRating,
    pub k: Option<f64>,
    pub t: Option<f64>,
    pub r: Option<f64>,
    pub acres: f64,
    pub geometry: MultiPolygon<f64>,
}

/// One rating's share of one field, after dissolving summary polygons
#[derive(Debug, Clone)]
pub struct DissolvedSummary {
    pub clu_number: CluNumber,
    pub rating: HelRating,
    pub acres: f64,
    /// Share of the field's computed acres, rounded to two decimals and
    /// clamped to 100
    pub percent: f64,
    pub geometry: MultiPolygon<f64>,
}

/// Final field outcome: rating, acres and the rating's share of the field
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldDecision {
    pub rating: HelRating,
    pub acres: f64,
    pub percent: f64,
}

/// Round to `places` decimals
pub fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

/// Percentage of `part` in `whole`, clamped to [0, 100]
pub fn clamped_percent(part: f64, whole: f64) -> f64 {
    if whole <= 0.0 {
        return 0.0;
    }
    (part / whole * 100.0).clamp(0.0, 100.0)
}
