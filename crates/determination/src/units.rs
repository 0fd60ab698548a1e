//! Z-factor and acre conversion tables
//!
//! The Z-factor converts a vertical rise measured in Z units into the DEM's
//! horizontal units for slope computation. Acre divisors turn squared
//! horizontal units into acres.

use std::fmt;

use heldet_core::LinearUnit;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::InputError;

/// Elevation (Z) unit of a DEM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ZUnit {
    Meter,
    Foot,
    Centimeter,
    Inch,
}

impl ZUnit {
    /// Parse `Meters`, `Feet`, `Centimeters`, `Inches` or any
    /// [`LinearUnit`] alias
    pub fn from_name(name: &str) -> Option<Self> {
        LinearUnit::from_name(name).map(Self::from)
    }

    /// Plural name used in run configuration and logs
    pub fn name(&self) -> &'static str {
        match self {
            ZUnit::Meter => "Meters",
            ZUnit::Foot => "Feet",
            ZUnit::Centimeter => "Centimeters",
            ZUnit::Inch => "Inches",
        }
    }

    /// Maximum sink-fill depth: one foot expressed in this unit
    pub fn fill_limit(&self) -> f64 {
        match self {
            ZUnit::Foot => 1.0,
            ZUnit::Meter => 0.3048,
            ZUnit::Inch => 12.0,
            ZUnit::Centimeter => 30.48,
        }
    }

    fn index(&self) -> usize {
        match self {
            ZUnit::Meter => 0,
            ZUnit::Foot => 1,
            ZUnit::Centimeter => 2,
            ZUnit::Inch => 3,
        }
    }
}

impl From<LinearUnit> for ZUnit {
    fn from(unit: LinearUnit) -> Self {
        match unit {
            LinearUnit::Meter => ZUnit::Meter,
            LinearUnit::Foot | LinearUnit::FootUs => ZUnit::Foot,
            LinearUnit::Centimeter => ZUnit::Centimeter,
            LinearUnit::Inch => ZUnit::Inch,
        }
    }
}

impl TryFrom<String> for ZUnit {
    type Error = InputError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ZUnit::from_name(&value).ok_or(InputError::UnknownZUnits(value))
    }
}

impl From<ZUnit> for String {
    fn from(unit: ZUnit) -> Self {
        unit.name().to_string()
    }
}

impl fmt::Display for ZUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Rows: XY unit; columns: Z unit (Meter, Foot, Centimeter, Inch)
const Z_FACTORS: [[f64; 4]; 4] = [
    [1.0, 0.3048, 0.01, 0.0254],
    [3.28084, 1.0, 0.0328084, 0.083333],
    [100.0, 30.48, 1.0, 2.54],
    [39.3701, 12.0, 0.393701, 1.0],
];

/// Z-factor for a DEM with horizontal unit `xy` and elevation unit `z`
pub fn z_factor(xy: LinearUnit, z: ZUnit) -> f64 {
    Z_FACTORS[ZUnit::from(xy).index()][z.index()]
}

/// Squared `xy` units per acre
pub fn acre_divisor(xy: LinearUnit) -> f64 {
    match xy {
        LinearUnit::Meter => 4046.8564224,
        LinearUnit::Foot | LinearUnit::FootUs => 43560.0,
        LinearUnit::Centimeter => 40_470_000.0,
        LinearUnit::Inch => 6_273_000.0,
    }
}

/// Resolve a horizontal unit name, failing with "cannot determine linear
/// units" for anything outside the table.
pub fn linear_unit(name: &str, subject: &str) -> Result<LinearUnit, InputError> {
    LinearUnit::from_name(name).ok_or_else(|| InputError::UnknownLinearUnits(subject.to_string()))
}

/// Elevation unit to use: the caller's choice, or the XY unit when none was
/// given.
pub fn resolve_z_unit(xy: LinearUnit, requested: Option<ZUnit>) -> ZUnit {
    match requested {
        Some(z) => z,
        None => {
            let z = ZUnit::from(xy);
            info!("Z-units were auto set to: {}", z);
            z
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const UNITS: [LinearUnit; 4] = [
        LinearUnit::Meter,
        LinearUnit::Foot,
        LinearUnit::Centimeter,
        LinearUnit::Inch,
    ];

    #[test]
    fn test_reflexive_z_factor() {
        for unit in UNITS {
            assert_eq!(z_factor(unit, ZUnit::from(unit)), 1.0);
        }
        assert_eq!(z_factor(LinearUnit::FootUs, ZUnit::Foot), 1.0);
    }

    #[test]
    fn test_matrix_values() {
        assert_eq!(z_factor(LinearUnit::Meter, ZUnit::Foot), 0.3048);
        assert_eq!(z_factor(LinearUnit::Foot, ZUnit::Meter), 3.28084);
        assert_eq!(z_factor(LinearUnit::Foot, ZUnit::Inch), 0.083333);
        assert_eq!(z_factor(LinearUnit::Centimeter, ZUnit::Foot), 30.48);
        assert_eq!(z_factor(LinearUnit::Inch, ZUnit::Centimeter), 0.393701);
    }

    #[test]
    fn test_not_inverse_in_general() {
        // 0.083333 * 12 is not exactly 1
        let product = z_factor(LinearUnit::Foot, ZUnit::Inch) * z_factor(LinearUnit::Inch, ZUnit::Foot);
        assert!(product != 1.0);
        assert_relative_eq!(product, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_acre_divisors() {
        assert_eq!(acre_divisor(LinearUnit::Meter), 4046.8564224);
        assert_eq!(acre_divisor(LinearUnit::FootUs), 43560.0);
        assert_eq!(acre_divisor(LinearUnit::Inch), 6_273_000.0);
    }

    #[test]
    fn test_z_unit_names() {
        assert_eq!(ZUnit::from_name("Feet"), Some(ZUnit::Foot));
        assert_eq!(ZUnit::from_name("Centimeters"), Some(ZUnit::Centimeter));
        assert_eq!(ZUnit::from_name("furlongs"), None);
        let parsed: ZUnit = serde_json::from_str("\"Inches\"").unwrap();
        assert_eq!(parsed, ZUnit::Inch);
        assert!(serde_json::from_str::<ZUnit>("\"cubits\"").is_err());
    }

    #[test]
    fn test_unknown_linear_unit() {
        let err = linear_unit("Degree", "DEM").unwrap_err();
        assert_eq!(err.to_string(), "cannot determine linear units of DEM");
    }

    #[test]
    fn test_auto_z_unit() {
        assert_eq!(resolve_z_unit(LinearUnit::FootUs, None), ZUnit::Foot);
        assert_eq!(resolve_z_unit(LinearUnit::Meter, Some(ZUnit::Foot)), ZUnit::Foot);
    }

    #[test]
    fn test_fill_limit() {
        assert_eq!(ZUnit::Foot.fill_limit(), 1.0);
        assert_eq!(ZUnit::Meter.fill_limit(), 0.3048);
        assert_eq!(ZUnit::Inch.fill_limit(), 12.0);
        assert_eq!(ZUnit::Centimeter.fill_limit(), 30.48);
    }
}
