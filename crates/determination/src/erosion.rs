//! AH537 erosion-index pipeline
//!
//! fill → 3x3 mean → slope / D8 direction → upstream length (3x3 max)
//! → LS → EI = LS·K·R/T → HEL factor → classes 1 (NHEL) and 2 (HEL).
//! Every stage is all-or-nothing; intermediate surfaces live in the
//! scratch arena and are released as soon as the next stage has used them.

use heldet_algorithms::algebra::{band_math, combine, reclassify, RangeBoundary, ReclassEntry, ReclassifyParams};
use heldet_algorithms::hydrology::{fill_sinks, flow_direction, flow_length_upstream, FillSinksParams, FlowDirectionParams};
use heldet_algorithms::statistics::{focal_statistics, FocalParams, FocalStatistic};
use heldet_algorithms::terrain::{slope, SlopeParams, SlopeUnits};
use heldet_algorithms::vector::rasterize;
use heldet_core::raster::Raster;
use heldet_core::vector::FeatureCollection;
use tracing::info;

use crate::context::ScratchArena;
use crate::dem::PreparedDem;
use crate::error::Result;
use crate::model::{attr, EI_HEL_THRESHOLD};

/// Feet per meter used to express flow length in feet
pub const FEET_PER_METER: f64 = 3.280839896;
/// Unit plot length (ft)
const PLOT_LENGTH_FT: f64 = 72.6;
/// Unit plot steepness (degrees) of the runoff LS form
const PLOT_SLOPE_DEG: f64 = 5.143;
/// HEL factor assigned to cells rated HEL
const HEL_FORCED_FACTOR: f64 = 9.0;
/// Upper bound of the HEL class range
const CLASS_RANGE_MAX: f64 = 100_000_000.0;

/// AH537 LS factor from flow length (ft), slope angle and percent slope
pub fn ls_standard(flow_length_ft: f64, radians: f64, slope_percent: f64) -> f64 {
    let sin = radians.sin();
    let s = 65.41 * sin * sin + 4.56 * sin + 0.065;
    let m = if slope_percent < 1.0 {
        0.2
    } else if slope_percent < 3.0 {
        0.3
    } else if slope_percent < 5.0 {
        0.4
    } else {
        0.5
    };
    (flow_length_ft / PLOT_LENGTH_FT).powf(m) * s
}

/// LS factor of the runoff form
pub fn ls_runoff(flow_length_ft: f64, radians: f64) -> f64 {
    let l = (flow_length_ft / PLOT_LENGTH_FT * radians.cos()).powf(0.5);
    let s = (radians.sin() / PLOT_SLOPE_DEG.to_radians().sin()).powf(0.7);
    l * s
}

/// HEL factor of one cell from its HEL code (0 HEL, 1 NHEL/NA, 2 PHEL)
/// and erosion index
pub fn hel_factor(code: Option<f64>, erosion_index: Option<f64>) -> Option<f64> {
    match code? as i64 {
        2 => erosion_index,
        0 => Some(HEL_FORCED_FACTOR),
        1 => Some(1.0),
        _ => None,
    }
}

/// Soil factors burned onto the prepared DEM grid
#[derive(Debug, Clone)]
pub struct SoilFactorRasters {
    pub k: Raster<f64>,
    pub t: Raster<f64>,
    pub r: Raster<f64>,
    pub hel_code: Raster<f64>,
}

impl SoilFactorRasters {
    /// Rasterize K, T and R from the summary polygons and the HEL code
    /// from the dissolved field/rating summary.
    pub fn rasterize(summary: &FeatureCollection, dissolved: &FeatureCollection, template: &Raster<f64>) -> Result<Self> {
        info!("Converting soil factors to rasters");
        Ok(Self {
            k: rasterize(summary, attr::K, template)?,
            t: rasterize(summary, attr::T, template)?,
            r: rasterize(summary, attr::R, template)?,
            hel_code: rasterize(dissolved, attr::OG_HEL_CODE, template)?,
        })
    }
}

/// Erosion-index classification of a prepared DEM
#[derive(Debug, Clone, Copy, Default)]
pub struct ErosionIndexEngine {
    /// Use the runoff LS form instead of the AH537 L·S product
    pub use_runoff_ls: bool,
}

impl ErosionIndexEngine {
    pub fn new(use_runoff_ls: bool) -> Self {
        Self { use_runoff_ls }
    }

    /// Classify every cell of `dem` as 1 (NHEL) or 2 (HEL); cells without
    /// a soil code or elevation are NoData.
    pub fn classify(&self, dem: &PreparedDem, factors: &SoilFactorRasters, arena: &mut ScratchArena) -> Result<Raster<f64>> {
        info!("Filling sinks to a limit of {} {}", dem.z_unit.fill_limit(), dem.z_unit);
        let filled = fill_sinks(
            &dem.raster,
            FillSinksParams {
                z_limit: Some(dem.z_unit.fill_limit()),
            },
        )?;
        let filled = arena.put("fill", filled);

        info!("Smoothing the filled DEM (3x3 mean)");
        let smoothed = focal_statistics(arena.surface(&filled)?, FocalParams::default())?;
        arena.release(&filled);
        let smoothed = arena.put("preslope", smoothed);

        info!("Calculating percent slope (Z-factor {})", dem.z_factor);
        let slope_pct = slope(
            arena.surface(&smoothed)?,
            SlopeParams {
                units: SlopeUnits::Percent,
                z_factor: dem.z_factor,
            },
        )?;
        let slope_pct = arena.put("slope", slope_pct);

        info!("Calculating flow direction");
        let directions = flow_direction(
            arena.surface(&smoothed)?,
            FlowDirectionParams {
                force_edge_outflow: true,
                resolve_flats: true,
            },
        )?;
        arena.release(&smoothed);
        let directions = arena.put("flow_dir", directions);

        info!("Calculating upstream flow length");
        let raw_length = flow_length_upstream(arena.directions(&directions)?)?;
        arena.release(&directions);
        let mut length = focal_statistics(
            &raw_length,
            FocalParams {
                statistic: FocalStatistic::Max,
                ..Default::default()
            },
        )?;
        if !dem.linear_unit.is_feet() {
            info!("Converting flow length from {} to feet", dem.linear_unit);
            length = band_math(&length, |v| v * FEET_PER_METER)?;
        }
        let length = arena.put("flow_length", length);

        let radians = band_math(arena.surface(&slope_pct)?, |s| (s * 0.01).atan())?;
        let radians = arena.put("radians", radians);

        let ls = if self.use_runoff_ls {
            info!("Calculating LS factor (runoff equation)");
            combine(&[arena.surface(&length)?, arena.surface(&radians)?], |v| {
                Some(ls_runoff(v[0]?, v[1]?))
            })?
        } else {
            info!("Calculating LS factor (AH537)");
            combine(
                &[arena.surface(&length)?, arena.surface(&radians)?, arena.surface(&slope_pct)?],
                |v| Some(ls_standard(v[0]?, v[1]?, v[2]?)),
            )?
        };
        for id in [&length, &radians, &slope_pct] {
            arena.release(id);
        }
        let ls = arena.put("ls_factor", ls);

        info!("Calculating erosion index");
        let ei = combine(
            &[arena.surface(&ls)?, &factors.k, &factors.r, &factors.t],
            |v| match (v[0], v[1], v[2], v[3]) {
                (Some(ls), Some(k), Some(r), Some(t)) if t != 0.0 => Some(ls * k * r / t),
                _ => None,
            },
        )?;
        arena.release(&ls);
        let ei = arena.put("ei_factor", ei);

        let factor = combine(&[&factors.hel_code, arena.surface(&ei)?], |v| hel_factor(v[0], v[1]))?;
        arena.release(&ei);

        info!("Reclassifying HEL factor at {}", EI_HEL_THRESHOLD);
        let classes = reclassify(
            &factor,
            ReclassifyParams {
                classes: vec![
                    ReclassEntry::new(0.0, EI_HEL_THRESHOLD, 1.0),
                    ReclassEntry::new(EI_HEL_THRESHOLD, CLASS_RANGE_MAX, 2.0),
                ],
                default_value: f64::NAN,
                boundary: RangeBoundary::UpperInclusive,
            },
        )?;
        Ok(classes)
    }
}
