//! Determination run: intersect, dissolve, decide, and resolve PHEL
//! through the erosion index when the area thresholds cannot.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use geo::Area;
use heldet_algorithms::statistics::tabulate_area;
use heldet_algorithms::vector::{dissolve, intersect, union_all};
use heldet_core::crs::{LinearUnit, CRS};
use heldet_core::raster::Raster;
use heldet_core::vector::{Feature, FeatureCollection};
use serde::Deserialize;
use tracing::{debug, info};

use crate::context::ProcessingContext;
use crate::decider::{
    decide_fields_final, decide_initial, decide_polygons, detect_collapse, final_polygons_from_ratings,
    Collapse, FinalFieldResult, FinalPolygon, InitialDecision,
};
use crate::dem::{check_coverage, Coverage, DemPreparer, ElevationSource};
use crate::erosion::{ErosionIndexEngine, SoilFactorRasters};
use crate::error::{DeterminationError, InputError, Result};
use crate::model::{
    attr, clamped_percent, round_to, CluNumber, CluRecord, DissolvedSummary, FieldDecision, HelRating,
    SummaryPolygon,
};
use crate::output::{clear_outputs, write_outputs};
use crate::soils::{merge_soil_layers, SoilLayer};
use crate::units::{acre_divisor, ZUnit};

/// Run configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeterminationParams {
    /// Elevation units; the DEM's horizontal unit when absent
    pub z_units: Option<ZUnit>,
    /// Use the runoff LS form
    pub use_runoff_ls: bool,
    pub aoi_buffer_feet: f64,
    pub target_cell_size: f64,
    pub max_cell_size_meters: f64,
}

impl Default for DeterminationParams {
    fn default() -> Self {
        let dem = DemPreparer::default();
        Self {
            z_units: None,
            use_runoff_ls: false,
            aoi_buffer_feet: dem.aoi_buffer_feet,
            target_cell_size: dem.target_cell_size,
            max_cell_size_meters: dem.max_cell_size_meters,
        }
    }
}

/// Everything a run reads
#[derive(Debug)]
pub struct DeterminationInputs {
    pub fields: FeatureCollection,
    pub soils: Vec<SoilLayer>,
    pub dem: Option<ElevationSource>,
}

/// Progress of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Start,
    PolygonSummaryReady,
    NeedsErosionIndex,
    Decided,
}

/// How the final ratings were reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeterminationPath {
    /// No PHEL soils at all
    NoPhel,
    /// PHEL present but every field settled by the area thresholds
    ResolvedByThresholds,
    /// PHEL resolved by the erosion index
    ErosionIndex,
}

/// Result of a determination run
#[derive(Debug, Clone)]
pub struct DeterminationOutcome {
    pub tract: String,
    pub farm: String,
    pub path: DeterminationPath,
    pub fields: Vec<CluRecord>,
    pub decisions: BTreeMap<CluNumber, FieldDecision>,
    pub initial: InitialDecision,
    /// Field results of the erosion-index pass
    pub final_fields: Option<BTreeMap<CluNumber, FinalFieldResult>>,
    pub collapse: Option<Collapse>,
    pub coverage: Option<Coverage>,
    /// "Initial HEL Summary": one feature per field and rating
    pub initial_summary: FeatureCollection,
    /// "Final HEL Summary": one feature per field/soil intersection
    pub final_summary: FeatureCollection,
    /// Field layer carrying HEL_YES, HEL_Acres and HEL_Pct
    pub field_determination: FeatureCollection,
    /// "LiDAR HEL Summary": classes 1 (NHEL) and 2 (HEL)
    pub lidar_hel: Option<Raster<f64>>,
    /// Files written to the workspace, if any
    pub outputs: Vec<PathBuf>,
}

/// Validated field layer
struct FieldSet {
    records: Vec<CluRecord>,
    layer: FeatureCollection,
    crs: CRS,
    unit: LinearUnit,
    tract: String,
    farm: String,
}

fn required_text(feature: &Feature, name: &'static str) -> std::result::Result<String, InputError> {
    feature
        .property_ci(name)
        .and_then(|v| v.to_text())
        .filter(|s| !s.trim().is_empty())
        .ok_or(InputError::MissingFieldAttribute(name))
}

fn read_fields(layer: &FeatureCollection) -> Result<FieldSet> {
    let crs = match &layer.crs {
        Some(crs) if crs.is_projected() => crs.clone(),
        _ => return Err(InputError::NotProjected("field layer".into()).into()),
    };
    let unit = crs
        .linear_unit()
        .ok_or_else(|| InputError::UnknownLinearUnits("field layer".into()))?;
    let divisor = acre_divisor(unit);

    let mut records = Vec::with_capacity(layer.len());
    let mut out = FeatureCollection::with_crs(Some(crs.clone()));
    for feature in layer.iter() {
        let Some(geometry) = feature.polygons() else {
            continue;
        };
        let calc_acres = geometry.unsigned_area() / divisor;
        records.push(CluRecord {
            clu_number: CluNumber(required_text(feature, attr::CLU_NUMBER)?),
            tract: required_text(feature, attr::TRACT)?,
            farm: required_text(feature, attr::FARM)?,
            county: feature
                .property_ci(attr::COUNTY)
                .and_then(|v| v.to_text())
                .unwrap_or_default(),
            calc_acres,
            geometry,
        });
        let mut feature = feature.clone();
        feature.set_property(attr::CALC_ACRES, calc_acres);
        out.push(feature);
    }
    if records.is_empty() {
        return Err(InputError::NoFields.into());
    }

    let tracts: BTreeSet<&str> = records.iter().map(|r| r.tract.as_str()).collect();
    if tracts.len() > 1 {
        return Err(InputError::MultipleTracts(tracts.len()).into());
    }
    let farms: BTreeSet<&str> = records.iter().map(|r| r.farm.as_str()).collect();
    if farms.len() > 1 {
        return Err(InputError::MultipleFarms(farms.len()).into());
    }

    let tract = records[0].tract.clone();
    let farm = records[0].farm.clone();
    Ok(FieldSet {
        records,
        layer: out,
        crs,
        unit,
        tract,
        farm,
    })
}

/// Fail on null ratings first, then on ratings outside HEL/NHEL/PHEL/NA.
fn validate_ratings(summary: &FeatureCollection) -> std::result::Result<(), InputError> {
    let mut nulls = 0;
    let mut invalid = BTreeSet::new();
    for feature in summary.iter() {
        match feature.property_ci(attr::HEL_RATING).and_then(|v| v.to_text()) {
            Some(text) if !text.trim().is_empty() => {
                if text.trim().parse::<HelRating>().is_err() {
                    invalid.insert(text);
                }
            }
            _ => nulls += 1,
        }
    }
    if nulls > 0 {
        return Err(InputError::NullRating(nulls));
    }
    if !invalid.is_empty() {
        return Err(InputError::InvalidRating(invalid.into_iter().collect()));
    }
    Ok(())
}

fn rating_of(feature: &Feature) -> Option<HelRating> {
    feature
        .property_ci(attr::HEL_RATING)
        .and_then(|v| v.to_text())
        .and_then(|s| s.trim().parse().ok())
}

/// Summary polygons with their soil factors. Features lacking a polygon,
/// field number or rating are dropped from `summary` so both stay aligned.
fn summary_polygons(summary: &mut FeatureCollection, divisor: f64) -> Vec<SummaryPolygon> {
    let mut polygons = Vec::with_capacity(summary.len());
    summary.features.retain(|f| {
        let polygon = f.polygons().and_then(|geometry| {
            Some(SummaryPolygon {
                clu_number: CluNumber(f.property_ci(attr::CLU_NUMBER)?.to_text()?),
                rating: rating_of(f)?,
                k: f.property_ci(attr::K).and_then(|v| v.as_f64()),
                t: f.property_ci(attr::T).and_then(|v| v.as_f64()),
                r: f.property_ci(attr::R).and_then(|v| v.as_f64()),
                acres: geometry.unsigned_area() / divisor,
                geometry,
            })
        });
        match polygon {
            Some(p) => {
                polygons.push(p);
                true
            }
            None => false,
        }
    });
    polygons
}

/// Dissolve the summary by field and rating, attaching the original
/// HEL code, acres and share of the field.
fn dissolve_summary(summary: &FeatureCollection, divisor: f64) -> (FeatureCollection, Vec<DissolvedSummary>) {
    let mut layer = dissolve(
        summary,
        &[
            attr::CLU_NUMBER,
            attr::TRACT,
            attr::FARM,
            attr::COUNTY,
            attr::CALC_ACRES,
            attr::HEL_RATING,
        ],
        false,
    );

    let mut rows = Vec::with_capacity(layer.len());
    for feature in layer.features.iter_mut() {
        let (Some(geometry), Some(rating)) = (feature.polygons(), rating_of(feature)) else {
            continue;
        };
        let Some(clu) = feature.property_ci(attr::CLU_NUMBER).and_then(|v| v.to_text()) else {
            continue;
        };
        let calc_acres = feature
            .property_ci(attr::CALC_ACRES)
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);
        let acres = geometry.unsigned_area() / divisor;
        let percent = round_to(clamped_percent(acres, calc_acres), 2);

        feature.set_property(attr::OG_HEL_CODE, rating.raster_code());
        feature.set_property(attr::OG_HEL_ACRES, acres);
        feature.set_property(attr::OG_HEL_PCT, percent);
        rows.push(DissolvedSummary {
            clu_number: CluNumber(clu),
            rating,
            acres,
            percent,
            geometry,
        });
    }
    (layer, rows)
}

fn final_summary_layer(summary: &FeatureCollection, finals: &[FinalPolygon]) -> FeatureCollection {
    let mut out = FeatureCollection::with_crs(summary.crs.clone());
    for (feature, f) in summary.iter().zip(finals) {
        out.push(
            feature
                .clone()
                .with_property(attr::POLYGON_ACRES, f.polygon_acres)
                .with_property(attr::FINAL_HEL_VALUE, f.value.as_str())
                .with_property(attr::FINAL_HEL_ACRES, f.hel_acres)
                .with_property(attr::FINAL_HEL_PERCENT, f.hel_percent),
        );
    }
    out
}

fn field_determination_layer(fields: &FeatureCollection, decisions: &BTreeMap<CluNumber, FieldDecision>) -> FeatureCollection {
    let mut out = FeatureCollection::with_crs(fields.crs.clone());
    for feature in fields.iter() {
        let mut feature = feature.clone();
        let decision = feature
            .property_ci(attr::CLU_NUMBER)
            .and_then(|v| v.to_text())
            .and_then(|clu| decisions.get(&CluNumber(clu)));
        if let Some(d) = decision {
            feature.set_property(attr::HEL_YES, d.rating.as_str());
            feature.set_property(attr::HEL_ACRES, d.acres);
            feature.set_property(attr::HEL_PCT, d.percent);
        }
        out.push(feature);
    }
    out
}

/// Drives a determination from inputs to the four result layers
#[derive(Debug, Clone)]
pub struct DeterminationOrchestrator {
    params: DeterminationParams,
    state: RunState,
}

impl DeterminationOrchestrator {
    pub fn new(params: DeterminationParams) -> Self {
        Self {
            params,
            state: RunState::Start,
        }
    }

    pub fn params(&self) -> &DeterminationParams {
        &self.params
    }

    /// State reached by the last run
    pub fn state(&self) -> RunState {
        self.state
    }

    fn advance(&mut self, next: RunState) {
        debug!("run state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Run a determination. Scratch datasets are released whether or not
    /// the run succeeds. With a workspace, earlier results are removed
    /// before any processing and the new ones are written on success.
    pub fn run(&mut self, ctx: &mut ProcessingContext, inputs: &DeterminationInputs) -> Result<DeterminationOutcome> {
        self.state = RunState::Start;
        if let Some(workspace) = ctx.workspace() {
            clear_outputs(workspace)?;
        }
        let result = self.execute(ctx, inputs);
        ctx.scratch.release_all();
        let mut outcome = result?;

        if let Some(workspace) = ctx.workspace() {
            outcome.outputs = write_outputs(workspace, &outcome)?;
        }
        Ok(outcome)
    }

    fn execute(&mut self, ctx: &mut ProcessingContext, inputs: &DeterminationInputs) -> Result<DeterminationOutcome> {
        let fields = read_fields(&inputs.fields)?;
        let divisor = acre_divisor(fields.unit);
        info!(
            "Processing {} field(s) on tract {}, farm {}",
            fields.records.len(),
            fields.tract,
            fields.farm
        );

        let mask = union_all(&fields.layer);
        let soils = merge_soil_layers(&inputs.soils, &mask, Some(&fields.crs))?;
        let soils = ctx.scratch.put("soils", soils);

        info!("Intersecting fields with soils");
        let mut summary = intersect(&fields.layer, ctx.scratch.layer(&soils)?)?;
        ctx.scratch.release(&soils);
        self.advance(RunState::PolygonSummaryReady);

        validate_ratings(&summary)?;
        let polygons = summary_polygons(&mut summary, divisor);
        let total_acres: f64 = polygons.iter().map(|p| p.acres).sum();
        if polygons.is_empty() || total_acres <= 0.0 {
            return Err(InputError::NoOverlap.into());
        }

        info!("Computing summary of original HEL values");
        let (initial_summary, dissolved) = dissolve_summary(&summary, divisor);
        let initial = decide_initial(&dissolved);

        if initial.skip_geoprocessing() {
            let path = if initial.has_phel {
                info!("All fields were determined by HEL soil acreage; skipping PHEL geoprocessing");
                DeterminationPath::ResolvedByThresholds
            } else {
                info!("There are no PHEL values in the HEL layer; skipping PHEL geoprocessing");
                DeterminationPath::NoPhel
            };
            let finals = final_polygons_from_ratings(&polygons, &initial);
            let decisions = initial.final_decisions();
            self.advance(RunState::Decided);

            return Ok(DeterminationOutcome {
                tract: fields.tract,
                farm: fields.farm,
                path,
                final_summary: final_summary_layer(&summary, &finals),
                field_determination: field_determination_layer(&fields.layer, &decisions),
                fields: fields.records,
                decisions,
                initial,
                final_fields: None,
                collapse: None,
                coverage: None,
                initial_summary,
                lidar_hel: None,
                outputs: Vec::new(),
            });
        }

        self.advance(RunState::NeedsErosionIndex);
        info!("PHEL values present; running the erosion index");
        let source = inputs.dem.as_ref().ok_or(InputError::DemRequired)?;
        let preparer = DemPreparer {
            aoi_buffer_feet: self.params.aoi_buffer_feet,
            target_cell_size: self.params.target_cell_size,
            max_cell_size_meters: self.params.max_cell_size_meters,
        };
        let dem = preparer.prepare(&fields.layer, source, self.params.z_units)?;
        let coverage = check_coverage(&dem.raster, &fields.layer);

        let factors = SoilFactorRasters::rasterize(&summary, &initial_summary, &dem.raster)?;
        let classes = ErosionIndexEngine::new(self.params.use_runoff_ls).classify(&dem, &factors, &mut ctx.scratch)?;

        info!("Tabulating HEL classes by summary polygon");
        let zones: Vec<_> = polygons.iter().map(|p| p.geometry.clone()).collect();
        let tables = tabulate_area(&zones, &classes)?;
        let collapse = detect_collapse(&tables).map_err(|()| {
            DeterminationError::RasterProcessing(heldet_core::Error::Algorithm(
                "reclassifying HEL factor left no classified cells under the fields".into(),
            ))
        })?;

        let finals = decide_polygons(&polygons, &tables, divisor);
        let final_fields = decide_fields_final(&fields.records, &polygons, &finals, collapse, &initial);
        let decisions: BTreeMap<CluNumber, FieldDecision> = final_fields
            .iter()
            .map(|(clu, r)| (clu.clone(), r.decision))
            .collect();

        for (clu, r) in &final_fields {
            info!("CLU #: {}", clu);
            info!("    HEL Acres:  {:.1} .ac -- {:.1} %", r.hel_acres, r.hel_percent);
            info!("    NHEL Acres: {:.1} .ac -- {:.1} %", r.nhel_acres, r.nhel_percent);
            info!("    HEL Determination: {}", r.decision.rating);
        }
        self.advance(RunState::Decided);

        Ok(DeterminationOutcome {
            tract: fields.tract,
            farm: fields.farm,
            path: DeterminationPath::ErosionIndex,
            final_summary: final_summary_layer(&summary, &finals),
            field_determination: field_determination_layer(&fields.layer, &decisions),
            fields: fields.records,
            decisions,
            initial,
            final_fields: Some(final_fields),
            collapse,
            coverage: Some(coverage),
            initial_summary,
            lidar_hel: Some(classes),
            outputs: Vec::new(),
        })
    }
}
