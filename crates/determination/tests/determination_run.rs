//! End-to-end determinations on synthetic fields, soils and terrain

use approx::assert_relative_eq;
use geo::{polygon, Polygon};
use heldet_core::crs::CRS;
use heldet_core::raster::{GeoTransform, Raster};
use heldet_core::vector::{Feature, FeatureCollection};
use heldet_determination::output::{FIELD_DETERMINATION, FINAL_HEL_SUMMARY, INITIAL_HEL_SUMMARY, LIDAR_HEL_SUMMARY};
use heldet_determination::{
    CluNumber, DeterminationError, DeterminationInputs, DeterminationOrchestrator, DeterminationOutcome,
    DeterminationParams, DeterminationPath, ElevationSource, FieldDecision, HelRating, InputError,
    ProcessingContext, Result, RunState, SoilLayer, Workspace,
};

const UTM15N: u32 = 26915;
const SQ_M_PER_ACRE: f64 = 4046.8564224;
const X0: f64 = 500_000.0;
const Y0: f64 = 4_600_000.0;

fn rect(x: f64, y: f64, w: f64, h: f64) -> Polygon<f64> {
    polygon![(x: x, y: y), (x: x + w, y: y), (x: x + w, y: y + h), (x: x, y: y + h)]
}

fn field(clu: i64, poly: Polygon<f64>) -> Feature {
    Feature::new(poly)
        .with_property("CLUNBR", clu)
        .with_property("TRACTNBR", "1234")
        .with_property("FARMNBR", "56")
        .with_property("COUNTYCD", "169")
}

fn soil(poly: Polygon<f64>, rating: Option<&str>) -> Feature {
    Feature::new(poly)
        .with_property("AREASYMBOL", "IA169")
        .with_property("SPATIALVER", 4i64)
        .with_property("MUSYM", "138C2")
        .with_property("MUNAME", "Clarion loam")
        .with_property("MUHELCL", rating)
        .with_property("K", 0.3)
        .with_property("T", 5.0)
        .with_property("R", 150.0)
}

fn layer(features: Vec<Feature>) -> FeatureCollection {
    FeatureCollection {
        features,
        crs: Some(CRS::from_epsg(UTM15N)),
    }
}

/// One field of `acres`, 1000 m wide, split west to east into soils of
/// the given (rating, acres)
fn split_field(acres: f64, soils: &[(&str, f64)]) -> DeterminationInputs {
    let height = acres * SQ_M_PER_ACRE / 1000.0;
    let mut x = X0;
    let mut soil_features = Vec::new();
    for (rating, a) in soils {
        let width = a * SQ_M_PER_ACRE / height;
        // Extend soils past the field in y; they are clipped to it
        soil_features.push(soil(rect(x, Y0 - 50.0, width, height + 100.0), Some(*rating)));
        x += width;
    }
    DeterminationInputs {
        fields: layer(vec![field(1, rect(X0, Y0, 1000.0, height))]),
        soils: vec![SoilLayer::new("soils", layer(soil_features))],
        dem: None,
    }
}

fn run(inputs: &DeterminationInputs) -> Result<DeterminationOutcome> {
    let mut ctx = ProcessingContext::in_memory();
    DeterminationOrchestrator::new(DeterminationParams::default()).run(&mut ctx, inputs)
}

fn decision(outcome: &DeterminationOutcome, clu: &str) -> FieldDecision {
    outcome.decisions[&CluNumber(clu.to_string())]
}

#[test]
fn test_hel_by_share_fast_path() {
    let outcome = run(&split_field(120.0, &[("HEL", 45.0), ("NHEL", 75.0)])).unwrap();
    assert_eq!(outcome.path, DeterminationPath::NoPhel);
    assert!(outcome.lidar_hel.is_none());

    let d = decision(&outcome, "1");
    assert_eq!(d.rating, HelRating::Hel);
    assert_relative_eq!(d.acres, 120.0, epsilon = 1e-6);
    assert_relative_eq!(d.percent, 37.5);

    let f = &outcome.field_determination.features[0];
    assert_eq!(f.get_property("HEL_YES").and_then(|v| v.as_str()), Some("HEL"));
    assert_relative_eq!(f.get_property("HEL_Pct").and_then(|v| v.as_f64()).unwrap(), 37.5);
}

#[test]
fn test_nhel_by_share_fast_path() {
    let outcome = run(&split_field(120.0, &[("HEL", 30.0), ("NHEL", 90.0)])).unwrap();
    let d = decision(&outcome, "1");
    assert_eq!(d.rating, HelRating::Nhel);
    assert_relative_eq!(d.percent, 75.0);
}

#[test]
fn test_fifty_acre_override() {
    let outcome = run(&split_field(500.0, &[("HEL", 55.0), ("NHEL", 445.0)])).unwrap();
    let d = decision(&outcome, "1");
    assert_eq!(d.rating, HelRating::Hel);
    assert_relative_eq!(d.percent, 11.0);
}

#[test]
fn test_initial_summary_attributes() {
    let outcome = run(&split_field(120.0, &[("HEL", 45.0), ("NHEL", 75.0)])).unwrap();
    assert_eq!(outcome.initial_summary.len(), 2);
    let hel = outcome
        .initial_summary
        .iter()
        .find(|f| f.get_property("MUHELCL").and_then(|v| v.as_str()) == Some("HEL"))
        .unwrap();
    assert_eq!(hel.get_property("Og_HELcode").and_then(|v| v.as_i64()), Some(0));
    assert_relative_eq!(hel.get_property("Og_HEL_AcrePct").and_then(|v| v.as_f64()).unwrap(), 37.5);

    // Fast path: HEL polygons count whole, NHEL polygons not at all
    for f in outcome.final_summary.iter() {
        let value = f.get_property("Final_HEL_Value").and_then(|v| v.as_str()).unwrap();
        let hel_acres = f.get_property("Final_HEL_Acres").and_then(|v| v.as_f64()).unwrap();
        let acres = f.get_property("Polygon_Acres").and_then(|v| v.as_f64()).unwrap();
        if value == "HEL" {
            assert_relative_eq!(hel_acres, acres);
        } else {
            assert_eq!(hel_acres, 0.0);
        }
    }
}

#[test]
fn test_phel_resolved_by_thresholds() {
    let outcome = run(&split_field(120.0, &[("HEL", 60.0), ("PHEL", 60.0)])).unwrap();
    assert_eq!(outcome.path, DeterminationPath::ResolvedByThresholds);
    assert_eq!(decision(&outcome, "1").rating, HelRating::Hel);
}

#[test]
fn test_phel_without_dem() {
    let err = run(&split_field(120.0, &[("HEL", 10.0), ("PHEL", 110.0)])).unwrap_err();
    assert!(matches!(err, DeterminationError::InputValidation(InputError::DemRequired)));
}

#[test]
fn test_null_and_invalid_ratings() {
    let mut inputs = split_field(120.0, &[("HEL", 60.0), ("NHEL", 60.0)]);
    inputs.soils[0].features.features[1].set_property("MUHELCL", None::<&str>);
    let err = run(&inputs).unwrap_err();
    assert!(matches!(err, DeterminationError::InputValidation(InputError::NullRating(1))));

    let inputs = split_field(120.0, &[("HEL", 60.0), ("Potentially HEL", 60.0)]);
    let err = run(&inputs).unwrap_err();
    assert!(matches!(err, DeterminationError::InputValidation(InputError::InvalidRating(v)) if v == ["Potentially HEL"]));
}

#[test]
fn test_no_overlap() {
    let mut inputs = split_field(120.0, &[("HEL", 120.0)]);
    inputs.soils[0].features = layer(vec![soil(rect(X0 + 5000.0, Y0, 100.0, 100.0), Some("HEL"))]);
    let err = run(&inputs).unwrap_err();
    assert!(matches!(err, DeterminationError::InputValidation(InputError::NoOverlap)));
}

#[test]
fn test_multiple_farms() {
    let mut inputs = split_field(120.0, &[("HEL", 120.0)]);
    inputs
        .fields
        .push(field(2, rect(X0, Y0 - 300.0, 100.0, 100.0)).with_property("FARMNBR", "57"));
    let err = run(&inputs).unwrap_err();
    assert!(matches!(err, DeterminationError::InputValidation(InputError::MultipleFarms(2))));
}

/// Terrain falling east: 15% until x = 500 400, then 0.2%
fn terrain(cell: f64) -> Raster<f64> {
    let (x_min, y_max) = (499_800.0, 4_600_500.0);
    let cols = (1200.0 / cell) as usize;
    let rows = (800.0 / cell) as usize;
    let break_x = 500_400.0;
    let data = (0..rows * cols)
        .map(|i| {
            let x = x_min + ((i % cols) as f64 + 0.5) * cell;
            if x < break_x {
                600.0 - 0.15 * (x - x_min)
            } else {
                600.0 - 0.15 * (break_x - x_min) - 0.002 * (x - break_x)
            }
        })
        .collect();
    let mut r = Raster::from_vec(data, rows, cols).unwrap();
    r.set_transform(GeoTransform::new(x_min, y_max, cell, -cell));
    r.set_crs(Some(CRS::from_epsg(UTM15N)));
    r
}

/// A field on the steep slope and one on the gentle plain, both PHEL
fn terrain_inputs(cell: f64, with_plain_field: bool) -> DeterminationInputs {
    let mut fields = vec![field(1, rect(500_100.0, Y0, 200.0, 200.0))];
    if with_plain_field {
        fields.push(field(2, rect(500_600.0, Y0, 200.0, 200.0)));
    }
    DeterminationInputs {
        fields: layer(fields),
        soils: vec![SoilLayer::new(
            "ssurgo",
            layer(vec![soil(rect(499_000.0, 4_599_000.0, 3000.0, 3000.0), Some("PHEL"))]),
        )],
        dem: Some(ElevationSource::Local(terrain(cell))),
    }
}

#[test]
fn test_erosion_index_resolves_phel() {
    let outcome = run(&terrain_inputs(2.5, true)).unwrap();
    assert_eq!(outcome.path, DeterminationPath::ErosionIndex);
    assert_eq!(outcome.collapse, None);

    let classes = outcome.lidar_hel.as_ref().unwrap();
    assert_relative_eq!(classes.cell_size(), 3.0);

    let steep = decision(&outcome, "1");
    assert_eq!(steep.rating, HelRating::Hel);
    assert_relative_eq!(steep.percent, 100.0, epsilon = 1.0);

    let plain = decision(&outcome, "2");
    assert_eq!(plain.rating, HelRating::Nhel);
    assert_relative_eq!(plain.acres, 0.0);

    let finals = outcome.final_fields.as_ref().unwrap();
    let plain_final = &finals[&CluNumber("2".into())];
    assert_relative_eq!(plain_final.nhel_percent, 100.0);
    assert!(outcome.coverage.unwrap().is_complete());
}

#[test]
fn test_all_hel_collapse_uses_field_acres() {
    let outcome = run(&terrain_inputs(2.5, false)).unwrap();
    assert_eq!(outcome.collapse, Some(heldet_determination::decider::Collapse::OnlyHel));
    let d = decision(&outcome, "1");
    assert_eq!(d.rating, HelRating::Hel);
    assert_relative_eq!(d.acres, 40_000.0 / SQ_M_PER_ACRE, epsilon = 1e-6);
    assert_eq!(d.percent, 100.0);
}

#[test]
fn test_coarse_dem_rejected_before_raster_work() {
    let mut orchestrator = DeterminationOrchestrator::new(DeterminationParams::default());
    let mut ctx = ProcessingContext::in_memory();
    let err = orchestrator.run(&mut ctx, &terrain_inputs(5.0, true)).unwrap_err();
    assert!(matches!(
        err,
        DeterminationError::InputValidation(InputError::CellSizeExceedsLimit { .. })
    ));
    assert_eq!(orchestrator.state(), RunState::NeedsErosionIndex);
    assert!(ctx.scratch.is_empty());
}

#[test]
fn test_outputs_are_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = terrain_inputs(2.5, true);

    let mut first_ctx = ProcessingContext::with_workspace(Workspace::create(dir.path()).unwrap());
    let first = DeterminationOrchestrator::new(DeterminationParams::default())
        .run(&mut first_ctx, &inputs)
        .unwrap();
    let mut second_ctx = ProcessingContext::with_workspace(Workspace::create(dir.path()).unwrap());
    let second = DeterminationOrchestrator::new(DeterminationParams::default())
        .run(&mut second_ctx, &inputs)
        .unwrap();

    for (clu, a) in &first.decisions {
        let b = second.decisions[clu];
        assert_eq!(a.rating, b.rating);
        assert!((a.acres - b.acres).abs() < 0.1);
        assert!((a.percent - b.percent).abs() < 0.1);
    }
    assert_eq!(first.outputs, second.outputs);
    for name in [LIDAR_HEL_SUMMARY, INITIAL_HEL_SUMMARY, FINAL_HEL_SUMMARY, FIELD_DETERMINATION] {
        assert!(dir.path().join(name).exists(), "{} missing", name);
    }
    assert!(dir
        .path()
        .join("NRCS_HEL_Determination_TRACT(1234)_FARM(56).txt")
        .exists());

    // A later fast-path run leaves no stale classification raster behind
    let mut fast_ctx = ProcessingContext::with_workspace(Workspace::create(dir.path()).unwrap());
    DeterminationOrchestrator::new(DeterminationParams::default())
        .run(&mut fast_ctx, &split_field(120.0, &[("HEL", 120.0)]))
        .unwrap();
    assert!(!dir.path().join(LIDAR_HEL_SUMMARY).exists());
}

#[test]
fn test_failed_run_clears_earlier_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = ProcessingContext::with_workspace(Workspace::create(dir.path()).unwrap());
    DeterminationOrchestrator::new(DeterminationParams::default())
        .run(&mut ctx, &split_field(120.0, &[("HEL", 45.0), ("NHEL", 75.0)]))
        .unwrap();
    assert!(dir.path().join(FIELD_DETERMINATION).exists());

    let mut inputs = split_field(120.0, &[("HEL", 120.0)]);
    inputs
        .fields
        .push(field(2, rect(X0, Y0 - 300.0, 100.0, 100.0)).with_property("FARMNBR", "57"));
    let mut ctx = ProcessingContext::with_workspace(Workspace::create(dir.path()).unwrap());
    let err = DeterminationOrchestrator::new(DeterminationParams::default())
        .run(&mut ctx, &inputs)
        .unwrap_err();
    assert!(matches!(err, DeterminationError::InputValidation(InputError::MultipleFarms(2))));

    let left: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert!(left.is_empty(), "outputs left behind: {:?}", left);
}

#[test]
fn test_dem_gaps_warn_but_complete() {
    let mut inputs = terrain_inputs(2.5, true);
    let Some(ElevationSource::Local(dem)) = inputs.dem.as_mut() else {
        unreachable!()
    };
    // Knock out a 20 m square in the middle of field 1
    let transform = *dem.transform();
    for row in 0..dem.rows() {
        for col in 0..dem.cols() {
            let (x, y) = transform.pixel_to_geo(col, row);
            if (500_190.0..500_210.0).contains(&x) && (4_600_090.0..4_600_110.0).contains(&y) {
                dem.set(row, col, f64::NAN).unwrap();
            }
        }
    }

    let outcome = run(&inputs).unwrap();
    assert_eq!(outcome.path, DeterminationPath::ErosionIndex);
    let coverage = outcome.coverage.unwrap();
    assert!(coverage.invalid_cells > 0);
    assert!(!coverage.is_complete());
    assert_eq!(decision(&outcome, "1").rating, HelRating::Hel);
    assert_eq!(decision(&outcome, "2").rating, HelRating::Nhel);
}
