//! Write result layers and the report into a workspace

use std::fs;
use std::path::PathBuf;

use heldet_core::io::{write_geojson, write_geotiff};
use tracing::info;

use crate::context::Workspace;
use crate::error::Result;
use crate::orchestrator::DeterminationOutcome;
use crate::report::{report_file_name, DeterminationReport, REPORT_PREFIX};

pub const LIDAR_HEL_SUMMARY: &str = "lidar_hel_summary.tif";
pub const INITIAL_HEL_SUMMARY: &str = "initial_hel_summary.geojson";
pub const FINAL_HEL_SUMMARY: &str = "final_hel_summary.geojson";
pub const FIELD_DETERMINATION: &str = "field_determination.geojson";

/// Remove every result layer and report left by an earlier run
pub fn clear_outputs(workspace: &Workspace) -> Result<()> {
    for name in [LIDAR_HEL_SUMMARY, INITIAL_HEL_SUMMARY, FINAL_HEL_SUMMARY, FIELD_DETERMINATION] {
        workspace.prepare_output(name)?;
    }
    for entry in fs::read_dir(workspace.root())? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(REPORT_PREFIX) && name.ends_with(".txt") && entry.path().is_file() {
            workspace.prepare_output(&name)?;
        }
    }
    Ok(())
}

/// Write every result of `outcome`, replacing earlier files of the same
/// names. A stale classification raster is removed when the erosion index
/// did not run.
pub fn write_outputs(workspace: &Workspace, outcome: &DeterminationOutcome) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();

    let raster_path = workspace.prepare_output(LIDAR_HEL_SUMMARY)?;
    if let Some(classes) = &outcome.lidar_hel {
        write_geotiff(classes, &raster_path)?;
        written.push(raster_path);
    }

    for (name, layer) in [
        (INITIAL_HEL_SUMMARY, &outcome.initial_summary),
        (FINAL_HEL_SUMMARY, &outcome.final_summary),
        (FIELD_DETERMINATION, &outcome.field_determination),
    ] {
        let path = workspace.prepare_output(name)?;
        write_geojson(layer, &path)?;
        written.push(path);
    }

    let report_path = workspace.prepare_output(&report_file_name(&outcome.tract, &outcome.farm))?;
    fs::write(&report_path, DeterminationReport::new(outcome).to_string())?;
    written.push(report_path);

    for path in &written {
        info!("Wrote {}", path.display());
    }
    Ok(written)
}
