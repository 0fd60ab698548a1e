//! Plain-text determination report

use std::fmt;

use crate::model::HelRating;
use crate::orchestrator::{DeterminationOutcome, DeterminationPath};

/// `NRCS_HEL_Determination_TRACT(<tract>)_FARM(<farm>).txt`
pub const REPORT_PREFIX: &str = "NRCS_HEL_Determination_";

pub fn report_file_name(tract: &str, farm: &str) -> String {
    format!("{}TRACT({})_FARM({}).txt", REPORT_PREFIX, tract, farm)
}

/// Renders an outcome as the text report
pub struct DeterminationReport<'a> {
    outcome: &'a DeterminationOutcome,
}

impl<'a> DeterminationReport<'a> {
    pub fn new(outcome: &'a DeterminationOutcome) -> Self {
        Self { outcome }
    }
}

impl fmt::Display for DeterminationReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = self.outcome;
        writeln!(f, "NRCS Highly Erodible Land Determination")?;
        writeln!(f, "Tract: {}    Farm: {}", o.tract, o.farm)?;
        let path = match o.path {
            DeterminationPath::NoPhel => "no PHEL soils; determined from soil ratings",
            DeterminationPath::ResolvedByThresholds => "all fields determined from soil ratings",
            DeterminationPath::ErosionIndex => "PHEL resolved by erosion index",
        };
        writeln!(f, "Method: {}", path)?;
        if let Some(coverage) = o.coverage
            && !coverage.is_complete()
        {
            writeln!(
                f,
                "WARNING: {} of {} DEM cells under the fields have no elevation; PHEL results are likely invalid",
                coverage.invalid_cells, coverage.cells
            )?;
        }

        writeln!(f)?;
        writeln!(f, "Initial HEL summary")?;
        for summary in o.initial.fields.values() {
            match &summary.decision {
                Some(d) => writeln!(f, "  CLU #: {} - Rating: {}", summary.clu_number, d.rating)?,
                None => writeln!(f, "  CLU #: {}", summary.clu_number)?,
            }
            for share in &summary.shares {
                writeln!(
                    f,
                    "      {:<4} -- {:>8.1} .ac -- {:>5.1} %",
                    share.rating.as_str(),
                    share.acres,
                    share.percent
                )?;
            }
        }

        writeln!(f)?;
        writeln!(f, "Final determination")?;
        for record in &o.fields {
            let Some(decision) = o.decisions.get(&record.clu_number) else {
                continue;
            };
            writeln!(f, "  CLU #: {}", record.clu_number)?;
            let final_result = o
                .final_fields
                .as_ref()
                .and_then(|m| m.get(&record.clu_number));
            if let Some(r) = final_result {
                writeln!(f, "      HEL Acres:  {:>8.1} .ac -- {:>5.1} %", r.hel_acres, r.hel_percent)?;
                writeln!(f, "      NHEL Acres: {:>8.1} .ac -- {:>5.1} %", r.nhel_acres, r.nhel_percent)?;
            } else {
                writeln!(
                    f,
                    "      {} Acres: {:>8.1} .ac -- {:>5.1} %",
                    decision.rating, decision.acres, decision.percent
                )?;
            }
            let verdict = if decision.rating == HelRating::Hel { "HEL" } else { "NHEL" };
            writeln!(f, "      HEL Determination: {}", verdict)?;
        }
        Ok(())
    }
}
