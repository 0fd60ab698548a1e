//! Field-level HEL decision rules
//!
//! Pass 1 works from soil ratings alone: a field is HEL when its HEL share
//! reaches 33.33% or 50 acres, NHEL when its NHEL share exceeds 66.67%, and
//! otherwise needs the erosion index. Pass 2 takes the erosion-index
//! classification tabulated per polygon, calls each polygon by majority,
//! and aggregates HEL polygon acres back to the field.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{info, warn};

use crate::model::{
    clamped_percent, round_to, CluNumber, CluRecord, DissolvedSummary, FieldDecision, HelRating,
    SummaryPolygon, HEL_ACRES_THRESHOLD, HEL_PERCENT_THRESHOLD, NHEL_PERCENT_THRESHOLD,
    POLYGON_MAJORITY_PERCENT,
};

/// Classification raster value for NHEL cells
pub const CLASS_NHEL: i64 = 1;
/// Classification raster value for HEL cells
pub const CLASS_HEL: i64 = 2;

/// One rating's tally within a field, as reported
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingShare {
    pub rating: HelRating,
    /// Acres rounded to one decimal
    pub acres: f64,
    /// Share of the field rounded to one decimal, at most 100
    pub percent: f64,
}

/// Pass-1 view of one field
#[derive(Debug, Clone, PartialEq)]
pub struct InitialFieldSummary {
    pub clu_number: CluNumber,
    /// Sum of all rating acres in the field, NA included
    pub clu_acres: f64,
    /// Ratings present, in HEL, NA, NHEL, PHEL order
    pub shares: Vec<RatingShare>,
    /// Decision reached by the area thresholds, if any
    pub decision: Option<FieldDecision>,
}

impl InitialFieldSummary {
    fn share(&self, rating: HelRating) -> Option<&RatingShare> {
        self.shares.iter().find(|s| s.rating == rating)
    }
}

/// Outcome of pass 1 over every field
#[derive(Debug, Clone, PartialEq)]
pub struct InitialDecision {
    pub fields: BTreeMap<CluNumber, InitialFieldSummary>,
    /// Whether any polygon carries a PHEL rating
    pub has_phel: bool,
}

impl InitialDecision {
    /// Every field resolved by thresholds, or nothing left to resolve
    pub fn skip_geoprocessing(&self) -> bool {
        !self.has_phel || self.fields.values().all(|f| f.decision.is_some())
    }

    /// Pass-1 decisions for every field. Fields left undetermined finalize
    /// as NHEL; only meaningful when [`skip_geoprocessing`](Self::skip_geoprocessing) holds.
    pub fn final_decisions(&self) -> BTreeMap<CluNumber, FieldDecision> {
        self.fields
            .iter()
            .map(|(clu, summary)| {
                let decision = summary.decision.unwrap_or_else(|| FieldDecision {
                    rating: HelRating::Nhel,
                    acres: summary.clu_acres,
                    percent: summary.share(HelRating::Nhel).map_or(0.0, |s| s.percent),
                });
                (clu.clone(), decision)
            })
            .collect()
    }
}

/// Apply the area-threshold rule to one field's (rating, acres) tallies.
pub fn decide_field(clu_number: &CluNumber, tallies: &BTreeMap<HelRating, f64>) -> InitialFieldSummary {
    let clu_acres: f64 = tallies.values().sum();
    let mut shares = Vec::with_capacity(tallies.len());
    let mut decision = None;

    for (&rating, &raw_acres) in tallies {
        let acres = round_to(raw_acres, 1);
        let percent = round_to(clamped_percent(raw_acres, clu_acres), 1).min(100.0);
        shares.push(RatingShare {
            rating,
            acres,
            percent,
        });

        if decision.is_some() {
            continue;
        }
        let decided = match rating {
            HelRating::Hel => percent >= HEL_PERCENT_THRESHOLD || acres >= HEL_ACRES_THRESHOLD,
            HelRating::Nhel => percent > NHEL_PERCENT_THRESHOLD,
            _ => false,
        };
        if decided {
            decision = Some(FieldDecision {
                rating,
                acres: clu_acres,
                percent,
            });
        }
    }

    InitialFieldSummary {
        clu_number: clu_number.clone(),
        clu_acres,
        shares,
        decision,
    }
}

/// Pass 1: group dissolved summaries by field and apply the thresholds.
pub fn decide_initial(dissolved: &[DissolvedSummary]) -> InitialDecision {
    let mut tallies: BTreeMap<CluNumber, BTreeMap<HelRating, f64>> = BTreeMap::new();
    for row in dissolved {
        *tallies
            .entry(row.clu_number.clone())
            .or_default()
            .entry(row.rating)
            .or_insert(0.0) += row.acres;
    }

    let fields: BTreeMap<CluNumber, InitialFieldSummary> = tallies
        .iter()
        .map(|(clu, t)| (clu.clone(), decide_field(clu, t)))
        .collect();

    info!("Summary by CLU:");
    for summary in fields.values() {
        match &summary.decision {
            Some(d) => info!("CLU #: {} - Rating: {}", summary.clu_number, d.rating),
            None => info!("CLU #: {}", summary.clu_number),
        }
        for share in &summary.shares {
            info!("    {:<4} -- {} .ac -- {} %", share.rating.as_str(), share.acres, share.percent);
        }
    }

    InitialDecision {
        has_phel: dissolved.iter().any(|d| d.rating == HelRating::Phel),
        fields,
    }
}

/// Pass-2 attributes of one summary polygon
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinalPolygon {
    pub polygon_acres: f64,
    /// HEL or NHEL after the erosion index; the soil rating on the fast path
    pub value: HelRating,
    pub hel_acres: f64,
    pub hel_percent: f64,
}

/// Fast path: polygons keep their soil rating. HEL polygons count their
/// full area as HEL; the percentage is the polygon's share of its field.
pub fn final_polygons_from_ratings(
    polygons: &[SummaryPolygon],
    initial: &InitialDecision,
) -> Vec<FinalPolygon> {
    polygons
        .iter()
        .map(|p| {
            let clu_acres = initial
                .fields
                .get(&p.clu_number)
                .map_or(0.0, |f| f.clu_acres);
            FinalPolygon {
                polygon_acres: p.acres,
                value: p.rating,
                hel_acres: if p.rating == HelRating::Hel { p.acres } else { 0.0 },
                hel_percent: clamped_percent(p.acres, clu_acres),
            }
        })
        .collect()
}

/// Whether the classification collapsed to a single class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collapse {
    OnlyHel,
    OnlyNhel,
}

/// Detect a classification containing only HEL or only NHEL cells across
/// every polygon. Returns `Err(())` when neither class appears at all.
pub fn detect_collapse(tables: &[BTreeMap<i64, f64>]) -> Result<Option<Collapse>, ()> {
    let present: BTreeSet<i64> = tables.iter().flat_map(|t| t.keys().copied()).collect();
    match (present.contains(&CLASS_NHEL), present.contains(&CLASS_HEL)) {
        (true, true) => Ok(None),
        (false, true) => {
            warn!("WARNING: Entire Area is HEL");
            Ok(Some(Collapse::OnlyHel))
        }
        (true, false) => {
            warn!("WARNING: Entire Area is NHEL");
            Ok(Some(Collapse::OnlyNhel))
        }
        (false, false) => Err(()),
    }
}

/// Pass 2, polygon level: HEL acres from the tabulated class-2 area and a
/// majority call per polygon.
pub fn decide_polygons(
    polygons: &[SummaryPolygon],
    tables: &[BTreeMap<i64, f64>],
    acre_divisor: f64,
) -> Vec<FinalPolygon> {
    polygons
        .iter()
        .zip(tables)
        .map(|(p, table)| {
            // Slivers below the cell size tabulate nothing
            let hel_acres = table.get(&CLASS_HEL).map_or(0.0, |a| a / acre_divisor);
            let hel_percent = clamped_percent(hel_acres, p.acres);
            let value = if hel_percent > POLYGON_MAJORITY_PERCENT {
                HelRating::Hel
            } else {
                HelRating::Nhel
            };
            FinalPolygon {
                polygon_acres: p.acres,
                value,
                hel_acres,
                hel_percent,
            }
        })
        .collect()
}

/// Pass-2 outcome for one field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinalFieldResult {
    pub hel_acres: f64,
    pub hel_percent: f64,
    pub nhel_acres: f64,
    pub nhel_percent: f64,
    pub decision: FieldDecision,
}

/// Pass 2, field level: sum HEL polygon acres per field and apply the
/// 33.33% / 50-acre rule. On a collapse, each field's original acreage is
/// used whole.
pub fn decide_fields_final(
    fields: &[CluRecord],
    polygons: &[SummaryPolygon],
    finals: &[FinalPolygon],
    collapse: Option<Collapse>,
    initial: &InitialDecision,
) -> BTreeMap<CluNumber, FinalFieldResult> {
    let mut hel_by_field: BTreeMap<&CluNumber, f64> = BTreeMap::new();
    for (p, f) in polygons.iter().zip(finals) {
        let entry = hel_by_field.entry(&p.clu_number).or_insert(0.0);
        if f.value == HelRating::Hel {
            *entry += f.polygon_acres;
        }
    }

    fields
        .iter()
        .map(|field| {
            let original_acres = initial
                .fields
                .get(&field.clu_number)
                .map_or(field.calc_acres, |s| s.clu_acres);
            let (hel_acres, hel_percent, nhel_acres, nhel_percent) = match collapse {
                Some(Collapse::OnlyHel) => (original_acres, 100.0, 0.0, 0.0),
                Some(Collapse::OnlyNhel) => (0.0, 0.0, original_acres, 100.0),
                None => {
                    let hel = hel_by_field.get(&field.clu_number).copied().unwrap_or(0.0);
                    let pct = clamped_percent(hel, field.calc_acres);
                    (hel, pct, (field.calc_acres - hel).max(0.0), 100.0 - pct)
                }
            };
            let rating = if hel_percent >= HEL_PERCENT_THRESHOLD || hel_acres >= HEL_ACRES_THRESHOLD {
                HelRating::Hel
            } else {
                HelRating::Nhel
            };
            let result = FinalFieldResult {
                hel_acres,
                hel_percent,
                nhel_acres,
                nhel_percent,
                decision: FieldDecision {
                    rating,
                    acres: hel_acres,
                    percent: hel_percent,
                },
            };
            (field.clu_number.clone(), result)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::MultiPolygon;

    fn clu(n: &str) -> CluNumber {
        CluNumber(n.to_string())
    }

    fn tallies(pairs: &[(HelRating, f64)]) -> BTreeMap<HelRating, f64> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_hel_by_share() {
        let s = decide_field(&clu("1"), &tallies(&[(HelRating::Hel, 45.0), (HelRating::Nhel, 75.0)]));
        let d = s.decision.unwrap();
        assert_eq!(d.rating, HelRating::Hel);
        assert_relative_eq!(d.acres, 120.0);
        assert_relative_eq!(d.percent, 37.5);
    }

    #[test]
    fn test_nhel_by_share() {
        let s = decide_field(&clu("1"), &tallies(&[(HelRating::Hel, 30.0), (HelRating::Nhel, 90.0)]));
        let d = s.decision.unwrap();
        assert_eq!(d.rating, HelRating::Nhel);
        assert_relative_eq!(d.percent, 75.0);
    }

    #[test]
    fn test_fifty_acre_override() {
        let s = decide_field(&clu("1"), &tallies(&[(HelRating::Hel, 55.0), (HelRating::Nhel, 445.0)]));
        let d = s.decision.unwrap();
        assert_eq!(d.rating, HelRating::Hel);
        assert_relative_eq!(d.percent, 11.0);
    }

    #[test]
    fn test_undetermined_needs_erosion_index() {
        let s = decide_field(
            &clu("1"),
            &tallies(&[(HelRating::Hel, 20.0), (HelRating::Nhel, 40.0), (HelRating::Phel, 40.0)]),
        );
        assert!(s.decision.is_none());
        assert_eq!(s.shares.len(), 3);
    }

    #[test]
    fn test_na_counts_toward_field_total() {
        // NHEL 60 of 100 is not above 66.67 even though it is all the rated land
        let s = decide_field(&clu("1"), &tallies(&[(HelRating::Na, 40.0), (HelRating::Nhel, 60.0)]));
        assert!(s.decision.is_none());
    }

    #[test]
    fn test_percent_clamped_and_rounded() {
        let s = decide_field(&clu("1"), &tallies(&[(HelRating::Hel, 12.345)]));
        assert_eq!(s.shares[0].percent, 100.0);
        assert_eq!(s.shares[0].acres, 12.3);
    }

    fn dissolved(clu_n: &str, rating: HelRating, acres: f64) -> DissolvedSummary {
        DissolvedSummary {
            clu_number: clu(clu_n),
            rating,
            acres,
            percent: 0.0,
            geometry: MultiPolygon(Vec::new()),
        }
    }

    #[test]
    fn test_skip_without_phel() {
        let initial = decide_initial(&[
            dissolved("1", HelRating::Hel, 10.0),
            dissolved("1", HelRating::Na, 50.0),
            dissolved("1", HelRating::Nhel, 40.0),
        ]);
        assert!(!initial.has_phel);
        assert!(initial.skip_geoprocessing());
        let decisions = initial.final_decisions();
        assert_eq!(decisions[&clu("1")].rating, HelRating::Nhel);
        assert_relative_eq!(decisions[&clu("1")].percent, 40.0);
    }

    #[test]
    fn test_padded_field_numbers_decided_separately() {
        let initial = decide_initial(&[
            dissolved("1", HelRating::Hel, 10.0),
            dissolved("01", HelRating::Nhel, 90.0),
        ]);
        assert_eq!(initial.fields.len(), 2);
        let decisions = initial.final_decisions();
        assert_eq!(decisions[&clu("1")].rating, HelRating::Hel);
        assert_eq!(decisions[&clu("01")].rating, HelRating::Nhel);
        assert_relative_eq!(decisions[&clu("01")].percent, 100.0);
    }

    #[test]
    fn test_phel_needs_processing_unless_resolved() {
        let initial = decide_initial(&[
            dissolved("1", HelRating::Hel, 60.0),
            dissolved("1", HelRating::Phel, 40.0),
            dissolved("2", HelRating::Nhel, 50.0),
            dissolved("2", HelRating::Phel, 50.0),
        ]);
        assert!(initial.has_phel);
        assert!(!initial.skip_geoprocessing());

        let resolved = decide_initial(&[
            dissolved("1", HelRating::Hel, 60.0),
            dissolved("1", HelRating::Phel, 40.0),
        ]);
        assert!(resolved.skip_geoprocessing());
    }

    fn poly(clu_n: &str, rating: HelRating, acres: f64) -> SummaryPolygon {
        SummaryPolygon {
            clu_number: clu(clu_n),
            rating,
            k: None,
            t: None,
            r: None,
            acres,
            geometry: MultiPolygon(Vec::new()),
        }
    }

    fn table(nhel_sq: f64, hel_sq: f64) -> BTreeMap<i64, f64> {
        let mut t = BTreeMap::new();
        if nhel_sq > 0.0 {
            t.insert(CLASS_NHEL, nhel_sq);
        }
        if hel_sq > 0.0 {
            t.insert(CLASS_HEL, hel_sq);
        }
        t
    }

    #[test]
    fn test_polygon_majority() {
        let polys = [poly("1", HelRating::Phel, 10.0), poly("1", HelRating::Phel, 10.0)];
        // Divisor 1: tabulated areas are already acres
        let finals = decide_polygons(&polys, &[table(4.0, 6.0), table(5.0, 5.0)], 1.0);
        assert_eq!(finals[0].value, HelRating::Hel);
        assert_relative_eq!(finals[0].hel_percent, 60.0);
        // Exactly half is not a majority
        assert_eq!(finals[1].value, HelRating::Nhel);
    }

    #[test]
    fn test_sliver_without_cells() {
        let finals = decide_polygons(&[poly("1", HelRating::Phel, 0.001)], &[BTreeMap::new()], 1.0);
        assert_eq!(finals[0].hel_acres, 0.0);
        assert_eq!(finals[0].value, HelRating::Nhel);
    }

    #[test]
    fn test_collapse_detection() {
        assert_eq!(detect_collapse(&[table(1.0, 1.0)]), Ok(None));
        assert_eq!(detect_collapse(&[table(0.0, 1.0)]), Ok(Some(Collapse::OnlyHel)));
        assert_eq!(detect_collapse(&[table(1.0, 0.0), BTreeMap::new()]), Ok(Some(Collapse::OnlyNhel)));
        assert!(detect_collapse(&[BTreeMap::new()]).is_err());
    }

    fn field(n: &str, acres: f64) -> CluRecord {
        CluRecord {
            clu_number: clu(n),
            tract: "100".into(),
            farm: "200".into(),
            county: "001".into(),
            calc_acres: acres,
            geometry: MultiPolygon(Vec::new()),
        }
    }

    #[test]
    fn test_field_aggregation() {
        let polys = [
            poly("1", HelRating::Phel, 40.0),
            poly("1", HelRating::Nhel, 60.0),
            poly("2", HelRating::Phel, 10.0),
        ];
        let finals = decide_polygons(&polys, &[table(0.0, 40.0), table(60.0, 0.0), table(10.0, 0.0)], 1.0);
        let initial = decide_initial(&[]);
        let results = decide_fields_final(&[field("1", 100.0), field("2", 10.0)], &polys, &finals, None, &initial);

        let one = &results[&clu("1")];
        assert_eq!(one.decision.rating, HelRating::Hel);
        assert_relative_eq!(one.hel_acres, 40.0);
        assert_relative_eq!(one.hel_percent, 40.0);
        assert_relative_eq!(one.nhel_acres, 60.0);

        let two = &results[&clu("2")];
        assert_eq!(two.decision.rating, HelRating::Nhel);
        assert_relative_eq!(two.hel_acres, 0.0);
        assert_relative_eq!(two.nhel_percent, 100.0);
    }

    #[test]
    fn test_collapse_uses_original_acres() {
        let initial = decide_initial(&[dissolved("1", HelRating::Phel, 12.5)]);
        let polys = [poly("1", HelRating::Phel, 12.4)];
        let finals = decide_polygons(&polys, &[table(12.4, 0.0)], 1.0);
        let results = decide_fields_final(&[field("1", 12.4)], &polys, &finals, Some(Collapse::OnlyNhel), &initial);
        let r = &results[&clu("1")];
        assert_eq!(r.decision.rating, HelRating::Nhel);
        assert_relative_eq!(r.nhel_acres, 12.5);
        assert_relative_eq!(r.nhel_percent, 100.0);
    }

    #[test]
    fn test_hel_share_over_100_clamps() {
        let polys = [poly("1", HelRating::Phel, 10.03)];
        let finals = decide_polygons(&polys, &[table(0.0, 10.03)], 1.0);
        let initial = decide_initial(&[]);
        let results = decide_fields_final(&[field("1", 10.0)], &polys, &finals, None, &initial);
        assert_eq!(results[&clu("1")].hel_percent, 100.0);
    }
}
