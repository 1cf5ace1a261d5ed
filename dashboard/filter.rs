//! # Filter Engine
//!
//! A `FilterSpec` is a conjunction of up to four independent predicates over a
//! joined view. Each row is tested against every active predicate and kept only
//! if all of them pass, so the order in which predicates are listed (or applied)
//! never changes the result: the output is the intersection of the per-predicate
//! row sets, taken in input order.
//!
//! Absent predicates and empty membership sets are skipped. They never mean
//! "exclude everything". Contradictory combinations (an age range nothing falls
//! into, a threshold above every probability) produce an empty view, not an error.

use crate::config::RiskCategory;
use crate::types::{JoinedPatientView, PatientRow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Inclusive age bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeRange {
    pub min: u32,
    pub max: u32,
}

impl AgeRange {
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn contains(&self, age: u32) -> bool {
        self.min <= age && age <= self.max
    }
}

/// The patient filters a presentation layer can request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    pub risk_categories: BTreeSet<RiskCategory>,
    pub pathologies: BTreeSet<String>,
    pub age_range: Option<AgeRange>,
    pub min_probability: Option<f64>,
}

/// One active predicate of a `FilterSpec`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Predicate<'a> {
    RiskCategory(&'a BTreeSet<RiskCategory>),
    Pathology(&'a BTreeSet<String>),
    Age(AgeRange),
    MinProbability(f64),
}

impl Predicate<'_> {
    #[inline]
    pub fn matches(&self, row: &PatientRow) -> bool {
        match self {
            Predicate::RiskCategory(tiers) => tiers.contains(&row.risk_category()),
            Predicate::Pathology(pathologies) => pathologies.contains(row.pathology()),
            Predicate::Age(range) => range.contains(row.age()),
            Predicate::MinProbability(threshold) => row.probability() >= *threshold,
        }
    }
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_risk_categories(mut self, tiers: impl IntoIterator<Item = RiskCategory>) -> Self {
        self.risk_categories = tiers.into_iter().collect();
        self
    }

    pub fn with_pathologies<S: Into<String>>(
        mut self,
        pathologies: impl IntoIterator<Item = S>,
    ) -> Self {
        self.pathologies = pathologies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_age_range(mut self, min: u32, max: u32) -> Self {
        self.age_range = Some(AgeRange::new(min, max));
        self
    }

    pub fn with_min_probability(mut self, threshold: f64) -> Self {
        self.min_probability = Some(threshold);
        self
    }

    /// The predicates this spec activates. Empty sets and absent bounds contribute
    /// nothing.
    pub fn predicates(&self) -> Vec<Predicate<'_>> {
        let mut predicates = Vec::with_capacity(4);
        if !self.risk_categories.is_empty() {
            predicates.push(Predicate::RiskCategory(&self.risk_categories));
        }
        if !self.pathologies.is_empty() {
            predicates.push(Predicate::Pathology(&self.pathologies));
        }
        if let Some(range) = self.age_range {
            predicates.push(Predicate::Age(range));
        }
        if let Some(threshold) = self.min_probability {
            predicates.push(Predicate::MinProbability(threshold));
        }
        predicates
    }

    pub fn is_empty(&self) -> bool {
        self.predicates().is_empty()
    }

    pub fn matches(&self, row: &PatientRow) -> bool {
        self.predicates().iter().all(|predicate| predicate.matches(row))
    }
}

/// Keeps the rows that satisfy every active predicate, in their original order.
pub fn apply(view: &JoinedPatientView, spec: &FilterSpec) -> JoinedPatientView {
    let predicates = spec.predicates();
    if predicates.is_empty() {
        return view.clone();
    }

    let rows = view
        .rows()
        .iter()
        .filter(|row| predicates.iter().all(|predicate| predicate.matches(row)))
        .cloned()
        .collect();
    let filtered = view.derive(rows);
    log::debug!(
        "Filter with {} predicates kept {} of {} patients",
        predicates.len(),
        filtered.len(),
        view.len()
    );
    filtered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{random_view, row};
    use crate::types::PredictedLabelSource;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashSet;

    fn ids(view: &JoinedPatientView) -> Vec<String> {
        view.iter().map(|r| r.patient_id().to_string()).collect()
    }

    fn small_view() -> JoinedPatientView {
        JoinedPatientView::new(
            vec![
                row("P1", 34, "NSCLC", RiskCategory::High, 0.91),
                row("P2", 58, "Melanoma", RiskCategory::Low, 0.12),
                row("P3", 45, "CRC", RiskCategory::Medium, 0.47),
                row("P4", 71, "NSCLC", RiskCategory::High, 0.72),
                row("P5", 45, "Breast Cancer", RiskCategory::Low, 0.30),
            ],
            [PredictedLabelSource::PredLabel],
        )
    }

    #[test]
    fn empty_spec_returns_the_view_unchanged() {
        let view = random_view(11, 100);
        let filtered = apply(&view, &FilterSpec::new());
        assert_eq!(filtered, view);
        assert!(FilterSpec::new().is_empty());
    }

    #[test]
    fn empty_membership_sets_are_skipped_not_exclusive() {
        let spec = FilterSpec::new()
            .with_risk_categories([])
            .with_pathologies(Vec::<String>::new());
        assert!(spec.is_empty());
        assert_eq!(apply(&small_view(), &spec).len(), 5);
    }

    #[test]
    fn each_predicate_restricts_as_expected() {
        let view = small_view();

        let high = FilterSpec::new().with_risk_categories([RiskCategory::High]);
        assert_eq!(ids(&apply(&view, &high)), vec!["P1", "P4"]);

        let nsclc_or_crc = FilterSpec::new().with_pathologies(["NSCLC", "CRC"]);
        assert_eq!(ids(&apply(&view, &nsclc_or_crc)), vec!["P1", "P3", "P4"]);

        let forty_five = FilterSpec::new().with_age_range(45, 45);
        assert_eq!(ids(&apply(&view, &forty_five)), vec!["P3", "P5"]);

        let likely = FilterSpec::new().with_min_probability(0.47);
        assert_eq!(ids(&apply(&view, &likely)), vec!["P1", "P3", "P4"]);
    }

    #[test]
    fn predicates_combine_as_a_conjunction() {
        let spec = FilterSpec::new()
            .with_risk_categories([RiskCategory::High, RiskCategory::Medium])
            .with_pathologies(["NSCLC"])
            .with_age_range(30, 60)
            .with_min_probability(0.5);
        assert_eq!(ids(&apply(&small_view(), &spec)), vec!["P1"]);
    }

    #[test]
    fn contradictory_age_range_yields_an_empty_view() {
        let view = random_view(3, 100);
        let spec = FilterSpec::new().with_age_range(40, 40);
        let expected = view.iter().filter(|r| r.age() == 40).count();
        assert_eq!(apply(&view, &spec).len(), expected);

        let inverted = FilterSpec::new().with_age_range(60, 30);
        let filtered = apply(&view, &inverted);
        assert!(filtered.is_empty());
        assert_eq!(filtered.label_sources(), view.label_sources());
    }

    #[test]
    fn age_range_missing_every_row_is_empty_not_an_error() {
        let rows = (0..100)
            .map(|i| {
                let age = if i % 2 == 0 { 39 } else { 41 };
                row(&format!("P{i}"), age, "CRC", RiskCategory::Low, 0.2)
            })
            .collect();
        let view = JoinedPatientView::new(rows, [PredictedLabelSource::PredLabel]);
        let filtered = apply(&view, &FilterSpec::new().with_age_range(40, 40));
        assert!(filtered.is_empty());
    }

    #[test]
    fn combined_filter_equals_intersection_of_single_predicate_filters() {
        let mut rng = StdRng::seed_from_u64(2024);
        let view = random_view(99, 400);
        let all_tiers = RiskCategory::ALL;
        let all_pathologies = ["NSCLC", "Melanoma", "Breast Cancer", "CRC"];

        for _ in 0..50 {
            let tiers: Vec<RiskCategory> = all_tiers
                .iter()
                .copied()
                .filter(|_| rng.gen_bool(0.5))
                .collect();
            let pathologies: Vec<&str> = all_pathologies
                .iter()
                .copied()
                .filter(|_| rng.gen_bool(0.5))
                .collect();
            let lo = rng.gen_range(20..70);
            let hi = lo + rng.gen_range(0..30);
            let threshold = rng.gen_range(0.0..1.0);

            let singles = [
                FilterSpec::new().with_risk_categories(tiers.clone()),
                FilterSpec::new().with_pathologies(pathologies.clone()),
                FilterSpec::new().with_age_range(lo, hi),
                FilterSpec::new().with_min_probability(threshold),
            ];
            let combined = FilterSpec::new()
                .with_risk_categories(tiers)
                .with_pathologies(pathologies)
                .with_age_range(lo, hi)
                .with_min_probability(threshold);

            let result = apply(&view, &combined);
            let result_ids: HashSet<String> = ids(&result).into_iter().collect();

            let mut intersection: HashSet<String> = ids(&view).into_iter().collect();
            for single in &singles {
                let kept: HashSet<String> = ids(&apply(&view, single)).into_iter().collect();
                intersection.retain(|id| kept.contains(id));
            }
            assert_eq!(result_ids, intersection);

            // Applying the single filters one after another, in reverse order,
            // gives the same rows in the same order.
            let mut chained = view.clone();
            for single in singles.iter().rev() {
                chained = apply(&chained, single);
            }
            assert_eq!(ids(&chained), ids(&result));

            // The output is an order-preserving subsequence of the input.
            let positions: Vec<usize> = result
                .iter()
                .map(|r| {
                    view.iter()
                        .position(|v| v.patient_id() == r.patient_id())
                        .unwrap()
                })
                .collect();
            assert!(positions.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn filter_spec_round_trips_through_json_with_defaults() {
        let spec: FilterSpec =
            serde_json::from_str(r#"{"risk_categories":["High"],"min_probability":0.25}"#)
                .unwrap();
        assert_eq!(
            spec,
            FilterSpec::new()
                .with_risk_categories([RiskCategory::High])
                .with_min_probability(0.25)
        );
        assert_eq!(spec.predicates().len(), 2);
        assert!(spec.matches(&row("P1", 50, "CRC", RiskCategory::High, 0.3)));
        assert!(!spec.matches(&row("P2", 50, "CRC", RiskCategory::High, 0.2)));
    }
}
