//! Dataset-wide counts and rates over a joined view.

use crate::config::RiskCategory;
use crate::types::{JoinedPatientView, PatientRow};
use ahash::AHashSet;
use serde::Serialize;
use std::ops::{Index, IndexMut};

/// Patient counts per risk tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RiskCounts {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

impl RiskCounts {
    pub fn from_rows<'a>(rows: impl IntoIterator<Item = &'a PatientRow>) -> Self {
        let mut counts = [0usize; 3];
        for row in rows {
            counts[row.risk_category().index()] += 1;
        }
        Self {
            low: counts[0],
            medium: counts[1],
            high: counts[2],
        }
    }

    pub fn get(&self, tier: RiskCategory) -> usize {
        self[tier]
    }

    pub fn total(&self) -> usize {
        self.low + self.medium + self.high
    }
}

impl Index<RiskCategory> for RiskCounts {
    type Output = usize;

    fn index(&self, tier: RiskCategory) -> &usize {
        match tier {
            RiskCategory::Low => &self.low,
            RiskCategory::Medium => &self.medium,
            RiskCategory::High => &self.high,
        }
    }
}

impl IndexMut<RiskCategory> for RiskCounts {
    fn index_mut(&mut self, tier: RiskCategory) -> &mut usize {
        match tier {
            RiskCategory::Low => &mut self.low,
            RiskCategory::Medium => &mut self.medium,
            RiskCategory::High => &mut self.high,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSummary {
    pub total_patients: usize,
    pub count_by_risk: RiskCounts,
    /// Mean predicted probability; `None` for an empty view, where it is undefined.
    pub avg_probability: Option<f64>,
    pub distinct_pathology_count: usize,
}

/// Summarizes a view. Pure: the view is only read.
pub fn summarize(view: &JoinedPatientView) -> DatasetSummary {
    let total_patients = view.len();
    let avg_probability = if view.is_empty() {
        None
    } else {
        Some(view.iter().map(PatientRow::probability).sum::<f64>() / total_patients as f64)
    };
    let distinct_pathology_count = view
        .iter()
        .map(PatientRow::pathology)
        .collect::<AHashSet<_>>()
        .len();

    DatasetSummary {
        total_patients,
        count_by_risk: RiskCounts::from_rows(view.iter()),
        avg_probability,
        distinct_pathology_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{random_view, row};
    use crate::types::PredictedLabelSource;
    use approx::assert_abs_diff_eq;

    fn ten_patients_four_high() -> JoinedPatientView {
        let tiers = [
            (RiskCategory::High, 0.9),
            (RiskCategory::Low, 0.1),
            (RiskCategory::High, 0.8),
            (RiskCategory::Medium, 0.5),
            (RiskCategory::High, 0.75),
            (RiskCategory::Low, 0.2),
            (RiskCategory::Medium, 0.4),
            (RiskCategory::High, 0.95),
            (RiskCategory::Low, 0.05),
            (RiskCategory::Medium, 0.6),
        ];
        let pathologies = ["NSCLC", "Melanoma", "CRC"];
        let rows = tiers
            .iter()
            .enumerate()
            .map(|(i, (tier, p))| row(&format!("P{i}"), 40 + i as u32, pathologies[i % 3], *tier, *p))
            .collect();
        JoinedPatientView::new(rows, [PredictedLabelSource::PredLabel])
    }

    #[test]
    fn counts_each_tier_and_partitions_the_view() {
        let summary = summarize(&ten_patients_four_high());
        assert_eq!(summary.total_patients, 10);
        assert_eq!(summary.count_by_risk[RiskCategory::High], 4);
        assert_eq!(summary.count_by_risk.get(RiskCategory::Low), 3);
        assert_eq!(summary.count_by_risk.medium, 3);
        assert_eq!(summary.count_by_risk.total(), 10);
        assert_eq!(summary.distinct_pathology_count, 3);
        assert_abs_diff_eq!(summary.avg_probability.unwrap(), 0.525, epsilon = 1e-12);
    }

    #[test]
    fn empty_view_has_zero_counts_and_no_average() {
        let summary = summarize(&JoinedPatientView::default());
        assert_eq!(summary.total_patients, 0);
        assert_eq!(summary.count_by_risk, RiskCounts::default());
        assert_eq!(summary.avg_probability, None);
        assert_eq!(summary.distinct_pathology_count, 0);
    }

    #[test]
    fn missing_tier_counts_zero() {
        let view = JoinedPatientView::new(
            vec![row("P1", 50, "CRC", RiskCategory::Low, 0.1)],
            [PredictedLabelSource::PredLabel],
        );
        let summary = summarize(&view);
        assert_eq!(summary.count_by_risk[RiskCategory::High], 0);
        assert_eq!(summary.count_by_risk[RiskCategory::Medium], 0);
    }

    #[test]
    fn summarizing_is_deterministic_and_leaves_the_view_untouched() {
        let view = random_view(7, 250);
        let before = view.clone();
        let first = summarize(&view);
        let second = summarize(&view);
        assert_eq!(first, second);
        assert_eq!(view, before);
        assert_eq!(first.count_by_risk.total(), 250);
    }
}
