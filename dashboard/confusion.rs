//! Confusion counts of ground truth against an explicitly chosen predicted label.

use crate::types::{JoinedPatientView, PredictedLabelSource};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfusionError {
    #[error(
        "The predicted-label column '{0}' is not present in the dataset. Choose one of the loaded label columns."
    )]
    MissingColumn(String),
}

/// The four-way partition of binary outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionCounts {
    pub true_positive: usize,
    pub true_negative: usize,
    pub false_positive: usize,
    pub false_negative: usize,
}

impl ConfusionCounts {
    pub fn total(&self) -> usize {
        self.true_positive + self.true_negative + self.false_positive + self.false_negative
    }

    /// Rows are actual 0/1, columns predicted 0/1: `[[tn, fp], [fn, tp]]`.
    pub fn matrix(&self) -> [[usize; 2]; 2] {
        [
            [self.true_negative, self.false_positive],
            [self.false_negative, self.true_positive],
        ]
    }

    pub fn accuracy(&self) -> Option<f64> {
        ratio(self.true_positive + self.true_negative, self.total())
    }

    pub fn precision(&self) -> Option<f64> {
        ratio(self.true_positive, self.true_positive + self.false_positive)
    }

    pub fn recall(&self) -> Option<f64> {
        ratio(self.true_positive, self.true_positive + self.false_negative)
    }
}

fn ratio(numerator: usize, denominator: usize) -> Option<f64> {
    (denominator > 0).then(|| numerator as f64 / denominator as f64)
}

/// Counts outcomes of `source` against `y_true` over every row of the view.
///
/// The label column must have been loaded for the view, and every row must carry
/// it; otherwise the computation is refused with the offending column name.
pub fn build(
    view: &JoinedPatientView,
    source: PredictedLabelSource,
) -> Result<ConfusionCounts, ConfusionError> {
    let missing = || ConfusionError::MissingColumn(source.column_name().to_string());
    if !view.has_label_source(source) {
        return Err(missing());
    }

    let mut counts = ConfusionCounts::default();
    for row in view.iter() {
        let predicted = source.label_of(&row.prediction).ok_or_else(missing)?;
        match (row.prediction.y_true, predicted) {
            (true, true) => counts.true_positive += 1,
            (false, false) => counts.true_negative += 1,
            (false, true) => counts.false_positive += 1,
            (true, false) => counts.false_negative += 1,
        }
    }
    Ok(counts)
}
