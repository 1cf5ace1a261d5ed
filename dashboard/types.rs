// ========================================================================================
//                             High-Level Data Contracts
// ========================================================================================

// Only types used by more than one module belong here. Everything is an immutable
// snapshot of the source tables; nothing is edited in place after loading.

use crate::config::RiskCategory;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// One row of the patient features table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientFeatureRecord {
    pub patient_id: String,
    pub age: u32,
    pub sex: String,
    pub pathology: String,
    pub n_visits: u32,
    pub visits_per_month: f64,
    pub months_active: f64,
    pub days_since_last_visit: u32,
    /// Treatment adherence rate in [0, 1].
    pub adherence: f64,
    /// Satisfaction score on the 1-5 scale.
    pub satisfaction: f64,
    pub response_mean: f64,
    pub response_std: f64,
    pub biomarker_mean: f64,
    pub biomarker_std: f64,
    pub biomarker_min: f64,
    pub biomarker_max: f64,
}

/// One row of the predictions table, keyed by the same patient identifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRecord {
    pub patient_id: String,
    pub y_true: bool,
    /// Predicted probability of response, in [0, 1].
    pub y_proba: f64,
    pub pred_label: bool,
    pub risk_category: RiskCategory,
    pub y_pred: Option<bool>,
    pub pred_high_sensitivity: Option<bool>,
    pub pred_high_precision: Option<bool>,
    pub shap_top_feature: Option<String>,
}

/// A patient present in both the features and the predictions tables.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientRow {
    pub features: PatientFeatureRecord,
    pub prediction: PredictionRecord,
}

impl PatientRow {
    #[inline]
    pub fn patient_id(&self) -> &str {
        &self.features.patient_id
    }

    #[inline]
    pub fn age(&self) -> u32 {
        self.features.age
    }

    #[inline]
    pub fn pathology(&self) -> &str {
        &self.features.pathology
    }

    #[inline]
    pub fn risk_category(&self) -> RiskCategory {
        self.prediction.risk_category
    }

    #[inline]
    pub fn probability(&self) -> f64 {
        self.prediction.y_proba
    }
}

/// The columns that can act as a binary predicted label.
///
/// The predictions table always carries `pred_label`; the other three are optional
/// exports. Confusion matrices never pick one implicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictedLabelSource {
    PredLabel,
    YPred,
    PredHighSensitivity,
    PredHighPrecision,
}

impl PredictedLabelSource {
    pub const ALL: [PredictedLabelSource; 4] = [
        PredictedLabelSource::PredLabel,
        PredictedLabelSource::YPred,
        PredictedLabelSource::PredHighSensitivity,
        PredictedLabelSource::PredHighPrecision,
    ];

    /// The column header this source is read from.
    pub fn column_name(self) -> &'static str {
        match self {
            PredictedLabelSource::PredLabel => "pred_label",
            PredictedLabelSource::YPred => "y_pred",
            PredictedLabelSource::PredHighSensitivity => "pred_high_sensitivity",
            PredictedLabelSource::PredHighPrecision => "pred_high_precision",
        }
    }

    /// The label this source assigns to a prediction row, if the row carries it.
    pub fn label_of(self, prediction: &PredictionRecord) -> Option<bool> {
        match self {
            PredictedLabelSource::PredLabel => Some(prediction.pred_label),
            PredictedLabelSource::YPred => prediction.y_pred,
            PredictedLabelSource::PredHighSensitivity => prediction.pred_high_sensitivity,
            PredictedLabelSource::PredHighPrecision => prediction.pred_high_precision,
        }
    }
}

impl fmt::Display for PredictedLabelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

impl FromStr for PredictedLabelSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        PredictedLabelSource::ALL
            .into_iter()
            .find(|source| source.column_name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| {
                format!(
                    "Unknown predicted-label column '{trimmed}'. Expected one of: {}",
                    PredictedLabelSource::ALL.map(|s| s.column_name()).join(", ")
                )
            })
    }
}

/// The inner join of patient features and predictions on patient identifier.
///
/// Rows are shared behind `Arc`, so filtered views are cheap to build and never
/// copy patient data. The set of predicted-label columns present in the source
/// travels with every view derived from it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JoinedPatientView {
    rows: Vec<Arc<PatientRow>>,
    label_sources: BTreeSet<PredictedLabelSource>,
}

impl JoinedPatientView {
    pub fn new(
        rows: Vec<PatientRow>,
        label_sources: impl IntoIterator<Item = PredictedLabelSource>,
    ) -> Self {
        Self {
            rows: rows.into_iter().map(Arc::new).collect(),
            label_sources: label_sources.into_iter().collect(),
        }
    }

    /// A view over a subsequence of this view's rows.
    pub(crate) fn derive(&self, rows: Vec<Arc<PatientRow>>) -> Self {
        Self {
            rows,
            label_sources: self.label_sources.clone(),
        }
    }

    pub fn rows(&self) -> &[Arc<PatientRow>] {
        &self.rows
    }

    pub fn iter(&self) -> impl Iterator<Item = &PatientRow> + '_ {
        self.rows.iter().map(|row| row.as_ref())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn label_sources(&self) -> &BTreeSet<PredictedLabelSource> {
        &self.label_sources
    }

    pub fn has_label_source(&self, source: PredictedLabelSource) -> bool {
        self.label_sources.contains(&source)
    }

    /// Distinct pathology values in first-seen order.
    pub fn pathologies(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.iter()
            .map(PatientRow::pathology)
            .filter(|pathology| seen.insert(*pathology))
            .collect()
    }

    /// Youngest and oldest age in the view, or `None` when it is empty.
    pub fn age_bounds(&self) -> Option<(u32, u32)> {
        self.iter()
            .map(PatientRow::age)
            .fold(None, |bounds, age| match bounds {
                None => Some((age, age)),
                Some((min, max)) => Some((u32::min(min, age), u32::max(max, age))),
            })
    }
}

/// One row of the feature importance table with its derived rank.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureImportanceRecord {
    pub feature: String,
    pub importance: f64,
    /// 1-based position after sorting by importance, descending.
    pub rank: usize,
}

/// One row of the model comparison table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelScoreRecord {
    pub model: String,
    pub auc: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub pr_auc: f64,
    pub brier: f64,
}
