//! Model performance lookup over the model comparison table.

use crate::types::ModelScoreRecord;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetricsError {
    #[error("No scores found for model '{requested}'. Available models: {}", available.join(", "))]
    ModelNotFound {
        requested: String,
        available: Vec<String>,
    },
}

/// The six headline metrics of one model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelMetrics {
    pub auc: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub pr_auc: f64,
    /// Mean squared error of the probabilities; lower is better.
    pub brier: f64,
}

impl From<&ModelScoreRecord> for ModelMetrics {
    fn from(record: &ModelScoreRecord) -> Self {
        Self {
            auc: record.auc,
            precision: record.precision,
            recall: record.recall,
            f1: record.f1,
            pr_auc: record.pr_auc,
            brier: record.brier,
        }
    }
}

/// Metrics for the model named exactly `model_name` (case-sensitive).
pub fn get_metrics(
    scores: &[ModelScoreRecord],
    model_name: &str,
) -> Result<ModelMetrics, MetricsError> {
    scores
        .iter()
        .find(|record| record.model == model_name)
        .map(ModelMetrics::from)
        .ok_or_else(|| MetricsError::ModelNotFound {
            requested: model_name.to_string(),
            available: scores.iter().map(|record| record.model.clone()).collect(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores() -> Vec<ModelScoreRecord> {
        vec![
            ModelScoreRecord {
                model: "Random Forest".to_string(),
                auc: 0.936,
                precision: 0.667,
                recall: 0.545,
                f1: 0.600,
                pr_auc: 0.638,
                brier: 0.063,
            },
            ModelScoreRecord {
                model: "Logistic Regression".to_string(),
                auc: 0.921,
                precision: 0.404,
                recall: 0.955,
                f1: 0.568,
                pr_auc: 0.477,
                brier: 0.081,
            },
        ]
    }

    #[test]
    fn present_model_returns_its_exact_row() {
        let metrics = get_metrics(&scores(), "Logistic Regression").unwrap();
        assert_eq!(
            metrics,
            ModelMetrics {
                auc: 0.921,
                precision: 0.404,
                recall: 0.955,
                f1: 0.568,
                pr_auc: 0.477,
                brier: 0.081,
            }
        );
    }

    #[test]
    fn absent_model_is_a_typed_error_listing_alternatives() {
        let err = get_metrics(&scores(), "rf").unwrap_err();
        assert_eq!(
            err,
            MetricsError::ModelNotFound {
                requested: "rf".to_string(),
                available: vec![
                    "Random Forest".to_string(),
                    "Logistic Regression".to_string()
                ],
            }
        );
        assert!(err.to_string().contains("Random Forest, Logistic Regression"));
    }

    #[test]
    fn lookup_is_case_sensitive() {
        assert!(get_metrics(&scores(), "random forest").is_err());
        assert!(get_metrics(&[], "Random Forest").is_err());
    }
}
