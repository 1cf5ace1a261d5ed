//! Builders for in-memory patient rows used across the unit tests.

use crate::config::RiskCategory;
use crate::types::{
    JoinedPatientView, PatientFeatureRecord, PatientRow, PredictedLabelSource, PredictionRecord,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A joined row with neutral engagement values and labels derived from `y_proba`.
pub fn row(
    patient_id: &str,
    age: u32,
    pathology: &str,
    risk_category: RiskCategory,
    y_proba: f64,
) -> PatientRow {
    PatientRow {
        features: PatientFeatureRecord {
            patient_id: patient_id.to_string(),
            age,
            sex: if age % 2 == 0 { "F" } else { "M" }.to_string(),
            pathology: pathology.to_string(),
            n_visits: 12,
            visits_per_month: 2.5,
            months_active: 8.0,
            days_since_last_visit: 30,
            adherence: 0.75,
            satisfaction: 4.0,
            response_mean: 0.5,
            response_std: 0.1,
            biomarker_mean: 100.0,
            biomarker_std: 12.0,
            biomarker_min: 60.0,
            biomarker_max: 140.0,
        },
        prediction: PredictionRecord {
            patient_id: patient_id.to_string(),
            y_true: y_proba > 0.5,
            y_proba,
            pred_label: y_proba > 0.5,
            risk_category,
            y_pred: None,
            pred_high_sensitivity: Some(y_proba > 0.35),
            pred_high_precision: Some(y_proba > 0.70),
            shap_top_feature: Some("visits_per_month".to_string()),
        },
    }
}

/// A row with explicit ground-truth and `pred_label` values.
pub fn labelled_row(patient_id: &str, y_true: bool, pred_label: bool) -> PatientRow {
    let mut labelled = row(patient_id, 50, "CRC", RiskCategory::Medium, 0.5);
    labelled.prediction.y_true = y_true;
    labelled.prediction.pred_label = pred_label;
    labelled
}

/// A seeded synthetic cohort with the producer's pathology mix and age span.
pub fn random_view(seed: u64, size: usize) -> JoinedPatientView {
    const PATHOLOGIES: [&str; 4] = ["NSCLC", "Melanoma", "Breast Cancer", "CRC"];
    let mut rng = StdRng::seed_from_u64(seed);
    let rows = (0..size)
        .map(|i| {
            let y_proba: f64 = rng.gen_range(0.0..1.0);
            let age = rng.gen_range(25..80);
            let pathology = PATHOLOGIES[rng.gen_range(0..PATHOLOGIES.len())];
            row(
                &format!("P{:04}", i + 1),
                age,
                pathology,
                RiskCategory::from_probability(y_proba),
                y_proba,
            )
        })
        .collect();
    JoinedPatientView::new(
        rows,
        [
            PredictedLabelSource::PredLabel,
            PredictedLabelSource::PredHighSensitivity,
            PredictedLabelSource::PredHighPrecision,
        ],
    )
}
