mod common;

use aplusa::config::{DataSourceConfig, RiskCategory};
use aplusa::confusion::{self, ConfusionCounts, ConfusionError};
use aplusa::data::{self, JoinDiagnostics};
use aplusa::export::{self, DisplayColumn};
use aplusa::filter::{self, FilterSpec};
use aplusa::metrics::{self, MetricsError};
use aplusa::report;
use aplusa::summary;
use aplusa::types::PredictedLabelSource;
use approx::assert_abs_diff_eq;
use std::num::NonZeroUsize;

fn loaded() -> data::LoadedTables {
    let dir = common::dataset_dir();
    data::load(&DataSourceConfig::in_dir(dir.path())).expect("load dataset")
}

#[test]
fn join_drops_unmatched_patients_and_reports_them() {
    let tables = loaded();
    let ids: Vec<&str> = tables.view.iter().map(|row| row.patient_id()).collect();
    assert_eq!(ids, ["P001", "P002", "P003", "P004", "P005"]);
    assert_eq!(
        tables.diagnostics,
        JoinDiagnostics {
            feature_rows: 6,
            prediction_rows: 6,
            joined_rows: 5,
            features_without_prediction: 1,
            predictions_without_features: 1,
            risk_tier_mismatches: 0,
        }
    );
    assert!(tables.view.has_label_source(PredictedLabelSource::PredHighSensitivity));
    assert!(!tables.view.has_label_source(PredictedLabelSource::YPred));
}

#[test]
fn summary_of_the_joined_view() {
    let tables = loaded();
    let summary = summary::summarize(&tables.view);
    assert_eq!(summary.total_patients, 5);
    assert_eq!(summary.count_by_risk[RiskCategory::High], 2);
    assert_eq!(summary.count_by_risk[RiskCategory::Medium], 1);
    assert_eq!(summary.count_by_risk[RiskCategory::Low], 2);
    assert_eq!(summary.distinct_pathology_count, 4);
    assert_abs_diff_eq!(summary.avg_probability.unwrap(), 0.504, epsilon = 1e-12);
}

#[test]
fn filters_compose_over_loaded_data() {
    let tables = loaded();
    let spec = FilterSpec::new()
        .with_risk_categories([RiskCategory::High, RiskCategory::Medium])
        .with_age_range(40, 80);
    let filtered = filter::apply(&tables.view, &spec);
    let ids: Vec<&str> = filtered.iter().map(|row| row.patient_id()).collect();
    assert_eq!(ids, ["P003", "P004"]);

    let none = filter::apply(&tables.view, &FilterSpec::new().with_age_range(40, 40));
    assert!(none.is_empty());
    assert_eq!(summary::summarize(&none).avg_probability, None);
}

#[test]
fn metrics_and_confusion_for_the_loaded_model() {
    let tables = loaded();
    let rf = metrics::get_metrics(&tables.scores, "Random Forest").unwrap();
    assert_abs_diff_eq!(rf.auc, 0.936, epsilon = 1e-12);
    assert_abs_diff_eq!(rf.brier, 0.063, epsilon = 1e-12);

    match metrics::get_metrics(&tables.scores, "rf") {
        Err(MetricsError::ModelNotFound { available, .. }) => {
            assert_eq!(available, ["Random Forest", "Logistic Regression"]);
        }
        other => panic!("expected ModelNotFound, got {other:?}"),
    }

    let counts = confusion::build(&tables.view, PredictedLabelSource::PredLabel).unwrap();
    assert_eq!(
        counts,
        ConfusionCounts {
            true_positive: 1,
            true_negative: 2,
            false_positive: 1,
            false_negative: 1,
        }
    );
    let sensitive =
        confusion::build(&tables.view, PredictedLabelSource::PredHighSensitivity).unwrap();
    assert_eq!(sensitive.false_negative, 0);
    assert_eq!(sensitive.total(), tables.view.len());

    assert_eq!(
        confusion::build(&tables.view, PredictedLabelSource::YPred),
        Err(ConfusionError::MissingColumn("y_pred".to_string()))
    );
}

#[test]
fn feature_ranking_keeps_ties_in_source_order() {
    let tables = loaded();
    let features: Vec<(&str, usize)> = tables
        .importance
        .records()
        .iter()
        .map(|record| (record.feature.as_str(), record.rank))
        .collect();
    assert_eq!(
        features,
        [
            ("visits_per_month", 1),
            ("days_since_last_visit", 2),
            ("adherence", 3),
            ("n_visits", 4),
            ("satisfaction", 5),
        ]
    );

    let top = report::feature_rows(&tables.importance, NonZeroUsize::new(50).unwrap());
    assert_eq!(top.len(), 5);
    assert_eq!(top[4].definition, "Patient satisfaction score (1-5)");
}

#[test]
fn exported_csv_reads_back_with_the_chosen_columns() {
    let tables = loaded();
    let high = filter::apply(
        &tables.view,
        &FilterSpec::new().with_risk_categories([RiskCategory::High]),
    );
    let columns = [DisplayColumn::PatientId, DisplayColumn::YProba, DisplayColumn::Pathology];
    let bytes = export::export_csv(&high, &columns).unwrap();

    let mut reader = csv::Reader::from_reader(bytes.as_slice());
    let headers = reader.headers().unwrap().clone();
    assert_eq!(headers.iter().collect::<Vec<_>>(), ["PatientID", "y_proba", "Pathology"]);
    let records: Vec<Vec<String>> = reader
        .records()
        .map(|record| record.unwrap().iter().map(str::to_string).collect())
        .collect();
    assert_eq!(
        records,
        [
            vec!["P001".to_string(), "0.91".to_string(), "NSCLC".to_string()],
            vec!["P004".to_string(), "0.72".to_string(), "NSCLC".to_string()],
        ]
    );
}
