//! # Data Loading and Validation Module
//!
//! This module is the only entry point for the precomputed dataset. It reads the
//! four flat tables (patient features, predictions, feature importance, model
//! scores), validates each against a fixed schema, and turns them into typed
//! records. Downstream code never sees a loosely-typed table.
//!
//! - Strict Schema: every table has a declared set of required columns. Header
//!   lookup ignores ASCII case, because exports of the same producer disagree on
//!   `adherence` vs `Adherence`; anything else must match exactly.
//! - Whole-or-nothing: any failure in any table aborts the load. There is no
//!   partially loaded dataset.
//! - Visible join loss: patients present in only one of the features and
//!   predictions tables are dropped from the joined view, and counted in
//!   `JoinDiagnostics`.

use crate::config::{DataSourceConfig, RiskCategory};
use crate::types::{
    FeatureImportanceRecord, JoinedPatientView, ModelScoreRecord, PatientFeatureRecord,
    PatientRow, PredictedLabelSource, PredictionRecord,
};
use ahash::{AHashMap, AHashSet};
use log::{debug, info, warn};
use polars::prelude::*;
use serde::Serialize;
use std::fs::File;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const PATIENTS_TABLE: &str = "patients_features";
pub const PREDICTIONS_TABLE: &str = "predictions";
pub const IMPORTANCE_TABLE: &str = "feature_importance";
pub const SCORES_TABLE: &str = "model_scores";

/// The join key shared by the features and predictions tables.
pub const PATIENT_ID_COLUMN: &str = "PatientID";

const SATISFACTION_SCALE: (f64, f64) = (1.0, 5.0);

/// Every way the source tables can fail to load.
#[derive(Error, Debug)]
pub enum DataSourceError {
    #[error("Could not read the {table} table at '{path}': {source}")]
    Io {
        table: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Error from the underlying Polars library while reading the {table} table: {source}")]
    Polars {
        table: &'static str,
        #[source]
        source: PolarsError,
    },
    #[error(
        "The required column '{column}' was not found in the {table} table. Please check spelling."
    )]
    ColumnNotFound { table: &'static str, column: String },
    #[error("The {table} table has more than one column named '{column}' (ignoring case).")]
    AmbiguousColumn { table: &'static str, column: String },
    #[error(
        "Column '{column}' of the {table} table could not be converted to the expected type '{expected_type}'. (Found type: {found_type})"
    )]
    ColumnWrongType {
        table: &'static str,
        column: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error("Missing or null values were found in column '{column}' of the {table} table.")]
    MissingValuesFound { table: &'static str, column: String },
    #[error(
        "Non-finite values (NaN or Infinity) were found in column '{column}' of the {table} table."
    )]
    NonFiniteValuesFound { table: &'static str, column: String },
    #[error("Invalid value in column '{column}' of the {table} table at data row {row}: {reason}")]
    InvalidValue {
        table: &'static str,
        column: String,
        row: usize,
        reason: String,
    },
    #[error("Duplicate key '{key}' in column '{column}' of the {table} table.")]
    DuplicateKey {
        table: &'static str,
        column: String,
        key: String,
    },
}

/// Row accounting for the features/predictions inner join.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JoinDiagnostics {
    pub feature_rows: usize,
    pub prediction_rows: usize,
    pub joined_rows: usize,
    /// Feature rows dropped because no prediction shares their identifier.
    pub features_without_prediction: usize,
    /// Prediction rows dropped because no feature row shares their identifier.
    pub predictions_without_features: usize,
    /// Joined rows whose stored risk tier disagrees with the binned probability.
    pub risk_tier_mismatches: usize,
}

impl JoinDiagnostics {
    pub fn dropped_rows(&self) -> usize {
        self.features_without_prediction + self.predictions_without_features
    }
}

/// The predictions table plus the optional label columns it carried.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionTable {
    pub records: Vec<PredictionRecord>,
    pub label_sources: Vec<PredictedLabelSource>,
}

/// Feature importances sorted by weight, descending, with 1-based ranks.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FeatureImportanceTable {
    records: Vec<FeatureImportanceRecord>,
}

impl FeatureImportanceTable {
    /// Ranks `(feature, importance)` pairs. The sort is stable, so equal weights
    /// keep their source order. `-0.0` and `0.0` count as equal.
    pub fn from_weights(weights: Vec<(String, f64)>) -> Self {
        let mut weights = weights;
        weights.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let records = weights
            .into_iter()
            .enumerate()
            .map(|(i, (feature, importance))| FeatureImportanceRecord {
                feature,
                importance,
                rank: i + 1,
            })
            .collect();
        Self { records }
    }

    pub fn records(&self) -> &[FeatureImportanceRecord] {
        &self.records
    }

    /// The `n` highest-ranked features, or all of them when fewer exist.
    pub fn top(&self, n: NonZeroUsize) -> &[FeatureImportanceRecord] {
        &self.records[..n.get().min(self.records.len())]
    }

    pub fn get(&self, feature: &str) -> Option<&FeatureImportanceRecord> {
        self.records.iter().find(|record| record.feature == feature)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Everything read from one data directory, already joined and ranked.
#[derive(Debug, Clone)]
pub struct LoadedTables {
    pub view: JoinedPatientView,
    pub importance: FeatureImportanceTable,
    pub scores: Vec<ModelScoreRecord>,
    pub diagnostics: JoinDiagnostics,
}

/// Loads, validates, and joins all four tables.
pub fn load(source: &DataSourceConfig) -> Result<LoadedTables, DataSourceError> {
    info!("Loading dataset from '{}'", source.data_dir.display());

    let features = load_patient_features(&source.patients_path())?;
    let predictions = load_predictions(&source.predictions_path())?;
    let importance = load_feature_importance(&source.importance_path())?;
    let scores = load_model_scores(&source.scores_path())?;

    let (view, diagnostics) = join(features, predictions);

    if diagnostics.dropped_rows() > 0 {
        warn!(
            "Inner join dropped {} feature rows without predictions and {} predictions without features",
            diagnostics.features_without_prediction, diagnostics.predictions_without_features
        );
    }
    if diagnostics.risk_tier_mismatches > 0 {
        warn!(
            "{} patients have a risk category that disagrees with their binned probability",
            diagnostics.risk_tier_mismatches
        );
    }
    info!(
        "Dataset ready: {} joined patients, {} ranked features, {} models",
        view.len(),
        importance.len(),
        scores.len()
    );

    Ok(LoadedTables {
        view,
        importance,
        scores,
        diagnostics,
    })
}

/// Loads the patient features table.
pub fn load_patient_features(path: &Path) -> Result<Vec<PatientFeatureRecord>, DataSourceError> {
    let table = internal::Table::read(PATIENTS_TABLE, path)?;

    let ids = table.unique_keys(PATIENT_ID_COLUMN)?;
    let ages = table.counts("Age")?;
    let sexes = table.text("Sex")?;
    let pathologies = table.text("Pathology")?;
    let n_visits = table.counts("n_visits")?;
    let visits_per_month = table.numeric("visits_per_month")?;
    let months_active = table.numeric("months_active")?;
    let days_since_last_visit = table.counts("days_since_last_visit")?;
    let adherence = table.bounded("adherence", 0.0, 1.0)?;
    let satisfaction = table.bounded("satisfaction", SATISFACTION_SCALE.0, SATISFACTION_SCALE.1)?;
    let response_mean = table.numeric("response_mean")?;
    let response_std = table.numeric("response_std")?;
    let biomarker_mean = table.numeric("biomarker_mean")?;
    let biomarker_std = table.numeric("biomarker_std")?;
    let biomarker_min = table.numeric("biomarker_min")?;
    let biomarker_max = table.numeric("biomarker_max")?;

    let records = ids
        .into_iter()
        .enumerate()
        .map(|(i, patient_id)| PatientFeatureRecord {
            patient_id,
            age: ages[i],
            sex: sexes[i].clone(),
            pathology: pathologies[i].clone(),
            n_visits: n_visits[i],
            visits_per_month: visits_per_month[i],
            months_active: months_active[i],
            days_since_last_visit: days_since_last_visit[i],
            adherence: adherence[i],
            satisfaction: satisfaction[i],
            response_mean: response_mean[i],
            response_std: response_std[i],
            biomarker_mean: biomarker_mean[i],
            biomarker_std: biomarker_std[i],
            biomarker_min: biomarker_min[i],
            biomarker_max: biomarker_max[i],
        })
        .collect::<Vec<_>>();

    debug!("Read {} patient feature rows", records.len());
    Ok(records)
}

/// Loads the predictions table, including whichever optional label columns exist.
pub fn load_predictions(path: &Path) -> Result<PredictionTable, DataSourceError> {
    let table = internal::Table::read(PREDICTIONS_TABLE, path)?;

    let ids = table.unique_keys(PATIENT_ID_COLUMN)?;
    let y_true = table.binary("y_true")?;
    let y_proba = table.bounded("y_proba", 0.0, 1.0)?;
    let pred_label = table.binary(PredictedLabelSource::PredLabel.column_name())?;
    let risk_category = table.risk_categories("risk_category")?;

    let y_pred = table.optional_binary(PredictedLabelSource::YPred.column_name())?;
    let high_sensitivity =
        table.optional_binary(PredictedLabelSource::PredHighSensitivity.column_name())?;
    let high_precision =
        table.optional_binary(PredictedLabelSource::PredHighPrecision.column_name())?;
    let top_feature = if table.has("shap_top_feature")? {
        Some(table.text("shap_top_feature")?)
    } else {
        None
    };

    let mut label_sources = vec![PredictedLabelSource::PredLabel];
    for (source, column) in [
        (PredictedLabelSource::YPred, &y_pred),
        (PredictedLabelSource::PredHighSensitivity, &high_sensitivity),
        (PredictedLabelSource::PredHighPrecision, &high_precision),
    ] {
        if column.is_some() {
            label_sources.push(source);
        }
    }

    let optional_at = |column: &Option<Vec<bool>>, i: usize| column.as_ref().map(|c| c[i]);
    let records = ids
        .into_iter()
        .enumerate()
        .map(|(i, patient_id)| PredictionRecord {
            patient_id,
            y_true: y_true[i],
            y_proba: y_proba[i],
            pred_label: pred_label[i],
            risk_category: risk_category[i],
            y_pred: optional_at(&y_pred, i),
            pred_high_sensitivity: optional_at(&high_sensitivity, i),
            pred_high_precision: optional_at(&high_precision, i),
            shap_top_feature: top_feature.as_ref().map(|c| c[i].clone()),
        })
        .collect::<Vec<_>>();

    debug!(
        "Read {} prediction rows with label columns {:?}",
        records.len(),
        label_sources
    );
    Ok(PredictionTable {
        records,
        label_sources,
    })
}

/// Loads the feature importance table and assigns ranks.
pub fn load_feature_importance(path: &Path) -> Result<FeatureImportanceTable, DataSourceError> {
    let table = internal::Table::read(IMPORTANCE_TABLE, path)?;

    let features = table.unique_keys("feature")?;
    let importance = table.bounded("importance", 0.0, f64::INFINITY)?;

    let ranked = FeatureImportanceTable::from_weights(features.into_iter().zip(importance).collect());
    debug!("Ranked {} features", ranked.len());
    Ok(ranked)
}

/// Loads the model comparison table.
pub fn load_model_scores(path: &Path) -> Result<Vec<ModelScoreRecord>, DataSourceError> {
    let table = internal::Table::read(SCORES_TABLE, path)?;

    let models = table.unique_keys("model")?;
    let auc = table.numeric("auc")?;
    let precision = table.numeric("precision")?;
    let recall = table.numeric("recall")?;
    let f1 = table.numeric("f1")?;
    let pr_auc = table.numeric("pr_auc")?;
    let brier = table.numeric("brier")?;

    let records: Vec<ModelScoreRecord> = models
        .into_iter()
        .enumerate()
        .map(|(i, model)| ModelScoreRecord {
            model,
            auc: auc[i],
            precision: precision[i],
            recall: recall[i],
            f1: f1[i],
            pr_auc: pr_auc[i],
            brier: brier[i],
        })
        .collect();

    for record in &records {
        let metrics = [
            ("auc", record.auc),
            ("precision", record.precision),
            ("recall", record.recall),
            ("f1", record.f1),
            ("pr_auc", record.pr_auc),
            ("brier", record.brier),
        ];
        for (name, value) in metrics {
            if !(0.0..=1.0).contains(&value) {
                warn!(
                    "Model '{}' reports {name} = {value}, outside the usual [0, 1] range",
                    record.model
                );
            }
        }
    }

    debug!("Read scores for {} models", records.len());
    Ok(records)
}

/// Inner-joins features to predictions on patient identifier, keeping the order of
/// the features table.
pub fn join(
    features: Vec<PatientFeatureRecord>,
    predictions: PredictionTable,
) -> (JoinedPatientView, JoinDiagnostics) {
    let feature_rows = features.len();
    let prediction_rows = predictions.records.len();

    let mut by_id: AHashMap<String, PredictionRecord> = predictions
        .records
        .into_iter()
        .map(|record| (record.patient_id.clone(), record))
        .collect();

    let mut rows = Vec::with_capacity(feature_rows.min(prediction_rows));
    let mut features_without_prediction = 0;
    for feature in features {
        match by_id.remove(&feature.patient_id) {
            Some(prediction) => rows.push(PatientRow {
                features: feature,
                prediction,
            }),
            None => features_without_prediction += 1,
        }
    }

    let risk_tier_mismatches = rows
        .iter()
        .filter(|row| RiskCategory::from_probability(row.probability()) != row.risk_category())
        .count();

    let diagnostics = JoinDiagnostics {
        feature_rows,
        prediction_rows,
        joined_rows: rows.len(),
        features_without_prediction,
        predictions_without_features: by_id.len(),
        risk_tier_mismatches,
    };

    (
        JoinedPatientView::new(rows, predictions.label_sources),
        diagnostics,
    )
}

/// Internal module for column extraction and validation shared by all tables.
mod internal {
    use super::*;

    /// A parsed table plus the name used in error messages.
    pub(super) struct Table {
        name: &'static str,
        df: DataFrame,
        headers: Vec<String>,
    }

    impl Table {
        pub(super) fn read(name: &'static str, path: &Path) -> Result<Self, DataSourceError> {
            debug!("Reading {name} table from '{}'", path.display());

            let file = File::open(path).map_err(|source| DataSourceError::Io {
                table: name,
                path: path.to_path_buf(),
                source,
            })?;

            let df = CsvReader::new(file)
                .with_options(CsvReadOptions::default().with_has_header(true))
                .finish()
                .map_err(|source| DataSourceError::Polars {
                    table: name,
                    source,
                })?;

            let headers = df
                .get_column_names()
                .into_iter()
                .map(|s| s.to_string())
                .collect();

            Ok(Self { name, df, headers })
        }

        fn height(&self) -> usize {
            self.df.height()
        }

        /// Finds the actual header for `column`, ignoring ASCII case.
        fn resolve(&self, column: &str) -> Result<Option<&str>, DataSourceError> {
            let mut matches = self
                .headers
                .iter()
                .filter(|header| header.eq_ignore_ascii_case(column));
            let first = matches.next();
            if matches.next().is_some() {
                return Err(DataSourceError::AmbiguousColumn {
                    table: self.name,
                    column: column.to_string(),
                });
            }
            Ok(first.map(String::as_str))
        }

        pub(super) fn has(&self, column: &str) -> Result<bool, DataSourceError> {
            Ok(self.resolve(column)?.is_some())
        }

        fn require(&self, column: &str) -> Result<&Column, DataSourceError> {
            let header = self
                .resolve(column)?
                .ok_or_else(|| DataSourceError::ColumnNotFound {
                    table: self.name,
                    column: column.to_string(),
                })?;
            let series = self
                .df
                .column(header)
                .map_err(|source| self.polars_error(source))?;
            if series.null_count() > 0 {
                return Err(DataSourceError::MissingValuesFound {
                    table: self.name,
                    column: column.to_string(),
                });
            }
            Ok(series)
        }

        fn polars_error(&self, source: PolarsError) -> DataSourceError {
            DataSourceError::Polars {
                table: self.name,
                source,
            }
        }

        fn invalid(&self, column: &str, index: usize, reason: String) -> DataSourceError {
            DataSourceError::InvalidValue {
                table: self.name,
                column: column.to_string(),
                row: index + 1,
                reason,
            }
        }

        /// A finite numeric column with no missing values.
        pub(super) fn numeric(&self, column: &str) -> Result<Vec<f64>, DataSourceError> {
            let series = self.require(column)?;
            let wrong_type = || DataSourceError::ColumnWrongType {
                table: self.name,
                column: column.to_string(),
                expected_type: "f64 (numeric)",
                found_type: format!("{:?}", series.dtype()),
            };

            let casted = series.cast(&DataType::Float64).map_err(|_| wrong_type())?;
            // Non-numeric text casts to null rather than failing.
            if casted.null_count() > 0 {
                return Err(wrong_type());
            }

            let chunked = casted
                .f64()
                .map_err(|source| self.polars_error(source))?
                .rechunk();
            let values: Vec<f64> = chunked.into_no_null_iter().collect();
            if values.iter().any(|v| !v.is_finite()) {
                return Err(DataSourceError::NonFiniteValuesFound {
                    table: self.name,
                    column: column.to_string(),
                });
            }
            Ok(values)
        }

        /// A numeric column whose values must lie in `[min, max]`.
        pub(super) fn bounded(
            &self,
            column: &str,
            min: f64,
            max: f64,
        ) -> Result<Vec<f64>, DataSourceError> {
            let values = self.numeric(column)?;
            if let Some(index) = values.iter().position(|v| *v < min || *v > max) {
                return Err(self.invalid(
                    column,
                    index,
                    format!("{} is outside [{min}, {max}]", values[index]),
                ));
            }
            Ok(values)
        }

        /// A column of non-negative whole numbers (ages, visit counts, day counts).
        pub(super) fn counts(&self, column: &str) -> Result<Vec<u32>, DataSourceError> {
            self.numeric(column)?
                .into_iter()
                .enumerate()
                .map(|(i, v)| {
                    if v < 0.0 || v.fract() != 0.0 || v > f64::from(u32::MAX) {
                        Err(self.invalid(column, i, format!("{v} is not a non-negative integer")))
                    } else {
                        Ok(v as u32)
                    }
                })
                .collect()
        }

        /// A 0/1 column.
        pub(super) fn binary(&self, column: &str) -> Result<Vec<bool>, DataSourceError> {
            self.numeric(column)?
                .into_iter()
                .enumerate()
                .map(|(i, v)| {
                    if v == 0.0 {
                        Ok(false)
                    } else if v == 1.0 {
                        Ok(true)
                    } else {
                        Err(self.invalid(column, i, format!("{v} is not a binary label (0 or 1)")))
                    }
                })
                .collect()
        }

        pub(super) fn optional_binary(
            &self,
            column: &str,
        ) -> Result<Option<Vec<bool>>, DataSourceError> {
            if self.has(column)? {
                self.binary(column).map(Some)
            } else {
                Ok(None)
            }
        }

        /// A text column with no missing values. Numeric columns are rendered as text.
        pub(super) fn text(&self, column: &str) -> Result<Vec<String>, DataSourceError> {
            let series = self.require(column)?;
            let casted = series
                .cast(&DataType::String)
                .map_err(|source| self.polars_error(source))?;
            let chunked = casted.str().map_err(|source| self.polars_error(source))?;

            let mut values = Vec::with_capacity(self.height());
            for value in chunked.into_iter() {
                match value {
                    Some(text) if !text.trim().is_empty() => values.push(text.trim().to_string()),
                    _ => {
                        return Err(DataSourceError::MissingValuesFound {
                            table: self.name,
                            column: column.to_string(),
                        });
                    }
                }
            }
            Ok(values)
        }

        /// A text column whose values must be unique within the table.
        pub(super) fn unique_keys(&self, column: &str) -> Result<Vec<String>, DataSourceError> {
            let keys = self.text(column)?;
            let mut seen = AHashSet::with_capacity(keys.len());
            for key in &keys {
                if !seen.insert(key.as_str()) {
                    return Err(DataSourceError::DuplicateKey {
                        table: self.name,
                        column: column.to_string(),
                        key: key.clone(),
                    });
                }
            }
            Ok(keys)
        }

        pub(super) fn risk_categories(
            &self,
            column: &str,
        ) -> Result<Vec<RiskCategory>, DataSourceError> {
            self.text(column)?
                .iter()
                .enumerate()
                .map(|(i, text)| text.parse::<RiskCategory>().map_err(|reason| self.invalid(column, i, reason)))
                .collect()
        }
    }
}
