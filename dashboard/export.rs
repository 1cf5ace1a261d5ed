//! CSV export of a (usually filtered) patient view.
//!
//! Columns are written in exactly the order the caller lists them, under their
//! canonical source headers, so an exported file can be read back by the loader.

use crate::types::{JoinedPatientView, PatientRow, PredictedLabelSource};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("At least one column must be selected for export.")]
    NoColumns,
    #[error("Failed to write CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("Failed to write export file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A column of the joined view that can be shown or exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisplayColumn {
    PatientId,
    Age,
    Sex,
    Pathology,
    NVisits,
    VisitsPerMonth,
    MonthsActive,
    DaysSinceLastVisit,
    Adherence,
    Satisfaction,
    ResponseMean,
    ResponseStd,
    BiomarkerMean,
    BiomarkerStd,
    BiomarkerMin,
    BiomarkerMax,
    YTrue,
    YProba,
    PredLabel,
    RiskCategory,
    YPred,
    PredHighSensitivity,
    PredHighPrecision,
    ShapTopFeature,
}

/// The columns the patient explorer shows when nothing else is chosen.
pub const DEFAULT_DISPLAY_COLUMNS: [DisplayColumn; 9] = [
    DisplayColumn::PatientId,
    DisplayColumn::Age,
    DisplayColumn::Sex,
    DisplayColumn::Pathology,
    DisplayColumn::RiskCategory,
    DisplayColumn::YProba,
    DisplayColumn::NVisits,
    DisplayColumn::Adherence,
    DisplayColumn::Satisfaction,
];

impl DisplayColumn {
    pub const ALL: [DisplayColumn; 24] = [
        DisplayColumn::PatientId,
        DisplayColumn::Age,
        DisplayColumn::Sex,
        DisplayColumn::Pathology,
        DisplayColumn::NVisits,
        DisplayColumn::VisitsPerMonth,
        DisplayColumn::MonthsActive,
        DisplayColumn::DaysSinceLastVisit,
        DisplayColumn::Adherence,
        DisplayColumn::Satisfaction,
        DisplayColumn::ResponseMean,
        DisplayColumn::ResponseStd,
        DisplayColumn::BiomarkerMean,
        DisplayColumn::BiomarkerStd,
        DisplayColumn::BiomarkerMin,
        DisplayColumn::BiomarkerMax,
        DisplayColumn::YTrue,
        DisplayColumn::YProba,
        DisplayColumn::PredLabel,
        DisplayColumn::RiskCategory,
        DisplayColumn::YPred,
        DisplayColumn::PredHighSensitivity,
        DisplayColumn::PredHighPrecision,
        DisplayColumn::ShapTopFeature,
    ];

    /// The source header this column is read from and exported under.
    pub fn header(self) -> &'static str {
        match self {
            DisplayColumn::PatientId => "PatientID",
            DisplayColumn::Age => "Age",
            DisplayColumn::Sex => "Sex",
            DisplayColumn::Pathology => "Pathology",
            DisplayColumn::NVisits => "n_visits",
            DisplayColumn::VisitsPerMonth => "visits_per_month",
            DisplayColumn::MonthsActive => "months_active",
            DisplayColumn::DaysSinceLastVisit => "days_since_last_visit",
            DisplayColumn::Adherence => "adherence",
            DisplayColumn::Satisfaction => "satisfaction",
            DisplayColumn::ResponseMean => "response_mean",
            DisplayColumn::ResponseStd => "response_std",
            DisplayColumn::BiomarkerMean => "biomarker_mean",
            DisplayColumn::BiomarkerStd => "biomarker_std",
            DisplayColumn::BiomarkerMin => "biomarker_min",
            DisplayColumn::BiomarkerMax => "biomarker_max",
            DisplayColumn::YTrue => "y_true",
            DisplayColumn::YProba => "y_proba",
            DisplayColumn::PredLabel => PredictedLabelSource::PredLabel.column_name(),
            DisplayColumn::RiskCategory => "risk_category",
            DisplayColumn::YPred => PredictedLabelSource::YPred.column_name(),
            DisplayColumn::PredHighSensitivity => {
                PredictedLabelSource::PredHighSensitivity.column_name()
            }
            DisplayColumn::PredHighPrecision => PredictedLabelSource::PredHighPrecision.column_name(),
            DisplayColumn::ShapTopFeature => "shap_top_feature",
        }
    }

    /// The cell text for one row. Absent optional values are written empty.
    pub fn value(self, row: &PatientRow) -> String {
        let features = &row.features;
        let prediction = &row.prediction;
        let flag = |value: bool| u8::from(value).to_string();
        let optional_flag = |value: Option<bool>| value.map(flag).unwrap_or_default();
        match self {
            DisplayColumn::PatientId => features.patient_id.clone(),
            DisplayColumn::Age => features.age.to_string(),
            DisplayColumn::Sex => features.sex.clone(),
            DisplayColumn::Pathology => features.pathology.clone(),
            DisplayColumn::NVisits => features.n_visits.to_string(),
            DisplayColumn::VisitsPerMonth => features.visits_per_month.to_string(),
            DisplayColumn::MonthsActive => features.months_active.to_string(),
            DisplayColumn::DaysSinceLastVisit => features.days_since_last_visit.to_string(),
            DisplayColumn::Adherence => features.adherence.to_string(),
            DisplayColumn::Satisfaction => features.satisfaction.to_string(),
            DisplayColumn::ResponseMean => features.response_mean.to_string(),
            DisplayColumn::ResponseStd => features.response_std.to_string(),
            DisplayColumn::BiomarkerMean => features.biomarker_mean.to_string(),
            DisplayColumn::BiomarkerStd => features.biomarker_std.to_string(),
            DisplayColumn::BiomarkerMin => features.biomarker_min.to_string(),
            DisplayColumn::BiomarkerMax => features.biomarker_max.to_string(),
            DisplayColumn::YTrue => flag(prediction.y_true),
            DisplayColumn::YProba => prediction.y_proba.to_string(),
            DisplayColumn::PredLabel => flag(prediction.pred_label),
            DisplayColumn::RiskCategory => prediction.risk_category.to_string(),
            DisplayColumn::YPred => optional_flag(prediction.y_pred),
            DisplayColumn::PredHighSensitivity => optional_flag(prediction.pred_high_sensitivity),
            DisplayColumn::PredHighPrecision => optional_flag(prediction.pred_high_precision),
            DisplayColumn::ShapTopFeature => {
                prediction.shap_top_feature.clone().unwrap_or_default()
            }
        }
    }
}

impl fmt::Display for DisplayColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

impl FromStr for DisplayColumn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        DisplayColumn::ALL
            .into_iter()
            .find(|column| column.header().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| format!("Unknown column '{trimmed}'."))
    }
}

/// Writes the header and one record per row to `writer`.
pub fn write_csv<W: Write>(
    view: &JoinedPatientView,
    columns: &[DisplayColumn],
    writer: W,
) -> Result<(), ExportError> {
    if columns.is_empty() {
        return Err(ExportError::NoColumns);
    }

    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(columns.iter().map(|column| column.header()))?;
    for row in view.iter() {
        csv_writer.write_record(columns.iter().map(|column| column.value(row)))?;
    }
    csv_writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Renders the view as UTF-8 CSV bytes.
pub fn export_csv(view: &JoinedPatientView, columns: &[DisplayColumn]) -> Result<Vec<u8>, ExportError> {
    let mut buffer = Vec::new();
    write_csv(view, columns, &mut buffer)?;
    Ok(buffer)
}

/// Writes the view as CSV to `path`, replacing any existing file.
pub fn export_csv_to_path(
    view: &JoinedPatientView,
    columns: &[DisplayColumn],
    path: &Path,
) -> Result<(), ExportError> {
    if columns.is_empty() {
        return Err(ExportError::NoColumns);
    }
    let file = File::create(path).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    write_csv(view, columns, BufWriter::new(file))?;
    log::info!("Exported {} patients to '{}'", view.len(), path.display());
    Ok(())
}
