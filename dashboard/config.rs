//! # Schema and Configuration
//!
//! Static enumerations shared by every other module (risk tiers, the palette used
//! to draw them, human-readable feature definitions) and the on-disk dashboard
//! configuration.
//!
//! The configuration is a small TOML file. Every field has a default, so an empty
//! file (or no file at all) yields a working setup pointed at `./data`. The
//! default model name lives here and nowhere else; callers that do not name a
//! model ask the configuration for it.

use crate::types::PredictedLabelSource;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::{BufWriter, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// The model whose metrics are shown when the caller does not choose one.
pub const DEFAULT_MODEL_NAME: &str = "Random Forest";

/// Number of ranked features shown when the caller does not choose a count.
pub const DEFAULT_TOP_FEATURES: usize = 10;

pub const PATIENTS_FILE: &str = "patients_features.csv";
pub const PREDICTIONS_FILE: &str = "predictions_full_bestmodel.csv";
pub const IMPORTANCE_FILE: &str = "feature_importance_rf.csv";
pub const SCORES_FILE: &str = "model_scores.csv";

/// Upper bounds (inclusive) of the Low and Medium probability bins. Anything above
/// the second bound is High.
pub const RISK_BIN_EDGES: [f64; 2] = [0.33, 0.67];

pub mod palette {
    pub const PRIMARY: &str = "#003366";
    pub const ACCENT: &str = "#1976D2";
    pub const BACKGROUND: &str = "#F5F5F5";
    pub const LOW_RISK: &str = "#4CAF50";
    pub const MEDIUM_RISK: &str = "#FF9800";
    pub const HIGH_RISK: &str = "#D32F2F";
}

/// A patient's risk tier. The derived ordering is Low < Medium < High.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskCategory {
    Low,
    Medium,
    High,
}

impl RiskCategory {
    /// All tiers in ascending order.
    pub const ALL: [RiskCategory; 3] = [RiskCategory::Low, RiskCategory::Medium, RiskCategory::High];

    pub fn as_str(self) -> &'static str {
        match self {
            RiskCategory::Low => "Low",
            RiskCategory::Medium => "Medium",
            RiskCategory::High => "High",
        }
    }

    /// Hex color used by charts for this tier.
    pub fn color(self) -> &'static str {
        match self {
            RiskCategory::Low => palette::LOW_RISK,
            RiskCategory::Medium => palette::MEDIUM_RISK,
            RiskCategory::High => palette::HIGH_RISK,
        }
    }

    /// Bins a predicted probability with right-closed intervals:
    /// `(0, 0.33]` is Low, `(0.33, 0.67]` is Medium, `(0.67, 1]` is High.
    /// A probability of exactly zero is treated as Low.
    pub fn from_probability(probability: f64) -> RiskCategory {
        if probability <= RISK_BIN_EDGES[0] {
            RiskCategory::Low
        } else if probability <= RISK_BIN_EDGES[1] {
            RiskCategory::Medium
        } else {
            RiskCategory::High
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            RiskCategory::Low => 0,
            RiskCategory::Medium => 1,
            RiskCategory::High => 2,
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        RiskCategory::ALL
            .into_iter()
            .find(|tier| tier.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| {
                format!("Unknown risk category '{trimmed}'. Expected one of Low, Medium, High.")
            })
    }
}

/// Plain-language meaning of a model feature, if one is documented.
pub fn feature_definition(feature: &str) -> Option<&'static str> {
    let definition = match feature {
        "visits_per_month" => "Average number of patient visits per month",
        "days_since_last_visit" => "Days elapsed since most recent contact",
        "months_active" => "Total duration patient has been in study",
        "n_visits" => "Total number of visits recorded",
        "response_mean" => "Average historical response rate",
        "response_std" => "Variability in patient responses",
        "biomarker_mean" => "Average biomarker level",
        "biomarker_std" => "Biomarker variability",
        "adherence" => "Treatment adherence rate (0-1)",
        "satisfaction" => "Patient satisfaction score (1-5)",
        _ => return None,
    };
    Some(definition)
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write configuration file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to serialize configuration to TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Where the four input tables live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSourceConfig {
    pub data_dir: PathBuf,
    pub patients_file: String,
    pub predictions_file: String,
    pub importance_file: String,
    pub scores_file: String,
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            patients_file: PATIENTS_FILE.to_string(),
            predictions_file: PREDICTIONS_FILE.to_string(),
            importance_file: IMPORTANCE_FILE.to_string(),
            scores_file: SCORES_FILE.to_string(),
        }
    }
}

impl DataSourceConfig {
    /// Points at `dir` with the default file names.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: dir.into(),
            ..Self::default()
        }
    }

    pub fn patients_path(&self) -> PathBuf {
        self.data_dir.join(&self.patients_file)
    }

    pub fn predictions_path(&self) -> PathBuf {
        self.data_dir.join(&self.predictions_file)
    }

    pub fn importance_path(&self) -> PathBuf {
        self.data_dir.join(&self.importance_file)
    }

    pub fn scores_path(&self) -> PathBuf {
        self.data_dir.join(&self.scores_file)
    }

    /// The four table paths in load order.
    pub fn all_paths(&self) -> [PathBuf; 4] {
        [
            self.patients_path(),
            self.predictions_path(),
            self.importance_path(),
            self.scores_path(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub data: DataSourceConfig,
    /// Model shown by the performance views when none is requested.
    pub default_model: String,
    /// Predicted-label column that feeds confusion matrices by default.
    pub confusion_label: PredictedLabelSource,
    pub top_features: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            data: DataSourceConfig::default(),
            default_model: DEFAULT_MODEL_NAME.to_string(),
            confusion_label: PredictedLabelSource::PredLabel,
            top_features: DEFAULT_TOP_FEATURES,
        }
    }
}

impl DashboardConfig {
    /// Loads a configuration from a TOML file. Absent fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: DashboardConfig = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration in a human-readable TOML format.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut file = BufWriter::new(fs::File::create(path).map_err(io_err)?);
        file.write_all(toml_string.as_bytes()).map_err(io_err)?;
        file.flush().map_err(io_err)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_model.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "default_model",
                reason: "must name a model".to_string(),
            });
        }
        self.top_features_count()?;
        Ok(())
    }

    pub fn top_features_count(&self) -> Result<NonZeroUsize, ConfigError> {
        NonZeroUsize::new(self.top_features).ok_or_else(|| ConfigError::InvalidValue {
            field: "top_features",
            reason: "must be a positive integer".to_string(),
        })
    }

    /// The model to use for a request: the requested one, or the configured default.
    pub fn model_or_default<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested.unwrap_or(&self.default_model)
    }
}
