//! # Dataset Handle
//!
//! The loaded dataset is read far more often than it is replaced. A `DatasetHandle`
//! owns the current `Dataset` behind `RwLock<Arc<_>>`: readers take a cheap `Arc`
//! snapshot and release the lock immediately, so a snapshot stays valid and
//! unchanged for as long as its holder keeps it. `reload` builds a complete new
//! `Dataset` outside the lock and only then swaps the pointer. A failed reload
//! leaves the previous dataset in place.

use crate::config::{DashboardConfig, DataSourceConfig};
use crate::confusion::{self, ConfusionCounts};
use crate::data::{self, DataSourceError, FeatureImportanceTable, JoinDiagnostics};
use crate::filter::{self, FilterSpec};
use crate::metrics::{self, ModelMetrics};
use crate::summary::{self, DatasetSummary};
use crate::types::{FeatureImportanceRecord, JoinedPatientView, ModelScoreRecord, PredictedLabelSource};
use crate::DashboardError;
use log::{info, warn};
use std::fs;
use std::num::NonZeroUsize;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

/// One immutable, fully validated load of the four source tables.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub view: JoinedPatientView,
    pub importance: FeatureImportanceTable,
    pub scores: Vec<ModelScoreRecord>,
    pub diagnostics: JoinDiagnostics,
    pub loaded_at: SystemTime,
    /// Newest modification time among the source files, when the filesystem reports one.
    pub source_modified: Option<SystemTime>,
}

impl Dataset {
    pub fn load(source: &DataSourceConfig) -> Result<Self, DataSourceError> {
        let tables = data::load(source)?;
        Ok(Self {
            view: tables.view,
            importance: tables.importance,
            scores: tables.scores,
            diagnostics: tables.diagnostics,
            loaded_at: SystemTime::now(),
            source_modified: newest_modification(source),
        })
    }

    pub fn summary(&self) -> DatasetSummary {
        summary::summarize(&self.view)
    }

    pub fn filter(&self, spec: &FilterSpec) -> JoinedPatientView {
        filter::apply(&self.view, spec)
    }

    pub fn metrics(&self, model_name: &str) -> Result<ModelMetrics, metrics::MetricsError> {
        metrics::get_metrics(&self.scores, model_name)
    }

    pub fn confusion(
        &self,
        source: PredictedLabelSource,
    ) -> Result<ConfusionCounts, confusion::ConfusionError> {
        confusion::build(&self.view, source)
    }

    pub fn top_features(&self, n: NonZeroUsize) -> &[FeatureImportanceRecord] {
        self.importance.top(n)
    }
}

fn newest_modification(source: &DataSourceConfig) -> Option<SystemTime> {
    source
        .all_paths()
        .iter()
        .filter_map(|path| fs::metadata(path).and_then(|meta| meta.modified()).ok())
        .max()
}

/// Shared access to the current dataset plus the configuration it was loaded with.
#[derive(Debug)]
pub struct DatasetHandle {
    config: DashboardConfig,
    current: RwLock<Arc<Dataset>>,
}

impl DatasetHandle {
    /// Validates the configuration and performs the initial load.
    pub fn open(config: DashboardConfig) -> Result<Self, DashboardError> {
        config.validate()?;
        let dataset = Dataset::load(&config.data)?;
        Ok(Self {
            config,
            current: RwLock::new(Arc::new(dataset)),
        })
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    /// The dataset current at the time of the call.
    pub fn snapshot(&self) -> Arc<Dataset> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Loads the source tables again and, on success, makes the result current.
    ///
    /// Snapshots taken before the call keep seeing the old dataset.
    pub fn reload(&self) -> Result<Arc<Dataset>, DataSourceError> {
        let fresh = match Dataset::load(&self.config.data) {
            Ok(dataset) => Arc::new(dataset),
            Err(e) => {
                warn!("Reload failed, keeping the previously loaded dataset: {e}");
                return Err(e);
            }
        };
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::clone(&fresh);
        drop(guard);
        info!("Reloaded dataset with {} patients", fresh.view.len());
        Ok(fresh)
    }

    /// True when a source file has been modified since the current dataset was read.
    pub fn source_changed(&self) -> bool {
        let loaded = self.snapshot().source_modified;
        match (newest_modification(&self.config.data), loaded) {
            (Some(now), Some(then)) => now > then,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Metrics for `model`, or for the configured default model when `None`.
    pub fn metrics(&self, model: Option<&str>) -> Result<ModelMetrics, metrics::MetricsError> {
        let name = self.config.model_or_default(model);
        self.snapshot().metrics(name)
    }

    /// Confusion counts for `source`, or for the configured label column when `None`.
    pub fn confusion(
        &self,
        source: Option<PredictedLabelSource>,
    ) -> Result<ConfusionCounts, confusion::ConfusionError> {
        self.snapshot()
            .confusion(source.unwrap_or(self.config.confusion_label))
    }

    /// The configured number of top features.
    pub fn default_top_features(&self) -> NonZeroUsize {
        // Validated in `open`.
        NonZeroUsize::new(self.config.top_features).unwrap_or(NonZeroUsize::MIN)
    }
}
