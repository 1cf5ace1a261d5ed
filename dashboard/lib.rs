#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod config;
pub mod confusion;
pub mod data;
pub mod dataset;
pub mod export;
pub mod filter;
pub mod metrics;
pub mod report;
pub mod summary;
pub mod types;

#[cfg(test)]
mod test_fixtures;

use thiserror::Error;

/// Any failure a dashboard operation can report.
#[derive(Error, Debug)]
pub enum DashboardError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    DataSource(#[from] data::DataSourceError),
    #[error(transparent)]
    Metrics(#[from] metrics::MetricsError),
    #[error(transparent)]
    Confusion(#[from] confusion::ConfusionError),
    #[error(transparent)]
    Export(#[from] export::ExportError),
}
