//! # Presentation Helpers
//!
//! Number formatting and the small derived tables the dashboard pages draw: the
//! per-tier breakdown, the probability histogram and the annotated feature
//! ranking. Everything here is a pure function of a view or table.

use crate::config::{RiskCategory, feature_definition};
use crate::data::FeatureImportanceTable;
use crate::summary::RiskCounts;
use crate::types::{JoinedPatientView, PatientRow};
use serde::Serialize;
use std::num::NonZeroUsize;

/// Shown in place of a definition for undocumented features.
pub const MISSING_DEFINITION: &str = "N/A";

/// Formats a fraction as a percentage, e.g. `0.667` with one decimal as `"66.7%"`.
pub fn format_percentage(value: f64, decimals: usize) -> String {
    format!("{:.*}%", decimals, value * 100.0)
}

/// Formats a value as a whole number with thousands separators, e.g. `"1,000"`.
pub fn format_number(value: f64) -> String {
    let rounded = value.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if rounded < 0.0 {
        grouped.push('-');
    }
    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}

/// Human-readable age of a timestamp given in elapsed seconds.
pub fn format_refresh_age(seconds: u64) -> String {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 60 * MINUTE;
    const DAY: u64 = 24 * HOUR;
    const WEEK: u64 = 7 * DAY;
    const MONTH: u64 = 30 * DAY;
    const YEAR: u64 = 365 * DAY;

    if seconds < MINUTE {
        format!("{} seconds ago", seconds)
    } else if seconds < HOUR {
        format!("{:.1} minutes ago", seconds as f64 / MINUTE as f64)
    } else if seconds < DAY {
        format!("{:.1} hours ago", seconds as f64 / HOUR as f64)
    } else if seconds < WEEK {
        format!("{:.1} days ago", seconds as f64 / DAY as f64)
    } else if seconds < MONTH {
        format!("{:.1} weeks ago", seconds as f64 / WEEK as f64)
    } else if seconds < YEAR {
        format!("{:.1} months ago", seconds as f64 / MONTH as f64)
    } else {
        format!("{:.1} years ago", seconds as f64 / YEAR as f64)
    }
}

/// One line of the risk breakdown table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskBreakdownRow {
    pub risk_category: RiskCategory,
    pub patients: usize,
    pub mean_probability: f64,
    pub mean_age: f64,
}

/// Count, mean probability and mean age for every tier present in the view,
/// highest tier first.
pub fn risk_breakdown(view: &JoinedPatientView) -> Vec<RiskBreakdownRow> {
    RiskCategory::ALL
        .iter()
        .rev()
        .filter_map(|&tier| {
            let rows: Vec<&PatientRow> = view.iter().filter(|row| row.risk_category() == tier).collect();
            if rows.is_empty() {
                return None;
            }
            let n = rows.len() as f64;
            Some(RiskBreakdownRow {
                risk_category: tier,
                patients: rows.len(),
                mean_probability: rows.iter().map(|row| row.probability()).sum::<f64>() / n,
                mean_age: rows.iter().map(|row| f64::from(row.age())).sum::<f64>() / n,
            })
        })
        .collect()
}

/// One equal-width probability bin with its per-tier counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub counts: RiskCounts,
}

const BIN_EDGE_TOLERANCE: f64 = 1e-9;

/// Splits [0, 1] into `bins` equal-width bins and counts patients per tier in each.
/// Bins are closed on the left; a probability of exactly 1 lands in the last bin.
pub fn probability_histogram(view: &JoinedPatientView, bins: NonZeroUsize) -> Vec<HistogramBin> {
    let n = bins.get();
    let width = 1.0 / n as f64;
    let mut histogram: Vec<HistogramBin> = (0..n)
        .map(|i| HistogramBin {
            lower: i as f64 * width,
            upper: if i + 1 == n { 1.0 } else { (i + 1) as f64 * width },
            counts: RiskCounts::default(),
        })
        .collect();

    for row in view.iter() {
        // Rounding can leave a value sitting on an edge just below it.
        let scaled = row.probability() * n as f64 + BIN_EDGE_TOLERANCE;
        let slot = (scaled.floor() as usize).min(n - 1);
        histogram[slot].counts[row.risk_category()] += 1;
    }
    histogram
}

/// One line of the annotated feature ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRow {
    pub rank: usize,
    pub feature: String,
    pub importance: f64,
    pub definition: &'static str,
}

/// The top `n` ranked features with their plain-language definitions.
pub fn feature_rows(table: &FeatureImportanceTable, n: NonZeroUsize) -> Vec<FeatureRow> {
    table
        .top(n)
        .iter()
        .map(|record| FeatureRow {
            rank: record.rank,
            feature: record.feature.clone(),
            importance: record.importance,
            definition: feature_definition(&record.feature).unwrap_or(MISSING_DEFINITION),
        })
        .collect()
}
