#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use itertools::Itertools;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::process;
use std::time::SystemTime;

use aplusa::config::{DashboardConfig, RiskCategory};
use aplusa::dataset::{Dataset, DatasetHandle};
use aplusa::export::{self, DEFAULT_DISPLAY_COLUMNS, DisplayColumn};
use aplusa::filter::FilterSpec;
use aplusa::report::{
    feature_rows, format_number, format_percentage, format_refresh_age, probability_histogram,
    risk_breakdown,
};
use aplusa::types::PredictedLabelSource;

/// Configuration file picked up from the working directory when `--config` is absent.
const LOCAL_CONFIG_FILE: &str = "aplusa.toml";

#[derive(Parser)]
#[command(
    name = "aplusa",
    about = "Patient risk analytics over precomputed model outputs",
    long_about = "Loads patient features, model predictions, feature importances and model \
                 scores from a data directory and reports risk summaries, filtered cohorts \
                 and model performance."
)]
struct Cli {
    /// TOML configuration file (defaults to ./aplusa.toml when present)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory holding the four input tables; overrides the configuration
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Dataset overview: totals, risk tiers and the probability distribution
    #[command(about = "Show the executive summary")]
    Summary {
        /// Emit the summary as JSON instead of text
        #[arg(long)]
        json: bool,

        /// Number of equal-width bins in the probability histogram
        #[arg(long, default_value = "10", value_name = "N")]
        bins: NonZeroUsize,
    },

    /// Filter patients and optionally export the result
    #[command(about = "Filter, list and export patients")]
    Explore(ExploreArgs),

    /// Ranked feature importances with definitions
    #[command(about = "Show the most important model features")]
    Features {
        /// Number of features to show (defaults to the configured count)
        #[arg(long, value_name = "N")]
        top: Option<NonZeroUsize>,
    },

    /// Headline metrics and the confusion matrix of one model
    #[command(about = "Show model performance")]
    Performance {
        /// Model name as written in the scores table (defaults to the configured model)
        #[arg(long, value_name = "NAME")]
        model: Option<String>,

        /// Predicted-label column for the confusion matrix (defaults to the configured column)
        #[arg(long, value_name = "COLUMN")]
        labels: Option<PredictedLabelSource>,
    },

    /// Display version and build information
    #[command(about = "Display version and build information")]
    Version,
}

#[derive(Args)]
struct ExploreArgs {
    /// Keep only these risk tiers (repeatable)
    #[arg(long = "risk", value_name = "TIER")]
    risk: Vec<RiskCategory>,

    /// Keep only these pathologies (repeatable)
    #[arg(long = "pathology", value_name = "NAME")]
    pathology: Vec<String>,

    /// Youngest age to keep (inclusive)
    #[arg(long, value_name = "YEARS")]
    min_age: Option<u32>,

    /// Oldest age to keep (inclusive)
    #[arg(long, value_name = "YEARS")]
    max_age: Option<u32>,

    /// Keep patients whose predicted probability is at least this value
    #[arg(long, value_name = "P")]
    min_probability: Option<f64>,

    /// Comma-separated display columns, in output order
    #[arg(long, value_delimiter = ',', value_name = "COLUMNS")]
    columns: Vec<DisplayColumn>,

    /// Write the filtered patients to this CSV file
    #[arg(long, value_name = "PATH")]
    export: Option<PathBuf>,

    /// Maximum number of patients printed to the terminal
    #[arg(long, default_value = "25", value_name = "N")]
    limit: usize,

    /// List the pathologies present in the data and exit
    #[arg(long)]
    list_pathologies: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli {
        config,
        data_dir,
        command,
    } = Cli::parse();

    let result = match command {
        Some(Commands::Version) => {
            print_version_info();
            Ok(())
        }
        Some(command) => open_dataset(config.as_deref(), data_dir)
            .and_then(|handle| run(&handle, command)),
        None => {
            Cli::command().print_help().expect("print help");
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn open_dataset(
    config_path: Option<&Path>,
    data_dir: Option<PathBuf>,
) -> Result<DatasetHandle, Box<dyn std::error::Error>> {
    let local = Path::new(LOCAL_CONFIG_FILE);
    let mut config = match config_path {
        Some(path) => DashboardConfig::load(path)?,
        None if local.is_file() => DashboardConfig::load(local)?,
        None => DashboardConfig::default(),
    };
    if let Some(dir) = data_dir {
        config.data.data_dir = dir;
    }
    Ok(DatasetHandle::open(config)?)
}

fn run(handle: &DatasetHandle, command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Summary { json, bins } => run_summary(&handle.snapshot(), json, bins),
        Commands::Explore(args) => run_explore(&handle.snapshot(), args),
        Commands::Features { top } => {
            let n = top.unwrap_or_else(|| handle.default_top_features());
            run_features(&handle.snapshot(), n);
            Ok(())
        }
        Commands::Performance { model, labels } => run_performance(handle, model, labels),
        Commands::Version => {
            print_version_info();
            Ok(())
        }
    }
}

fn run_summary(
    dataset: &Dataset,
    json: bool,
    bins: NonZeroUsize,
) -> Result<(), Box<dyn std::error::Error>> {
    let summary = dataset.summary();

    if json {
        let document = serde_json::json!({
            "summary": summary,
            "risk_breakdown": risk_breakdown(&dataset.view),
            "join": dataset.diagnostics,
        });
        println!("{}", serde_json::to_string_pretty(&document)?);
        return Ok(());
    }

    println!("Total patients:        {}", format_number(summary.total_patients as f64));
    for tier in RiskCategory::ALL.iter().rev() {
        let count = summary.count_by_risk[*tier];
        let share = if summary.total_patients == 0 {
            "-".to_string()
        } else {
            format_percentage(count as f64 / summary.total_patients as f64, 1)
        };
        println!("{:<22} {} ({share})", format!("{tier} risk:"), format_number(count as f64));
    }
    match summary.avg_probability {
        Some(p) => println!("Average probability:   {}", format_percentage(p, 1)),
        None => println!("Average probability:   -"),
    }
    println!("Pathologies:           {}", summary.distinct_pathology_count);
    print_freshness(dataset);

    if dataset.diagnostics.dropped_rows() > 0 {
        println!(
            "Join dropped {} feature rows and {} prediction rows without a match",
            dataset.diagnostics.features_without_prediction,
            dataset.diagnostics.predictions_without_features
        );
    }

    println!("\nRisk breakdown");
    let rows = risk_breakdown(&dataset.view)
        .into_iter()
        .map(|row| {
            vec![
                row.risk_category.to_string(),
                format_number(row.patients as f64),
                format_percentage(row.mean_probability, 1),
                format!("{:.1}", row.mean_age),
            ]
        })
        .collect::<Vec<_>>();
    print_table(&["Risk", "Count", "Avg Prob", "Avg Age"], &rows);

    println!("\nPredicted probabilities");
    let rows = probability_histogram(&dataset.view, bins)
        .into_iter()
        .map(|bin| {
            vec![
                format!("{:.2}-{:.2}", bin.lower, bin.upper),
                bin.counts.low.to_string(),
                bin.counts.medium.to_string(),
                bin.counts.high.to_string(),
            ]
        })
        .collect::<Vec<_>>();
    print_table(&["Probability", "Low", "Medium", "High"], &rows);
    Ok(())
}

fn print_freshness(dataset: &Dataset) {
    let age_of = |time: SystemTime| {
        SystemTime::now()
            .duration_since(time)
            .map(|d| format_refresh_age(d.as_secs()))
            .unwrap_or_else(|_| "just now".to_string())
    };
    println!("Loaded:                {}", age_of(dataset.loaded_at));
    if let Some(modified) = dataset.source_modified {
        println!("Source data modified:  {}", age_of(modified));
    }
}

fn run_explore(dataset: &Dataset, args: ExploreArgs) -> Result<(), Box<dyn std::error::Error>> {
    if args.list_pathologies {
        let mut pathologies = dataset.view.pathologies();
        pathologies.sort_by(|a, b| natord::compare(a, b));
        for pathology in pathologies {
            println!("{pathology}");
        }
        return Ok(());
    }

    let mut spec = FilterSpec::new()
        .with_risk_categories(args.risk)
        .with_pathologies(args.pathology);
    if args.min_age.is_some() || args.max_age.is_some() {
        let (youngest, oldest) = dataset.view.age_bounds().unwrap_or((0, u32::MAX));
        spec = spec.with_age_range(
            args.min_age.unwrap_or(youngest),
            args.max_age.unwrap_or(oldest),
        );
    }
    if let Some(threshold) = args.min_probability {
        spec = spec.with_min_probability(threshold);
    }

    let filtered = dataset.filter(&spec);
    let columns = if args.columns.is_empty() {
        DEFAULT_DISPLAY_COLUMNS.to_vec()
    } else {
        args.columns
    };

    println!(
        "{} of {} patients match",
        format_number(filtered.len() as f64),
        format_number(dataset.view.len() as f64)
    );
    let headers = columns.iter().map(|column| column.header()).collect::<Vec<_>>();
    let rows = filtered
        .iter()
        .take(args.limit)
        .map(|row| columns.iter().map(|column| column.value(row)).collect())
        .collect::<Vec<_>>();
    print_table(&headers, &rows);
    if filtered.len() > args.limit {
        println!("... {} more", filtered.len() - args.limit);
    }

    if let Some(path) = args.export {
        export::export_csv_to_path(&filtered, &columns, &path)?;
        println!("Exported {} patients to {}", filtered.len(), path.display());
    }
    Ok(())
}

fn run_features(dataset: &Dataset, n: NonZeroUsize) {
    let rows = feature_rows(&dataset.importance, n)
        .into_iter()
        .map(|row| {
            vec![
                row.rank.to_string(),
                row.feature,
                format_percentage(row.importance, 1),
                row.definition.to_string(),
            ]
        })
        .collect::<Vec<_>>();
    println!("Top {} most important features", rows.len());
    print_table(&["Rank", "Feature", "Importance", "Definition"], &rows);
}

fn run_performance(
    handle: &DatasetHandle,
    model: Option<String>,
    labels: Option<PredictedLabelSource>,
) -> Result<(), Box<dyn std::error::Error>> {
    // One snapshot, so a concurrent reload cannot mix two datasets in one report.
    let dataset = handle.snapshot();
    let config = handle.config();
    let name = config.model_or_default(model.as_deref());
    let metrics = dataset.metrics(name)?;

    println!("Model: {name}");
    let rows = [
        ("AUC", metrics.auc),
        ("Precision", metrics.precision),
        ("Recall", metrics.recall),
        ("F1 Score", metrics.f1),
        ("PR-AUC", metrics.pr_auc),
        ("Brier Score", metrics.brier),
    ]
    .into_iter()
    .map(|(label, value)| vec![label.to_string(), format!("{value:.3}")])
    .collect::<Vec<_>>();
    print_table(&["Metric", "Value"], &rows);

    let source = labels.unwrap_or(config.confusion_label);
    let counts = dataset.confusion(source)?;
    println!("\nConfusion matrix ({source})");
    let [[tn, fp], [fn_count, tp]] = counts.matrix();
    print_table(
        &["", "Predicted 0", "Predicted 1"],
        &[
            vec!["Actual 0".to_string(), tn.to_string(), fp.to_string()],
            vec!["Actual 1".to_string(), fn_count.to_string(), tp.to_string()],
        ],
    );
    let rate = |value: Option<f64>| value.map_or_else(|| "-".to_string(), |v| format_percentage(v, 1));
    println!(
        "Accuracy {}, precision {}, recall {}",
        rate(counts.accuracy()),
        rate(counts.precision()),
        rate(counts.recall())
    );

    println!("\nModel comparison");
    let comparison = dataset
        .scores
        .iter()
        .map(|record| {
            let mut cells = vec![record.model.clone()];
            cells.extend(
                [record.auc, record.pr_auc, record.precision, record.recall, record.f1, record.brier]
                    .iter()
                    .map(|value| format!("{value:.3}")),
            );
            cells
        })
        .collect::<Vec<_>>();
    print_table(
        &["Model", "AUC", "PR-AUC", "Precision", "Recall", "F1", "Brier"],
        &comparison,
    );
    Ok(())
}

/// Prints left-aligned columns sized to their widest cell.
fn print_table<H: AsRef<str>>(headers: &[H], rows: &[Vec<String>]) {
    let widths = column_widths(headers, rows);
    let header_cells = headers.iter().map(|h| h.as_ref()).collect::<Vec<_>>();
    println!("{}", format_line(&header_cells, &widths));
    println!("{}", widths.iter().map(|w| "-".repeat(*w)).join("  "));
    for row in rows {
        let cells = row.iter().map(String::as_str).collect::<Vec<_>>();
        println!("{}", format_line(&cells, &widths));
    }
    if rows.is_empty() {
        println!("(no rows)");
    }
}

/// Display width of each column in characters, header included.
fn column_widths<H: AsRef<str>>(headers: &[H], rows: &[Vec<String>]) -> Vec<usize> {
    let mut widths = headers
        .iter()
        .map(|h| h.as_ref().chars().count())
        .collect::<Vec<_>>();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }
    widths
}

fn format_line(cells: &[&str], widths: &[usize]) -> String {
    cells
        .iter()
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .join("  ")
        .trim_end()
        .to_string()
}

fn print_version_info() {
    let version = env!("CARGO_PKG_VERSION");
    let release_tag = option_env!("APLUSA_RELEASE_TAG");
    let build_timestamp: u64 = env!("APLUSA_BUILD_TIMESTAMP").parse().unwrap_or(0);

    println!("aplusa {}", version);

    match release_tag {
        Some(tag) => println!("Release: {}", tag),
        None => println!("Release: development build"),
    }

    if build_timestamp > 0 {
        let now = SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        if now > build_timestamp {
            println!("Built: {}", format_refresh_age(now - build_timestamp));
        } else {
            println!("Built: just now");
        }
    }
}
