//! CLI entry point for the log-processing pipeline.

use anyhow::{Result, anyhow};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};
use triage_processing::{
    ClassBalancer, CleaningPipeline, OutlierMethod, PipelineConfig, ReportWriter, RunSummary,
    StageCounts, pipeline::load_cleaned_table, render_run_summary,
};

/// CLI-compatible outlier method enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliOutlierMethod {
    /// Drop rows outside the IQR fences
    Iqr,
    /// Drop rows beyond the z-score threshold
    ZScore,
    /// Keep all rows
    Keep,
}

impl From<CliOutlierMethod> for OutlierMethod {
    fn from(cli: CliOutlierMethod) -> Self {
        match cli {
            CliOutlierMethod::Iqr => OutlierMethod::Iqr,
            CliOutlierMethod::ZScore => OutlierMethod::ZScore,
            CliOutlierMethod::Keep => OutlierMethod::Keep,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Streaming cleaner and class balancer for security-event log exports",
    long_about = "Cleans large, schema-drifting CSV exports in two streaming passes,\n\
                  then rebuilds the class distribution for classifier training.\n\n\
                  EXAMPLES:\n  \
                  # Clean a directory of firewall exports\n  \
                  triage-processing -i Datasets/raw/firewall --log-type firewall\n\n  \
                  # Clean and balance a labeled corpus\n  \
                  triage-processing -i labeled.csv --log-type merged \\\n      \
                      --label-column attack_label --balance\n\n  \
                  # Z-score outliers against corpus statistics, custom seed\n  \
                  triage-processing -i raw/ --log-type proxy \\\n      \
                      --outlier-method z-score --z-threshold 5 --seed 7"
)]
struct Args {
    /// Input CSV files or directories of CSV files
    #[arg(short, long, required = true, num_args = 1..)]
    input: Vec<PathBuf>,

    /// Log type of the inputs; selects the row-filter profile and names the
    /// output file
    #[arg(short = 't', long, default_value = "generic")]
    log_type: String,

    /// Output directory for cleaned and balanced tables
    #[arg(short, long, default_value = "./output")]
    output: PathBuf,

    /// Name of the label column (never dropped, imputed or rescaled)
    #[arg(long, default_value = "attack_label")]
    label_column: String,

    /// Drop columns whose corpus-wide missing ratio exceeds this (0.0 - 1.0)
    #[arg(long, default_value = "0.95")]
    missing_threshold: f64,

    /// Rows per chunk when streaming input files
    #[arg(long, default_value = "100000")]
    chunk_size: usize,

    /// Method for outlier removal
    #[arg(long, value_enum, default_value = "iqr")]
    outlier_method: CliOutlierMethod,

    /// IQR fence multiplier
    #[arg(long, default_value = "1.5")]
    iqr_multiplier: f64,

    /// Z-score cutoff for the z-score method
    #[arg(long, default_value = "10.0")]
    z_threshold: f64,

    /// Balance the class distribution after cleaning
    #[arg(short, long)]
    balance: bool,

    /// Label treated as the majority class (default: most frequent)
    #[arg(long)]
    majority_label: Option<String>,

    /// Balancing target is the largest non-majority count times this
    #[arg(long, default_value = "1.0")]
    balance_multiplier: f64,

    /// Seed for reproducible resampling
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Skip outlier removal and rescaling
    #[arg(long)]
    skip_postprocess: bool,

    /// Write a JSON metadata side-file next to the output tables
    #[arg(short = 'm', long)]
    emit_metadata: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show warnings and the final summary)
    #[arg(short, long)]
    quiet: bool,
}

/// Initialize the tracing subscriber for logging.
fn init_logging(level: &str, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, args.quiet);

    let mut config_builder = PipelineConfig::builder()
        .missing_threshold(args.missing_threshold)
        .chunk_size(args.chunk_size)
        .label_column(&args.label_column)
        .outlier_method(args.outlier_method.into())
        .iqr_multiplier(args.iqr_multiplier)
        .z_score_threshold(args.z_threshold)
        .balance_multiplier(args.balance_multiplier)
        .random_seed(args.seed)
        .output_dir(&args.output);

    if let Some(ref label) = args.majority_label {
        config_builder = config_builder.majority_label(label);
    }

    let config = config_builder.build()?;
    let started = Instant::now();

    let mut summary = RunSummary {
        started_at: Utc::now().to_rfc3339(),
        ..Default::default()
    };

    let pipeline = CleaningPipeline::new(config.clone())
        .map_err(|e| anyhow!("Pipeline setup failed: {}", e))?;

    // Two-pass cleaning
    let outcome = pipeline
        .clean(&args.input, &args.log_type)
        .map_err(|e| anyhow!("Cleaning failed: {}", e))?;

    summary.files_scanned = outcome.first_pass.files_scanned;
    summary.files_skipped = outcome.first_pass.files_skipped;
    summary.corpus_rows = outcome.summary.total_rows();
    summary.columns_seen = outcome.summary.column_names().count();
    summary.columns_dropped = outcome.decision.columns_to_drop.iter().cloned().collect();
    summary.record_stage(
        "clean",
        StageCounts::new(outcome.second_pass.rows_read, outcome.second_pass.rows_written),
    );
    if outcome.first_pass.files_skipped > 0 {
        summary.add_warning(format!(
            "{} input file(s) could not be read and were skipped",
            outcome.first_pass.files_skipped
        ));
    }

    let cleaned_path = pipeline.cleaned_path(&args.log_type);
    info!("Cleaned table written to {}", cleaned_path.display());

    // Post-processing and balancing operate on the materialized table
    let mut encoder = None;
    if !args.skip_postprocess || args.balance {
        let table = load_cleaned_table(&cleaned_path)
            .map_err(|e| anyhow!("Failed to re-read cleaned table: {}", e))?;
        let rows_before = table.height();

        let mut table = table;
        if !args.skip_postprocess {
            let (processed, fitted, outliers_removed) = pipeline
                .postprocess(table, Some(&outcome.summary))
                .map_err(|e| anyhow!("Post-processing failed: {}", e))?;
            summary.record_stage(
                "postprocess",
                StageCounts::new(rows_before, rows_before - outliers_removed),
            );
            encoder = Some(fitted);
            table = processed;
        }

        if args.balance {
            let rows_in = table.height();
            let balancer = ClassBalancer::from_config(&config);
            let (balanced, report) = balancer
                .balance(table, &config.label_column)
                .map_err(|e| anyhow!("Balancing failed: {}", e))?;

            summary.record_stage("balance", StageCounts::new(rows_in, balanced.height()));
            summary.class_distribution_before = Some(report.before);
            summary.class_distribution_after = Some(report.after);

            let balanced_path = args
                .output
                .join(format!("{}_balanced.csv", args.log_type));
            let mut writer = triage_processing::io::IncrementalCsvWriter::create(&balanced_path)?;
            writer.append(&balanced)?;
            info!("Balanced table written to {}", balanced_path.display());
        } else if !args.skip_postprocess {
            // persist the post-processed table in place of the raw cleaning
            let mut writer = triage_processing::io::IncrementalCsvWriter::create(&cleaned_path)?;
            writer.append(&table)?;
        }
    }

    summary.duration_ms = started.elapsed().as_millis() as u64;

    if args.emit_metadata {
        let writer = ReportWriter::new(&args.output);
        writer.write_metadata(
            &args.log_type,
            &summary,
            Some(&outcome.summary),
            encoder.as_ref(),
        )?;
    }

    if outcome.second_pass.chunks_skipped > 0 {
        warn!(
            "{} chunk(s) were skipped after transform errors",
            outcome.second_pass.chunks_skipped
        );
    }

    println!("{}", render_run_summary(&summary));
    Ok(())
}
