//! Security-log preprocessing pipeline.
//!
//! A streaming, two-pass cleaner and class balancer for large security-event
//! CSV exports (firewall, proxy, mail, XDR), built with Rust and Polars.
//!
//! # Overview
//!
//! Input corpora are too large to hold comfortably in memory and arrive as
//! many files with drifting schemas, so the pipeline works in two strictly
//! sequential passes:
//!
//! - **Pass 1** streams every file in bounded chunks and feeds an online
//!   statistics engine: per-column missing ratio, mean, standard deviation,
//!   a running median estimate, and capped-cardinality distinct counts.
//! - A **cleaning decision** is derived once from the finalized statistics:
//!   constant columns and columns beyond the missing-ratio threshold are
//!   dropped, and each surviving numeric column gets the corpus median as
//!   its imputation value.
//! - **Pass 2** re-streams the same files, applies the decision to every
//!   chunk together with the source's row predicates, tags rows with their
//!   log type, and appends to the output with a single header.
//! - The materialized result can then go through outlier removal, min-max
//!   rescaling, categorical encoding, and label-aware **class balancing**
//!   (majority undersampling plus SMOTE-style minority synthesis).
//!
//! # Quick start
//!
//! ```rust,ignore
//! use triage_processing::{ClassBalancer, CleaningPipeline, PipelineConfig};
//!
//! let config = PipelineConfig::builder()
//!     .missing_threshold(0.95)
//!     .chunk_size(100_000)
//!     .output_dir("output")
//!     .build()?;
//!
//! let pipeline = CleaningPipeline::new(config.clone())?;
//! let outcome = pipeline.clean(&[raw_dir], "firewall")?;
//!
//! let cleaned = triage_processing::pipeline::load_cleaned_table(
//!     pipeline.cleaned_path("firewall"),
//! )?;
//! let (table, encoder, _) = pipeline.postprocess(cleaned, Some(&outcome.summary))?;
//!
//! let balancer = ClassBalancer::from_config(&config);
//! let (balanced, report) = balancer.balance(table, "attack_label")?;
//! ```
//!
//! # Error policy
//!
//! Configuration problems and empty stage results abort the run; a file that
//! cannot be read is logged and excluded; unreadable rows and chunks are
//! absorbed and counted. See [`error::ProcessingError`].

pub mod balance;
pub mod config;
pub mod encode;
pub mod error;
pub mod filters;
pub mod io;
pub mod pipeline;
pub mod report;
pub mod stats;
pub mod types;

// Re-exports for convenient access
pub use balance::{BalanceReport, ClassBalancer, SmoteSampler};
pub use config::{ConfigValidationError, OutlierMethod, PipelineConfig, PipelineConfigBuilder};
pub use encode::CategoricalEncoder;
pub use error::{ProcessingError, Result as ProcessingResult, ResultExt};
pub use filters::{LogTypeProfile, RowFilter, default_profiles};
pub use pipeline::{
    CleaningDecision, CleaningOutcome, CleaningPipeline, LOG_TYPE_COLUMN, OutlierStage,
};
pub use report::{ReportWriter, render_run_summary};
pub use stats::{ColumnAccumulator, ColumnKind, ColumnSummary, CorpusStatistics, CorpusSummary};
pub use types::{ClassDistribution, RunSummary, StageCounts};
