//! Configuration types for the log-processing pipeline.
//!
//! This module provides configuration options using the builder pattern
//! for flexible and ergonomic pipeline setup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::filters::{self, LogTypeProfile};

/// Method for removing statistical outliers from numeric columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OutlierMethod {
    /// Drop rows outside `[Q1 - k*IQR, Q3 + k*IQR]`, quartiles computed
    /// from the working table.
    #[default]
    Iqr,
    /// Drop rows whose z-score against the corpus-wide mean/std exceeds
    /// the configured threshold.
    ZScore,
    /// Keep all rows (no outlier handling).
    Keep,
}

/// Configuration for the processing pipeline.
///
/// Use [`PipelineConfig::builder()`] to create a new configuration
/// with fluent API.
///
/// # Example
///
/// ```rust,ignore
/// use triage_processing::config::{OutlierMethod, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .missing_threshold(0.9)
///     .chunk_size(50_000)
///     .outlier_method(OutlierMethod::Iqr)
///     .random_seed(7)
///     .build()?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Threshold for dropping columns with too many missing values (0.0 - 1.0).
    /// Columns whose corpus-wide missing ratio exceeds this are dropped.
    /// Default: 0.95
    pub missing_threshold: f64,

    /// Number of rows per chunk when scanning input files.
    /// Default: 100_000
    pub chunk_size: usize,

    /// Exact distinct-value tracking stops past this many values per column;
    /// beyond it the column reports a saturated "high cardinality" count.
    /// Default: 10_000
    pub distinct_cap: usize,

    /// Name of the label column. Never dropped, imputed, rescaled or encoded.
    /// Default: "attack_label"
    pub label_column: String,

    /// Method for outlier removal in numeric columns.
    /// Default: Iqr
    pub outlier_method: OutlierMethod,

    /// Multiplier `k` for the IQR fences.
    /// Default: 1.5
    pub iqr_multiplier: f64,

    /// Z-score cutoff when `outlier_method` is `ZScore`.
    /// Default: 10.0
    pub z_score_threshold: f64,

    /// The class treated as "majority" by the balancer. When `None`, the
    /// most frequent label is used.
    /// Default: None
    pub majority_label: Option<String>,

    /// The balancing target is the largest non-majority class count times
    /// this multiplier.
    /// Default: 1.0
    pub balance_multiplier: f64,

    /// Seed for all random sampling, making resampling reproducible.
    /// Default: 42
    pub random_seed: u64,

    /// Per-log-type profiles: row predicates and the timestamp column.
    /// Defaults to the built-in firewall/proxy/xdr/mail profiles.
    pub log_types: HashMap<String, LogTypeProfile>,

    /// Output directory for cleaned and balanced tables.
    /// Default: "output"
    pub output_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            missing_threshold: 0.95,
            chunk_size: 100_000,
            distinct_cap: 10_000,
            label_column: "attack_label".to_string(),
            outlier_method: OutlierMethod::default(),
            iqr_multiplier: 1.5,
            z_score_threshold: 10.0,
            majority_label: None,
            balance_multiplier: 1.0,
            random_seed: 42,
            log_types: filters::default_profiles(),
            output_dir: PathBuf::from("output"),
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !(0.0..=1.0).contains(&self.missing_threshold) {
            return Err(ConfigValidationError::InvalidThreshold {
                field: "missing_threshold".to_string(),
                value: self.missing_threshold,
            });
        }

        if self.chunk_size == 0 {
            return Err(ConfigValidationError::InvalidChunkSize(self.chunk_size));
        }

        if self.distinct_cap < 2 {
            return Err(ConfigValidationError::InvalidDistinctCap(self.distinct_cap));
        }

        if self.label_column.trim().is_empty() {
            return Err(ConfigValidationError::EmptyLabelColumn);
        }

        if self.iqr_multiplier <= 0.0 {
            return Err(ConfigValidationError::InvalidMultiplier {
                field: "iqr_multiplier".to_string(),
                value: self.iqr_multiplier,
            });
        }

        if self.z_score_threshold <= 0.0 {
            return Err(ConfigValidationError::InvalidMultiplier {
                field: "z_score_threshold".to_string(),
                value: self.z_score_threshold,
            });
        }

        if self.balance_multiplier <= 0.0 {
            return Err(ConfigValidationError::InvalidMultiplier {
                field: "balance_multiplier".to_string(),
                value: self.balance_multiplier,
            });
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid threshold for '{field}': {value} (must be between 0.0 and 1.0)")]
    InvalidThreshold { field: String, value: f64 },

    #[error("Invalid chunk size: {0} (must be at least 1)")]
    InvalidChunkSize(usize),

    #[error("Invalid distinct-value cap: {0} (must be at least 2)")]
    InvalidDistinctCap(usize),

    #[error("Label column name must not be empty")]
    EmptyLabelColumn,

    #[error("Invalid value for '{field}': {value} (must be positive)")]
    InvalidMultiplier { field: String, value: f64 },
}

/// Builder for [`PipelineConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    missing_threshold: Option<f64>,
    chunk_size: Option<usize>,
    distinct_cap: Option<usize>,
    label_column: Option<String>,
    outlier_method: Option<OutlierMethod>,
    iqr_multiplier: Option<f64>,
    z_score_threshold: Option<f64>,
    majority_label: Option<String>,
    balance_multiplier: Option<f64>,
    random_seed: Option<u64>,
    log_types: Option<HashMap<String, LogTypeProfile>>,
    output_dir: Option<PathBuf>,
}

impl PipelineConfigBuilder {
    /// Set the corpus-wide missing ratio above which a column is dropped.
    ///
    /// # Arguments
    /// * `threshold` - Value between 0.0 and 1.0 (e.g., 0.95 = 95%)
    pub fn missing_threshold(mut self, threshold: f64) -> Self {
        self.missing_threshold = Some(threshold);
        self
    }

    /// Set the number of rows per scanned chunk.
    pub fn chunk_size(mut self, rows: usize) -> Self {
        self.chunk_size = Some(rows);
        self
    }

    /// Set the cap on exact distinct-value tracking per column.
    pub fn distinct_cap(mut self, cap: usize) -> Self {
        self.distinct_cap = Some(cap);
        self
    }

    /// Set the name of the label column.
    pub fn label_column(mut self, name: impl Into<String>) -> Self {
        self.label_column = Some(name.into());
        self
    }

    /// Set the outlier removal method.
    pub fn outlier_method(mut self, method: OutlierMethod) -> Self {
        self.outlier_method = Some(method);
        self
    }

    /// Set the IQR fence multiplier.
    pub fn iqr_multiplier(mut self, k: f64) -> Self {
        self.iqr_multiplier = Some(k);
        self
    }

    /// Set the z-score cutoff.
    pub fn z_score_threshold(mut self, threshold: f64) -> Self {
        self.z_score_threshold = Some(threshold);
        self
    }

    /// Set the label treated as the majority class by the balancer.
    pub fn majority_label(mut self, label: impl Into<String>) -> Self {
        self.majority_label = Some(label.into());
        self
    }

    /// Set the multiplier applied to the largest non-majority class count
    /// when computing the balancing target.
    pub fn balance_multiplier(mut self, multiplier: f64) -> Self {
        self.balance_multiplier = Some(multiplier);
        self
    }

    /// Set the seed used for all resampling.
    pub fn random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    /// Replace the log-type profile registry.
    pub fn log_types(mut self, profiles: HashMap<String, LogTypeProfile>) -> Self {
        self.log_types = Some(profiles);
        self
    }

    /// Set the output directory for generated tables.
    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(path.into());
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `PipelineConfig` or an error if validation fails.
    pub fn build(self) -> Result<PipelineConfig, ConfigValidationError> {
        let config = PipelineConfig {
            missing_threshold: self.missing_threshold.unwrap_or(0.95),
            chunk_size: self.chunk_size.unwrap_or(100_000),
            distinct_cap: self.distinct_cap.unwrap_or(10_000),
            label_column: self
                .label_column
                .unwrap_or_else(|| "attack_label".to_string()),
            outlier_method: self.outlier_method.unwrap_or_default(),
            iqr_multiplier: self.iqr_multiplier.unwrap_or(1.5),
            z_score_threshold: self.z_score_threshold.unwrap_or(10.0),
            majority_label: self.majority_label,
            balance_multiplier: self.balance_multiplier.unwrap_or(1.0),
            random_seed: self.random_seed.unwrap_or(42),
            log_types: self.log_types.unwrap_or_else(filters::default_profiles),
            output_dir: self.output_dir.unwrap_or_else(|| PathBuf::from("output")),
        };

        config.validate()?;
        Ok(config)
    }
}
