//! Custom error types for the log-processing pipeline.
//!
//! This module provides the error hierarchy using `thiserror`. The taxonomy
//! mirrors the escalation policy of the pipeline: configuration problems and
//! whole-corpus emptiness are fatal, file-level problems exclude the file,
//! and row-level problems are absorbed and counted where they occur.

use thiserror::Error;

/// The main error type for the processing pipeline.
#[derive(Error, Debug)]
pub enum ProcessingError {
    /// Invalid configuration; aborts before any pass starts.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The label column is missing from a table that must carry it.
    #[error("Label column '{0}' not present in the data")]
    MissingLabelColumn(String),

    /// A required column is absent from an entire file.
    #[error("File '{file}' is missing required column '{column}'")]
    SchemaMismatch { file: String, column: String },

    /// Column was not found in the working table.
    #[error("Column '{0}' not found in table")]
    ColumnNotFound(String),

    /// A stage produced zero rows where data is required.
    #[error("Stage '{stage}' produced no rows: {reason}")]
    EmptyResult { stage: String, reason: String },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV decoding error wrapper.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ProcessingError>,
    },
}

impl ProcessingError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ProcessingError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error must abort the whole run.
    ///
    /// Fatal errors are configuration problems (nothing has been written yet)
    /// and empty stage results (continuing would leave a corrupt output).
    /// Everything else is absorbed at the file or chunk level.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::InvalidConfig(_) | Self::EmptyResult { .. } | Self::MissingLabelColumn(_) => true,
            Self::WithContext { source, .. } => source.is_fatal(),
            _ => false,
        }
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, ProcessingError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| ProcessingError::Polars(e).with_context(context))
    }
}
