//! Pipeline module.
//!
//! The two-pass cleaning controller and its stages: the read-only statistics
//! pass, the pure decision step, the transforming pass, and the outlier /
//! rescaling stage applied to the materialized result.

mod decisions;
mod scanner;
mod transform;
pub mod outliers;

pub use decisions::CleaningDecision;
pub use outliers::OutlierStage;
pub use scanner::{FirstPassOutcome, run_first_pass};
pub use transform::{LOG_TYPE_COLUMN, Pass2Transformer, SecondPassOutcome, run_second_pass};

use std::path::{Path, PathBuf};

use polars::prelude::DataFrame;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::encode::CategoricalEncoder;
use crate::error::{ProcessingError, Result};
use crate::filters::LogTypeProfile;
use crate::io;
use crate::stats::CorpusSummary;

/// Result of cleaning one log type's corpus.
#[derive(Debug)]
pub struct CleaningOutcome {
    /// Finalized first-pass statistics.
    pub summary: CorpusSummary,
    /// The decision set applied to every chunk of the second pass.
    pub decision: CleaningDecision,
    pub first_pass: FirstPassOutcome,
    pub second_pass: SecondPassOutcome,
}

/// Two-pass streaming cleaner for one log type.
///
/// Pass 1 must fully complete and finalize before pass 2 begins; the second
/// pass's correctness depends on the finalized global decisions, so the two
/// passes are strictly sequential.
pub struct CleaningPipeline {
    config: PipelineConfig,
}

static_assertions::assert_impl_all!(CleaningPipeline: Send);

impl CleaningPipeline {
    /// Create a pipeline with a validated configuration.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| ProcessingError::InvalidConfig(e.to_string()))?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Clean the given inputs as `log_type`, writing
    /// `<output_dir>/<log_type>_cleaned.csv`.
    pub fn clean(&self, inputs: &[PathBuf], log_type: &str) -> Result<CleaningOutcome> {
        let profile = self.profile_for(log_type);

        let files = io::collect_input_files(inputs)?;
        if files.is_empty() {
            return Err(ProcessingError::EmptyResult {
                stage: "scan".to_string(),
                reason: "no input CSV files found".to_string(),
            });
        }

        let first_pass =
            run_first_pass(&files, self.config.chunk_size, self.config.distinct_cap)?;
        if first_pass.summary.total_rows() == 0 {
            return Err(ProcessingError::EmptyResult {
                stage: "scan".to_string(),
                reason: "input files contained no rows".to_string(),
            });
        }

        if let Some(time_column) = &profile.time_column
            && first_pass.summary.get(time_column).is_none()
        {
            warn!(
                "Timestamp column '{}' for log type '{}' was not seen in the corpus",
                time_column, log_type
            );
        }

        let decision = CleaningDecision::derive(
            &first_pass.summary,
            self.config.missing_threshold,
            &self.config.label_column,
        );

        let transformer = Pass2Transformer::new(
            &decision,
            &first_pass.summary,
            &profile,
            &self.config.label_column,
        );
        let output_path = self.cleaned_path(log_type);
        let second_pass = run_second_pass(
            &files,
            self.config.chunk_size,
            &transformer,
            &output_path,
        )?;

        if second_pass.rows_written == 0 {
            return Err(ProcessingError::EmptyResult {
                stage: "transform".to_string(),
                reason: "no rows survived filtering".to_string(),
            });
        }

        Ok(CleaningOutcome {
            summary: first_pass.summary.clone(),
            decision,
            first_pass,
            second_pass,
        })
    }

    /// Outlier removal, rescaling and categorical encoding on the
    /// materialized cleaned table.
    ///
    /// `summary` supplies corpus-wide mean/std for the z-score variant.
    pub fn postprocess(
        &self,
        df: DataFrame,
        summary: Option<&CorpusSummary>,
    ) -> Result<(DataFrame, CategoricalEncoder, usize)> {
        let stage = OutlierStage::new(
            self.config.outlier_method,
            self.config.iqr_multiplier,
            self.config.z_score_threshold,
        );

        let (df, removed) =
            stage.remove_outliers(df, &self.config.label_column, summary)?;
        let df = stage.rescale(df, &self.config.label_column)?;
        let (df, encoder) = CategoricalEncoder::fit_transform(df, &self.config.label_column)?;

        Ok((df, encoder, removed))
    }

    /// Output path of the cleaned table for a log type.
    pub fn cleaned_path(&self, log_type: &str) -> PathBuf {
        self.config
            .output_dir
            .join(format!("{log_type}_cleaned.csv"))
    }

    fn profile_for(&self, log_type: &str) -> LogTypeProfile {
        match self.config.log_types.get(log_type) {
            Some(profile) => profile.clone(),
            None => {
                warn!(
                    "No profile configured for log type '{}'; keeping all rows",
                    log_type
                );
                LogTypeProfile::passthrough(log_type)
            }
        }
    }
}

/// Re-read a cleaned table written by [`CleaningPipeline::clean`].
pub fn load_cleaned_table(path: impl AsRef<Path>) -> Result<DataFrame> {
    let df = io::read_table(path.as_ref())?;
    info!(
        "Loaded cleaned table {} ({} rows, {} columns)",
        path.as_ref().display(),
        df.height(),
        df.width()
    );
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutlierMethod;
    use polars::prelude::*;
    use pretty_assertions::assert_eq;

    fn config_in(dir: &tempfile::TempDir) -> PipelineConfig {
        PipelineConfig::builder()
            .chunk_size(2)
            .output_dir(dir.path().join("out"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_clean_writes_tagged_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("fw.csv");
        std::fs::write(
            &input,
            "type,bytes,constant\nthreat,10,k\ntraffic,20,k\nthreat,30,k\n",
        )
        .unwrap();

        let pipeline = CleaningPipeline::new(config_in(&dir)).unwrap();
        let outcome = pipeline.clean(&[input], "firewall").unwrap();

        // only the two threat rows survive the firewall predicate
        assert_eq!(outcome.second_pass.rows_written, 2);
        assert!(outcome.decision.columns_to_drop.contains("constant"));

        let cleaned = load_cleaned_table(pipeline.cleaned_path("firewall")).unwrap();
        assert_eq!(cleaned.height(), 2);
        assert!(cleaned.column("log_type").is_ok());
        assert!(cleaned.column("constant").is_err());
    }

    #[test]
    fn test_round_trip_reports_zero_dropped_columns() {
        // clean once, then re-scan the cleaned output: nothing left to drop
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("gen.csv");
        std::fs::write(&input, "a,b\n1,x\n2,y\n3,z\n4,x\n").unwrap();

        let pipeline = CleaningPipeline::new(config_in(&dir)).unwrap();
        let outcome = pipeline.clean(&[input], "generic").unwrap();
        assert!(outcome.decision.columns_to_drop.is_empty());

        // the tag became the label column, so it is excluded from dropping
        let cleaned_path = pipeline.cleaned_path("generic");
        let rescan = run_first_pass(&[cleaned_path], 2, 1000).unwrap();
        let redecision = CleaningDecision::derive(&rescan.summary, 0.95, LOG_TYPE_COLUMN);
        assert!(redecision.columns_to_drop.is_empty());
    }

    #[test]
    fn test_empty_inputs_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = CleaningPipeline::new(config_in(&dir)).unwrap();

        let err = pipeline
            .clean(&[dir.path().to_path_buf()], "firewall")
            .unwrap_err();
        assert!(matches!(err, ProcessingError::EmptyResult { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_all_rows_filtered_is_fatal_and_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("fw.csv");
        std::fs::write(&input, "type,bytes\ntraffic,10\ntraffic,20\n").unwrap();

        let pipeline = CleaningPipeline::new(config_in(&dir)).unwrap();
        let err = pipeline.clean(&[input], "firewall").unwrap_err();
        assert!(matches!(err, ProcessingError::EmptyResult { .. }));
        assert!(!pipeline.cleaned_path("firewall").exists());
    }

    #[test]
    fn test_postprocess_encodes_and_rescales() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::builder()
            .output_dir(dir.path())
            .outlier_method(OutlierMethod::Keep)
            .build()
            .unwrap();
        let pipeline = CleaningPipeline::new(config).unwrap();

        let df = df![
            "bytes" => [0.0, 50.0, 100.0],
            "proto" => ["tcp", "udp", "tcp"],
            "attack_label" => ["0", "1", "0"],
        ]
        .unwrap();

        let (out, encoder, removed) = pipeline.postprocess(df, None).unwrap();
        assert_eq!(removed, 0);
        assert!(encoder.mappings().contains_key("proto"));

        let bytes: Vec<f64> = out
            .column("bytes")
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .map(|v| v.unwrap())
            .collect();
        assert_eq!(bytes, vec![0.0, 0.5, 1.0]);
    }
}
