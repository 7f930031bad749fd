//! Second pass: applying cleaning decisions and writing output.
//!
//! Re-walks the same files in the same order as the first pass and, chunk by
//! chunk: applies the source's row predicates, drops the decided columns,
//! tags rows with the log type, casts and imputes numeric columns, and
//! appends to the output table. Every written chunk carries the same column
//! set in the same order (chunks missing a surviving column are padded),
//! and the header is written exactly once.

use std::path::PathBuf;

use polars::prelude::*;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::filters::LogTypeProfile;
use crate::io::{ChunkedCsvReader, IncrementalCsvWriter};
use crate::pipeline::decisions::CleaningDecision;
use crate::stats::CorpusSummary;

/// Name of the source tag column added to every output row.
pub const LOG_TYPE_COLUMN: &str = "log_type";

/// Outcome of the second pass.
#[derive(Debug)]
pub struct SecondPassOutcome {
    pub rows_read: usize,
    /// Rows removed by the log type's predicates.
    pub rows_filtered: usize,
    pub rows_written: usize,
    pub chunks_skipped: usize,
    pub output_path: PathBuf,
}

/// Applies one [`CleaningDecision`] to a stream of chunks.
pub struct Pass2Transformer<'a> {
    decision: &'a CleaningDecision,
    summary: &'a CorpusSummary,
    profile: &'a LogTypeProfile,
    /// The label column passes through verbatim: never cast, never imputed.
    label_column: String,
    /// Fixed output column order: the log-type tag first, then every
    /// surviving column in statistics order.
    output_columns: Vec<String>,
}

static_assertions::assert_impl_all!(SecondPassOutcome: Send);

impl<'a> Pass2Transformer<'a> {
    pub fn new(
        decision: &'a CleaningDecision,
        summary: &'a CorpusSummary,
        profile: &'a LogTypeProfile,
        label_column: impl Into<String>,
    ) -> Self {
        let output_columns: Vec<String> = decision
            .surviving_columns(summary)
            .into_iter()
            .filter(|name| *name != LOG_TYPE_COLUMN)
            .map(str::to_string)
            .collect();

        Self {
            decision,
            summary,
            profile,
            label_column: label_column.into(),
            output_columns,
        }
    }

    /// The column set of every output chunk, tag column included.
    pub fn output_schema(&self) -> Vec<String> {
        let mut schema = Vec::with_capacity(self.output_columns.len() + 1);
        schema.push(LOG_TYPE_COLUMN.to_string());
        schema.extend(self.output_columns.iter().cloned());
        schema
    }

    /// Transform one chunk into its output form.
    ///
    /// Returns the filtered-and-aligned chunk together with the number of
    /// rows the predicates removed.
    pub fn transform_chunk(&self, chunk: &DataFrame) -> Result<(DataFrame, usize)> {
        let mask = self.profile.keep_mask(chunk)?;
        let kept = chunk.filter(&mask)?;
        let removed = chunk.height() - kept.height();
        let height = kept.height();

        let mut columns: Vec<Column> =
            Vec::with_capacity(self.output_columns.len() + 1);

        let tag = Series::new(
            LOG_TYPE_COLUMN.into(),
            vec![self.profile.name.clone(); height],
        );
        columns.push(tag.into_column());

        for name in &self.output_columns {
            let is_numeric = *name != self.label_column
                && self
                    .summary
                    .get(name)
                    .map(|col| col.is_numeric())
                    .unwrap_or(false);

            let series = if is_numeric {
                self.numeric_output_column(&kept, name, height)?
            } else {
                self.categorical_output_column(&kept, name, height)?
            };
            columns.push(series.into_column());
        }

        Ok((DataFrame::new(columns)?, removed))
    }

    /// Cast a surviving numeric column and impute its missing values with
    /// the corpus median. Conversion failures become missing first, so they
    /// are imputed too. An absent column is synthesized entirely from the
    /// impute value.
    fn numeric_output_column(
        &self,
        chunk: &DataFrame,
        name: &str,
        height: usize,
    ) -> Result<Series> {
        let impute = self.decision.impute_values.get(name).copied();

        let Ok(col) = chunk.column(name) else {
            let fill = impute.unwrap_or(f64::NAN);
            return Ok(Series::new(name.into(), vec![fill; height]));
        };

        let casted = col.as_materialized_series().cast(&DataType::Float64)?;
        let ca = casted.f64()?;
        let filled = match impute {
            Some(value) => ca.apply(|v| v.or(Some(value))),
            None => ca.clone(),
        };
        Ok(filled.into_series().with_name(name.into()))
    }

    /// Pass a categorical column through, filling missing values with the
    /// corpus mode when one is known. The label column never appears in the
    /// mode map, so it passes through untouched.
    fn categorical_output_column(
        &self,
        chunk: &DataFrame,
        name: &str,
        height: usize,
    ) -> Result<Series> {
        let mode = self.decision.mode_values.get(name).cloned();

        let Ok(col) = chunk.column(name) else {
            let values: Vec<Option<String>> = vec![mode.clone(); height];
            return Ok(Series::new(name.into(), values));
        };

        let casted = col.as_materialized_series().cast(&DataType::String)?;
        let series = match mode {
            Some(value) => {
                let ca = casted.str()?;
                let filled: Vec<Option<String>> = ca
                    .into_iter()
                    .map(|v| v.map(str::to_string).or_else(|| Some(value.clone())))
                    .collect();
                Series::new(name.into(), filled)
            }
            None => casted.with_name(name.into()),
        };
        Ok(series)
    }
}

/// Run the transformation pass over `files`, appending to `output_path`.
///
/// `files` must be the same list, in the same order, that the first pass
/// scanned. A chunk that fails to transform is logged and skipped; the pass
/// continues with the remaining chunks.
pub fn run_second_pass(
    files: &[PathBuf],
    chunk_size: usize,
    transformer: &Pass2Transformer<'_>,
    output_path: impl Into<PathBuf>,
) -> Result<SecondPassOutcome> {
    let output_path = output_path.into();
    info!(
        "Starting second pass: applying transformations into {}",
        output_path.display()
    );

    let mut writer = IncrementalCsvWriter::create(&output_path)?;
    let mut rows_read = 0usize;
    let mut rows_filtered = 0usize;
    let mut chunks_skipped = 0usize;

    for file in files {
        let mut reader = match ChunkedCsvReader::open(file, chunk_size) {
            Ok(reader) => reader,
            Err(e) => {
                warn!("Skipping unreadable file {}: {}", file.display(), e);
                continue;
            }
        };

        loop {
            let chunk = match reader.next_chunk() {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    warn!("Error reading chunk from {}: {}", file.display(), e);
                    break;
                }
            };

            rows_read += chunk.height();
            match transformer.transform_chunk(&chunk) {
                Ok((transformed, removed)) => {
                    rows_filtered += removed;
                    if transformed.height() == 0 {
                        debug!("Chunk empty after filtering, skipping write");
                        continue;
                    }
                    writer.append(&transformed)?;
                }
                Err(e) => {
                    warn!(
                        "Skipping chunk from {} after transform error: {}",
                        file.display(),
                        e
                    );
                    chunks_skipped += 1;
                }
            }
        }
    }

    let rows_written = writer.rows_written();
    info!(
        "Second pass completed: {} rows read, {} filtered, {} written",
        rows_read, rows_filtered, rows_written
    );

    Ok(SecondPassOutcome {
        rows_read,
        rows_filtered,
        rows_written,
        chunks_skipped,
        output_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::scanner::run_first_pass;
    use crate::stats::CorpusStatistics;
    use pretty_assertions::assert_eq;

    fn finalize_chunks(chunks: &[DataFrame]) -> CorpusSummary {
        let mut stats = CorpusStatistics::new(1000);
        for chunk in chunks {
            stats.merge_chunk(chunk).unwrap();
        }
        stats.finalize()
    }

    fn passthrough() -> LogTypeProfile {
        LogTypeProfile::passthrough("firewall")
    }

    #[test]
    fn test_output_schema_is_stable_across_chunks() {
        let chunk1 = df![
            "b" => ["1", "2"],
            "a" => ["x", "y"],
        ]
        .unwrap();
        let chunk2 = df![
            "a" => ["z"],
        ]
        .unwrap();

        let summary = finalize_chunks(&[chunk1.clone(), chunk2.clone()]);
        let decision = CleaningDecision::derive(&summary, 0.95, "attack_label");
        let profile = passthrough();
        let transformer = Pass2Transformer::new(&decision, &summary, &profile, "attack_label");

        let (out1, _) = transformer.transform_chunk(&chunk1).unwrap();
        let (out2, _) = transformer.transform_chunk(&chunk2).unwrap();

        let names1: Vec<String> = out1
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        let names2: Vec<String> = out2
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(names1, names2);
        assert_eq!(names1, transformer.output_schema());
        assert_eq!(names1[0], LOG_TYPE_COLUMN);
    }

    #[test]
    fn test_dropped_columns_are_absent_from_output() {
        let chunk = df![
            "constant" => ["k", "k", "k"],
            "num" => ["1", "2", "3"],
        ]
        .unwrap();

        let summary = finalize_chunks(std::slice::from_ref(&chunk));
        let decision = CleaningDecision::derive(&summary, 0.95, "attack_label");
        let profile = passthrough();
        let transformer = Pass2Transformer::new(&decision, &summary, &profile, "attack_label");

        let (out, _) = transformer.transform_chunk(&chunk).unwrap();
        assert!(out.column("constant").is_err());
        assert!(out.column("num").is_ok());
    }

    #[test]
    fn test_numeric_imputation_uses_corpus_median() {
        let chunk1 = df!["num" => [Some("1"), Some("2"), Some("3")], "pad" => [Some("a"), Some("b"), Some("c")]].unwrap();
        let chunk2 = df!["num" => [None::<&str>, Some("5")], "pad" => [Some("d"), Some("e")]].unwrap();

        let summary = finalize_chunks(&[chunk1, chunk2.clone()]);
        let decision = CleaningDecision::derive(&summary, 0.95, "attack_label");
        let profile = passthrough();
        let transformer = Pass2Transformer::new(&decision, &summary, &profile, "attack_label");

        let (out, _) = transformer.transform_chunk(&chunk2).unwrap();
        let num = out.column("num").unwrap();
        assert_eq!(num.null_count(), 0);

        let imputed = num.f64().unwrap().get(0).unwrap();
        assert!((imputed - decision.impute_values["num"]).abs() < 1e-9);
    }

    #[test]
    fn test_row_predicates_are_applied() {
        let chunk = df![
            "type" => ["threat", "traffic", "threat"],
            "num" => ["1", "2", "3"],
        ]
        .unwrap();

        let summary = finalize_chunks(std::slice::from_ref(&chunk));
        let decision = CleaningDecision::derive(&summary, 0.95, "attack_label");
        let profile = crate::filters::default_profiles().remove("firewall").unwrap();
        let transformer = Pass2Transformer::new(&decision, &summary, &profile, "attack_label");

        let (out, removed) = transformer.transform_chunk(&chunk).unwrap();
        assert_eq!(out.height(), 2);
        assert_eq!(removed, 1);
    }

    #[test]
    fn test_tag_column_carries_profile_name() {
        let chunk = df!["num" => ["1", "2"], "other" => ["a", "b"]].unwrap();

        let summary = finalize_chunks(std::slice::from_ref(&chunk));
        let decision = CleaningDecision::derive(&summary, 0.95, "attack_label");
        let profile = LogTypeProfile::passthrough("proxy");
        let transformer = Pass2Transformer::new(&decision, &summary, &profile, "attack_label");

        let (out, _) = transformer.transform_chunk(&chunk).unwrap();
        let tag = out.column(LOG_TYPE_COLUMN).unwrap();
        let first = tag.str().unwrap().get(0).unwrap();
        assert_eq!(first, "proxy");
    }

    #[test]
    fn test_second_pass_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.csv");
        std::fs::write(&input, "num,cat\n1,a\n2,b\n3,a\n4,b\n").unwrap();
        let files = vec![input];

        let outcome = run_first_pass(&files, 2, 1000).unwrap();
        let decision = CleaningDecision::derive(&outcome.summary, 0.95, "attack_label");
        let profile = passthrough();
        let transformer = Pass2Transformer::new(&decision, &outcome.summary, &profile, "attack_label");

        let output = dir.path().join("out.csv");
        let result = run_second_pass(&files, 2, &transformer, &output).unwrap();
        assert_eq!(result.rows_written, 4);

        let content = std::fs::read_to_string(&output).unwrap();
        let headers = content
            .lines()
            .filter(|l| l.starts_with("log_type,"))
            .count();
        assert_eq!(headers, 1);
    }
}
