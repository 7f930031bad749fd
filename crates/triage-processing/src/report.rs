//! Run metadata and summaries.
//!
//! Each pipeline run can emit a JSON side-file next to its output tables:
//! row counts per stage, the dropped columns, per-column summary statistics,
//! class distributions before and after balancing, and the categorical code
//! maps. The same summary renders as the human-readable block the CLI
//! prints at the end of a run.

use chrono::Utc;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::encode::CategoricalEncoder;
use crate::error::Result;
use crate::stats::{ColumnSummary, CorpusSummary};
use crate::types::RunSummary;

/// Serialized shape of the metadata side-file.
#[derive(Serialize)]
struct Metadata<'a> {
    generated_at: String,
    run: &'a RunSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    columns: Option<Vec<&'a ColumnSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    encodings: Option<&'a CategoricalEncoder>,
}

/// Writes metadata side-files into the output directory.
pub struct ReportWriter {
    output_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Write `<name>_metadata.json` and return its path.
    pub fn write_metadata(
        &self,
        name: &str,
        run: &RunSummary,
        columns: Option<&CorpusSummary>,
        encodings: Option<&CategoricalEncoder>,
    ) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(format!("{name}_metadata.json"));

        let metadata = Metadata {
            generated_at: Utc::now().to_rfc3339(),
            run,
            columns: columns.map(|summary| summary.iter().collect()),
            encodings,
        };

        let json = serde_json::to_string_pretty(&metadata)?;
        std::fs::write(&path, json)?;
        info!("Metadata written to {}", path.display());
        Ok(path)
    }
}

/// Render the end-of-run block printed by the CLI.
pub fn render_run_summary(summary: &RunSummary) -> String {
    let mut out = String::new();
    let rule = "=".repeat(80);

    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "PROCESSING COMPLETE");
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "Duration: {}ms", summary.duration_ms);
    let _ = writeln!(
        out,
        "Files: {} scanned, {} skipped",
        summary.files_scanned, summary.files_skipped
    );
    let _ = writeln!(
        out,
        "Corpus: {} rows, {} columns",
        summary.corpus_rows, summary.columns_seen
    );

    if summary.columns_dropped.is_empty() {
        let _ = writeln!(out, "Columns dropped: none");
    } else {
        let _ = writeln!(
            out,
            "Columns dropped ({}): {:?}",
            summary.columns_dropped.len(),
            summary.columns_dropped
        );
    }

    for (stage, counts) in &summary.stages {
        let _ = writeln!(
            out,
            "  {stage}: {} -> {} rows ({} dropped)",
            counts.rows_in,
            counts.rows_out,
            counts.rows_dropped()
        );
    }

    if let Some(dist) = &summary.class_distribution_after {
        let _ = writeln!(out, "Final class distribution:");
        for (label, count) in dist.iter() {
            let _ = writeln!(out, "  {label}: {count}");
        }
    }

    for warning in &summary.warnings {
        let _ = writeln!(out, "  ! {warning}");
    }

    let _ = writeln!(out, "{rule}");
    out
}
