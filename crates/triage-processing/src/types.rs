//! Shared result types for pipeline stages.

use serde::Serialize;
use std::collections::BTreeMap;

/// Per-label row counts of a labeled table.
///
/// Recomputed whenever the table changes materially (after the second pass,
/// after balancing); never updated in place.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ClassDistribution(BTreeMap<String, usize>);

impl ClassDistribution {
    /// Count one label value per row.
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Self {
        let mut counts = BTreeMap::new();
        for label in labels {
            *counts.entry(label.as_ref().to_string()).or_insert(0) += 1;
        }
        Self(counts)
    }

    pub fn get(&self, label: &str) -> usize {
        self.0.get(label).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    pub fn class_count(&self) -> usize {
        self.0.len()
    }

    /// The most frequent label; ties resolve to the smallest label so the
    /// choice is deterministic.
    pub fn most_frequent(&self) -> Option<&str> {
        self.0
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(label, _)| label.as_str())
    }

    /// Labels and counts in label order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &usize)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Row bookkeeping for one pipeline stage.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StageCounts {
    pub rows_in: usize,
    pub rows_out: usize,
}

impl StageCounts {
    pub fn new(rows_in: usize, rows_out: usize) -> Self {
        Self { rows_in, rows_out }
    }

    pub fn rows_dropped(&self) -> usize {
        self.rows_in.saturating_sub(self.rows_out)
    }
}

/// Summary of a whole pipeline run, rendered by the CLI and written to the
/// metadata side-file.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// When the run started, RFC 3339.
    pub started_at: String,
    pub duration_ms: u64,

    pub files_scanned: usize,
    pub files_skipped: usize,
    pub corpus_rows: usize,
    pub columns_seen: usize,

    /// Columns removed by the cleaning decision.
    pub columns_dropped: Vec<String>,

    /// Per-stage row counts, in execution order.
    pub stages: BTreeMap<String, StageCounts>,

    pub class_distribution_before: Option<ClassDistribution>,
    pub class_distribution_after: Option<ClassDistribution>,

    pub warnings: Vec<String>,
}

impl RunSummary {
    pub fn record_stage(&mut self, name: impl Into<String>, counts: StageCounts) {
        self.stages.insert(name.into(), counts);
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }
}
