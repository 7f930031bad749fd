//! Corpus-wide statistics over a stream of chunks.
//!
//! [`CorpusStatistics`] owns one [`ColumnAccumulator`] per column observed
//! anywhere in the corpus. Columns may appear and disappear between chunks
//! and files; an accumulator is created the first time its column shows up,
//! and the finalized missing ratio charges the rows it never saw. The engine
//! is an owned value created at pipeline start, threaded by `&mut` through
//! the first pass, and consumed by [`finalize`](CorpusStatistics::finalize).

use polars::prelude::*;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::stats::accumulator::{ColumnAccumulator, ColumnSummary};

/// Mutable running statistics for the whole corpus.
#[derive(Debug)]
pub struct CorpusStatistics {
    /// Keyed and iterated in name order so every derived decision is
    /// deterministic across runs.
    columns: BTreeMap<String, ColumnAccumulator>,
    total_rows: usize,
    distinct_cap: usize,
}

static_assertions::assert_impl_all!(CorpusStatistics: Send);

impl CorpusStatistics {
    pub fn new(distinct_cap: usize) -> Self {
        Self {
            columns: BTreeMap::new(),
            total_rows: 0,
            distinct_cap,
        }
    }

    /// Rows merged so far across all chunks.
    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    /// Number of distinct columns observed so far.
    pub fn columns_seen(&self) -> usize {
        self.columns.len()
    }

    /// Rows seen by one column's accumulator, if the column has appeared.
    pub fn rows_seen(&self, column: &str) -> Option<usize> {
        self.columns.get(column).map(|acc| acc.rows_seen())
    }

    /// Merge one chunk into the running statistics.
    pub fn merge_chunk(&mut self, df: &DataFrame) -> Result<()> {
        let cap = self.distinct_cap;
        for col in df.get_columns() {
            let name = col.name().to_string();
            let series = col.as_materialized_series().cast(&DataType::String)?;
            let ca = series.str()?;
            let values: Vec<Option<&str>> = ca.into_iter().collect();

            self.columns
                .entry(name.clone())
                .or_insert_with(|| ColumnAccumulator::new(name, cap))
                .merge(&values);
        }

        self.total_rows += df.height();
        Ok(())
    }

    /// Finalize every accumulator. The statistics are immutable afterwards.
    pub fn finalize(self) -> CorpusSummary {
        let total_rows = self.total_rows;
        let columns = self
            .columns
            .into_iter()
            .map(|(name, acc)| {
                let summary = acc.finalize(total_rows);
                (name, summary)
            })
            .collect();

        CorpusSummary {
            columns,
            total_rows,
        }
    }
}

/// Finalized, immutable corpus statistics.
#[derive(Debug, Clone)]
pub struct CorpusSummary {
    columns: BTreeMap<String, ColumnSummary>,
    total_rows: usize,
}

impl CorpusSummary {
    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    pub fn get(&self, column: &str) -> Option<&ColumnSummary> {
        self.columns.get(column)
    }

    /// Column summaries in name order.
    pub fn iter(&self) -> impl Iterator<Item = &ColumnSummary> {
        self.columns.values()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|k| k.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_total_rows_is_sum_of_chunk_lengths() {
        let mut stats = CorpusStatistics::new(1000);
        stats
            .merge_chunk(&df!["a" => ["1", "2", "3"]].unwrap())
            .unwrap();
        stats
            .merge_chunk(&df!["a" => ["4", "5"]].unwrap())
            .unwrap();

        assert_eq!(stats.total_rows(), 5);
    }

    #[test]
    fn test_late_appearing_column_rows_seen() {
        // column "a" is missing from chunk 1 entirely, then carries one
        // value in each of chunks 2 and 3
        let mut stats = CorpusStatistics::new(1000);
        stats
            .merge_chunk(&df!["b" => ["x", "y", "z"]].unwrap())
            .unwrap();
        stats
            .merge_chunk(&df!["b" => ["w"], "a" => ["5"]].unwrap())
            .unwrap();
        stats
            .merge_chunk(&df!["b" => ["v"], "a" => ["7"]].unwrap())
            .unwrap();

        // rows_seen counts only the chunks where "a" was present
        assert_eq!(stats.rows_seen("a"), Some(2));
        assert_eq!(stats.total_rows(), 5);

        // but the finalized missing ratio charges the three unseen rows
        let summary = stats.finalize();
        let a = summary.get("a").unwrap();
        assert!((a.missing_ratio - 3.0 / 5.0).abs() < 1e-9);
        assert!((a.mean - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_disappearing_column_counts_as_missing() {
        let mut stats = CorpusStatistics::new(1000);
        stats.merge_chunk(&df!["a" => ["1", "2"]].unwrap()).unwrap();
        stats.merge_chunk(&df!["b" => ["x", "y"]].unwrap()).unwrap();

        let summary = stats.finalize();
        let a = summary.get("a").unwrap();
        assert!((a.missing_ratio - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_finalized_summaries_iterate_in_name_order() {
        let mut stats = CorpusStatistics::new(1000);
        stats
            .merge_chunk(&df!["zeta" => ["1"], "alpha" => ["2"], "mid" => ["3"]].unwrap())
            .unwrap();

        let summary = stats.finalize();
        let names: Vec<&str> = summary.column_names().collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_typed_chunks_are_accepted() {
        // chunks built elsewhere may already carry typed columns
        let mut stats = CorpusStatistics::new(1000);
        stats
            .merge_chunk(&df!["n" => [1i64, 2, 3], "s" => ["a", "b", "a"]].unwrap())
            .unwrap();

        let summary = stats.finalize();
        assert!(summary.get("n").unwrap().is_numeric());
        assert!(!summary.get("s").unwrap().is_numeric());
        assert_eq!(summary.get("s").unwrap().cardinality, 2);
    }
}
