//! Per-column running statistics.
//!
//! One [`ColumnAccumulator`] absorbs a column's values chunk by chunk and is
//! finalized exactly once after the whole corpus has been scanned. The merge
//! formulas combine per-chunk aggregates rather than individual values: the
//! mean uses the weighted-delta update, the sum of squared deviations adds
//! each chunk's own contribution, and the median estimate is a rows-weighted
//! average of chunk medians. The variance and median combinations are
//! deliberately approximate; Chan's parallel combination would make them
//! exact at the cost of extra bookkeeping.

use std::collections::HashMap;

use serde::Serialize;

/// Whether a column holds numbers or free text / categories.
///
/// Decided the first time non-missing values are observed and never
/// revisited; later values that stop parsing count as missing instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

/// Distinct-value tracking with a memory cap.
///
/// Exact value counts are kept until `cap` distinct values have been seen;
/// past that the tracker saturates to a bare count. The cleaning decision
/// only needs to distinguish cardinality <= 1 from everything else, so
/// saturation never changes which columns are dropped.
#[derive(Debug, Clone)]
enum DistinctTracker {
    Exact(HashMap<String, usize>),
    Saturated(usize),
}

impl DistinctTracker {
    fn new() -> Self {
        DistinctTracker::Exact(HashMap::new())
    }

    fn insert(&mut self, value: &str, cap: usize) {
        match self {
            DistinctTracker::Exact(counts) => {
                if let Some(count) = counts.get_mut(value) {
                    *count += 1;
                } else if counts.len() >= cap {
                    *self = DistinctTracker::Saturated(counts.len() + 1);
                } else {
                    counts.insert(value.to_string(), 1);
                }
            }
            DistinctTracker::Saturated(_) => {}
        }
    }

    fn cardinality(&self) -> usize {
        match self {
            DistinctTracker::Exact(counts) => counts.len(),
            DistinctTracker::Saturated(n) => *n,
        }
    }

    fn is_saturated(&self) -> bool {
        matches!(self, DistinctTracker::Saturated(_))
    }

    /// Most frequent value, when exact counts are still available.
    fn mode(&self) -> Option<String> {
        match self {
            DistinctTracker::Exact(counts) => counts
                .iter()
                .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
                .map(|(value, _)| value.clone()),
            DistinctTracker::Saturated(_) => None,
        }
    }
}

/// Running statistics for a single column.
///
/// Mutated only through [`merge`](Self::merge); callers never touch the
/// fields directly.
#[derive(Debug, Clone)]
pub struct ColumnAccumulator {
    name: String,
    kind: Option<ColumnKind>,
    /// Rows of chunks in which this column was present.
    rows_seen: usize,
    /// Missing or non-convertible values within those rows.
    missing: usize,
    /// Non-missing (and, for numeric columns, convertible) values.
    observed: usize,
    mean: f64,
    sum_sq_dev: f64,
    median_estimate: f64,
    distinct: DistinctTracker,
    distinct_cap: usize,
}

impl ColumnAccumulator {
    pub fn new(name: impl Into<String>, distinct_cap: usize) -> Self {
        Self {
            name: name.into(),
            kind: None,
            rows_seen: 0,
            missing: 0,
            observed: 0,
            mean: 0.0,
            sum_sq_dev: 0.0,
            median_estimate: 0.0,
            distinct: DistinctTracker::new(),
            distinct_cap,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rows_seen(&self) -> usize {
        self.rows_seen
    }

    pub fn missing(&self) -> usize {
        self.missing
    }

    pub fn kind(&self) -> Option<ColumnKind> {
        self.kind
    }

    /// Merge one chunk's values for this column.
    ///
    /// `values` holds the raw cells with missing markers already mapped to
    /// `None`. The first chunk containing any non-missing value fixes the
    /// column kind: numeric iff every non-missing value parses as a float.
    pub fn merge(&mut self, values: &[Option<&str>]) {
        let n_rows = values.len();
        let non_missing: Vec<&str> = values.iter().flatten().copied().collect();

        if self.kind.is_none() && !non_missing.is_empty() {
            let all_numeric = non_missing.iter().all(|v| v.parse::<f64>().is_ok());
            self.kind = Some(if all_numeric {
                ColumnKind::Numeric
            } else {
                ColumnKind::Categorical
            });
        }

        for value in &non_missing {
            self.distinct.insert(value, self.distinct_cap);
        }

        match self.kind {
            Some(ColumnKind::Numeric) => {
                let parsed: Vec<f64> = non_missing
                    .iter()
                    .filter_map(|v| v.parse::<f64>().ok())
                    .collect();
                // conversion failures in a numeric column are missing values
                self.missing += n_rows - parsed.len();
                self.merge_numeric(&parsed);
            }
            Some(ColumnKind::Categorical) | None => {
                self.missing += n_rows - non_missing.len();
                self.observed += non_missing.len();
            }
        }

        self.rows_seen += n_rows;
    }

    /// Weighted-delta merge of one chunk's parsed numeric values.
    fn merge_numeric(&mut self, parsed: &[f64]) {
        let n = parsed.len();
        if n == 0 {
            return;
        }

        let chunk_mean = parsed.iter().sum::<f64>() / n as f64;
        let chunk_median = exact_median(parsed);
        let chunk_var = sample_variance(parsed, chunk_mean);

        if self.observed == 0 {
            self.mean = chunk_mean;
            self.median_estimate = chunk_median;
            self.sum_sq_dev = chunk_var * (n.saturating_sub(1)) as f64;
        } else {
            let prior = self.observed as f64;
            let total = prior + n as f64;
            let delta = chunk_mean - self.mean;
            self.mean += delta * n as f64 / total;
            self.sum_sq_dev += chunk_var * (n.saturating_sub(1)) as f64;
            self.median_estimate =
                (self.median_estimate * prior + chunk_median * n as f64) / total;
        }

        self.observed += n;
    }

    /// Collapse the accumulator into its final summary.
    ///
    /// `corpus_rows` is the total row count of the whole corpus; the missing
    /// ratio is computed against it, so rows from chunks where this column
    /// was absent (before it first appeared, or after it disappeared) count
    /// as missing.
    pub fn finalize(&self, corpus_rows: usize) -> ColumnSummary {
        let std_dev = if self.rows_seen > 1 {
            (self.sum_sq_dev / (self.rows_seen - 1) as f64).sqrt()
        } else {
            // a single observation has no spread; do not divide by zero
            0.0
        };

        let missing_ratio = if corpus_rows == 0 {
            0.0
        } else {
            (1.0 - self.observed as f64 / corpus_rows as f64).clamp(0.0, 1.0)
        };

        ColumnSummary {
            name: self.name.clone(),
            kind: self.kind.unwrap_or(ColumnKind::Categorical),
            rows_seen: self.rows_seen,
            missing_ratio,
            mean: self.mean,
            std_dev,
            median: self.median_estimate,
            cardinality: self.distinct.cardinality(),
            high_cardinality: self.distinct.is_saturated(),
            mode: self.distinct.mode(),
        }
    }
}

/// Finalized statistics for one column.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnSummary {
    pub name: String,
    pub kind: ColumnKind,
    pub rows_seen: usize,
    pub missing_ratio: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub median: f64,
    pub cardinality: usize,
    /// True when distinct tracking saturated; `cardinality` is then a floor.
    pub high_cardinality: bool,
    /// Most frequent value, for categorical imputation fallback.
    pub mode: Option<String>,
}

impl ColumnSummary {
    pub fn is_numeric(&self) -> bool {
        self.kind == ColumnKind::Numeric
    }

    /// Constant-valued over the whole corpus (at most one distinct value).
    pub fn is_constant(&self) -> bool {
        self.cardinality <= 1
    }
}

fn exact_median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn sample_variance(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn merge_strs(acc: &mut ColumnAccumulator, values: &[Option<&str>]) {
        acc.merge(values);
    }

    #[test]
    fn test_numeric_classification_fixed_at_first_sight() {
        let mut acc = ColumnAccumulator::new("bytes", 100);
        merge_strs(&mut acc, &[Some("1"), Some("2.5"), None]);
        assert_eq!(acc.kind(), Some(ColumnKind::Numeric));

        // later non-numeric values do not reclassify; they count as missing
        merge_strs(&mut acc, &[Some("garbage"), Some("3")]);
        assert_eq!(acc.kind(), Some(ColumnKind::Numeric));
        assert_eq!(acc.missing(), 2); // the null plus the unparsable cell
    }

    #[test]
    fn test_categorical_classification() {
        let mut acc = ColumnAccumulator::new("action", 100);
        merge_strs(&mut acc, &[Some("allow"), Some("deny"), Some("1")]);
        assert_eq!(acc.kind(), Some(ColumnKind::Categorical));
    }

    #[test]
    fn test_classification_deferred_past_all_missing_chunk() {
        let mut acc = ColumnAccumulator::new("score", 100);
        merge_strs(&mut acc, &[None, None]);
        assert_eq!(acc.kind(), None);

        merge_strs(&mut acc, &[Some("4.0")]);
        assert_eq!(acc.kind(), Some(ColumnKind::Numeric));
    }

    #[test]
    fn test_mean_matches_pooled_mean() {
        let mut acc = ColumnAccumulator::new("v", 100);
        merge_strs(&mut acc, &[Some("1"), Some("2"), Some("3")]);
        merge_strs(&mut acc, &[Some("10"), Some("20")]);

        let summary = acc.finalize(5);
        let expected = (1.0 + 2.0 + 3.0 + 10.0 + 20.0) / 5.0;
        assert!((summary.mean - expected).abs() < 1e-9);
    }

    #[test]
    fn test_order_invariance_of_counts_and_mean() {
        let chunk1: Vec<Option<&str>> = vec![Some("1"), None, Some("5"), Some("9")];
        let chunk2: Vec<Option<&str>> = vec![Some("100"), Some("200"), None];

        let mut forward = ColumnAccumulator::new("v", 100);
        forward.merge(&chunk1);
        forward.merge(&chunk2);

        let mut reverse = ColumnAccumulator::new("v", 100);
        reverse.merge(&chunk2);
        reverse.merge(&chunk1);

        assert_eq!(forward.rows_seen(), reverse.rows_seen());
        assert_eq!(forward.missing(), reverse.missing());

        let f = forward.finalize(7);
        let r = reverse.finalize(7);
        assert!((f.mean - r.mean).abs() < 1e-9);
    }

    #[test]
    fn test_std_dev_single_row_does_not_panic() {
        let mut acc = ColumnAccumulator::new("v", 100);
        merge_strs(&mut acc, &[Some("42")]);
        let summary = acc.finalize(1);
        assert_eq!(summary.std_dev, 0.0);
    }

    #[test]
    fn test_std_dev_whole_column_at_once() {
        let mut acc = ColumnAccumulator::new("v", 100);
        merge_strs(&mut acc, &[Some("1"), Some("2"), Some("3"), Some("4"), Some("5")]);
        let summary = acc.finalize(5);
        // sample std of 1..=5 is sqrt(2.5)
        assert!((summary.std_dev - 2.5f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_median_estimate_weighted() {
        let mut acc = ColumnAccumulator::new("v", 100);
        merge_strs(&mut acc, &[Some("1"), Some("2"), Some("3")]); // median 2
        merge_strs(&mut acc, &[Some("10"), Some("20")]); // median 15

        let summary = acc.finalize(5);
        let expected = (2.0 * 3.0 + 15.0 * 2.0) / 5.0;
        assert!((summary.median - expected).abs() < 1e-9);
    }

    #[test]
    fn test_missing_ratio_in_unit_interval_and_retroactive() {
        let mut acc = ColumnAccumulator::new("late", 100);
        // column appears only after 4 corpus rows have passed
        merge_strs(&mut acc, &[Some("5"), Some("7")]);

        let summary = acc.finalize(6);
        assert_eq!(acc.rows_seen(), 2);
        assert!((summary.missing_ratio - 4.0 / 6.0).abs() < 1e-9);
        assert!((0.0..=1.0).contains(&summary.missing_ratio));
    }

    #[test]
    fn test_constant_column_detected() {
        let mut acc = ColumnAccumulator::new("c", 100);
        merge_strs(&mut acc, &[Some("x"), Some("x"), Some("x")]);
        let summary = acc.finalize(3);
        assert!(summary.is_constant());
        assert_eq!(summary.cardinality, 1);
    }

    #[test]
    fn test_distinct_cap_saturates() {
        let mut acc = ColumnAccumulator::new("id", 3);
        let values: Vec<String> = (0..10).map(|i| i.to_string()).collect();
        let refs: Vec<Option<&str>> = values.iter().map(|s| Some(s.as_str())).collect();
        merge_strs(&mut acc, &refs);

        let summary = acc.finalize(10);
        assert!(summary.high_cardinality);
        assert!(summary.cardinality > 1);
        assert!(!summary.is_constant());
        assert!(summary.mode.is_none());
    }

    #[test]
    fn test_mode_tracks_most_frequent() {
        let mut acc = ColumnAccumulator::new("proto", 100);
        merge_strs(&mut acc, &[Some("tcp"), Some("udp"), Some("tcp"), None]);
        let summary = acc.finalize(4);
        assert_eq!(summary.mode.as_deref(), Some("tcp"));
    }
}
