//! Cleaning decisions derived from finalized corpus statistics.
//!
//! The decision set is a pure function of the finalized statistics and the
//! configured thresholds. It is computed once, between the two passes, and
//! applied unchanged to every chunk of the second pass; no chunk can
//! influence its own cleaning.

use std::collections::{BTreeMap, BTreeSet};

use tracing::info;

use crate::stats::CorpusSummary;

/// Immutable column-level decisions for the second pass.
#[derive(Debug, Clone, PartialEq)]
pub struct CleaningDecision {
    /// Columns removed from the output: constant-valued columns and columns
    /// whose corpus-wide missing ratio exceeds the threshold. Never contains
    /// the label column.
    pub columns_to_drop: BTreeSet<String>,
    /// Imputation value (finalized median estimate) per surviving numeric
    /// column.
    pub impute_values: BTreeMap<String, f64>,
    /// Mode per surviving categorical column, for the categorical fallback.
    pub mode_values: BTreeMap<String, String>,
}

impl CleaningDecision {
    /// Derive the decision set from finalized statistics.
    pub fn derive(summary: &CorpusSummary, missing_threshold: f64, label_column: &str) -> Self {
        let mut constant = BTreeSet::new();
        let mut high_missing = BTreeSet::new();

        for col in summary.iter() {
            if col.name == label_column {
                continue;
            }
            if col.is_constant() {
                constant.insert(col.name.clone());
            }
            if col.missing_ratio > missing_threshold {
                high_missing.insert(col.name.clone());
            }
        }

        if !constant.is_empty() {
            info!("Columns to remove due to constant values: {:?}", constant);
        }
        if !high_missing.is_empty() {
            info!(
                "Columns to remove due to missing ratio > {:.2}: {:?}",
                missing_threshold, high_missing
            );
        }

        let columns_to_drop: BTreeSet<String> =
            constant.union(&high_missing).cloned().collect();

        let mut impute_values = BTreeMap::new();
        let mut mode_values = BTreeMap::new();
        for col in summary.iter() {
            if col.name == label_column || columns_to_drop.contains(&col.name) {
                continue;
            }
            if col.is_numeric() {
                impute_values.insert(col.name.clone(), col.median);
            } else if let Some(mode) = &col.mode {
                mode_values.insert(col.name.clone(), mode.clone());
            }
        }

        Self {
            columns_to_drop,
            impute_values,
            mode_values,
        }
    }

    /// Whether a column survives cleaning.
    pub fn keeps(&self, column: &str) -> bool {
        !self.columns_to_drop.contains(column)
    }

    /// Columns of the finalized statistics that survive cleaning, in
    /// deterministic name order.
    pub fn surviving_columns<'a>(&self, summary: &'a CorpusSummary) -> Vec<&'a str> {
        summary
            .column_names()
            .filter(|name| self.keeps(name))
            .collect()
    }
}
