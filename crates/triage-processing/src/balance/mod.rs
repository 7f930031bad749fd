//! Label-aware class balancing.
//!
//! Rebuilds the class distribution of a finalized table: the majority class
//! is undersampled down to the target count, minority classes are grown up
//! to it (nearest-neighbor interpolation when the class has at least two
//! examples, duplication when it has exactly one), and classes already at
//! or above the target pass through untouched. All sampling is seeded.

mod smote;

pub use smote::SmoteSampler;

use polars::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use tracing::info;

use crate::config::PipelineConfig;
use crate::error::{ProcessingError, Result};
use crate::types::ClassDistribution;

/// Cap on the SMOTE neighbor count.
const NEIGHBOR_CAP: usize = 5;

/// Outcome details for the run summary.
#[derive(Debug, Clone)]
pub struct BalanceReport {
    pub before: ClassDistribution,
    pub after: ClassDistribution,
    pub majority_label: String,
    pub target_count: usize,
}

/// Resamples a labeled table toward a uniform non-majority distribution.
pub struct ClassBalancer {
    seed: u64,
    majority_label: Option<String>,
    multiplier: f64,
}

static_assertions::assert_impl_all!(ClassBalancer: Send);

impl ClassBalancer {
    pub fn new(seed: u64, majority_label: Option<String>, multiplier: f64) -> Self {
        Self {
            seed,
            majority_label,
            multiplier,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.random_seed,
            config.majority_label.clone(),
            config.balance_multiplier,
        )
    }

    /// Balance `df` on `label_column`.
    ///
    /// Numeric feature columns are cast to Float64 first so interpolated
    /// rows share the table's schema. Fails fatally when the label column is
    /// absent, the table is empty, or no non-majority rows exist.
    pub fn balance(
        &self,
        df: DataFrame,
        label_column: &str,
    ) -> Result<(DataFrame, BalanceReport)> {
        if df
            .get_column_names()
            .iter()
            .all(|c| c.as_str() != label_column)
        {
            return Err(ProcessingError::MissingLabelColumn(label_column.to_string()));
        }
        if df.height() == 0 {
            return Err(ProcessingError::EmptyResult {
                stage: "balance".to_string(),
                reason: "input table has no rows".to_string(),
            });
        }

        let df = cast_features_to_float(df, label_column)?;
        let labels = label_strings(&df, label_column)?;
        let before = ClassDistribution::from_labels(&labels);

        let majority = match &self.majority_label {
            Some(label) => label.clone(),
            None => before
                .most_frequent()
                .ok_or_else(|| ProcessingError::EmptyResult {
                    stage: "balance".to_string(),
                    reason: "no labels present".to_string(),
                })?
                .to_string(),
        };

        let minority_max = before
            .iter()
            .filter(|(label, _)| **label != majority)
            .map(|(_, count)| *count)
            .max();
        let Some(minority_max) = minority_max else {
            return Err(ProcessingError::EmptyResult {
                stage: "balance".to_string(),
                reason: format!("no rows outside majority class '{majority}'"),
            });
        };

        let target = ((minority_max as f64 * self.multiplier).round() as usize).max(1);
        info!(
            "Balancing toward target {} (majority '{}', multiplier {})",
            target, majority, self.multiplier
        );

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut parts: Vec<DataFrame> = Vec::new();

        // majority first, as the original lays out its output
        let majority_df = class_rows(&df, &labels, &majority)?;
        parts.push(if majority_df.height() > target {
            info!(
                "Undersampling majority '{}' from {} to {} rows",
                majority,
                majority_df.height(),
                target
            );
            sample_rows(&majority_df, target, &mut rng)?
        } else {
            majority_df
        });

        for (label, count) in before.iter() {
            if *label == majority {
                continue;
            }
            let class_df = class_rows(&df, &labels, label)?;

            if *count >= target {
                // classes at or above target are never downsampled here
                parts.push(class_df);
            } else if *count == 1 {
                info!(
                    "Duplicating singleton class '{}' up to {} rows",
                    label, target
                );
                parts.push(duplicate_rows(&class_df, target)?);
            } else {
                let sampler = SmoteSampler::for_class_size(*count, NEIGHBOR_CAP)?;
                info!(
                    "Synthesizing {} rows for class '{}' (k={})",
                    target - count,
                    label,
                    sampler.k_neighbors()
                );
                let synthesized = sampler.synthesize(&class_df, target - count, &mut rng)?;
                parts.push(class_df.vstack(&synthesized)?);
            }
        }

        let mut parts = parts.into_iter();
        let mut balanced = parts.next().ok_or_else(|| ProcessingError::EmptyResult {
            stage: "balance".to_string(),
            reason: "no class partitions produced".to_string(),
        })?;
        for part in parts {
            balanced = balanced.vstack(&part)?;
        }

        let after_labels = label_strings(&balanced, label_column)?;
        let after = ClassDistribution::from_labels(&after_labels);
        info!("Balanced distribution: {:?}", after);

        Ok((
            balanced,
            BalanceReport {
                before,
                after,
                majority_label: majority,
                target_count: target,
            },
        ))
    }
}

/// Cast numeric feature columns to Float64, leaving the label column alone.
fn cast_features_to_float(df: DataFrame, label_column: &str) -> Result<DataFrame> {
    let mut df = df;
    let names: Vec<String> = df
        .get_columns()
        .iter()
        .filter(|col| {
            col.name().as_str() != label_column
                && col.dtype().is_integer()
        })
        .map(|col| col.name().to_string())
        .collect();

    for name in names {
        let casted = df
            .column(&name)?
            .as_materialized_series()
            .cast(&DataType::Float64)?;
        df.replace(&name, casted)?;
    }
    Ok(df)
}

/// The label column rendered as strings, one per row.
fn label_strings(df: &DataFrame, label_column: &str) -> Result<Vec<String>> {
    let series = df
        .column(label_column)?
        .as_materialized_series()
        .cast(&DataType::String)?;
    let ca = series.str()?;
    Ok(ca
        .into_iter()
        .map(|v| v.unwrap_or("").to_string())
        .collect())
}

/// Rows of one class.
fn class_rows(df: &DataFrame, labels: &[String], class: &str) -> Result<DataFrame> {
    let mask_values: Vec<bool> = labels.iter().map(|l| l == class).collect();
    let mask = BooleanChunked::from_slice("mask".into(), &mask_values);
    Ok(df.filter(&mask)?)
}

/// Uniform sample of `count` rows without replacement, in stable row order.
fn sample_rows(df: &DataFrame, count: usize, rng: &mut StdRng) -> Result<DataFrame> {
    let mut indices: Vec<u32> = sample(rng, df.height(), count)
        .into_iter()
        .map(|i| i as u32)
        .collect();
    indices.sort_unstable();
    let idx = IdxCa::from_vec("idx".into(), indices);
    Ok(df.take(&idx)?)
}

/// Grow a singleton class to `target` rows by repeating its example.
fn duplicate_rows(df: &DataFrame, target: usize) -> Result<DataFrame> {
    let indices: Vec<u32> = vec![0; target];
    let idx = IdxCa::from_vec("idx".into(), indices);
    Ok(df.take(&idx)?)
}
