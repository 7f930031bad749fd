//! Outlier removal and feature rescaling.
//!
//! Operates on the materialized cleaned table, after the second pass. IQR
//! fences are computed from the working table itself; the z-score variant
//! instead checks values against the corpus-wide mean and standard deviation
//! gathered during the first pass. If removal would empty the table the
//! stage falls back to the pre-removal data rather than silently discarding
//! everything.

use polars::prelude::*;
use tracing::{debug, info, warn};

use crate::config::OutlierMethod;
use crate::error::Result;
use crate::stats::CorpusSummary;

/// Removes statistical outliers and rescales numeric columns.
pub struct OutlierStage {
    method: OutlierMethod,
    iqr_multiplier: f64,
    z_threshold: f64,
}

impl OutlierStage {
    pub fn new(method: OutlierMethod, iqr_multiplier: f64, z_threshold: f64) -> Self {
        Self {
            method,
            iqr_multiplier,
            z_threshold,
        }
    }

    /// Remove outlier rows from every numeric, non-label column.
    ///
    /// Returns the filtered table and the number of rows removed. Columns
    /// are processed in table order; each column's bounds are computed on
    /// the rows surviving the previous columns.
    pub fn remove_outliers(
        &self,
        df: DataFrame,
        label_column: &str,
        summary: Option<&CorpusSummary>,
    ) -> Result<(DataFrame, usize)> {
        if matches!(self.method, OutlierMethod::Keep) {
            return Ok((df, 0));
        }

        let original_rows = df.height();
        let before = df.clone();
        let mut df = df;

        let numeric_cols: Vec<String> = numeric_feature_columns(&df, label_column);

        for name in &numeric_cols {
            let col = df.column(name)?.as_materialized_series().clone();
            let bounds = match self.method {
                OutlierMethod::Iqr => iqr_bounds(&col, self.iqr_multiplier)?,
                OutlierMethod::ZScore => {
                    z_score_bounds(&col, name, summary, self.z_threshold)?
                }
                OutlierMethod::Keep => unreachable!(),
            };

            let Some((lower, upper)) = bounds else {
                continue;
            };

            let casted = col.cast(&DataType::Float64)?;
            let ca = casted.f64()?;
            let mask_values: Vec<bool> = ca
                .into_iter()
                .map(|v| match v {
                    Some(val) => val >= lower && val <= upper,
                    // missing values are not outliers
                    None => true,
                })
                .collect();

            let outliers = mask_values.iter().filter(|keep| !**keep).count();
            if outliers > 0 {
                debug!(
                    "Column {}: {} outliers outside [{}, {}]",
                    name, outliers, lower, upper
                );
            }

            let mask = BooleanChunked::from_slice("mask".into(), &mask_values);
            df = df.filter(&mask)?;
        }

        if df.height() == 0 && original_rows > 0 {
            warn!("Outlier removal emptied the table; keeping pre-removal data");
            return Ok((before, 0));
        }

        let removed = original_rows - df.height();
        if removed > 0 {
            info!("Removed {} outlier rows", removed);
        }
        Ok((df, removed))
    }

    /// Rescale every numeric, non-label column into [0, 1] by min-max,
    /// fit on the working table. A constant column maps to 0.0.
    pub fn rescale(&self, df: DataFrame, label_column: &str) -> Result<DataFrame> {
        let mut df = df;
        let numeric_cols = numeric_feature_columns(&df, label_column);

        for name in &numeric_cols {
            let casted = df
                .column(name)?
                .as_materialized_series()
                .cast(&DataType::Float64)?;
            let ca = casted.f64()?;

            let (Some(min), Some(max)) = (ca.min(), ca.max()) else {
                continue;
            };
            let range = max - min;

            let scaled = ca.apply(move |v| {
                v.map(|val| if range > 0.0 { (val - min) / range } else { 0.0 })
            });
            df.replace(name, scaled.into_series().with_name(name.as_str().into()))?;
        }

        Ok(df)
    }
}

/// Numeric columns eligible for outlier handling and rescaling.
fn numeric_feature_columns(df: &DataFrame, label_column: &str) -> Vec<String> {
    df.get_columns()
        .iter()
        .filter(|col| is_numeric_dtype(col.dtype()) && col.name().as_str() != label_column)
        .map(|col| col.name().to_string())
        .collect()
}

/// Check if a DataType is numeric (integer or float).
fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// IQR fences `[Q1 - k*IQR, Q3 + k*IQR]` from the column's own values.
fn iqr_bounds(series: &Series, multiplier: f64) -> Result<Option<(f64, f64)>> {
    let non_null = series.drop_nulls();
    let sorted = non_null.sort(SortOptions::default())?;
    let n = sorted.len();
    if n < 4 {
        return Ok(None);
    }

    let q1_idx = (n as f64 * 0.25) as usize;
    let q3_idx = (n as f64 * 0.75) as usize;

    let q1 = sorted.get(q1_idx)?.try_extract::<f64>().unwrap_or(0.0);
    let q3 = sorted.get(q3_idx)?.try_extract::<f64>().unwrap_or(0.0);
    let iqr = q3 - q1;

    Ok(Some((q1 - multiplier * iqr, q3 + multiplier * iqr)))
}

/// Z-score bounds from the corpus-wide mean/std when available, otherwise
/// from the working table.
fn z_score_bounds(
    series: &Series,
    name: &str,
    summary: Option<&CorpusSummary>,
    threshold: f64,
) -> Result<Option<(f64, f64)>> {
    let (mean, std) = match summary.and_then(|s| s.get(name)) {
        Some(col) => (col.mean, col.std_dev),
        None => {
            let casted = series.cast(&DataType::Float64)?;
            let ca = casted.f64()?;
            let mean = ca.mean().unwrap_or(0.0);
            let std = ca.std(1).unwrap_or(0.0);
            (mean, std)
        }
    };

    if std <= 0.0 {
        return Ok(None);
    }

    Ok(Some((mean - threshold * std, mean + threshold * std)))
}
