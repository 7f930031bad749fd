//! Nearest-neighbor interpolation for minority-class synthesis.
//!
//! New rows are generated by interpolating between a real example and one of
//! its k nearest same-class neighbors, at a random point along the segment.
//! Distances are normalized Euclidean over the numeric feature columns;
//! non-numeric features are copied from the base example. The neighbor count
//! must be strictly less than the class size, so callers route singleton
//! classes to duplication instead.

use polars::prelude::*;
use rand::Rng;
use rand::rngs::StdRng;

use crate::error::{ProcessingError, Result};

/// Interpolating sampler over one class's rows.
pub struct SmoteSampler {
    k_neighbors: usize,
}

impl SmoteSampler {
    /// Create a sampler for a class of `class_size` examples.
    ///
    /// The neighbor count is `min(cap, class_size - 1)`; `class_size` must
    /// be at least 2.
    pub fn for_class_size(class_size: usize, cap: usize) -> Result<Self> {
        if class_size < 2 {
            return Err(ProcessingError::EmptyResult {
                stage: "balance".to_string(),
                reason: "interpolation needs at least two examples".to_string(),
            });
        }
        Ok(Self {
            k_neighbors: cap.min(class_size - 1).max(1),
        })
    }

    pub fn k_neighbors(&self) -> usize {
        self.k_neighbors
    }

    /// Synthesize `count` new rows from `df`, which holds one class.
    ///
    /// The output has the same columns in the same order as `df`; numeric
    /// feature columns must already be Float64.
    pub fn synthesize(
        &self,
        df: &DataFrame,
        count: usize,
        rng: &mut StdRng,
    ) -> Result<DataFrame> {
        let n_rows = df.height();
        let numeric_cols: Vec<String> = df
            .get_columns()
            .iter()
            .filter(|col| matches!(col.dtype(), DataType::Float64))
            .map(|col| col.name().to_string())
            .collect();

        let matrix = feature_matrix(df, &numeric_cols)?;

        // pick base rows and interpolation partners up front
        let mut picks: Vec<(usize, usize, f64)> = Vec::with_capacity(count);
        for _ in 0..count {
            let base = rng.gen_range(0..n_rows);
            let neighbors = nearest_neighbors(&matrix, base, self.k_neighbors);
            let partner = neighbors[rng.gen_range(0..neighbors.len())];
            let gap: f64 = rng.r#gen();
            picks.push((base, partner, gap));
        }

        let columns: Vec<Column> = df
            .get_columns()
            .iter()
            .map(|col| {
                let name = col.name().clone();
                let series = col.as_materialized_series();
                if matches!(col.dtype(), DataType::Float64) {
                    let ca = series.f64()?;
                    let values: Vec<Option<f64>> = picks
                        .iter()
                        .map(|&(base, partner, gap)| {
                            match (ca.get(base), ca.get(partner)) {
                                (Some(b), Some(p)) => Some(b + gap * (p - b)),
                                (b, _) => b,
                            }
                        })
                        .collect();
                    Ok(Series::new(name, values).into_column())
                } else {
                    // copy non-numeric features from the base example
                    let indices: Vec<u32> = picks.iter().map(|&(base, _, _)| base as u32).collect();
                    let idx = IdxCa::from_vec("idx".into(), indices);
                    Ok(series.take(&idx)?.into_column())
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(DataFrame::new(columns)?)
    }
}

/// Numeric feature matrix for distance computation; nulls are preserved and
/// skipped pairwise during distance evaluation.
fn feature_matrix(df: &DataFrame, columns: &[String]) -> Result<Vec<Vec<Option<f64>>>> {
    let n_rows = df.height();
    let mut matrix = vec![vec![None; columns.len()]; n_rows];

    for (col_idx, name) in columns.iter().enumerate() {
        let series = df.column(name)?.as_materialized_series().clone();
        let ca = series.f64()?;
        for (row_idx, row) in matrix.iter_mut().enumerate() {
            row[col_idx] = ca.get(row_idx);
        }
    }

    Ok(matrix)
}

/// Indices of the k rows closest to `target`, excluding `target` itself.
fn nearest_neighbors(matrix: &[Vec<Option<f64>>], target: usize, k: usize) -> Vec<usize> {
    let mut distances: Vec<(usize, f64)> = (0..matrix.len())
        .filter(|&row| row != target)
        .map(|row| (row, distance(&matrix[target], &matrix[row])))
        .collect();

    distances.sort_by(|a, b| {
        a.1.partial_cmp(&b.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    distances.into_iter().take(k).map(|(row, _)| row).collect()
}

/// Normalized Euclidean distance over the features both rows carry.
fn distance(a: &[Option<f64>], b: &[Option<f64>]) -> f64 {
    let mut sum_squared = 0.0;
    let mut count = 0usize;

    for (x, y) in a.iter().zip(b.iter()) {
        if let (Some(x), Some(y)) = (x, y) {
            let diff = x - y;
            sum_squared += diff * diff;
            count += 1;
        }
    }

    if count > 0 {
        (sum_squared / count as f64).sqrt()
    } else {
        f64::INFINITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn class_frame() -> DataFrame {
        df![
            "x" => [0.0, 1.0, 2.0, 10.0],
            "y" => [0.0, 1.0, 2.0, 10.0],
            "attack_label" => ["dos", "dos", "dos", "dos"],
        ]
        .unwrap()
    }

    #[test]
    fn test_k_is_capped_below_class_size() {
        let sampler = SmoteSampler::for_class_size(3, 5).unwrap();
        assert_eq!(sampler.k_neighbors(), 2);

        let sampler = SmoteSampler::for_class_size(100, 5).unwrap();
        assert_eq!(sampler.k_neighbors(), 5);
    }

    #[test]
    fn test_singleton_class_is_rejected() {
        assert!(SmoteSampler::for_class_size(1, 5).is_err());
    }

    #[test]
    fn test_synthesized_rows_have_requested_count_and_schema() {
        let df = class_frame();
        let sampler = SmoteSampler::for_class_size(df.height(), 5).unwrap();
        let mut rng = StdRng::seed_from_u64(42);

        let synth = sampler.synthesize(&df, 7, &mut rng).unwrap();
        assert_eq!(synth.height(), 7);
        assert_eq!(synth.get_column_names(), df.get_column_names());
    }

    #[test]
    fn test_synthesized_values_lie_between_neighbors() {
        let df = class_frame();
        let sampler = SmoteSampler::for_class_size(df.height(), 5).unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        let synth = sampler.synthesize(&df, 50, &mut rng).unwrap();
        let x = synth.column("x").unwrap().f64().unwrap();
        for value in x.into_iter().flatten() {
            assert!((0.0..=10.0).contains(&value));
        }
    }

    #[test]
    fn test_non_numeric_columns_copied_from_base() {
        let df = class_frame();
        let sampler = SmoteSampler::for_class_size(df.height(), 5).unwrap();
        let mut rng = StdRng::seed_from_u64(1);

        let synth = sampler.synthesize(&df, 5, &mut rng).unwrap();
        let labels = synth.column("attack_label").unwrap().str().unwrap();
        for label in labels.into_iter().flatten() {
            assert_eq!(label, "dos");
        }
    }

    #[test]
    fn test_seeded_synthesis_is_reproducible() {
        let df = class_frame();
        let sampler = SmoteSampler::for_class_size(df.height(), 5).unwrap();

        let a = sampler
            .synthesize(&df, 5, &mut StdRng::seed_from_u64(9))
            .unwrap();
        let b = sampler
            .synthesize(&df, 5, &mut StdRng::seed_from_u64(9))
            .unwrap();
        assert!(a.equals(&b));
    }
}
