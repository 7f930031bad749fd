//! Categorical feature encoding.
//!
//! Classifier-facing tables need numeric features, so the remaining string
//! columns are mapped to integer codes after cleaning. Codes are assigned in
//! sorted value order, which makes the mapping reproducible across runs, and
//! the full mapping is serializable so the metadata side-file can record it.
//! The label column is never encoded.

use polars::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::Result;

/// Deterministic string-to-code mapping per categorical column.
#[derive(Debug, Clone, Serialize)]
pub struct CategoricalEncoder {
    mappings: BTreeMap<String, BTreeMap<String, u32>>,
}

impl CategoricalEncoder {
    /// Fit a mapping for every string column except the label.
    pub fn fit(df: &DataFrame, label_column: &str) -> Result<Self> {
        let mut mappings = BTreeMap::new();

        for col in df.get_columns() {
            let name = col.name().to_string();
            if name == label_column || !matches!(col.dtype(), DataType::String) {
                continue;
            }

            let series = col.as_materialized_series();
            let ca = series.str()?;
            let mut values: Vec<&str> = ca.into_iter().flatten().collect();
            values.sort_unstable();
            values.dedup();

            let mapping: BTreeMap<String, u32> = values
                .into_iter()
                .enumerate()
                .map(|(code, value)| (value.to_string(), code as u32))
                .collect();
            mappings.insert(name, mapping);
        }

        Ok(Self { mappings })
    }

    /// Replace every mapped column with its integer codes.
    ///
    /// Values never seen during `fit` (and nulls) encode to null.
    pub fn transform(&self, df: DataFrame) -> Result<DataFrame> {
        let mut df = df;

        for (name, mapping) in &self.mappings {
            let Ok(col) = df.column(name) else {
                continue;
            };
            let series = col.as_materialized_series().clone();
            let ca = series.str()?;

            let codes: Vec<Option<u32>> = ca
                .into_iter()
                .map(|v| v.and_then(|s| mapping.get(s).copied()))
                .collect();

            df.replace(name, Series::new(name.as_str().into(), codes))?;
        }

        Ok(df)
    }

    /// Fit on a table and encode it in one step.
    pub fn fit_transform(df: DataFrame, label_column: &str) -> Result<(DataFrame, Self)> {
        let encoder = Self::fit(&df, label_column)?;
        let encoded = encoder.transform(df)?;
        Ok((encoded, encoder))
    }

    /// Encoded columns and their value-to-code maps.
    pub fn mappings(&self) -> &BTreeMap<String, BTreeMap<String, u32>> {
        &self.mappings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_codes_assigned_in_sorted_order() {
        let df = df![
            "proto" => ["udp", "tcp", "icmp", "tcp"],
            "attack_label" => ["0", "1", "0", "1"],
        ]
        .unwrap();

        let (encoded, encoder) = CategoricalEncoder::fit_transform(df, "attack_label").unwrap();

        let mapping = &encoder.mappings()["proto"];
        assert_eq!(mapping["icmp"], 0);
        assert_eq!(mapping["tcp"], 1);
        assert_eq!(mapping["udp"], 2);

        let codes: Vec<u32> = encoded
            .column("proto")
            .unwrap()
            .u32()
            .unwrap()
            .into_iter()
            .map(|v| v.unwrap())
            .collect();
        assert_eq!(codes, vec![2, 1, 0, 1]);
    }

    #[test]
    fn test_label_column_is_not_encoded() {
        let df = df![
            "proto" => ["udp", "tcp"],
            "attack_label" => ["benign", "dos"],
        ]
        .unwrap();

        let (encoded, encoder) = CategoricalEncoder::fit_transform(df, "attack_label").unwrap();
        assert!(!encoder.mappings().contains_key("attack_label"));
        assert_eq!(
            encoded.column("attack_label").unwrap().str().unwrap().get(0),
            Some("benign")
        );
    }

    #[test]
    fn test_numeric_columns_pass_through() {
        let df = df![
            "bytes" => [1.0, 2.0],
            "proto" => ["a", "b"],
        ]
        .unwrap();

        let (encoded, encoder) = CategoricalEncoder::fit_transform(df, "label").unwrap();
        assert!(!encoder.mappings().contains_key("bytes"));
        assert_eq!(
            encoded.column("bytes").unwrap().f64().unwrap().get(0),
            Some(1.0)
        );
    }

    #[test]
    fn test_unseen_values_encode_to_null() {
        let train = df!["proto" => ["tcp", "udp"]].unwrap();
        let encoder = CategoricalEncoder::fit(&train, "label").unwrap();

        let other = df!["proto" => [Some("tcp"), Some("gre"), None]].unwrap();
        let encoded = encoder.transform(other).unwrap();
        let col = encoded.column("proto").unwrap();
        assert_eq!(col.null_count(), 2);
        assert_eq!(col.u32().unwrap().get(0), Some(0));
    }

    #[test]
    fn test_mapping_is_deterministic() {
        let df = df!["proto" => ["b", "a", "c", "a"]].unwrap();
        let e1 = CategoricalEncoder::fit(&df, "label").unwrap();
        let e2 = CategoricalEncoder::fit(&df, "label").unwrap();
        assert_eq!(e1.mappings(), e2.mappings());
    }
}
