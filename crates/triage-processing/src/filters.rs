//! Per-log-type row predicates.
//!
//! Each log source carries its own keep/drop policy (firewall exports keep
//! only threat records, proxy exports drop allowed traffic, and so on).
//! Rather than branching on a log-type string, the policies are a closed set
//! of serde-deserializable predicate variants attached to a [`LogTypeProfile`]
//! and resolved through a lookup table, so new sources are configuration
//! rather than code.

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;

/// A single row predicate over one column.
///
/// String comparisons are case-insensitive and trimmed. A predicate whose
/// column is absent from the chunk keeps every row; a missing value fails
/// `Equals`/`NotEmpty`/`Contains` and passes `NotEquals`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RowFilter {
    /// Keep rows where `column` equals `value`.
    Equals { column: String, value: String },
    /// Keep rows where `column` differs from `value`.
    NotEquals { column: String, value: String },
    /// Keep rows where `column` is present and non-blank.
    NotEmpty { column: String },
    /// Keep rows where `column` contains `value` as a substring.
    Contains { column: String, value: String },
    /// Keep rows matching at least one of the nested predicates.
    AnyOf { filters: Vec<RowFilter> },
}

impl RowFilter {
    /// Evaluate the predicate against a chunk, producing a keep-mask.
    pub fn mask(&self, df: &DataFrame) -> Result<BooleanChunked> {
        match self {
            RowFilter::Equals { column, value } => {
                column_mask(df, column, |v| match v {
                    Some(s) => s.trim().eq_ignore_ascii_case(value),
                    None => false,
                })
            }
            RowFilter::NotEquals { column, value } => {
                column_mask(df, column, |v| match v {
                    Some(s) => !s.trim().eq_ignore_ascii_case(value),
                    None => true,
                })
            }
            RowFilter::NotEmpty { column } => column_mask(df, column, |v| match v {
                Some(s) => !s.trim().is_empty(),
                None => false,
            }),
            RowFilter::Contains { column, value } => {
                let needle = value.to_ascii_lowercase();
                column_mask(df, column, move |v| match v {
                    Some(s) => s.to_ascii_lowercase().contains(&needle),
                    None => false,
                })
            }
            RowFilter::AnyOf { filters } => {
                let mut combined: Option<BooleanChunked> = None;
                for filter in filters {
                    let mask = filter.mask(df)?;
                    combined = Some(match combined {
                        Some(acc) => acc | mask,
                        None => mask,
                    });
                }
                Ok(combined
                    .unwrap_or_else(|| all_rows_mask(df.height(), true)))
            }
        }
    }
}

/// Build a mask from a per-value closure over one column.
///
/// A chunk without the column keeps all rows, matching the source policy of
/// filtering only when the field is available.
fn column_mask<F>(df: &DataFrame, column: &str, predicate: F) -> Result<BooleanChunked>
where
    F: Fn(Option<&str>) -> bool,
{
    let Ok(col) = df.column(column) else {
        return Ok(all_rows_mask(df.height(), true));
    };

    let series = col.as_materialized_series().cast(&DataType::String)?;
    let ca = series.str()?;
    let values: Vec<bool> = ca.into_iter().map(predicate).collect();
    Ok(BooleanChunked::from_slice("mask".into(), &values))
}

fn all_rows_mask(len: usize, value: bool) -> BooleanChunked {
    BooleanChunked::from_slice("mask".into(), &vec![value; len])
}

/// Policy bundle for one log source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogTypeProfile {
    /// Source tag written into the output's `log_type` column.
    pub name: String,
    /// Timestamp column for this source, when known.
    pub time_column: Option<String>,
    /// Row predicates, all of which must hold for a row to survive.
    pub filters: Vec<RowFilter>,
}

impl LogTypeProfile {
    /// A profile with no filtering (every row kept).
    pub fn passthrough(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            time_column: None,
            filters: Vec::new(),
        }
    }

    /// Combined keep-mask for a chunk.
    pub fn keep_mask(&self, df: &DataFrame) -> Result<BooleanChunked> {
        let mut combined = all_rows_mask(df.height(), true);
        for filter in &self.filters {
            combined = combined & filter.mask(df)?;
        }
        Ok(combined)
    }
}

/// Built-in profiles for the supported sources.
///
/// Firewall keeps threat records; proxy drops allowed traffic; xdr requires
/// a populated `_table`; mail keeps message events or failed TLS checks.
pub fn default_profiles() -> HashMap<String, LogTypeProfile> {
    let mut profiles = HashMap::new();

    profiles.insert(
        "firewall".to_string(),
        LogTypeProfile {
            name: "firewall".to_string(),
            time_column: Some("receive_time".to_string()),
            filters: vec![RowFilter::Equals {
                column: "type".to_string(),
                value: "threat".to_string(),
            }],
        },
    );

    profiles.insert(
        "proxy".to_string(),
        LogTypeProfile {
            name: "proxy".to_string(),
            time_column: Some("datetime".to_string()),
            filters: vec![RowFilter::NotEquals {
                column: "action".to_string(),
                value: "allow".to_string(),
            }],
        },
    );

    profiles.insert(
        "xdr".to_string(),
        LogTypeProfile {
            name: "xdr".to_string(),
            time_column: Some("event_timestamp".to_string()),
            filters: vec![RowFilter::NotEmpty {
                column: "_table".to_string(),
            }],
        },
    );

    profiles.insert(
        "mail".to_string(),
        LogTypeProfile {
            name: "mail".to_string(),
            time_column: Some("fecha".to_string()),
            filters: vec![RowFilter::AnyOf {
                filters: vec![
                    RowFilter::Contains {
                        column: "evento".to_string(),
                        value: "message".to_string(),
                    },
                    RowFilter::NotEquals {
                        column: "tls.verify".to_string(),
                        value: "OK".to_string(),
                    },
                ],
            }],
        },
    );

    profiles
}

#[cfg(test)]
mod tests {
    use super::*;

    fn firewall_chunk() -> DataFrame {
        df![
            "type" => ["THREAT", "traffic", "threat", "config"],
            "bytes" => ["10", "20", "30", "40"],
        ]
        .unwrap()
    }

    #[test]
    fn test_equals_case_insensitive() {
        let df = firewall_chunk();
        let filter = RowFilter::Equals {
            column: "type".to_string(),
            value: "threat".to_string(),
        };
        let mask = filter.mask(&df).unwrap();
        let kept: Vec<bool> = mask.into_iter().map(|v| v.unwrap()).collect();
        assert_eq!(kept, vec![true, false, true, false]);
    }

    #[test]
    fn test_not_equals_keeps_missing_values() {
        let df = df![
            "action" => [Some("allow"), Some("deny"), None, Some("ALLOW")],
        ]
        .unwrap();
        let filter = RowFilter::NotEquals {
            column: "action".to_string(),
            value: "allow".to_string(),
        };
        let mask = filter.mask(&df).unwrap();
        let kept: Vec<bool> = mask.into_iter().map(|v| v.unwrap()).collect();
        assert_eq!(kept, vec![false, true, true, false]);
    }

    #[test]
    fn test_not_empty() {
        let df = df![
            "_table" => [Some("alerts"), Some("  "), None, Some("edr")],
        ]
        .unwrap();
        let filter = RowFilter::NotEmpty {
            column: "_table".to_string(),
        };
        let mask = filter.mask(&df).unwrap();
        let kept: Vec<bool> = mask.into_iter().map(|v| v.unwrap()).collect();
        assert_eq!(kept, vec![true, false, false, true]);
    }

    #[test]
    fn test_missing_column_keeps_all_rows() {
        let df = firewall_chunk();
        let filter = RowFilter::Equals {
            column: "no_such_column".to_string(),
            value: "x".to_string(),
        };
        let mask = filter.mask(&df).unwrap();
        assert_eq!(mask.sum(), Some(4));
    }

    #[test]
    fn test_any_of_combines_with_or() {
        let df = df![
            "evento" => [Some("message sent"), Some("login"), Some("bounce"), None],
            "tls.verify" => [Some("OK"), Some("FAIL"), Some("OK"), Some("OK")],
        ]
        .unwrap();
        let profile = default_profiles().remove("mail").unwrap();
        let mask = profile.keep_mask(&df).unwrap();
        let kept: Vec<bool> = mask.into_iter().map(|v| v.unwrap()).collect();
        // row 0: message event; row 1: TLS not OK; rows 2-3: neither
        assert_eq!(kept, vec![true, true, false, false]);
    }

    #[test]
    fn test_profile_filters_are_conjunctive() {
        let df = df![
            "type" => ["threat", "threat", "traffic"],
            "subtype" => ["spyware", "", "spyware"],
        ]
        .unwrap();
        let profile = LogTypeProfile {
            name: "firewall".to_string(),
            time_column: None,
            filters: vec![
                RowFilter::Equals {
                    column: "type".to_string(),
                    value: "threat".to_string(),
                },
                RowFilter::NotEmpty {
                    column: "subtype".to_string(),
                },
            ],
        };
        let mask = profile.keep_mask(&df).unwrap();
        let kept: Vec<bool> = mask.into_iter().map(|v| v.unwrap()).collect();
        assert_eq!(kept, vec![true, false, false]);
    }

    #[test]
    fn test_filter_spec_round_trip() {
        let json = r#"{"op":"not_equals","column":"action","value":"allow"}"#;
        let filter: RowFilter = serde_json::from_str(json).unwrap();
        assert_eq!(
            filter,
            RowFilter::NotEquals {
                column: "action".to_string(),
                value: "allow".to_string(),
            }
        );

        let back = serde_json::to_string(&filter).unwrap();
        let reparsed: RowFilter = serde_json::from_str(&back).unwrap();
        assert_eq!(filter, reparsed);
    }

    #[test]
    fn test_default_profiles_cover_known_sources() {
        let profiles = default_profiles();
        for name in ["firewall", "proxy", "xdr", "mail"] {
            assert!(profiles.contains_key(name), "missing profile for {name}");
        }
    }
}
