//! Online column statistics.
//!
//! This module provides the per-column accumulator and the corpus-wide
//! engine that owns one accumulator per observed column.

mod accumulator;
mod corpus;

pub use accumulator::{ColumnAccumulator, ColumnKind, ColumnSummary};
pub use corpus::{CorpusStatistics, CorpusSummary};
