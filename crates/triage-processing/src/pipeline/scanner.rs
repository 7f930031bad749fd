//! First pass: corpus statistics gathering.
//!
//! Walks every input file in sorted order and every chunk in file order,
//! feeding each chunk to the statistics engine. The pass is read-only: no
//! rows are filtered and nothing is written. A file that cannot be opened is
//! logged and excluded; an unreadable chunk is logged and skipped without
//! aborting the file.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::error::Result;
use crate::io::ChunkedCsvReader;
use crate::stats::{CorpusStatistics, CorpusSummary};

/// Outcome of the first pass.
#[derive(Debug)]
pub struct FirstPassOutcome {
    /// Finalized, immutable corpus statistics.
    pub summary: CorpusSummary,
    pub files_scanned: usize,
    pub files_skipped: usize,
    pub chunks_merged: usize,
}

/// Run the statistics pass over `files`.
///
/// `files` must already be in the deterministic order produced by
/// [`crate::io::collect_input_files`]; the same order is re-used by the
/// second pass.
pub fn run_first_pass(
    files: &[PathBuf],
    chunk_size: usize,
    distinct_cap: usize,
) -> Result<FirstPassOutcome> {
    info!("Starting first pass: computing corpus statistics...");

    let mut stats = CorpusStatistics::new(distinct_cap);
    let mut files_scanned = 0usize;
    let mut files_skipped = 0usize;
    let mut chunks_merged = 0usize;

    for file in files {
        let mut reader = match ChunkedCsvReader::open(file, chunk_size) {
            Ok(reader) => reader,
            Err(e) => {
                warn!("Skipping unreadable file {}: {}", file.display(), e);
                files_skipped += 1;
                continue;
            }
        };

        loop {
            match reader.next_chunk() {
                Ok(Some(chunk)) => {
                    if let Err(e) = stats.merge_chunk(&chunk) {
                        warn!("Error merging chunk from {}: {}", file.display(), e);
                        continue;
                    }
                    chunks_merged += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Error reading chunk from {}: {}", file.display(), e);
                    break;
                }
            }
        }

        files_scanned += 1;
        info!(
            "Scanned {} ({} rows so far)",
            file.display(),
            stats.total_rows()
        );
    }

    let summary = stats.finalize();
    info!(
        "First pass completed: {} rows, {} columns across {} files",
        summary.total_rows(),
        summary.column_names().count(),
        files_scanned
    );

    Ok(FirstPassOutcome {
        summary,
        files_scanned,
        files_skipped,
        chunks_merged,
    })
}
