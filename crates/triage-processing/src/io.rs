//! Chunked CSV input and incremental CSV output.
//!
//! Input files are read as a stream of bounded-size chunks so the corpus
//! never has to fit in memory. Every chunk is materialized as an all-string
//! polars DataFrame: type decisions belong to the statistics engine, not the
//! reader, and string-typed frames keep a file's inconsistent cell contents
//! from poisoning schema inference (the same reason the source read with
//! `low_memory=False` and coerced later).

use polars::prelude::*;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{ProcessingError, Result};

/// Cell contents treated as missing at ingestion time.
const MISSING_MARKERS: [&str; 7] = ["", "nan", "null", "none", "na", "n/a", "#n/a"];

/// Whether a raw cell denotes a missing value.
pub fn is_missing_marker(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || MISSING_MARKERS.contains(&trimmed.to_ascii_lowercase().as_str())
}

/// Streaming reader yielding chunks of at most `chunk_size` rows.
pub struct ChunkedCsvReader {
    reader: csv::Reader<File>,
    headers: Vec<String>,
    chunk_size: usize,
    path: PathBuf,
    exhausted: bool,
}

impl ChunkedCsvReader {
    /// Open a CSV file for chunked reading.
    ///
    /// The reader is flexible about ragged rows: short rows are padded with
    /// missing values and long rows are truncated to the header width, as
    /// these exports routinely contain both.
    pub fn open(path: impl AsRef<Path>, chunk_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&path)?;

        let headers = dedup_headers(
            reader
                .headers()?
                .iter()
                .map(|h| h.trim().to_string())
                .collect(),
        );

        Ok(Self {
            reader,
            headers,
            chunk_size,
            path,
            exhausted: false,
        })
    }

    /// Column names of this file, in file order.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Read the next chunk, or `None` once the file is exhausted.
    ///
    /// A row that fails to decode is logged and skipped; the rest of the
    /// file is still read.
    pub fn next_chunk(&mut self) -> Result<Option<DataFrame>> {
        if self.exhausted {
            return Ok(None);
        }

        let width = self.headers.len();
        let mut columns: Vec<Vec<Option<String>>> = vec![Vec::new(); width];
        let mut rows = 0usize;

        while rows < self.chunk_size {
            let mut record = csv::StringRecord::new();
            match self.reader.read_record(&mut record) {
                Ok(true) => {}
                Ok(false) => {
                    self.exhausted = true;
                    break;
                }
                Err(e) => {
                    warn!("Skipping unreadable row in {}: {}", self.path.display(), e);
                    continue;
                }
            }

            for (idx, column) in columns.iter_mut().enumerate() {
                let cell = record.get(idx).unwrap_or("");
                if is_missing_marker(cell) {
                    column.push(None);
                } else {
                    column.push(Some(cell.trim().to_string()));
                }
            }
            rows += 1;
        }

        if rows == 0 {
            return Ok(None);
        }

        let series: Vec<Column> = self
            .headers
            .iter()
            .zip(columns)
            .map(|(name, values)| Series::new(name.as_str().into(), values).into_column())
            .collect();

        let df = DataFrame::new(series)?;
        debug!(
            "Read chunk of {} rows from {}",
            df.height(),
            self.path.display()
        );
        Ok(Some(df))
    }
}

/// Make header names unique; exports occasionally repeat a column name.
fn dedup_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    headers
        .into_iter()
        .map(|h| {
            let count = seen.entry(h.clone()).or_insert(0);
            *count += 1;
            if *count == 1 { h } else { format!("{}_{}", h, count) }
        })
        .collect()
}

/// Collect the CSV files to process, in a deterministic order.
///
/// A directory expands to its `.csv` entries; explicit files are kept as
/// given. The result is sorted so repeated runs visit files identically.
pub fn collect_input_files(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            for entry in std::fs::read_dir(input)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) == Some("csv") {
                    files.push(path);
                }
            }
        } else {
            files.push(input.clone());
        }
    }
    files.sort();
    Ok(files)
}

/// Incremental CSV writer: header on the first append, bare rows afterwards.
pub struct IncrementalCsvWriter {
    path: PathBuf,
    rows_written: usize,
}

impl IncrementalCsvWriter {
    /// Create a writer for `path`, truncating any previous file.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(Self {
            path,
            rows_written: 0,
        })
    }

    /// Append a chunk. Empty chunks are ignored.
    pub fn append(&mut self, df: &DataFrame) -> Result<()> {
        if df.height() == 0 {
            return Ok(());
        }

        let first_write = self.rows_written == 0;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut out = df.clone();
        CsvWriter::new(&mut file)
            .include_header(first_write)
            .finish(&mut out)?;

        self.rows_written += df.height();
        Ok(())
    }

    /// Total rows appended so far.
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Remove the output file; used when a stage fails after opening it.
    pub fn discard(self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

/// Load a finalized table produced by an earlier stage.
///
/// Unlike chunk reading, this lets polars infer column types: by this point
/// the table has one consistent schema.
pub fn read_table(path: impl AsRef<Path>) -> Result<DataFrame> {
    let path = path.as_ref();
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(1000))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()
        .map_err(ProcessingError::from)
}

/// Concatenate per-source cleaned tables into one corpus.
///
/// When `time_column` is present in the merged table, rows are sorted by it
/// so downstream sequence analysis sees events in order.
pub fn merge_tables(paths: &[PathBuf], time_column: Option<&str>) -> Result<DataFrame> {
    if paths.is_empty() {
        return Err(ProcessingError::EmptyResult {
            stage: "merge".to_string(),
            reason: "no input tables".to_string(),
        });
    }

    let mut merged: Option<DataFrame> = None;
    for path in paths {
        let df = read_table(path)?;
        merged = Some(match merged {
            Some(acc) => acc.vstack(&df)?,
            None => df,
        });
    }
    let Some(mut merged) = merged else {
        return Err(ProcessingError::EmptyResult {
            stage: "merge".to_string(),
            reason: "no tables could be read".to_string(),
        });
    };

    if let Some(column) = time_column
        && merged.get_column_names().iter().any(|c| c.as_str() == column)
    {
        merged = merged.sort([column], SortMultipleOptions::default())?;
    }

    Ok(merged)
}
