#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Append-only CSV result files.
//!
//! A [`ResultSink`] remembers which files it has started during the current
//! run. The first row written to a file truncates it and writes the header;
//! every later row is appended. Files adopted from a previous run (see
//! [`ResultSink::adopt`]) are appended to from the start.
//!
//! Write failures are logged and swallowed so that one bad row never aborts
//! a crawl or a scrape.

pub mod paths;

use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Errors raised by file operations. Only [`read_column`] returns them;
/// [`ResultSink`] logs them instead.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Filesystem error.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// CSV encoding or decoding error.
    #[error("CSV error in {path}: {source}")]
    Csv {
        /// Path that caused the error.
        path: String,
        /// Underlying CSV error.
        source: csv::Error,
    },
}

impl SinkError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }

    fn csv(path: &Path, source: csv::Error) -> Self {
        Self::Csv {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Tabular writer with truncate-once-per-run semantics.
#[derive(Debug, Default)]
pub struct ResultSink {
    started: BTreeSet<PathBuf>,
}

impl ResultSink {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            started: BTreeSet::new(),
        }
    }

    /// Marks `path` as already started so that rows are appended to the
    /// existing content.
    pub fn adopt(&mut self, path: &Path) {
        self.started.insert(path.to_path_buf());
    }

    /// Whether `path` has been written to or adopted during this run.
    #[must_use]
    pub fn is_started(&self, path: &Path) -> bool {
        self.started.contains(path)
    }

    /// Every file written to or adopted during this run, in path order.
    pub fn touched_paths(&self) -> impl Iterator<Item = &Path> {
        self.started.iter().map(PathBuf::as_path)
    }

    /// Forgets every started file.
    pub fn reset(&mut self) {
        self.started.clear();
    }

    /// Writes one row to `path`.
    ///
    /// The parent directory is created if needed. Returns `false` (after
    /// logging) if the row could not be written.
    pub fn append_row<S: AsRef<[u8]>>(&mut self, path: &Path, header: &[&str], row: &[S]) -> bool {
        let first_touch = !self.started.contains(path);

        match write_row(path, header, row, first_touch) {
            Ok(()) => {
                if first_touch {
                    self.started.insert(path.to_path_buf());
                }
                true
            }
            Err(e) => {
                log::error!("Failed to save row: {e}");
                false
            }
        }
    }
}

fn write_row<S: AsRef<[u8]>>(
    path: &Path,
    header: &[&str],
    row: &[S],
    truncate: bool,
) -> Result<(), SinkError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        paths::ensure_dir(parent).map_err(|e| SinkError::io(parent, e))?;
    }

    let file = if truncate {
        File::create(path)
    } else {
        OpenOptions::new().create(true).append(true).open(path)
    }
    .map_err(|e| SinkError::io(path, e))?;

    let empty = file
        .metadata()
        .map_err(|e| SinkError::io(path, e))?
        .len()
        == 0;

    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(file);
    if empty {
        writer
            .write_record(header)
            .map_err(|e| SinkError::csv(path, e))?;
    }
    writer
        .write_record(row)
        .map_err(|e| SinkError::csv(path, e))?;
    writer.flush().map_err(|e| SinkError::io(path, e))
}

/// Reads the values of `column` from a CSV file with a header row.
///
/// Falls back to the first column when `column` is not in the header.
/// Malformed rows are skipped.
///
/// # Errors
///
/// Returns [`SinkError`] if the file cannot be opened or its header cannot
/// be read.
pub fn read_column(path: &Path, column: &str) -> Result<Vec<String>, SinkError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| SinkError::csv(path, e))?;

    let index = reader
        .headers()
        .map_err(|e| SinkError::csv(path, e))?
        .iter()
        .position(|h| h.trim() == column)
        .unwrap_or(0);

    let mut values = Vec::new();
    for record in reader.records() {
        match record {
            Ok(record) => {
                if let Some(value) = record.get(index).filter(|v| !v.is_empty()) {
                    values.push(value.to_owned());
                }
            }
            Err(e) => log::trace!("Skipping malformed row in {}: {e}", path.display()),
        }
    }

    Ok(values)
}
