//! CSV file feed

use std::path::{Path, PathBuf};

use serde_json::Value;

use super::{RawItem, SourceKind};
use crate::error::{IngestError, Result};

/// Reads every row of a headed CSV file as a JSON object
///
/// Cells are kept as strings; empty cells become `null`.
#[derive(Debug, Clone)]
pub struct CsvReader {
    path: PathBuf,
}

impl CsvReader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn read(&self) -> Result<Vec<RawItem>> {
        if !self.path.exists() {
            return Err(IngestError::unavailable(
                SourceKind::Csv,
                format!("file not found: {}", self.path.display()),
            ));
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::Headers)
            .from_path(&self.path)
            .map_err(|e| csv_error(&self.path, e))?;

        let headers = reader.headers().map_err(|e| csv_error(&self.path, e))?.clone();
        if headers.is_empty() {
            return Err(IngestError::format(SourceKind::Csv, "missing header row"));
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| csv_error(&self.path, e))?;
            let row: RawItem = headers
                .iter()
                .zip(record.iter())
                .map(|(name, cell)| {
                    let value = if cell.trim().is_empty() {
                        Value::Null
                    } else {
                        Value::String(cell.to_string())
                    };
                    (name.to_string(), value)
                })
                .collect();
            rows.push(row);
        }

        tracing::debug!(path = %self.path.display(), count = rows.len(), "Read CSV rows");

        Ok(rows)
    }
}

fn csv_error(path: &Path, err: csv::Error) -> IngestError {
    if err.is_io_error() {
        IngestError::unavailable(SourceKind::Csv, format!("{}: {}", path.display(), err))
    } else {
        IngestError::format(SourceKind::Csv, format!("{}: {}", path.display(), err))
    }
}
