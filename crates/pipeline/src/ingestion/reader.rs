//! CSV readers with UTF-8 enforcement.

use std::path::Path;

use tracing::info;

use super::normalize::normalize_column_name;
use super::schema::RawRow;
use crate::error::{PipelineError, Result};

/// Generic CSV reader producing raw rows keyed by normalized column name.
pub struct CsvReader;

impl CsvReader {
    /// Read a whole CSV file. The header row is required; column names are
    /// normalized (lowercase, underscores). Non-UTF-8 content aborts the
    /// batch with `FileEncoding`.
    pub fn read(path: &Path) -> Result<Vec<RawRow>> {
        if !path.exists() {
            return Err(PipelineError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| Self::map_csv_error(e, path))?
            .iter()
            .map(normalize_column_name)
            .collect();

        if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
            return Err(PipelineError::EmptyFile {
                path: path.to_path_buf(),
            });
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| Self::map_csv_error(e, path))?;
            let row: RawRow = headers
                .iter()
                .zip(record.iter())
                .map(|(header, value)| (header.clone(), value.to_string()))
                .collect();
            rows.push(row);
        }

        info!(rows = rows.len(), path = %path.display(), "read csv file");
        Ok(rows)
    }

    fn map_csv_error(error: csv::Error, path: &Path) -> PipelineError {
        if matches!(error.kind(), csv::ErrorKind::Utf8 { .. }) {
            PipelineError::FileEncoding {
                path: path.to_path_buf(),
            }
        } else {
            PipelineError::Csv(error)
        }
    }
}
