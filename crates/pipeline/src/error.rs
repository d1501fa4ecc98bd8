use std::path::PathBuf;
use thiserror::Error;

/// Pipeline-level errors (ingestion and transform).
///
/// Row-level problems are never surfaced through this type; they are captured
/// as `IngestionError` entries on the batch report. Only unrecoverable
/// failures (missing file, bad encoding, storage faults) travel here.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("File encoding error: {path}: expected UTF-8")]
    FileEncoding { path: PathBuf },

    #[error("CSV file is empty or has no headers: {path}")]
    EmptyFile { path: PathBuf },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Core error: {0}")]
    Core(#[from] reco_core::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl PipelineError {
    /// True when the failure aborts the whole batch (I/O level).
    pub fn is_batch_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::FileNotFound { .. }
                | PipelineError::FileEncoding { .. }
                | PipelineError::EmptyFile { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
