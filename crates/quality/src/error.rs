use thiserror::Error;

#[derive(Error, Debug)]
pub enum QualityError {
    #[error("Audit entry not found: {audit_id}")]
    AuditNotFound { audit_id: String },

    #[error("Unknown gating policy: {name}")]
    UnknownPolicy { name: String },

    #[error("Validation error: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

pub type Result<T> = std::result::Result<T, QualityError>;
