use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Customer not found: {code}")]
    CustomerNotFound { code: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Core error: {0}")]
    Core(#[from] reco_core::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

pub type Result<T> = std::result::Result<T, EngineError>;
