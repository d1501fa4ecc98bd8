use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("Missing required config key: {key}")]
    MissingConfig { key: String },

    #[error("Connector unreachable: {message}")]
    Unreachable { message: String },

    #[error("Unknown connector: {name}")]
    UnknownConnector { name: String },

    #[error("Extract failed: {message}")]
    Extract { message: String },

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] reco_pipeline::PipelineError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConnectorError>;
