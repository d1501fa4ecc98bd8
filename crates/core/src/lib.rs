pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod model;
pub mod types;

pub use crate::config::{AppConfig, Config, DatabaseConfig, RecoConfig};
pub use crate::database::Database;
pub use crate::error::{Error, Result};
pub use crate::logging::init_tracing;
pub use crate::model::*;
pub use crate::types::*;

// Re-export commonly used types from dependencies
pub use chrono::{DateTime, NaiveDate, Utc};
pub use uuid::Uuid;
