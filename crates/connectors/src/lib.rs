//! Source connectors: polymorphic pull of foreign operational data into the
//! raw staging tables.

pub mod connector;
pub mod error;
pub mod file_export;
pub mod manager;
pub mod types;

pub use connector::{CanonicalBatch, SourceConnector};
pub use error::{ConnectorError, Result};
pub use file_export::FileExportConnector;
pub use manager::ConnectorManager;
pub use types::{ConnectorKind, ConnectorState, ConnectorStatus, SourceKind, SyncResult};
