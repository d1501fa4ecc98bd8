use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Kinds of supported source connectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorKind {
    /// CSV export drops from a PoS / ERP.
    FileExport,
    /// Remote ERP reached over RPC.
    ErpRpc,
    /// Manually curated uploads.
    Manual,
}

impl ConnectorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectorKind::FileExport => "file_export",
            ConnectorKind::ErpRpc => "erp_rpc",
            ConnectorKind::Manual => "manual",
        }
    }
}

impl fmt::Display for ConnectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source-side record kinds a connector may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Customers,
    Products,
    SalesLines,
    StockLevels,
    ContactHistory,
}

impl SourceKind {
    pub const ALL: [SourceKind; 5] = [
        SourceKind::Customers,
        SourceKind::Products,
        SourceKind::SalesLines,
        SourceKind::StockLevels,
        SourceKind::ContactHistory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Customers => "customers",
            SourceKind::Products => "products",
            SourceKind::SalesLines => "sales_lines",
            SourceKind::StockLevels => "stock_levels",
            SourceKind::ContactHistory => "contact_history",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connector lifecycle: CONFIGURING -> HEALTHY <-> SYNCING -> HEALTHY | ERROR.
/// Idle is represented by HEALTHY with no active work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorStatus {
    Configuring,
    Healthy,
    Syncing,
    Error,
}

impl ConnectorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectorStatus::Configuring => "configuring",
            ConnectorStatus::Healthy => "healthy",
            ConnectorStatus::Syncing => "syncing",
            ConnectorStatus::Error => "error",
        }
    }
}

impl fmt::Display for ConnectorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one extract -> transform -> load cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResult {
    pub success: bool,
    pub connector: ConnectorKind,
    pub timestamp: DateTime<Utc>,
    /// Per-table loaded record counts, e.g. {"raw_customers": 150}.
    pub records_processed: HashMap<String, usize>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Cursor for the next incremental pull, when the source is temporal.
    pub next_cursor: Option<DateTime<Utc>>,
    pub duration_seconds: f64,
}

impl SyncResult {
    pub fn failure(connector: ConnectorKind, error: String, duration_seconds: f64) -> Self {
        Self {
            success: false,
            connector,
            timestamp: Utc::now(),
            records_processed: HashMap::new(),
            errors: vec![error],
            warnings: Vec::new(),
            next_cursor: None,
            duration_seconds,
        }
    }
}

/// Connector status snapshot exposed by the manager.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectorState {
    pub name: String,
    pub kind: ConnectorKind,
    pub status: ConnectorStatus,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}
