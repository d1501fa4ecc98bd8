//! The connector contract: every source implements the same capability set
//! and inherits the standard extract -> transform -> load sync cycle.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{error, info};

use reco_pipeline::ingestion::{ContactRecord, CustomerRecord, RawRow, SalesLineRecord};

use crate::error::{ConnectorError, Result};
use crate::types::{ConnectorKind, ConnectorStatus, SourceKind, SyncResult};

/// Canonical records produced by a connector's transform step, grouped by
/// target staging table.
#[derive(Debug, Default)]
pub struct CanonicalBatch {
    pub customers: Vec<CustomerRecord>,
    pub sales_lines: Vec<SalesLineRecord>,
    pub contacts: Vec<ContactRecord>,
    /// Source kinds that were extracted but have no staging sink.
    pub unsupported: Vec<SourceKind>,
}

impl CanonicalBatch {
    pub fn is_empty(&self) -> bool {
        self.customers.is_empty() && self.sales_lines.is_empty() && self.contacts.is_empty()
    }
}

/// A polymorphic data source.
///
/// Implementations provide extract/transform/load; the sync cycle and the
/// status state machine are shared. All failures are folded into the
/// returned `SyncResult`, never raised out of `sync`.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    fn kind(&self) -> ConnectorKind;

    /// Config keys this connector refuses to start without.
    fn required_config_keys(&self) -> &'static [&'static str];

    fn config(&self) -> &HashMap<String, String>;

    fn status(&self) -> ConnectorStatus;

    fn set_status(&mut self, status: ConnectorStatus);

    /// Verify all required keys are present and non-empty.
    fn validate_config(&self) -> Result<()> {
        for key in self.required_config_keys() {
            match self.config().get(*key) {
                Some(value) if !value.trim().is_empty() => {}
                _ => {
                    return Err(ConnectorError::MissingConfig {
                        key: (*key).to_string(),
                    })
                }
            }
        }
        Ok(())
    }

    /// Probe the source without moving data.
    async fn test_connection(&self) -> Result<bool>;

    /// Pull raw records per source kind. `last_sync` enables incremental
    /// pulls on temporal sources.
    async fn extract(
        &self,
        last_sync: Option<DateTime<Utc>>,
    ) -> Result<(HashMap<SourceKind, Vec<RawRow>>, Option<DateTime<Utc>>)>;

    /// Project raw records into canonical staging records.
    fn transform(&self, raw: HashMap<SourceKind, Vec<RawRow>>) -> Result<CanonicalBatch>;

    /// Persist the canonical batch into raw staging; returns per-table
    /// loaded counts.
    async fn load(&self, batch: &CanonicalBatch, batch_id: &str)
        -> Result<HashMap<String, usize>>;

    /// Full extract -> transform -> load cycle with status bookkeeping.
    async fn sync(&mut self, batch_id: &str, last_sync: Option<DateTime<Utc>>) -> SyncResult {
        let started = std::time::Instant::now();
        self.set_status(ConnectorStatus::Syncing);
        info!(connector = %self.kind(), batch_id, "starting sync");

        let result = async {
            let (raw, next_cursor) = self.extract(last_sync).await?;
            let batch = self.transform(raw)?;
            let records_processed = self.load(&batch, batch_id).await?;
            Ok::<_, ConnectorError>((batch, records_processed, next_cursor))
        }
        .await;

        match result {
            Ok((batch, records_processed, next_cursor)) => {
                self.set_status(ConnectorStatus::Healthy);
                let warnings = batch
                    .unsupported
                    .iter()
                    .map(|kind| format!("no staging sink for source kind: {}", kind))
                    .collect();
                let sync_result = SyncResult {
                    success: true,
                    connector: self.kind(),
                    timestamp: Utc::now(),
                    records_processed,
                    errors: Vec::new(),
                    warnings,
                    next_cursor,
                    duration_seconds: started.elapsed().as_secs_f64(),
                };
                info!(
                    connector = %self.kind(),
                    batch_id,
                    duration = format!("{:.1}s", sync_result.duration_seconds),
                    "sync completed"
                );
                sync_result
            }
            Err(e) => {
                self.set_status(ConnectorStatus::Error);
                error!(connector = %self.kind(), batch_id, error = %e, "sync failed");
                SyncResult::failure(
                    self.kind(),
                    format!("Sync failed: {}", e),
                    started.elapsed().as_secs_f64(),
                )
            }
        }
    }
}
