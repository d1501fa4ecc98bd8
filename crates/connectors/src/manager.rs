//! Process-wide connector registry.
//!
//! Connectors are registered once at startup and synced by name; the
//! manager keeps the last sync result and cursor per connector.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::info;

use crate::connector::SourceConnector;
use crate::error::{ConnectorError, Result};
use crate::types::{ConnectorState, SyncResult};

/// Named registry of connectors with sync bookkeeping.
#[derive(Default)]
pub struct ConnectorManager {
    connectors: DashMap<String, Arc<Mutex<Box<dyn SourceConnector>>>>,
    last_results: DashMap<String, SyncResult>,
    cursors: DashMap<String, DateTime<Utc>>,
}

impl ConnectorManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connector under a unique name. Registration happens at
    /// startup, before any sync observes the registry.
    pub fn register(&self, name: impl Into<String>, connector: Box<dyn SourceConnector>) {
        let name = name.into();
        info!(name = %name, kind = %connector.kind(), "registering connector");
        self.connectors
            .insert(name, Arc::new(Mutex::new(connector)));
    }

    pub fn names(&self) -> Vec<String> {
        self.connectors.iter().map(|e| e.key().clone()).collect()
    }

    /// Current state snapshot of one connector.
    pub async fn state(&self, name: &str) -> Result<ConnectorState> {
        let connector = self.get(name)?;
        let guard = connector.lock().await;
        Ok(ConnectorState {
            name: name.to_string(),
            kind: guard.kind(),
            status: guard.status(),
            last_sync: self.last_results.get(name).map(|r| r.timestamp),
            last_error: self
                .last_results
                .get(name)
                .and_then(|r| r.errors.first().cloned()),
        })
    }

    /// Sync one connector; the stored cursor from the previous sync is used
    /// for incremental pulls and updated from the result.
    pub async fn sync(&self, name: &str, batch_id: &str) -> Result<SyncResult> {
        let connector = self.get(name)?;
        let last_sync = self.cursors.get(name).map(|c| *c);

        let result = {
            let mut guard = connector.lock().await;
            guard.sync(batch_id, last_sync).await
        };

        if let Some(cursor) = result.next_cursor {
            self.cursors.insert(name.to_string(), cursor);
        }
        self.last_results.insert(name.to_string(), result.clone());
        Ok(result)
    }

    /// Sync every registered connector sequentially; per-connector failures
    /// land in their own results.
    pub async fn sync_all(&self, batch_id: &str) -> HashMap<String, SyncResult> {
        let mut results = HashMap::new();
        for name in self.names() {
            if let Ok(result) = self.sync(&name, batch_id).await {
                results.insert(name, result);
            }
        }
        results
    }

    pub fn last_result(&self, name: &str) -> Option<SyncResult> {
        self.last_results.get(name).map(|r| r.clone())
    }

    fn get(&self, name: &str) -> Result<Arc<Mutex<Box<dyn SourceConnector>>>> {
        self.connectors
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ConnectorError::UnknownConnector {
                name: name.to_string(),
            })
    }
}
