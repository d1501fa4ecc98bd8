//! Transform pipeline orchestration: raw staging to clean tables and
//! master profiles.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use super::dedup;
use super::loader::{CleanRepository, TransformLoader};
use super::profile::ProfileBuilder;
use super::resolver::AliasResolver;
use crate::ingestion::{ContactRecord, CustomerRecord, FileType, SalesLineRecord, StagingRepository};

/// Structured counters and errors for one transform run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransformPipelineStatus {
    pub customers_deduped: usize,
    pub customers_loaded: usize,
    pub order_lines_loaded: usize,
    pub order_lines_unresolved: usize,
    pub order_lines_duplicated: usize,
    pub contact_events_loaded: usize,
    pub master_profiles_built: usize,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TransformPipelineStatus {
    pub fn duration_seconds(&self) -> Option<f64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 1000.0),
            _ => None,
        }
    }
}

/// Runs the staged transform over one ingestion batch.
///
/// Each stage appends its counters to the status; a stage failure is recorded
/// and later stages still run unless their required input is empty. The run
/// succeeds iff no stage-level error was appended.
pub struct TransformOrchestrator {
    staging: Arc<dyn StagingRepository>,
    clean: Arc<dyn CleanRepository>,
    batch_id: String,
    status: TransformPipelineStatus,
}

impl TransformOrchestrator {
    pub fn new(staging: Arc<dyn StagingRepository>, clean: Arc<dyn CleanRepository>) -> Self {
        Self {
            staging,
            clean,
            batch_id: Uuid::new_v4().to_string(),
            status: TransformPipelineStatus::default(),
        }
    }

    /// The transform run's own batch id (distinct from the ingestion batch).
    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    pub async fn run(
        mut self,
        ingestion_batch_id: &str,
        skip_master_profiles: bool,
    ) -> (TransformPipelineStatus, bool) {
        self.status.started_at = Some(Utc::now());
        info!(
            batch_id = %self.batch_id,
            ingestion_batch_id,
            "starting transform pipeline"
        );

        let loader = TransformLoader::new(self.clean.as_ref());

        // Stage A: deduplicate customers.
        let deduped = match self.fetch_customers(ingestion_batch_id).await {
            Ok(rows) => {
                let deduped = dedup::deduplicate(rows);
                self.status.customers_deduped = deduped.len();
                info!(unique = deduped.len(), "customer deduplication complete");
                deduped
            }
            Err(e) => {
                error!(error = %e, "failed to fetch raw customers");
                self.status.errors.push(format!("customers: {}", e));
                Vec::new()
            }
        };

        // Stage B: load customers.
        if !deduped.is_empty() {
            match loader.load_customers(&deduped, &self.batch_id).await {
                Ok(loaded) => self.status.customers_loaded = loaded,
                Err(e) => self.status.errors.push(format!("customer load: {}", e)),
            }
        }

        // Stage C: load order lines through the alias cache.
        match self.fetch_sales_lines(ingestion_batch_id).await {
            Ok(lines) if !lines.is_empty() => {
                let mut resolver = AliasResolver::new();
                match self.clean.load_aliases().await {
                    Ok(aliases) => resolver.load(aliases),
                    Err(e) => self.status.errors.push(format!("alias load: {}", e)),
                }

                if resolver.is_loaded() {
                    match loader
                        .load_order_lines(&lines, &resolver, &self.batch_id)
                        .await
                    {
                        Ok(stats) => {
                            self.status.order_lines_loaded = stats.loaded;
                            self.status.order_lines_unresolved = stats.unresolved;
                            self.status.order_lines_duplicated = stats.duplicates;
                            if stats.unresolved > 0 {
                                self.status.warnings.push(format!(
                                    "{} order lines skipped: unresolved product alias",
                                    stats.unresolved
                                ));
                            }
                        }
                        Err(e) => self.status.errors.push(format!("order lines: {}", e)),
                    }
                }
            }
            Ok(_) => {}
            Err(e) => self.status.errors.push(format!("order lines: {}", e)),
        }

        // Stage D: load contact events.
        match self.fetch_contacts(ingestion_batch_id).await {
            Ok(contacts) if !contacts.is_empty() => {
                match loader.load_contact_events(&contacts).await {
                    Ok(loaded) => self.status.contact_events_loaded = loaded,
                    Err(e) => self.status.errors.push(format!("contact events: {}", e)),
                }
            }
            Ok(_) => {}
            Err(e) => self.status.errors.push(format!("contact events: {}", e)),
        }

        // Stage E: build master profiles.
        if !skip_master_profiles {
            let builder = ProfileBuilder::new(self.clean.as_ref());
            match builder.build_all().await {
                Ok(built) => self.status.master_profiles_built = built,
                Err(e) => self.status.errors.push(format!("master profiles: {}", e)),
            }
        }

        self.status.finished_at = Some(Utc::now());
        let success = self.status.errors.is_empty();
        info!(
            batch_id = %self.batch_id,
            customers = self.status.customers_loaded,
            order_lines = self.status.order_lines_loaded,
            contacts = self.status.contact_events_loaded,
            profiles = self.status.master_profiles_built,
            errors = self.status.errors.len(),
            success,
            "transform pipeline finished"
        );

        (self.status, success)
    }

    async fn fetch_customers(&self, ingestion_batch_id: &str) -> crate::error::Result<Vec<CustomerRecord>> {
        let rows = self
            .staging
            .fetch_raw_rows(FileType::Customers, ingestion_batch_id)
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|value| serde_json::from_value(value).ok())
            .collect())
    }

    async fn fetch_sales_lines(&self, ingestion_batch_id: &str) -> crate::error::Result<Vec<SalesLineRecord>> {
        let rows = self
            .staging
            .fetch_raw_rows(FileType::SalesLines, ingestion_batch_id)
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|value| serde_json::from_value(value).ok())
            .collect())
    }

    async fn fetch_contacts(&self, ingestion_batch_id: &str) -> crate::error::Result<Vec<ContactRecord>> {
        let rows = self
            .staging
            .fetch_raw_rows(FileType::Contacts, ingestion_batch_id)
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|value| serde_json::from_value(value).ok())
            .collect())
    }
}
