//! Connector over CSV export drops from a PoS / ERP.
//!
//! Each source kind reads the most recent export file in the configured
//! directory whose name starts with the kind's prefix. Foreign column names
//! are normalized and mapped to the canonical header set before validation.
//! The file modification time acts as the incremental cursor.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use reco_pipeline::ingestion::{
    validate, CsvReader, FileType, RawRow, StagingRepository,
};

use crate::connector::{CanonicalBatch, SourceConnector};
use crate::error::{ConnectorError, Result};
use crate::types::{ConnectorKind, ConnectorStatus, SourceKind};

/// CSV-export connector writing into raw staging.
pub struct FileExportConnector {
    config: HashMap<String, String>,
    status: ConnectorStatus,
    staging: Arc<dyn StagingRepository>,
}

impl FileExportConnector {
    pub fn new(config: HashMap<String, String>, staging: Arc<dyn StagingRepository>) -> Self {
        Self {
            config,
            status: ConnectorStatus::Configuring,
            staging,
        }
    }

    fn export_dir(&self) -> PathBuf {
        PathBuf::from(self.config.get("export_dir").cloned().unwrap_or_default())
    }

    fn prefix_for(&self, kind: SourceKind) -> String {
        let key = format!("{}_prefix", kind.as_str());
        self.config
            .get(&key)
            .cloned()
            .unwrap_or_else(|| kind.as_str().to_string())
    }

    /// Newest CSV in the export dir matching the kind's prefix, with its
    /// modification time. Files at or before `last_sync` are ignored.
    fn latest_export(
        &self,
        kind: SourceKind,
        last_sync: Option<DateTime<Utc>>,
    ) -> Result<Option<(PathBuf, DateTime<Utc>)>> {
        let dir = self.export_dir();
        if !dir.is_dir() {
            return Err(ConnectorError::Unreachable {
                message: format!("export directory not found: {}", dir.display()),
            });
        }

        let prefix = self.prefix_for(kind);
        let mut newest: Option<(PathBuf, DateTime<Utc>)> = None;

        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_lowercase(),
                None => continue,
            };
            if !name.starts_with(&prefix) || !name.ends_with(".csv") {
                continue;
            }

            let modified: DateTime<Utc> = entry.metadata()?.modified()?.into();
            if let Some(cursor) = last_sync {
                if modified <= cursor {
                    debug!(file = %path.display(), "export not newer than cursor; skipping");
                    continue;
                }
            }
            match &newest {
                Some((_, newest_time)) if *newest_time >= modified => {}
                _ => newest = Some((path, modified)),
            }
        }

        Ok(newest)
    }

    /// Map foreign (French PoS) column names onto the canonical header set.
    fn map_columns(kind: SourceKind, row: RawRow) -> RawRow {
        row.into_iter()
            .map(|(column, value)| (canonical_column(kind, &column), value))
            .collect()
    }
}

fn canonical_column(kind: SourceKind, column: &str) -> String {
    let mapped = match (kind, column) {
        (_, "code_client") => "customer_code",
        (SourceKind::Customers, "nom") => "last_name",
        (SourceKind::Customers, "prenom") => "first_name",
        (SourceKind::Customers, "courriel") | (SourceKind::Customers, "mail") => "email",
        (SourceKind::Customers, "telephone") | (SourceKind::Customers, "tel") => "phone",
        (SourceKind::Customers, "adresse") => "address",
        (SourceKind::Customers, "code_postal") | (SourceKind::Customers, "cp") => "postal_code",
        (SourceKind::Customers, "ville") => "city",
        (SourceKind::Customers, "pays") => "country",
        (SourceKind::SalesLines, "date_commande") | (SourceKind::SalesLines, "date_vente") => {
            "order_date"
        }
        (SourceKind::SalesLines, "ref_document") | (SourceKind::SalesLines, "no_facture") => {
            "doc_ref"
        }
        (SourceKind::SalesLines, "type_document") => "doc_type",
        (SourceKind::SalesLines, "libelle_produit") | (SourceKind::SalesLines, "designation") => {
            "product_label"
        }
        (SourceKind::SalesLines, "qte") | (SourceKind::SalesLines, "quantite") => "qty",
        (SourceKind::SalesLines, "montant_ht") => "amount_ht",
        (SourceKind::SalesLines, "montant_ttc") => "amount_ttc",
        (SourceKind::SalesLines, "marge") => "margin",
        (SourceKind::ContactHistory, "date_contact") => "contact_date",
        (SourceKind::ContactHistory, "canal") => "channel",
        (SourceKind::ContactHistory, "statut") => "status",
        (SourceKind::ContactHistory, "campagne") => "campaign_id",
        _ => return column.to_string(),
    };
    mapped.to_string()
}

#[async_trait]
impl SourceConnector for FileExportConnector {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::FileExport
    }

    fn required_config_keys(&self) -> &'static [&'static str] {
        &["export_dir"]
    }

    fn config(&self) -> &HashMap<String, String> {
        &self.config
    }

    fn status(&self) -> ConnectorStatus {
        self.status
    }

    fn set_status(&mut self, status: ConnectorStatus) {
        self.status = status;
    }

    async fn test_connection(&self) -> Result<bool> {
        self.validate_config()?;
        Ok(self.export_dir().is_dir())
    }

    async fn extract(
        &self,
        last_sync: Option<DateTime<Utc>>,
    ) -> Result<(HashMap<SourceKind, Vec<RawRow>>, Option<DateTime<Utc>>)> {
        self.validate_config()?;

        let mut raw: HashMap<SourceKind, Vec<RawRow>> = HashMap::new();
        let mut max_modified: Option<DateTime<Utc>> = None;

        let staged_kinds = [
            SourceKind::Customers,
            SourceKind::SalesLines,
            SourceKind::ContactHistory,
        ];
        for kind in staged_kinds {
            let Some((path, modified)) = self.latest_export(kind, last_sync)? else {
                continue;
            };
            let rows = CsvReader::read(&path)?;
            debug!(kind = %kind, file = %path.display(), rows = rows.len(), "extracted export");
            raw.insert(
                kind,
                rows.into_iter()
                    .map(|row| Self::map_columns(kind, row))
                    .collect(),
            );
            max_modified = Some(match max_modified {
                Some(current) if current >= modified => current,
                _ => modified,
            });
        }

        Ok((raw, max_modified.or(last_sync)))
    }

    fn transform(&self, raw: HashMap<SourceKind, Vec<RawRow>>) -> Result<CanonicalBatch> {
        let mut batch = CanonicalBatch::default();

        for (kind, rows) in raw {
            match kind {
                SourceKind::Customers => {
                    let validated = validate::validate_customers(&rows);
                    if !validated.errors.is_empty() {
                        warn!(
                            rejected = validated.errors.len(),
                            "customer export rows rejected during transform"
                        );
                    }
                    batch.customers = validated.valid;
                }
                SourceKind::SalesLines => {
                    let validated = validate::validate_sales_lines(&rows, None);
                    if !validated.errors.is_empty() {
                        warn!(
                            rejected = validated.errors.len(),
                            "sales export rows rejected during transform"
                        );
                    }
                    batch.sales_lines = validated.valid;
                }
                SourceKind::ContactHistory => {
                    let validated = validate::validate_contacts(&rows, None);
                    if !validated.errors.is_empty() {
                        warn!(
                            rejected = validated.errors.len(),
                            "contact export rows rejected during transform"
                        );
                    }
                    batch.contacts = validated.valid;
                }
                other => batch.unsupported.push(other),
            }
        }

        Ok(batch)
    }

    async fn load(
        &self,
        batch: &CanonicalBatch,
        batch_id: &str,
    ) -> Result<HashMap<String, usize>> {
        let mut counts = HashMap::new();

        let customers: Vec<serde_json::Value> = batch
            .customers
            .iter()
            .filter_map(|r| serde_json::to_value(r).ok())
            .collect();
        if !customers.is_empty() {
            let loaded = self
                .staging
                .insert_raw_rows(FileType::Customers, batch_id, &customers)
                .await
                .map_err(ConnectorError::Pipeline)?;
            counts.insert(FileType::Customers.staging_table().to_string(), loaded as usize);
        }

        let sales: Vec<serde_json::Value> = batch
            .sales_lines
            .iter()
            .filter_map(|r| serde_json::to_value(r).ok())
            .collect();
        if !sales.is_empty() {
            let loaded = self
                .staging
                .insert_raw_rows(FileType::SalesLines, batch_id, &sales)
                .await
                .map_err(ConnectorError::Pipeline)?;
            counts.insert(FileType::SalesLines.staging_table().to_string(), loaded as usize);
        }

        let contacts: Vec<serde_json::Value> = batch
            .contacts
            .iter()
            .filter_map(|r| serde_json::to_value(r).ok())
            .collect();
        if !contacts.is_empty() {
            let loaded = self
                .staging
                .insert_raw_rows(FileType::Contacts, batch_id, &contacts)
                .await
                .map_err(ConnectorError::Pipeline)?;
            counts.insert(FileType::Contacts.staging_table().to_string(), loaded as usize);
        }

        Ok(counts)
    }
}
