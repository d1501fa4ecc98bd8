//! Ingestion orchestration: read → normalize → validate → stage → report.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use super::loader::StagingRepository;
use super::reader::CsvReader;
use super::schema::{FileType, IngestionReport};
use super::validate::{self, BatchReferences};
use crate::error::Result;

/// Orchestrates CSV ingestion for one batch.
///
/// Every public operation returns `(IngestionReport, bool)`; failures are
/// folded into the report rather than raised. A fresh service gets a fresh
/// `batch_id`.
pub struct IngestionService {
    staging: Arc<dyn StagingRepository>,
    batch_id: String,
    reports: HashMap<FileType, IngestionReport>,
}

impl IngestionService {
    pub fn new(staging: Arc<dyn StagingRepository>) -> Self {
        Self {
            staging,
            batch_id: Uuid::new_v4().to_string(),
            reports: HashMap::new(),
        }
    }

    /// Reuse an existing batch id (re-runs are idempotent thanks to the
    /// `(batch_id, row_hash)` staging uniqueness).
    pub fn with_batch_id(staging: Arc<dyn StagingRepository>, batch_id: impl Into<String>) -> Self {
        Self {
            staging,
            batch_id: batch_id.into(),
            reports: HashMap::new(),
        }
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    /// Ingest one file by type.
    pub async fn ingest(
        &mut self,
        file_type: FileType,
        path: &Path,
        references: Option<&BatchReferences>,
    ) -> (IngestionReport, bool) {
        match file_type {
            FileType::Customers => self.ingest_customers(path).await,
            FileType::SalesLines => self.ingest_sales_lines(path, references).await,
            FileType::Contacts => self.ingest_contacts(path, references).await,
        }
    }

    pub async fn ingest_customers(&mut self, path: &Path) -> (IngestionReport, bool) {
        info!(batch_id = %self.batch_id, path = %path.display(), "starting customer ingestion");

        let rows = match CsvReader::read(path) {
            Ok(rows) => rows,
            Err(e) => return self.aborted_report(FileType::Customers, e),
        };
        let total_rows = rows.len();

        let batch = validate::validate_customers(&rows);
        let records: Vec<serde_json::Value> = batch
            .valid
            .iter()
            .filter_map(|r| serde_json::to_value(r).ok())
            .collect();

        self.finish_file(FileType::Customers, total_rows, records, batch.errors)
            .await
    }

    pub async fn ingest_sales_lines(
        &mut self,
        path: &Path,
        references: Option<&BatchReferences>,
    ) -> (IngestionReport, bool) {
        info!(batch_id = %self.batch_id, path = %path.display(), "starting sales line ingestion");

        let rows = match CsvReader::read(path) {
            Ok(rows) => rows,
            Err(e) => return self.aborted_report(FileType::SalesLines, e),
        };
        let total_rows = rows.len();

        let batch = validate::validate_sales_lines(&rows, references);
        let records: Vec<serde_json::Value> = batch
            .valid
            .iter()
            .filter_map(|r| serde_json::to_value(r).ok())
            .collect();

        self.finish_file(FileType::SalesLines, total_rows, records, batch.errors)
            .await
    }

    pub async fn ingest_contacts(
        &mut self,
        path: &Path,
        references: Option<&BatchReferences>,
    ) -> (IngestionReport, bool) {
        info!(batch_id = %self.batch_id, path = %path.display(), "starting contact ingestion");

        let rows = match CsvReader::read(path) {
            Ok(rows) => rows,
            Err(e) => return self.aborted_report(FileType::Contacts, e),
        };
        let total_rows = rows.len();

        let batch = validate::validate_contacts(&rows, references);
        let records: Vec<serde_json::Value> = batch
            .valid
            .iter()
            .filter_map(|r| serde_json::to_value(r).ok())
            .collect();

        self.finish_file(FileType::Contacts, total_rows, records, batch.errors)
            .await
    }

    /// Reports for every file ingested in this batch so far.
    pub fn batch_summary(&self) -> &HashMap<FileType, IngestionReport> {
        &self.reports
    }

    async fn finish_file(
        &mut self,
        file_type: FileType,
        total_rows: usize,
        records: Vec<serde_json::Value>,
        errors: Vec<super::schema::IngestionError>,
    ) -> (IngestionReport, bool) {
        let error_rows = errors.len();

        let loaded = match self.load_stage(file_type, &records, &errors).await {
            Ok(loaded) => loaded,
            Err(e) => {
                error!(batch_id = %self.batch_id, file_type = %file_type, error = %e, "staging load failed");
                let report = IngestionReport {
                    batch_id: self.batch_id.clone(),
                    file_type,
                    total_rows,
                    valid_rows: 0,
                    error_rows,
                    errors,
                };
                self.reports.insert(file_type, report.clone());
                return (report, false);
            }
        };

        if let Err(e) = self
            .staging
            .record_batch(&self.batch_id, file_type, total_rows, loaded, error_rows)
            .await
        {
            error!(batch_id = %self.batch_id, error = %e, "failed to record batch metadata");
        }

        let report = IngestionReport {
            batch_id: self.batch_id.clone(),
            file_type,
            total_rows,
            valid_rows: records.len(),
            error_rows,
            errors,
        };

        info!(
            batch_id = %self.batch_id,
            file_type = %file_type,
            total = report.total_rows,
            valid = report.valid_rows,
            errors = report.error_rows,
            success_rate = format!("{:.1}%", report.success_rate()),
            "ingestion completed"
        );

        let success = error_rows == 0;
        self.reports.insert(file_type, report.clone());
        (report, success)
    }

    async fn load_stage(
        &self,
        file_type: FileType,
        records: &[serde_json::Value],
        errors: &[super::schema::IngestionError],
    ) -> Result<usize> {
        let loaded = self
            .staging
            .insert_raw_rows(file_type, &self.batch_id, records)
            .await?;
        if !errors.is_empty() {
            self.staging.insert_errors(&self.batch_id, errors).await?;
        }
        Ok(loaded as usize)
    }

    fn aborted_report(
        &mut self,
        file_type: FileType,
        error: crate::error::PipelineError,
    ) -> (IngestionReport, bool) {
        error!(batch_id = %self.batch_id, file_type = %file_type, error = %error, "ingestion aborted");
        let report = IngestionReport::empty(&self.batch_id, file_type);
        self.reports.insert(file_type, report.clone());
        (report, false)
    }
}


#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;

    use super::test_support::InMemoryStaging;
    use super::*;

    fn fixture(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn customer_happy_path_normalizes_email() {
        let staging = Arc::new(InMemoryStaging::default());
        let mut service = IngestionService::new(staging.clone());

        let file = fixture(
            "customer_code,last_name,first_name,email,phone,address,postal_code,city,country\n\
             C001,Dupont,Jean,jean@ex.com,,,,Paris,France\n\
             C002,Martin,Marie,MARIE @ ex.com , ,,75002,Paris,France\n",
        );

        let (report, success) = service.ingest_customers(file.path()).await;
        assert!(success);
        assert_eq!(report.total_rows, 2);
        assert_eq!(report.valid_rows, 2);
        assert_eq!(report.error_rows, 0);

        let staged = staging
            .fetch_raw_rows(FileType::Customers, service.batch_id())
            .await
            .unwrap();
        assert_eq!(staged.len(), 2);
        assert_eq!(staged[1]["email"], "marie@ex.com");
    }

    #[tokio::test]
    async fn rerun_with_same_batch_id_is_idempotent() {
        let staging = Arc::new(InMemoryStaging::default());
        let content = "customer_code,email\nC001,a@x.com\nC002,b@x.com\n";
        let file = fixture(content);

        let mut first = IngestionService::with_batch_id(staging.clone(), "batch-1");
        first.ingest_customers(file.path()).await;

        let file2 = fixture(content);
        let mut second = IngestionService::with_batch_id(staging.clone(), "batch-1");
        second.ingest_customers(file2.path()).await;

        let staged = staging
            .fetch_raw_rows(FileType::Customers, "batch-1")
            .await
            .unwrap();
        assert_eq!(staged.len(), 2);
    }

    #[tokio::test]
    async fn missing_file_yields_zero_row_report() {
        let staging = Arc::new(InMemoryStaging::default());
        let mut service = IngestionService::new(staging);

        let (report, success) = service
            .ingest_customers(Path::new("/nonexistent/customers.csv"))
            .await;
        assert!(!success);
        assert_eq!(report.total_rows, 0);
        assert_eq!(report.success_rate(), 100.0);
    }

    #[tokio::test]
    async fn invalid_rows_are_reported_and_withheld() {
        let staging = Arc::new(InMemoryStaging::default());
        let mut service = IngestionService::new(staging.clone());

        let file = fixture(
            "customer_code,email\n\
             C001,good@ex.com\n\
             ,missing-code@ex.com\n\
             C003,not-an-email\n",
        );
        let (report, success) = service.ingest_customers(file.path()).await;
        assert!(!success);
        assert_eq!(report.total_rows, 3);
        assert_eq!(report.valid_rows, 1);
        assert_eq!(report.error_rows, 2);

        let staged = staging
            .fetch_raw_rows(FileType::Customers, service.batch_id())
            .await
            .unwrap();
        assert_eq!(staged.len(), 1);
        let persisted_errors = staging.errors.lock().unwrap();
        assert_eq!(persisted_errors.len(), 2);
    }

    #[tokio::test]
    async fn batch_summary_accumulates_reports() {
        let staging = Arc::new(InMemoryStaging::default());
        let mut service = IngestionService::new(staging);

        let customers = fixture("customer_code\nC001\n");
        service.ingest_customers(customers.path()).await;

        let contacts = fixture("customer_code,contact_date\nC001,2024-01-05\n");
        service.ingest_contacts(contacts.path(), None).await;

        assert_eq!(service.batch_summary().len(), 2);
    }
}
