//! Raw-staging persistence.
//!
//! Every validated row is content-hashed (SHA-256 over its key-sorted JSON
//! form) and upserted with uniqueness on `(batch_id, row_hash)`, so
//! re-running a batch is idempotent.

use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use tracing::{info, warn};

use super::schema::{FileType, IngestionError};
use crate::error::Result;

/// Serialize a JSON value with all object keys sorted, recursively.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by_key(|(k, _)| k.as_str());
            let body: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("{}:{}", serde_json::to_string(k).unwrap_or_default(), canonical_json(v)))
                .collect();
            format!("{{{}}}", body.join(","))
        }
        Value::Array(items) => {
            let body: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", body.join(","))
        }
        other => other.to_string(),
    }
}

/// SHA-256 content hash of a row, hex-encoded.
pub fn row_hash(row: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(row).as_bytes());
    hex::encode(hasher.finalize())
}

/// Raw-staging storage operations. Tests run against an in-memory fake.
#[async_trait]
pub trait StagingRepository: Send + Sync {
    /// Upsert rows into the staging table for `file_type`; returns the number
    /// of newly inserted rows (conflicts on `(batch_id, row_hash)` are
    /// skipped).
    async fn insert_raw_rows(
        &self,
        file_type: FileType,
        batch_id: &str,
        rows: &[Value],
    ) -> Result<u64>;

    /// Fetch the staged rows of a batch, in insertion order.
    async fn fetch_raw_rows(&self, file_type: FileType, batch_id: &str) -> Result<Vec<Value>>;

    /// Persist row-level errors for the batch.
    async fn insert_errors(&self, batch_id: &str, errors: &[IngestionError]) -> Result<u64>;

    /// Record batch-level metadata for one ingested file.
    async fn record_batch(
        &self,
        batch_id: &str,
        file_type: FileType,
        total_rows: usize,
        valid_rows: usize,
        error_rows: usize,
    ) -> Result<()>;
}

/// PostgreSQL implementation over the `raw_*` staging tables.
pub struct PostgresStagingRepository {
    pool: PgPool,
}

impl PostgresStagingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StagingRepository for PostgresStagingRepository {
    async fn insert_raw_rows(
        &self,
        file_type: FileType,
        batch_id: &str,
        rows: &[Value],
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            "INSERT INTO {} (batch_id, row_hash, row_data) VALUES ($1, $2, $3) \
             ON CONFLICT (batch_id, row_hash) DO NOTHING",
            file_type.staging_table()
        );

        let mut inserted = 0u64;
        for row in rows {
            let hash = row_hash(row);
            let result = sqlx::query(&sql)
                .bind(batch_id)
                .bind(&hash)
                .bind(row)
                .execute(&self.pool)
                .await?;
            inserted += result.rows_affected();
        }

        info!(
            table = file_type.staging_table(),
            batch_id,
            inserted,
            total = rows.len(),
            "loaded staging rows"
        );
        Ok(inserted)
    }

    async fn fetch_raw_rows(&self, file_type: FileType, batch_id: &str) -> Result<Vec<Value>> {
        let sql = format!(
            "SELECT row_data FROM {} WHERE batch_id = $1 ORDER BY id",
            file_type.staging_table()
        );
        let rows = sqlx::query(&sql)
            .bind(batch_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| row.get::<Value, _>("row_data"))
            .collect())
    }

    async fn insert_errors(&self, batch_id: &str, errors: &[IngestionError]) -> Result<u64> {
        let mut inserted = 0u64;
        for error in errors {
            let result = sqlx::query(
                "INSERT INTO ingestion_errors \
                 (batch_id, file_type, row_number, error_code, error_message, raw_row) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(batch_id)
            .bind(error.file_type.as_str())
            .bind(error.row_number as i32)
            .bind(error.code.as_str())
            .bind(&error.message)
            .bind(&error.raw_row)
            .execute(&self.pool)
            .await;

            match result {
                Ok(r) => inserted += r.rows_affected(),
                Err(e) => warn!(batch_id, error = %e, "failed to persist ingestion error"),
            }
        }
        Ok(inserted)
    }

    async fn record_batch(
        &self,
        batch_id: &str,
        file_type: FileType,
        total_rows: usize,
        valid_rows: usize,
        error_rows: usize,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO ingestion_batches (batch_id, file_type, total_rows, valid_rows, error_count) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (batch_id, file_type) DO UPDATE SET \
             total_rows = EXCLUDED.total_rows, \
             valid_rows = EXCLUDED.valid_rows, \
             error_count = EXCLUDED.error_count",
        )
        .bind(batch_id)
        .bind(file_type.as_str())
        .bind(total_rows as i32)
        .bind(valid_rows as i32)
        .bind(error_rows as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
