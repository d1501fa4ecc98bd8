//! Per-recommendation audit log with approval lifecycle.
//!
//! Transitions: PENDING -> APPROVED, PENDING -> REJECTED (mandatory reason),
//! any -> FLAGGED. Repeating an identical request is a no-op; operating on a
//! missing audit id returns `false` without mutating anything.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use tracing::{info, warn};
use uuid::Uuid;

use reco_core::types::{ApprovalStatus, Scenario};

use crate::error::Result;
use crate::models::{AuditLog, RecoSnapshot};

#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn insert(&self, entry: &AuditLog) -> Result<()>;
    async fn fetch(&self, audit_id: &str) -> Result<Option<AuditLog>>;
    async fn update(&self, entry: &AuditLog) -> Result<()>;
    async fn by_status(&self, status: ApprovalStatus, limit: usize) -> Result<Vec<AuditLog>>;
    async fn by_customer(&self, customer_code: &str, limit: usize) -> Result<Vec<AuditLog>>;
}

/// PostgreSQL audit_log table access.
pub struct PostgresAuditRepository {
    pool: PgPool,
}

impl PostgresAuditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn from_row(row: sqlx::postgres::PgRow) -> Result<AuditLog> {
        let scenario: String = row.get("scenario");
        let status: String = row.get("approval_status");
        let compliance: serde_json::Value = row.get("compliance_checks");
        let flags: serde_json::Value = row.get("flags");
        Ok(AuditLog {
            audit_id: row.get("audit_id"),
            run_id: row.get("run_id"),
            customer_code: row.get("customer_code"),
            product_key: row.get("product_key"),
            scenario: scenario
                .parse::<Scenario>()
                .map_err(|message| crate::error::QualityError::Internal { message })?,
            recommendation_score: row.get("recommendation_score"),
            approval_status: status
                .parse::<ApprovalStatus>()
                .map_err(|message| crate::error::QualityError::Internal { message })?,
            approval_reason: row.get("approval_reason"),
            created_at: row.get("created_at"),
            approved_at: row.get("approved_at"),
            approved_by: row.get("approved_by"),
            compliance_checks: serde_json::from_value(compliance).unwrap_or_default(),
            flags: serde_json::from_value(flags).unwrap_or_default(),
        })
    }
}

#[async_trait]
impl AuditRepository for PostgresAuditRepository {
    async fn insert(&self, entry: &AuditLog) -> Result<()> {
        sqlx::query(
            "INSERT INTO audit_log \
             (audit_id, run_id, customer_code, product_key, scenario, recommendation_score, \
              approval_status, approval_reason, created_at, approved_at, approved_by, \
              compliance_checks, flags) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(&entry.audit_id)
        .bind(&entry.run_id)
        .bind(&entry.customer_code)
        .bind(&entry.product_key)
        .bind(entry.scenario.as_str())
        .bind(entry.recommendation_score)
        .bind(entry.approval_status.as_str())
        .bind(&entry.approval_reason)
        .bind(entry.created_at)
        .bind(entry.approved_at)
        .bind(&entry.approved_by)
        .bind(serde_json::to_value(&entry.compliance_checks)?)
        .bind(serde_json::to_value(&entry.flags)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch(&self, audit_id: &str) -> Result<Option<AuditLog>> {
        let row = sqlx::query("SELECT * FROM audit_log WHERE audit_id = $1")
            .bind(audit_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::from_row).transpose()
    }

    async fn update(&self, entry: &AuditLog) -> Result<()> {
        sqlx::query(
            "UPDATE audit_log SET \
             approval_status = $2, approval_reason = $3, approved_at = $4, approved_by = $5, \
             compliance_checks = $6, flags = $7 \
             WHERE audit_id = $1",
        )
        .bind(&entry.audit_id)
        .bind(entry.approval_status.as_str())
        .bind(&entry.approval_reason)
        .bind(entry.approved_at)
        .bind(&entry.approved_by)
        .bind(serde_json::to_value(&entry.compliance_checks)?)
        .bind(serde_json::to_value(&entry.flags)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn by_status(&self, status: ApprovalStatus, limit: usize) -> Result<Vec<AuditLog>> {
        let rows = sqlx::query(
            "SELECT * FROM audit_log WHERE approval_status = $1 \
             ORDER BY created_at DESC LIMIT $2",
        )
        .bind(status.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::from_row).collect()
    }

    async fn by_customer(&self, customer_code: &str, limit: usize) -> Result<Vec<AuditLog>> {
        let rows = sqlx::query(
            "SELECT * FROM audit_log WHERE customer_code = $1 \
             ORDER BY created_at DESC LIMIT $2",
        )
        .bind(customer_code)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::from_row).collect()
    }
}

/// Audit lifecycle service.
pub struct AuditService {
    repository: Arc<dyn AuditRepository>,
}

impl AuditService {
    pub fn new(repository: Arc<dyn AuditRepository>) -> Self {
        Self { repository }
    }

    /// Register one recommendation for audit; starts PENDING.
    pub async fn log_recommendation(
        &self,
        run_id: &str,
        customer_code: &str,
        product_key: &str,
        scenario: Scenario,
        score: f64,
    ) -> Result<AuditLog> {
        let entry = AuditLog {
            audit_id: Uuid::new_v4().to_string(),
            run_id: run_id.to_string(),
            customer_code: customer_code.to_string(),
            product_key: product_key.to_string(),
            scenario,
            recommendation_score: score,
            approval_status: ApprovalStatus::Pending,
            approval_reason: None,
            created_at: Utc::now(),
            approved_at: None,
            approved_by: None,
            compliance_checks: HashMap::new(),
            flags: Vec::new(),
        };
        self.repository.insert(&entry).await?;
        info!(audit_id = %entry.audit_id, customer_code, "recommendation logged for audit");
        Ok(entry)
    }

    /// Register a whole run's recommendations.
    pub async fn log_batch(&self, recos: &[RecoSnapshot]) -> Result<Vec<AuditLog>> {
        let mut entries = Vec::with_capacity(recos.len());
        for reco in recos {
            entries.push(
                self.log_recommendation(
                    &reco.run_id,
                    &reco.customer_code,
                    &reco.product_key,
                    reco.scenario,
                    reco.final_score,
                )
                .await?,
            );
        }
        Ok(entries)
    }

    /// Approve a pending recommendation. Returns `false` for unknown ids;
    /// approving an already-approved item is a no-op.
    pub async fn approve(
        &self,
        audit_id: &str,
        approved_by: &str,
        reason: Option<String>,
    ) -> Result<bool> {
        let mut entry = match self.repository.fetch(audit_id).await? {
            Some(entry) => entry,
            None => return Ok(false),
        };
        if entry.approval_status == ApprovalStatus::Approved {
            return Ok(true);
        }

        entry.approval_status = ApprovalStatus::Approved;
        entry.approved_by = Some(approved_by.to_string());
        entry.approval_reason = reason;
        entry.approved_at = Some(Utc::now());
        self.repository.update(&entry).await?;
        info!(audit_id, approved_by, "recommendation approved");
        Ok(true)
    }

    /// Reject a recommendation; a reason is mandatory.
    pub async fn reject(&self, audit_id: &str, rejected_by: &str, reason: String) -> Result<bool> {
        let mut entry = match self.repository.fetch(audit_id).await? {
            Some(entry) => entry,
            None => return Ok(false),
        };
        if entry.approval_status == ApprovalStatus::Rejected
            && entry.approval_reason.as_deref() == Some(reason.as_str())
        {
            return Ok(true);
        }

        entry.approval_status = ApprovalStatus::Rejected;
        entry.approved_by = Some(rejected_by.to_string());
        entry.approval_reason = Some(reason);
        entry.approved_at = Some(Utc::now());
        self.repository.update(&entry).await?;
        info!(audit_id, rejected_by, "recommendation rejected");
        Ok(true)
    }

    /// Flag a recommendation from any state; reasons accumulate.
    pub async fn flag(&self, audit_id: &str, flag_reason: &str) -> Result<bool> {
        let mut entry = match self.repository.fetch(audit_id).await? {
            Some(entry) => entry,
            None => return Ok(false),
        };
        if entry.approval_status == ApprovalStatus::Flagged
            && entry.flags.iter().any(|f| f == flag_reason)
        {
            return Ok(true);
        }

        entry.approval_status = ApprovalStatus::Flagged;
        if !entry.flags.iter().any(|f| f == flag_reason) {
            entry.flags.push(flag_reason.to_string());
        }
        self.repository.update(&entry).await?;
        warn!(audit_id, flag_reason, "recommendation flagged");
        Ok(true)
    }

    pub async fn pending(&self, limit: usize) -> Result<Vec<AuditLog>> {
        self.repository.by_status(ApprovalStatus::Pending, limit).await
    }

    pub async fn flagged(&self, limit: usize) -> Result<Vec<AuditLog>> {
        self.repository.by_status(ApprovalStatus::Flagged, limit).await
    }

    pub async fn history(&self, customer_code: &str, limit: usize) -> Result<Vec<AuditLog>> {
        self.repository.by_customer(customer_code, limit).await
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Mutex;

    use super::*;

    /// In-memory audit store for lifecycle tests.
    #[derive(Default)]
    pub struct InMemoryAuditRepository {
        pub entries: Mutex<Vec<AuditLog>>,
    }

    #[async_trait]
    impl AuditRepository for InMemoryAuditRepository {
        async fn insert(&self, entry: &AuditLog) -> Result<()> {
            self.entries.lock().unwrap().push(entry.clone());
            Ok(())
        }

        async fn fetch(&self, audit_id: &str) -> Result<Option<AuditLog>> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .iter()
                .find(|e| e.audit_id == audit_id)
                .cloned())
        }

        async fn update(&self, entry: &AuditLog) -> Result<()> {
            let mut entries = self.entries.lock().unwrap();
            if let Some(existing) = entries.iter_mut().find(|e| e.audit_id == entry.audit_id) {
                *existing = entry.clone();
            }
            Ok(())
        }

        async fn by_status(&self, status: ApprovalStatus, limit: usize) -> Result<Vec<AuditLog>> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.approval_status == status)
                .take(limit)
                .cloned()
                .collect())
        }

        async fn by_customer(&self, customer_code: &str, limit: usize) -> Result<Vec<AuditLog>> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.customer_code == customer_code)
                .take(limit)
                .cloned()
                .collect())
        }
    }
}
