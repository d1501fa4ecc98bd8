//! Run-level quality metrics: coverage, diversity, accuracy proxy and the
//! composite quality score. Metrics are computed on demand and cached.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Serialize;
use sqlx::{PgPool, Row};
use tracing::info;

use reco_core::types::{QualityLevel, Scenario};

use crate::error::Result;
use crate::models::{QualityMetrics, RecoSnapshot};

#[async_trait]
pub trait QualityRepository: Send + Sync {
    async fn recos_for_run(&self, run_id: &str) -> Result<Vec<RecoSnapshot>>;
    async fn cached_metrics(&self, run_id: &str) -> Result<Option<QualityMetrics>>;
    async fn store_metrics(&self, metrics: &QualityMetrics) -> Result<()>;
    async fn metrics_since(&self, days: i64) -> Result<Vec<QualityMetrics>>;
}

/// PostgreSQL access to reco_item and quality_metrics.
pub struct PostgresQualityRepository {
    pool: PgPool,
}

impl PostgresQualityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn metrics_from_row(row: sqlx::postgres::PgRow) -> Result<QualityMetrics> {
        let level: String = row.get("quality_level");
        Ok(QualityMetrics {
            run_id: row.get("run_id"),
            total_recommendations: row.get::<i32, _>("total_recommendations") as usize,
            coverage_score: row.get("coverage_score"),
            diversity_score: row.get("diversity_score"),
            accuracy_score: row.get("accuracy_score"),
            avg_score: row.get("avg_score"),
            median_score: row.get("median_score"),
            diversity_ratio: row.get("diversity_ratio"),
            quality_level: level
                .parse::<QualityLevel>()
                .map_err(|message| crate::error::QualityError::Internal { message })?,
            computed_at: row.get("computed_at"),
        })
    }
}

#[async_trait]
impl QualityRepository for PostgresQualityRepository {
    async fn recos_for_run(&self, run_id: &str) -> Result<Vec<RecoSnapshot>> {
        let rows = sqlx::query(
            "SELECT run_id, customer_code, product_key, scenario, score \
             FROM reco_item WHERE run_id = $1",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let scenario: String = row.get("scenario");
                Ok(RecoSnapshot {
                    run_id: row.get("run_id"),
                    customer_code: row.get("customer_code"),
                    product_key: row.get("product_key"),
                    scenario: scenario
                        .parse::<Scenario>()
                        .map_err(|message| crate::error::QualityError::Internal { message })?,
                    final_score: row.get("score"),
                })
            })
            .collect()
    }

    async fn cached_metrics(&self, run_id: &str) -> Result<Option<QualityMetrics>> {
        let row = sqlx::query("SELECT * FROM quality_metrics WHERE run_id = $1")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::metrics_from_row).transpose()
    }

    async fn store_metrics(&self, metrics: &QualityMetrics) -> Result<()> {
        sqlx::query(
            "INSERT INTO quality_metrics \
             (run_id, total_recommendations, coverage_score, diversity_score, accuracy_score, \
              avg_score, median_score, diversity_ratio, quality_level, computed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (run_id) DO UPDATE SET \
             total_recommendations = EXCLUDED.total_recommendations, \
             coverage_score = EXCLUDED.coverage_score, \
             diversity_score = EXCLUDED.diversity_score, \
             accuracy_score = EXCLUDED.accuracy_score, \
             avg_score = EXCLUDED.avg_score, \
             median_score = EXCLUDED.median_score, \
             diversity_ratio = EXCLUDED.diversity_ratio, \
             quality_level = EXCLUDED.quality_level, \
             computed_at = EXCLUDED.computed_at",
        )
        .bind(&metrics.run_id)
        .bind(metrics.total_recommendations as i32)
        .bind(metrics.coverage_score)
        .bind(metrics.diversity_score)
        .bind(metrics.accuracy_score)
        .bind(metrics.avg_score)
        .bind(metrics.median_score)
        .bind(metrics.diversity_ratio)
        .bind(metrics.quality_level.as_str())
        .bind(metrics.computed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn metrics_since(&self, days: i64) -> Result<Vec<QualityMetrics>> {
        let cutoff = Utc::now() - Duration::days(days);
        let rows = sqlx::query(
            "SELECT * FROM quality_metrics WHERE computed_at >= $1 ORDER BY computed_at",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::metrics_from_row).collect()
    }
}

/// Pure metric computation over one run's recommendations.
pub fn compute_metrics(
    run_id: &str,
    recos: &[RecoSnapshot],
    total_customers: usize,
) -> QualityMetrics {
    if recos.is_empty() {
        return QualityMetrics {
            run_id: run_id.to_string(),
            total_recommendations: 0,
            coverage_score: 0.0,
            diversity_score: 0.0,
            accuracy_score: 0.0,
            avg_score: 0.0,
            median_score: 0.0,
            diversity_ratio: 0.0,
            quality_level: QualityLevel::Poor,
            computed_at: Utc::now(),
        };
    }

    let total = recos.len();
    let unique_customers: HashSet<&str> = recos.iter().map(|r| r.customer_code.as_str()).collect();
    let unique_products: HashSet<&str> = recos.iter().map(|r| r.product_key.as_str()).collect();

    let coverage_score =
        (unique_customers.len() as f64 / total_customers.max(1) as f64).clamp(0.0, 1.0);
    let diversity_score = (unique_products.len() as f64 / (total as f64 * 0.7)).min(1.0);

    let mut scores: Vec<f64> = recos.iter().map(|r| r.final_score).collect();
    scores.sort_by(|a, b| a.total_cmp(b));
    let avg_score = scores.iter().sum::<f64>() / total as f64;
    let median_score = scores[total / 2];
    let accuracy_score = (avg_score / 100.0).clamp(0.0, 1.0);

    // Per-customer product uniqueness ratio.
    let mut per_customer: HashMap<&str, Vec<&str>> = HashMap::new();
    for reco in recos {
        per_customer
            .entry(reco.customer_code.as_str())
            .or_default()
            .push(reco.product_key.as_str());
    }
    let diversity_ratio = per_customer
        .values()
        .map(|products| {
            let unique: HashSet<&&str> = products.iter().collect();
            unique.len() as f64 / products.len() as f64
        })
        .sum::<f64>()
        / per_customer.len() as f64;

    let quality_score = 0.4 * coverage_score + 0.3 * diversity_score + 0.3 * accuracy_score;

    QualityMetrics {
        run_id: run_id.to_string(),
        total_recommendations: total,
        coverage_score,
        diversity_score,
        accuracy_score,
        avg_score,
        median_score,
        diversity_ratio,
        quality_level: QualityLevel::from_score(quality_score),
        computed_at: Utc::now(),
    }
}

/// Aggregated report over recent runs.
#[derive(Debug, Clone, Serialize)]
pub struct QualityReport {
    pub total_runs: usize,
    pub average_coverage: f64,
    pub average_diversity: f64,
    pub average_accuracy: f64,
    pub quality_distribution: HashMap<String, usize>,
    pub recent_runs: Vec<QualityMetrics>,
}

/// Quality metric service with compute-then-cache semantics.
pub struct QualityService {
    repository: Arc<dyn QualityRepository>,
}

impl QualityService {
    pub fn new(repository: Arc<dyn QualityRepository>) -> Self {
        Self { repository }
    }

    /// Metrics for one run; cached after the first computation.
    pub async fn compute(&self, run_id: &str, total_customers: usize) -> Result<QualityMetrics> {
        if let Some(cached) = self.repository.cached_metrics(run_id).await? {
            return Ok(cached);
        }

        let recos = self.repository.recos_for_run(run_id).await?;
        let metrics = compute_metrics(run_id, &recos, total_customers);
        self.repository.store_metrics(&metrics).await?;
        info!(
            run_id,
            quality_level = metrics.quality_level.as_str(),
            recommendations = metrics.total_recommendations,
            "quality metrics computed"
        );
        Ok(metrics)
    }

    /// Rolling quality report over the last `days` days.
    pub async fn report(&self, days: i64) -> Result<QualityReport> {
        let metrics = self.repository.metrics_since(days).await?;
        if metrics.is_empty() {
            return Ok(QualityReport {
                total_runs: 0,
                average_coverage: 0.0,
                average_diversity: 0.0,
                average_accuracy: 0.0,
                quality_distribution: HashMap::new(),
                recent_runs: Vec::new(),
            });
        }

        let n = metrics.len() as f64;
        let average_coverage = metrics.iter().map(|m| m.coverage_score).sum::<f64>() / n;
        let average_diversity = metrics.iter().map(|m| m.diversity_score).sum::<f64>() / n;
        let average_accuracy = metrics.iter().map(|m| m.accuracy_score).sum::<f64>() / n;

        let mut quality_distribution: HashMap<String, usize> = HashMap::new();
        for metric in &metrics {
            *quality_distribution
                .entry(metric.quality_level.as_str().to_string())
                .or_default() += 1;
        }

        let recent_runs = metrics.iter().rev().take(10).rev().cloned().collect();
        Ok(QualityReport {
            total_runs: metrics.len(),
            average_coverage,
            average_diversity,
            average_accuracy,
            quality_distribution,
            recent_runs,
        })
    }
}
