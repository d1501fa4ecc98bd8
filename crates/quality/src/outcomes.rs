//! Outcome and feedback capture, rolling metrics, retraining triggers and
//! A/B test evaluation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::{PgPool, Row};
use tracing::info;

use crate::error::Result;
use crate::models::{
    AbTestResult, FeedbackRecord, FeedbackType, ModelPerformance, OutcomeMetrics, OutcomeReason,
    OutcomeRecord, OutcomeStatus, RetrainingTrigger, Sentiment, TriggerSeverity, TriggerType,
};

/// Per-recommendation unit cost (EUR) used by the ROI computation.
pub const RECO_UNIT_COST_EUR: f64 = 100.0;

#[async_trait]
pub trait OutcomesRepository: Send + Sync {
    async fn insert_outcome(&self, outcome: &OutcomeRecord) -> Result<()>;
    async fn insert_feedback(&self, feedback: &FeedbackRecord) -> Result<()>;
    async fn insert_performance(&self, metric: &ModelPerformance) -> Result<()>;
    async fn outcomes_since(
        &self,
        days: i64,
        customer_code: Option<&str>,
    ) -> Result<Vec<OutcomeRecord>>;
    async fn feedback_since(&self, days: i64) -> Result<Vec<FeedbackRecord>>;
}

/// PostgreSQL outcome/feedback storage.
pub struct PostgresOutcomesRepository {
    pool: PgPool,
}

impl PostgresOutcomesRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutcomesRepository for PostgresOutcomesRepository {
    async fn insert_outcome(&self, outcome: &OutcomeRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO outcome_event \
             (audit_id, customer_code, product_key, recommendation_score, status, reason, \
              purchased, purchase_amount, purchase_date, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(&outcome.audit_id)
        .bind(&outcome.customer_code)
        .bind(&outcome.product_key)
        .bind(outcome.recommendation_score)
        .bind(outcome.status.as_str())
        .bind(outcome.reason.map(|r| r.as_str()))
        .bind(outcome.purchased)
        .bind(outcome.purchase_amount)
        .bind(outcome.purchase_date)
        .bind(outcome.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_feedback(&self, feedback: &FeedbackRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO feedback_record \
             (customer_code, product_key, feedback_type, score, comment, sentiment, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&feedback.customer_code)
        .bind(&feedback.product_key)
        .bind(feedback.feedback_type.as_str())
        .bind(feedback.score)
        .bind(&feedback.comment)
        .bind(feedback.sentiment.as_str())
        .bind(feedback.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_performance(&self, metric: &ModelPerformance) -> Result<()> {
        sqlx::query(
            "INSERT INTO model_performance \
             (recommendation_id, actual_outcome, predicted_score, confidence, error_margin, \
              is_accurate, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&metric.recommendation_id)
        .bind(metric.actual_outcome.as_str())
        .bind(metric.predicted_score)
        .bind(metric.confidence)
        .bind(metric.error_margin)
        .bind(metric.is_accurate)
        .bind(metric.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn outcomes_since(
        &self,
        days: i64,
        customer_code: Option<&str>,
    ) -> Result<Vec<OutcomeRecord>> {
        let cutoff = Utc::now() - Duration::days(days);
        let rows = sqlx::query(
            "SELECT * FROM outcome_event \
             WHERE created_at >= $1 AND ($2::text IS NULL OR customer_code = $2) \
             ORDER BY created_at",
        )
        .bind(cutoff)
        .bind(customer_code)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let status: String = row.get("status");
                let reason: Option<String> = row.get("reason");
                Ok(OutcomeRecord {
                    audit_id: row.get("audit_id"),
                    customer_code: row.get("customer_code"),
                    product_key: row.get("product_key"),
                    recommendation_score: row.get("recommendation_score"),
                    status: status
                        .parse::<OutcomeStatus>()
                        .map_err(|message| crate::error::QualityError::Internal { message })?,
                    reason: reason.and_then(|r| r.parse::<OutcomeReason>().ok()),
                    purchased: row.get("purchased"),
                    purchase_amount: row.get("purchase_amount"),
                    purchase_date: row.get("purchase_date"),
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }

    async fn feedback_since(&self, days: i64) -> Result<Vec<FeedbackRecord>> {
        let cutoff = Utc::now() - Duration::days(days);
        let rows = sqlx::query("SELECT * FROM feedback_record WHERE created_at >= $1")
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                let feedback_type: String = row.get("feedback_type");
                let sentiment: String = row.get("sentiment");
                Ok(FeedbackRecord {
                    customer_code: row.get("customer_code"),
                    product_key: row.get("product_key"),
                    feedback_type: feedback_type
                        .parse::<FeedbackType>()
                        .unwrap_or(FeedbackType::Custom),
                    score: row.get("score"),
                    comment: row.get("comment"),
                    sentiment: match sentiment.as_str() {
                        "positive" => Sentiment::Positive,
                        "neutral" => Sentiment::Neutral,
                        _ => Sentiment::Negative,
                    },
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }
}

/// Outcome capture and learning-signal service.
pub struct OutcomesService {
    repository: Arc<dyn OutcomesRepository>,
}

impl OutcomesService {
    pub fn new(repository: Arc<dyn OutcomesRepository>) -> Self {
        Self { repository }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn record_outcome(
        &self,
        audit_id: &str,
        customer_code: &str,
        product_key: &str,
        recommendation_score: f64,
        status: OutcomeStatus,
        reason: Option<OutcomeReason>,
        purchased: bool,
        purchase_amount: Option<f64>,
    ) -> Result<OutcomeRecord> {
        let outcome = OutcomeRecord {
            audit_id: audit_id.to_string(),
            customer_code: customer_code.to_string(),
            product_key: product_key.to_string(),
            recommendation_score,
            status,
            reason,
            purchased,
            purchase_amount,
            purchase_date: purchased.then(Utc::now),
            created_at: Utc::now(),
        };
        self.repository.insert_outcome(&outcome).await?;
        info!(audit_id, customer_code, status = %status, "outcome recorded");
        Ok(outcome)
    }

    pub async fn record_feedback(
        &self,
        customer_code: &str,
        product_key: &str,
        feedback_type: FeedbackType,
        score: i32,
        comment: Option<String>,
    ) -> Result<FeedbackRecord> {
        if !(1..=5).contains(&score) {
            return Err(crate::error::QualityError::Validation {
                field: "score".to_string(),
                message: format!("feedback score must be 1-5, got {}", score),
            });
        }

        let feedback = FeedbackRecord {
            customer_code: customer_code.to_string(),
            product_key: product_key.to_string(),
            feedback_type,
            score,
            comment,
            sentiment: Sentiment::from_score(score),
            created_at: Utc::now(),
        };
        self.repository.insert_feedback(&feedback).await?;
        Ok(feedback)
    }

    /// Rolling-window outcome metrics.
    pub async fn compute_metrics(
        &self,
        days: i64,
        customer_code: Option<&str>,
    ) -> Result<OutcomeMetrics> {
        let outcomes = self.repository.outcomes_since(days, customer_code).await?;
        let feedback = self.repository.feedback_since(days).await?;
        Ok(aggregate_metrics(&outcomes, &feedback))
    }

    /// Track one prediction against its actual outcome.
    pub async fn track_model_performance(
        &self,
        recommendation_id: &str,
        actual_outcome: OutcomeStatus,
        predicted_score: f64,
        confidence: f64,
    ) -> Result<ModelPerformance> {
        let actual = if actual_outcome == OutcomeStatus::Purchased {
            1.0
        } else {
            0.0
        };
        let error_margin = (actual - predicted_score).abs();
        let metric = ModelPerformance {
            recommendation_id: recommendation_id.to_string(),
            actual_outcome,
            predicted_score,
            confidence,
            error_margin,
            is_accurate: error_margin < 0.2,
            created_at: Utc::now(),
        };
        self.repository.insert_performance(&metric).await?;
        Ok(metric)
    }

    /// Start an A/B comparison with empty arms.
    pub fn create_ab_test(&self, test_id: &str, variant_a: &str, variant_b: &str) -> AbTestResult {
        AbTestResult {
            test_id: test_id.to_string(),
            variant_a: variant_a.to_string(),
            variant_b: variant_b.to_string(),
            total_users_a: 0,
            total_users_b: 0,
            conversion_a: 0.0,
            conversion_b: 0.0,
            revenue_a: 0.0,
            revenue_b: 0.0,
            confidence_level: 0.0,
            winner: String::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }
}

/// Aggregate outcome metrics over a window of records.
pub fn aggregate_metrics(
    outcomes: &[OutcomeRecord],
    feedback: &[FeedbackRecord],
) -> OutcomeMetrics {
    if outcomes.is_empty() {
        return OutcomeMetrics::empty();
    }

    let total = outcomes.len();
    let accepted = outcomes
        .iter()
        .filter(|o| o.status != OutcomeStatus::Rejected)
        .count();
    let purchased = outcomes.iter().filter(|o| o.purchased).count();
    let returned = outcomes
        .iter()
        .filter(|o| o.status == OutcomeStatus::Returned)
        .count();
    let revenue: f64 = outcomes
        .iter()
        .filter(|o| o.purchased)
        .filter_map(|o| o.purchase_amount)
        .sum();

    let avg_satisfaction = if feedback.is_empty() {
        0.0
    } else {
        feedback.iter().map(|f| f.score as f64).sum::<f64>() / feedback.len() as f64
    };

    let cost = total as f64 * RECO_UNIT_COST_EUR;
    let with_feedback: std::collections::HashSet<&str> =
        feedback.iter().map(|f| f.product_key.as_str()).collect();

    OutcomeMetrics {
        total_recommendations: total,
        total_outcomes: total,
        acceptance_rate: accepted as f64 / total as f64,
        purchase_rate: purchased as f64 / total as f64,
        return_rate: if purchased > 0 {
            returned as f64 / purchased as f64
        } else {
            0.0
        },
        avg_satisfaction,
        revenue_impact: revenue,
        roi: (revenue - cost) / cost,
        recommendations_with_feedback: with_feedback.len(),
        recommendations_with_outcomes: total,
        computed_at: Utc::now(),
    }
}

/// Deterministic retraining-trigger checks against a previous aggregate.
pub fn check_retraining_triggers(
    current: &OutcomeMetrics,
    previous: Option<&OutcomeMetrics>,
) -> Vec<RetrainingTrigger> {
    let mut triggers = Vec::new();

    if let Some(previous) = previous {
        if current.purchase_rate < previous.purchase_rate * 0.9 {
            triggers.push(RetrainingTrigger {
                trigger_type: TriggerType::PerformanceDrop,
                severity: TriggerSeverity::High,
                reason: "Purchase rate dropped by >10%".to_string(),
                metrics_before: serde_json::json!({"purchase_rate": previous.purchase_rate}),
                metrics_after: serde_json::json!({"purchase_rate": current.purchase_rate}),
                recommended_action: "Retrain with recent data".to_string(),
                created_at: Utc::now(),
            });
        }
        if current.avg_satisfaction < previous.avg_satisfaction * 0.85 {
            triggers.push(RetrainingTrigger {
                trigger_type: TriggerType::SatisfactionDrop,
                severity: TriggerSeverity::Medium,
                reason: "Average satisfaction dropped".to_string(),
                metrics_before: serde_json::json!({"avg_satisfaction": previous.avg_satisfaction}),
                metrics_after: serde_json::json!({"avg_satisfaction": current.avg_satisfaction}),
                recommended_action: "Analyze feedback for patterns".to_string(),
                created_at: Utc::now(),
            });
        }
    }

    if current.return_rate > 0.15 {
        triggers.push(RetrainingTrigger {
            trigger_type: TriggerType::HighReturnRate,
            severity: TriggerSeverity::High,
            reason: "Return rate exceeds 15%".to_string(),
            metrics_before: serde_json::json!({}),
            metrics_after: serde_json::json!({"return_rate": current.return_rate}),
            recommended_action: "Investigate product quality issues".to_string(),
            created_at: Utc::now(),
        });
    }

    if current.acceptance_rate < 0.5 {
        triggers.push(RetrainingTrigger {
            trigger_type: TriggerType::LowAcceptanceRate,
            severity: TriggerSeverity::Medium,
            reason: "Acceptance rate below 50%".to_string(),
            metrics_before: serde_json::json!({}),
            metrics_after: serde_json::json!({"acceptance_rate": current.acceptance_rate}),
            recommended_action: "Review recommendation relevance".to_string(),
            created_at: Utc::now(),
        });
    }

    triggers
}

/// Evaluate an A/B test from the outcomes of both arms.
pub fn update_ab_test_results(
    test_id: &str,
    variant_a_outcomes: &[OutcomeRecord],
    variant_b_outcomes: &[OutcomeRecord],
) -> AbTestResult {
    let total_a = variant_a_outcomes.len();
    let total_b = variant_b_outcomes.len();
    let purchased_a = variant_a_outcomes.iter().filter(|o| o.purchased).count();
    let purchased_b = variant_b_outcomes.iter().filter(|o| o.purchased).count();

    let conversion_a = if total_a > 0 {
        purchased_a as f64 / total_a as f64
    } else {
        0.0
    };
    let conversion_b = if total_b > 0 {
        purchased_b as f64 / total_b as f64
    } else {
        0.0
    };

    let revenue = |outcomes: &[OutcomeRecord]| {
        outcomes
            .iter()
            .filter(|o| o.purchased)
            .filter_map(|o| o.purchase_amount)
            .sum::<f64>()
    };

    AbTestResult {
        test_id: test_id.to_string(),
        variant_a: "variant_a".to_string(),
        variant_b: "variant_b".to_string(),
        total_users_a: total_a,
        total_users_b: total_b,
        conversion_a,
        conversion_b,
        revenue_a: revenue(variant_a_outcomes),
        revenue_b: revenue(variant_b_outcomes),
        confidence_level: two_proportion_confidence(conversion_a, conversion_b, total_a, total_b),
        winner: if conversion_b > conversion_a {
            "variant_b".to_string()
        } else {
            "variant_a".to_string()
        },
        started_at: Utc::now(),
        ended_at: Some(Utc::now()),
    }
}

/// Approximate two-proportion z confidence: 0 below 30 samples per arm,
/// otherwise min(0.99, z / 1.96).
fn two_proportion_confidence(p1: f64, p2: f64, n1: usize, n2: usize) -> f64 {
    if n1 < 30 || n2 < 30 {
        return 0.0;
    }
    let (n1, n2) = (n1 as f64, n2 as f64);
    let pooled = (p1 * n1 + p2 * n2) / (n1 + n2);
    let se = (pooled * (1.0 - pooled) * (1.0 / n1 + 1.0 / n2)).sqrt();
    if se <= 0.0 {
        return 0.0;
    }
    let z = (p1 - p2).abs() / se;
    (z / 1.96).min(0.99)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(status: OutcomeStatus, purchased: bool, amount: Option<f64>) -> OutcomeRecord {
        OutcomeRecord {
            audit_id: "a1".to_string(),
            customer_code: "C001".to_string(),
            product_key: "WINE001".to_string(),
            recommendation_score: 80.0,
            status,
            reason: None,
            purchased,
            purchase_amount: amount,
            purchase_date: purchased.then(Utc::now),
            created_at: Utc::now(),
        }
    }

    fn metrics(purchase_rate: f64, avg_satisfaction: f64) -> OutcomeMetrics {
        OutcomeMetrics {
            purchase_rate,
            avg_satisfaction,
            ..OutcomeMetrics::empty()
        }
    }

    #[test]
    fn aggregate_rates_and_roi() {
        let outcomes = vec![
            outcome(OutcomeStatus::Purchased, true, Some(300.0)),
            outcome(OutcomeStatus::Rejected, false, None),
            outcome(OutcomeStatus::Accepted, false, None),
            outcome(OutcomeStatus::Returned, true, Some(100.0)),
        ];
        let metrics = aggregate_metrics(&outcomes, &[]);

        assert_eq!(metrics.total_outcomes, 4);
        assert!((metrics.acceptance_rate - 0.75).abs() < 1e-9);
        assert!((metrics.purchase_rate - 0.5).abs() < 1e-9);
        assert!((metrics.return_rate - 0.5).abs() < 1e-9);
        assert!((metrics.revenue_impact - 400.0).abs() < 1e-9);
        // (400 - 4*100) / 400 = 0.
        assert!((metrics.roi - 0.0).abs() < 1e-9);
    }

    #[test]
    fn return_rate_is_zero_without_purchases() {
        let outcomes = vec![outcome(OutcomeStatus::Rejected, false, None)];
        let metrics = aggregate_metrics(&outcomes, &[]);
        assert_eq!(metrics.return_rate, 0.0);
    }

    #[test]
    fn empty_window_yields_empty_metrics() {
        let metrics = aggregate_metrics(&[], &[]);
        assert_eq!(metrics.total_outcomes, 0);
        assert_eq!(metrics.roi, 0.0);
    }

    #[test]
    fn spec_trigger_example_fires_performance_and_satisfaction() {
        let previous = metrics(0.20, 4.0);
        let current = metrics(0.17, 3.3);

        let triggers = check_retraining_triggers(&current, Some(&previous));
        let types: Vec<TriggerType> = triggers.iter().map(|t| t.trigger_type).collect();
        assert_eq!(
            types,
            vec![TriggerType::PerformanceDrop, TriggerType::SatisfactionDrop]
        );
        assert_eq!(triggers[0].severity, TriggerSeverity::High);
        assert_eq!(triggers[1].severity, TriggerSeverity::Medium);
    }

    #[test]
    fn triggers_are_deterministic() {
        let previous = metrics(0.20, 4.0);
        let current = OutcomeMetrics {
            purchase_rate: 0.17,
            avg_satisfaction: 3.3,
            return_rate: 0.2,
            acceptance_rate: 0.4,
            ..OutcomeMetrics::empty()
        };

        let first = check_retraining_triggers(&current, Some(&previous));
        let second = check_retraining_triggers(&current, Some(&previous));
        let types =
            |triggers: &[RetrainingTrigger]| triggers.iter().map(|t| t.trigger_type).collect::<Vec<_>>();
        assert_eq!(types(&first), types(&second));
        assert_eq!(first.len(), 4);
    }

    #[test]
    fn no_previous_metrics_limits_trigger_set() {
        let current = OutcomeMetrics {
            purchase_rate: 0.01,
            acceptance_rate: 0.9,
            return_rate: 0.0,
            ..OutcomeMetrics::empty()
        };
        let triggers = check_retraining_triggers(&current, None);
        assert!(triggers.is_empty());
    }

    #[test]
    fn exact_threshold_does_not_fire() {
        // purchase_rate exactly 0.9x previous: strictly-below comparison.
        let previous = metrics(0.20, 4.0);
        let current = metrics(0.18, 4.0);
        let triggers = check_retraining_triggers(&current, Some(&previous));
        assert!(triggers.is_empty());
    }

    #[test]
    fn ab_test_winner_and_confidence() {
        let arm = |n: usize, purchased: usize, amount: f64| -> Vec<OutcomeRecord> {
            (0..n)
                .map(|i| {
                    outcome(
                        if i < purchased {
                            OutcomeStatus::Purchased
                        } else {
                            OutcomeStatus::NotPurchased
                        },
                        i < purchased,
                        (i < purchased).then_some(amount),
                    )
                })
                .collect()
        };

        // Small samples: confidence pinned to zero.
        let small = update_ab_test_results("t1", &arm(10, 5, 50.0), &arm(10, 8, 50.0));
        assert_eq!(small.confidence_level, 0.0);
        assert_eq!(small.winner, "variant_b");

        // Large, clearly different arms.
        let large = update_ab_test_results("t2", &arm(200, 20, 50.0), &arm(200, 80, 50.0));
        assert_eq!(large.winner, "variant_b");
        assert!((large.conversion_a - 0.1).abs() < 1e-9);
        assert!((large.conversion_b - 0.4).abs() < 1e-9);
        assert!(large.confidence_level > 0.9);
        assert!(large.confidence_level <= 0.99);
        assert!((large.revenue_b - 4000.0).abs() < 1e-9);

        // Tie goes to variant A.
        let tie = update_ab_test_results("t3", &arm(50, 10, 50.0), &arm(50, 10, 50.0));
        assert_eq!(tie.winner, "variant_a");
    }
}
