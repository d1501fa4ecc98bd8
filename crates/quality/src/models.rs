//! Audit, gating, quality and outcome model types.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reco_core::types::{ApprovalStatus, QualityLevel, Scenario};

/// Per-recommendation audit entry with its approval lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub audit_id: String,
    pub run_id: String,
    pub customer_code: String,
    pub product_key: String,
    pub scenario: Scenario,
    pub recommendation_score: f64,
    pub approval_status: ApprovalStatus,
    pub approval_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub compliance_checks: HashMap<String, bool>,
    pub flags: Vec<String>,
}

/// Lightweight recommendation view used by gating, quality and audit intake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoSnapshot {
    pub run_id: String,
    pub customer_code: String,
    pub product_key: String,
    pub scenario: Scenario,
    pub final_score: f64,
}

/// Policy applied by the gating service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatingPolicy {
    pub name: String,
    pub min_score: f64,
    pub max_score: f64,
    pub min_coverage: f64,
    pub require_approval: bool,
    pub compliance_rules: Vec<String>,
    pub enabled: bool,
}

impl GatingPolicy {
    pub fn named(name: &str, min_score: f64, min_coverage: f64, require_approval: bool) -> Self {
        Self {
            name: name.to_string(),
            min_score,
            max_score: 100.0,
            min_coverage,
            require_approval,
            compliance_rules: Vec::new(),
            enabled: true,
        }
    }
}

/// Result of one compliance rule evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceCheck {
    pub check_name: String,
    pub passed: bool,
    pub severity: String,
    pub message: String,
}

/// Run-level quality metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub run_id: String,
    pub total_recommendations: usize,
    pub coverage_score: f64,
    pub diversity_score: f64,
    pub accuracy_score: f64,
    pub avg_score: f64,
    pub median_score: f64,
    pub diversity_ratio: f64,
    pub quality_level: QualityLevel,
    pub computed_at: DateTime<Utc>,
}

/// Outcome of a recommendation once the customer reacted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeStatus {
    Pending,
    Accepted,
    Rejected,
    Purchased,
    NotPurchased,
    Returned,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Pending => "PENDING",
            OutcomeStatus::Accepted => "ACCEPTED",
            OutcomeStatus::Rejected => "REJECTED",
            OutcomeStatus::Purchased => "PURCHASED",
            OutcomeStatus::NotPurchased => "NOT_PURCHASED",
            OutcomeStatus::Returned => "RETURNED",
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutcomeStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OutcomeStatus::Pending),
            "ACCEPTED" => Ok(OutcomeStatus::Accepted),
            "REJECTED" => Ok(OutcomeStatus::Rejected),
            "PURCHASED" => Ok(OutcomeStatus::Purchased),
            "NOT_PURCHASED" => Ok(OutcomeStatus::NotPurchased),
            "RETURNED" => Ok(OutcomeStatus::Returned),
            other => Err(format!("unknown outcome status: {}", other)),
        }
    }
}

/// Declared reason behind an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeReason {
    PriceTooHigh,
    NotInterested,
    QualityConcern,
    CompetitorChoice,
    AlreadyOwns,
    QualityIssue,
    NotAsDescribed,
    BetterAlternative,
    Satisfied,
    Excellent,
}

impl OutcomeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeReason::PriceTooHigh => "PRICE_TOO_HIGH",
            OutcomeReason::NotInterested => "NOT_INTERESTED",
            OutcomeReason::QualityConcern => "QUALITY_CONCERN",
            OutcomeReason::CompetitorChoice => "COMPETITOR_CHOICE",
            OutcomeReason::AlreadyOwns => "ALREADY_OWNS",
            OutcomeReason::QualityIssue => "QUALITY_ISSUE",
            OutcomeReason::NotAsDescribed => "NOT_AS_DESCRIBED",
            OutcomeReason::BetterAlternative => "BETTER_ALTERNATIVE",
            OutcomeReason::Satisfied => "SATISFIED",
            OutcomeReason::Excellent => "EXCELLENT",
        }
    }
}

impl FromStr for OutcomeReason {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "PRICE_TOO_HIGH" => Ok(OutcomeReason::PriceTooHigh),
            "NOT_INTERESTED" => Ok(OutcomeReason::NotInterested),
            "QUALITY_CONCERN" => Ok(OutcomeReason::QualityConcern),
            "COMPETITOR_CHOICE" => Ok(OutcomeReason::CompetitorChoice),
            "ALREADY_OWNS" => Ok(OutcomeReason::AlreadyOwns),
            "QUALITY_ISSUE" => Ok(OutcomeReason::QualityIssue),
            "NOT_AS_DESCRIBED" => Ok(OutcomeReason::NotAsDescribed),
            "BETTER_ALTERNATIVE" => Ok(OutcomeReason::BetterAlternative),
            "SATISFIED" => Ok(OutcomeReason::Satisfied),
            "EXCELLENT" => Ok(OutcomeReason::Excellent),
            other => Err(format!("unknown outcome reason: {}", other)),
        }
    }
}

/// Kind of customer feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeedbackType {
    Satisfaction,
    Quality,
    Relevance,
    Price,
    Delivery,
    Custom,
}

impl FeedbackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackType::Satisfaction => "SATISFACTION",
            FeedbackType::Quality => "QUALITY",
            FeedbackType::Relevance => "RELEVANCE",
            FeedbackType::Price => "PRICE",
            FeedbackType::Delivery => "DELIVERY",
            FeedbackType::Custom => "CUSTOM",
        }
    }
}

impl FromStr for FeedbackType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "SATISFACTION" => Ok(FeedbackType::Satisfaction),
            "QUALITY" => Ok(FeedbackType::Quality),
            "RELEVANCE" => Ok(FeedbackType::Relevance),
            "PRICE" => Ok(FeedbackType::Price),
            "DELIVERY" => Ok(FeedbackType::Delivery),
            "CUSTOM" => Ok(FeedbackType::Custom),
            other => Err(format!("unknown feedback type: {}", other)),
        }
    }
}

/// Sentiment derived from the 1-5 feedback score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn from_score(score: i32) -> Self {
        if score >= 4 {
            Sentiment::Positive
        } else if score >= 3 {
            Sentiment::Neutral
        } else {
            Sentiment::Negative
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }
}

/// One recorded recommendation outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub audit_id: String,
    pub customer_code: String,
    pub product_key: String,
    pub recommendation_score: f64,
    pub status: OutcomeStatus,
    pub reason: Option<OutcomeReason>,
    pub purchased: bool,
    pub purchase_amount: Option<f64>,
    pub purchase_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One recorded feedback entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub customer_code: String,
    pub product_key: String,
    pub feedback_type: FeedbackType,
    pub score: i32,
    pub comment: Option<String>,
    pub sentiment: Sentiment,
    pub created_at: DateTime<Utc>,
}

/// Rolling-window outcome aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeMetrics {
    pub total_recommendations: usize,
    pub total_outcomes: usize,
    pub acceptance_rate: f64,
    pub purchase_rate: f64,
    pub return_rate: f64,
    pub avg_satisfaction: f64,
    pub revenue_impact: f64,
    pub roi: f64,
    pub recommendations_with_feedback: usize,
    pub recommendations_with_outcomes: usize,
    pub computed_at: DateTime<Utc>,
}

impl OutcomeMetrics {
    pub fn empty() -> Self {
        Self {
            total_recommendations: 0,
            total_outcomes: 0,
            acceptance_rate: 0.0,
            purchase_rate: 0.0,
            return_rate: 0.0,
            avg_satisfaction: 0.0,
            revenue_impact: 0.0,
            roi: 0.0,
            recommendations_with_feedback: 0,
            recommendations_with_outcomes: 0,
            computed_at: Utc::now(),
        }
    }
}

/// Retraining trigger kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
    PerformanceDrop,
    SatisfactionDrop,
    HighReturnRate,
    LowAcceptanceRate,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::PerformanceDrop => "PERFORMANCE_DROP",
            TriggerType::SatisfactionDrop => "SATISFACTION_DROP",
            TriggerType::HighReturnRate => "HIGH_RETURN_RATE",
            TriggerType::LowAcceptanceRate => "LOW_ACCEPTANCE_RATE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerSeverity {
    Low,
    Medium,
    High,
}

/// Diagnostic signal suggesting the scoring setup should be revisited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrainingTrigger {
    pub trigger_type: TriggerType,
    pub severity: TriggerSeverity,
    pub reason: String,
    pub metrics_before: serde_json::Value,
    pub metrics_after: serde_json::Value,
    pub recommended_action: String,
    pub created_at: DateTime<Utc>,
}

/// Predicted-vs-actual tracking for one recommendation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPerformance {
    pub recommendation_id: String,
    pub actual_outcome: OutcomeStatus,
    pub predicted_score: f64,
    pub confidence: f64,
    pub error_margin: f64,
    pub is_accurate: bool,
    pub created_at: DateTime<Utc>,
}

/// A/B comparison between two scoring variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbTestResult {
    pub test_id: String,
    pub variant_a: String,
    pub variant_b: String,
    pub total_users_a: usize,
    pub total_users_b: usize,
    pub conversion_a: f64,
    pub conversion_b: f64,
    pub revenue_a: f64,
    pub revenue_b: f64,
    pub confidence_level: f64,
    pub winner: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentiment_bands() {
        assert_eq!(Sentiment::from_score(5), Sentiment::Positive);
        assert_eq!(Sentiment::from_score(4), Sentiment::Positive);
        assert_eq!(Sentiment::from_score(3), Sentiment::Neutral);
        assert_eq!(Sentiment::from_score(2), Sentiment::Negative);
        assert_eq!(Sentiment::from_score(1), Sentiment::Negative);
    }

    #[test]
    fn outcome_status_round_trips() {
        for status in [
            OutcomeStatus::Pending,
            OutcomeStatus::Accepted,
            OutcomeStatus::Rejected,
            OutcomeStatus::Purchased,
            OutcomeStatus::NotPurchased,
            OutcomeStatus::Returned,
        ] {
            assert_eq!(status.as_str().parse::<OutcomeStatus>().unwrap(), status);
        }
    }
}
