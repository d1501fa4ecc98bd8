//! Audit, quality, gating and outcome tracking for recommendation runs.

pub mod audit;
pub mod error;
pub mod gating;
pub mod models;
pub mod outcomes;
pub mod quality;

pub use audit::{AuditRepository, AuditService, PostgresAuditRepository};
pub use error::{QualityError, Result};
pub use gating::{GatingBatchReport, GatingService};
pub use models::{
    AbTestResult, AuditLog, ComplianceCheck, FeedbackRecord, FeedbackType, GatingPolicy,
    ModelPerformance, OutcomeMetrics, OutcomeReason, OutcomeRecord, OutcomeStatus, QualityMetrics,
    RecoSnapshot, RetrainingTrigger, Sentiment, TriggerSeverity, TriggerType,
};
pub use outcomes::{
    aggregate_metrics, check_retraining_triggers, update_ab_test_results, OutcomesRepository,
    OutcomesService, PostgresOutcomesRepository, RECO_UNIT_COST_EUR,
};
pub use quality::{
    compute_metrics, PostgresQualityRepository, QualityReport, QualityRepository, QualityService,
};
