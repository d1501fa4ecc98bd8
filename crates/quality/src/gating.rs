//! Policy-based gating: accept or reject recommendations after scoring
//! without re-ranking them.

use dashmap::DashMap;
use serde::Serialize;
use tracing::info;

use crate::models::{GatingPolicy, RecoSnapshot};

/// Outcome of one batch gating pass.
#[derive(Debug, Clone, Serialize)]
pub struct GatingBatchReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f64,
    pub failures: Vec<GatingFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GatingFailure {
    pub reco: RecoSnapshot,
    pub issues: Vec<String>,
}

/// Policy registry plus the check logic. Policies are registered at startup
/// and read concurrently afterwards.
pub struct GatingService {
    policies: DashMap<String, GatingPolicy>,
}

impl Default for GatingService {
    fn default() -> Self {
        Self::new()
    }
}

impl GatingService {
    /// Registry seeded with the default strict/standard/permissive policies.
    pub fn new() -> Self {
        let service = Self {
            policies: DashMap::new(),
        };
        service.register(GatingPolicy::named("strict", 80.0, 0.7, true));
        service.register(GatingPolicy::named("standard", 60.0, 0.5, false));
        service.register(GatingPolicy::named("permissive", 40.0, 0.3, false));
        service
    }

    pub fn register(&self, policy: GatingPolicy) {
        info!(policy = %policy.name, min_score = policy.min_score, "registering gating policy");
        self.policies.insert(policy.name.clone(), policy);
    }

    pub fn policy(&self, name: &str) -> Option<GatingPolicy> {
        self.policies.get(name).map(|p| p.clone())
    }

    pub fn policy_names(&self) -> Vec<String> {
        self.policies.iter().map(|p| p.key().clone()).collect()
    }

    /// Check one recommendation. Unknown or disabled policies pass
    /// everything; issues enumerate each violation.
    pub fn check(&self, reco: &RecoSnapshot, policy_name: &str) -> (bool, Vec<String>) {
        let policy = match self.policies.get(policy_name) {
            Some(policy) if policy.enabled => policy,
            _ => return (true, Vec::new()),
        };

        let mut issues = Vec::new();
        if reco.final_score < policy.min_score {
            issues.push(format!(
                "Score {} below minimum {}",
                format_score(reco.final_score),
                format_score(policy.min_score)
            ));
        }
        if reco.final_score > policy.max_score {
            issues.push(format!(
                "Score {} above maximum {}",
                format_score(reco.final_score),
                format_score(policy.max_score)
            ));
        }
        for rule in &policy.compliance_rules {
            if !check_compliance_rule(reco, rule) {
                issues.push(format!("Compliance rule failed: {}", rule));
            }
        }

        (issues.is_empty(), issues)
    }

    /// Check a batch and summarize the pass rate.
    pub fn check_batch(&self, recos: &[RecoSnapshot], policy_name: &str) -> GatingBatchReport {
        let mut passed = 0;
        let mut failures = Vec::new();

        for reco in recos {
            let (ok, issues) = self.check(reco, policy_name);
            if ok {
                passed += 1;
            } else {
                failures.push(GatingFailure {
                    reco: reco.clone(),
                    issues,
                });
            }
        }

        GatingBatchReport {
            total: recos.len(),
            passed,
            failed: failures.len(),
            pass_rate: passed as f64 / recos.len().max(1) as f64,
            failures,
        }
    }
}

// Custom compliance rules resolve by name; unknown rules pass so a policy
// can carry forward rules this build does not know yet.
fn check_compliance_rule(reco: &RecoSnapshot, rule: &str) -> bool {
    match rule {
        "non_empty_product" => !reco.product_key.is_empty(),
        "scored" => reco.final_score > 0.0,
        _ => true,
    }
}

fn format_score(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use reco_core::types::Scenario;

    use super::*;

    fn reco(score: f64) -> RecoSnapshot {
        RecoSnapshot {
            run_id: "run-1".to_string(),
            customer_code: "C001".to_string(),
            product_key: "WINE001".to_string(),
            scenario: Scenario::Rebuy,
            final_score: score,
        }
    }

    #[test]
    fn standard_policy_min_score() {
        let service = GatingService::new();

        let (ok, issues) = service.check(&reco(85.0), "standard");
        assert!(ok);
        assert!(issues.is_empty());

        let (ok, issues) = service.check(&reco(40.0), "standard");
        assert!(!ok);
        assert_eq!(issues, vec!["Score 40 below minimum 60".to_string()]);
    }

    #[test]
    fn batch_pass_rate() {
        let service = GatingService::new();
        let report = service.check_batch(&[reco(85.0), reco(40.0)], "standard");
        assert_eq!(report.total, 2);
        assert_eq!(report.passed, 1);
        assert_eq!(report.failed, 1);
        assert!((report.pass_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn default_policies_are_registered() {
        let service = GatingService::new();
        let strict = service.policy("strict").unwrap();
        assert_eq!(strict.min_score, 80.0);
        assert!((strict.min_coverage - 0.7).abs() < 1e-9);
        assert!(strict.require_approval);

        let permissive = service.policy("permissive").unwrap();
        assert_eq!(permissive.min_score, 40.0);
        assert!(!permissive.require_approval);
    }

    #[test]
    fn unknown_policy_passes_everything() {
        let service = GatingService::new();
        let (ok, issues) = service.check(&reco(1.0), "nonexistent");
        assert!(ok);
        assert!(issues.is_empty());
    }

    #[test]
    fn disabled_policy_passes_everything() {
        let service = GatingService::new();
        let mut policy = GatingPolicy::named("off", 90.0, 0.9, false);
        policy.enabled = false;
        service.register(policy);

        let (ok, _) = service.check(&reco(10.0), "off");
        assert!(ok);
    }

    #[test]
    fn compliance_rules_report_by_name() {
        let service = GatingService::new();
        let mut policy = GatingPolicy::named("compliance", 0.0, 0.0, false);
        policy.compliance_rules = vec!["scored".to_string()];
        service.register(policy);

        let (ok, issues) = service.check(&reco(0.0), "compliance");
        assert!(!ok);
        assert_eq!(issues, vec!["Compliance rule failed: scored".to_string()]);
    }

    #[test]
    fn permissive_boundary_is_inclusive() {
        let service = GatingService::new();
        let (ok, _) = service.check(&reco(40.0), "permissive");
        assert!(ok);
    }
}
