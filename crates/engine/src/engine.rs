//! Run-level orchestration of the recommendation pipeline:
//! features -> scenarios -> scores -> rank/diversify -> explanations ->
//! atomic persistence.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use reco_core::config::RecoConfig;
use reco_core::model::RecoRun;
use reco_core::types::Scenario;

use crate::error::Result;
use crate::explain::ExplanationGenerator;
use crate::features::{CustomerFeatures, FeatureComputer};
use crate::scenarios::ScenarioMatcher;
use crate::scorer::{self, RecoScore, Scorer};
use crate::store::{product_families, NewRecoItem, RecoStore};

/// Why a generation attempt produced no recommendations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkipReason {
    NotContactable,
    SilenceWindow,
    NoScenarioMatched,
    NoCandidatesScored,
    PersistFailed,
    Timeout,
    Internal,
}

/// One recommendation with its rank, scores and explanation.
#[derive(Debug, Clone, Serialize)]
pub struct RecommendationItem {
    pub rank: usize,
    pub product_key: String,
    pub scenario: Scenario,
    pub score: RecoScore,
    pub explanation: crate::explain::Explanation,
    pub created_at: DateTime<Utc>,
}

/// Result of one generation attempt; `success = false` carries the reason
/// here rather than raising.
#[derive(Debug, Clone, Serialize)]
pub struct RecommendationResult {
    pub run_id: String,
    pub customer_code: String,
    pub generated_at: DateTime<Utc>,
    pub recommendations: Vec<RecommendationItem>,
    pub scenarios_matched: Vec<(Scenario, Vec<String>)>,
    pub features: Option<CustomerFeatures>,
    pub skip_reason: Option<SkipReason>,
}

impl RecommendationResult {
    fn new(customer_code: &str, run_id: String) -> Self {
        Self {
            run_id,
            customer_code: customer_code.to_string(),
            generated_at: Utc::now(),
            recommendations: Vec::new(),
            scenarios_matched: Vec::new(),
            features: None,
            skip_reason: None,
        }
    }

    fn skipped(mut self, reason: SkipReason) -> Self {
        self.skip_reason = Some(reason);
        self
    }
}

/// The recommendation engine.
pub struct RecommendationEngine {
    store: Arc<dyn RecoStore>,
    features: FeatureComputer,
    matcher: ScenarioMatcher,
    scorer: Scorer,
    explainer: ExplanationGenerator,
    config: RecoConfig,
    config_hash: String,
}

impl RecommendationEngine {
    pub fn new(store: Arc<dyn RecoStore>, config: RecoConfig) -> Self {
        let config_hash = hash_config(&config);
        Self {
            features: FeatureComputer::new(store.clone()),
            matcher: ScenarioMatcher::new(store.clone()),
            scorer: Scorer::new(store.clone()),
            explainer: ExplanationGenerator::new(store.clone()),
            store,
            config,
            config_hash,
        }
    }

    /// Generate and persist recommendations for one customer.
    pub async fn generate(
        &self,
        customer_code: &str,
        max_k: usize,
        enable_silence_check: bool,
    ) -> (RecommendationResult, bool) {
        let run_id = Uuid::new_v4().to_string();
        let started = std::time::Instant::now();
        info!(customer_code, run_id = %run_id, "starting recommendation generation");

        match self
            .generate_inner(customer_code, &run_id, max_k, enable_silence_check, started)
            .await
        {
            Ok((result, success)) => (result, success),
            Err(e) => {
                warn!(customer_code, run_id = %run_id, error = %e, "recommendation generation failed");
                (
                    RecommendationResult::new(customer_code, run_id).skipped(SkipReason::Internal),
                    false,
                )
            }
        }
    }

    async fn generate_inner(
        &self,
        customer_code: &str,
        run_id: &str,
        max_k: usize,
        enable_silence_check: bool,
        started: std::time::Instant,
    ) -> Result<(RecommendationResult, bool)> {
        let mut result = RecommendationResult::new(customer_code, run_id.to_string());
        let today = Utc::now().date_naive();

        // Step 0: contactability. Bounced or opted-out customers are never
        // eligible, whatever the silence window says.
        if let Some(customer) = self.store.customer(customer_code).await? {
            if !customer.contactable {
                info!(customer_code, "customer not contactable, skipping");
                return Ok((result.skipped(SkipReason::NotContactable), false));
            }
        }

        // Step 1: features and the silence gate.
        let features = self.features.compute_as_of(customer_code, today).await?;
        if enable_silence_check
            && self
                .features
                .in_silence_window(customer_code, self.config.silence_window_days, today)
                .await?
        {
            info!(customer_code, "customer in silence window, skipping");
            result.features = Some(features);
            return Ok((result.skipped(SkipReason::SilenceWindow), false));
        }

        // Step 2: scenario matching.
        let scenarios = self
            .matcher
            .match_scenarios(customer_code, &features, run_id, today)
            .await?;
        result.features = Some(features);
        if scenarios.is_empty() {
            info!(customer_code, "no scenarios matched");
            return Ok((result.skipped(SkipReason::NoScenarioMatched), false));
        }
        result.scenarios_matched = scenarios.clone();

        // Step 3: score every candidate.
        let mut scores: Vec<RecoScore> = Vec::new();
        for (scenario, product_keys) in &scenarios {
            for product_key in product_keys {
                scores.push(self.scorer.score(customer_code, product_key, *scenario).await?);
            }
        }
        if scores.is_empty() {
            return Ok((result.skipped(SkipReason::NoCandidatesScored), false));
        }

        // Step 4: rank then diversify down to K.
        let ranked = scorer::rank(scores);
        let families = product_families(
            self.store.as_ref(),
            ranked.iter().map(|s| s.product_key.as_str()),
        )
        .await?;
        let slate = scorer::diversify(&ranked, &families, max_k);

        // Step 5: explanations.
        let mut items: Vec<NewRecoItem> = Vec::with_capacity(slate.len());
        for (index, score) in slate.into_iter().enumerate() {
            let explanation = self
                .explainer
                .generate(customer_code, &score.product_key, score.scenario)
                .await;
            items.push(NewRecoItem {
                rank: (index + 1) as i32,
                scenario: score.scenario,
                product_key: score.product_key.clone(),
                score,
                explanation,
            });
        }

        // Step 6: persist run + items atomically.
        let run = self.build_run(run_id, &result, &items, started);
        if let Err(e) = self
            .store
            .insert_run_with_items(&run, customer_code, &items)
            .await
        {
            warn!(customer_code, run_id, error = %e, "failed to persist recommendations");
            return Ok((result.skipped(SkipReason::PersistFailed), false));
        }

        result.recommendations = items
            .into_iter()
            .map(|item| RecommendationItem {
                rank: item.rank as usize,
                product_key: item.product_key,
                scenario: item.scenario,
                score: item.score,
                explanation: item.explanation,
                created_at: run.run_timestamp,
            })
            .collect();

        info!(
            customer_code,
            run_id,
            recommendations = result.recommendations.len(),
            scenarios = result.scenarios_matched.len(),
            "recommendation generation complete"
        );
        Ok((result, true))
    }

    fn build_run(
        &self,
        run_id: &str,
        result: &RecommendationResult,
        items: &[NewRecoItem],
        started: std::time::Instant,
    ) -> RecoRun {
        let scenario_counts: HashMap<&str, usize> = result
            .scenarios_matched
            .iter()
            .map(|(scenario, products)| (scenario.as_str(), products.len()))
            .collect();
        let avg_score = if items.is_empty() {
            0.0
        } else {
            items.iter().map(|i| i.score.final_score).sum::<f64>() / items.len() as f64
        };

        RecoRun {
            run_id: run_id.to_string(),
            config_hash: self.config_hash.clone(),
            code_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            dataset_version: None,
            run_timestamp: Utc::now(),
            total_customers: 1,
            eligible_customers: 1,
            exported_customers: i32::from(!items.is_empty()),
            duration_seconds: Some(started.elapsed().as_secs_f64()),
            summary: Some(serde_json::json!({
                "scenarios": scenario_counts,
                "avg_score": avg_score,
                "items": items.len(),
            })),
            created_at: Utc::now(),
        }
    }

    /// Generate for a batch of customers with bounded parallelism and a
    /// per-customer deadline. A timed-out customer persists nothing.
    pub async fn generate_batch(
        &self,
        customer_codes: Option<Vec<String>>,
        limit: Option<usize>,
    ) -> HashMap<String, (RecommendationResult, bool)> {
        let codes = match customer_codes {
            Some(codes) => codes,
            None => match self
                .store
                .list_customer_codes(limit.unwrap_or(100_000))
                .await
            {
                Ok(codes) => codes,
                Err(e) => {
                    warn!(error = %e, "failed to enumerate customers for batch");
                    return HashMap::new();
                }
            },
        };
        info!(customers = codes.len(), "starting batch recommendation generation");

        let deadline = Duration::from_secs(self.config.customer_timeout_secs);
        let max_k = self.config.max_recommendations;

        let results: Vec<(String, (RecommendationResult, bool))> = stream::iter(codes)
            .map(|code| async move {
                let outcome =
                    match tokio::time::timeout(deadline, self.generate(&code, max_k, true)).await {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            warn!(customer_code = %code, "recommendation generation timed out");
                            (
                                RecommendationResult::new(&code, Uuid::new_v4().to_string())
                                    .skipped(SkipReason::Timeout),
                                false,
                            )
                        }
                    };
                (code, outcome)
            })
            .buffer_unordered(self.config.batch_parallelism.max(1))
            .collect()
            .await;

        let successes = results.iter().filter(|(_, (_, ok))| *ok).count();
        info!(
            total = results.len(),
            successes,
            "batch recommendation generation complete"
        );
        results.into_iter().collect()
    }
}

fn hash_config(config: &RecoConfig) -> String {
    let payload = serde_json::json!({
        "max_recommendations": config.max_recommendations,
        "silence_window_days": config.silence_window_days,
        "weights": {
            "affinity": scorer::WEIGHT_AFFINITY,
            "popularity": scorer::WEIGHT_POPULARITY,
            "profit": scorer::WEIGHT_PROFIT,
            "base": scorer::WEIGHT_BASE,
        },
    });
    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    hex::encode(hasher.finalize())
}
