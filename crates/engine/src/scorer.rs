//! Multi-factor scoring, ranking and family-aware diversification.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use reco_core::types::Scenario;

use crate::error::Result;
use crate::store::RecoStore;

/// Weights of the final score combination.
pub const WEIGHT_AFFINITY: f64 = 0.40;
pub const WEIGHT_POPULARITY: f64 = 0.30;
pub const WEIGHT_PROFIT: f64 = 0.20;
pub const WEIGHT_BASE: f64 = 0.10;

/// Score breakdown for one (customer, product, scenario) candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoScore {
    pub product_key: String,
    pub scenario: Scenario,
    pub base_score: f64,
    pub affinity_score: f64,
    pub popularity_score: f64,
    pub profit_score: f64,
    pub final_score: f64,
}

/// Computes component scores against the store.
pub struct Scorer {
    store: Arc<dyn RecoStore>,
}

impl Scorer {
    pub fn new(store: Arc<dyn RecoStore>) -> Self {
        Self { store }
    }

    /// Full score for one candidate.
    pub async fn score(
        &self,
        customer_code: &str,
        product_key: &str,
        scenario: Scenario,
    ) -> Result<RecoScore> {
        let affinity = self.affinity_score(customer_code, product_key).await?;
        let product = self.store.product(product_key).await?;
        let popularity = popularity_component(product.as_ref().and_then(|p| p.popularity));
        // Margin data is absent from the sources; popularity stands in as the
        // profitability proxy.
        let profit = popularity;
        let base = scenario.base_score();

        let final_score = WEIGHT_AFFINITY * affinity
            + WEIGHT_POPULARITY * popularity
            + WEIGHT_PROFIT * profit
            + WEIGHT_BASE * base;

        Ok(RecoScore {
            product_key: product_key.to_string(),
            scenario,
            base_score: base,
            affinity_score: affinity,
            popularity_score: popularity,
            profit_score: profit,
            final_score,
        })
    }

    /// Affinity in [0, 100]: 50 baseline, +25 for the customer's top family,
    /// +10 for any other known family.
    async fn affinity_score(&self, customer_code: &str, product_key: &str) -> Result<f64> {
        let product = match self.store.product(product_key).await? {
            Some(product) => product,
            None => return Ok(50.0),
        };

        let top_family = self
            .store
            .family_spend(customer_code)
            .await?
            .into_iter()
            .next()
            .map(|s| s.family);

        let mut score: f64 = 50.0;
        match (&product.family, &top_family) {
            (Some(family), Some(top)) if family == top => score += 25.0,
            (Some(_), _) => score += 10.0,
            (None, _) => {}
        }
        Ok(score.min(100.0))
    }
}

fn popularity_component(popularity: Option<f64>) -> f64 {
    match popularity {
        Some(p) => (p * 100.0).clamp(0.0, 100.0),
        None => 50.0,
    }
}

/// Rank candidates: final score descending, stable tie-break on scenario
/// priority then product key.
pub fn rank(mut scores: Vec<RecoScore>) -> Vec<RecoScore> {
    scores.sort_by(|a, b| {
        b.final_score
            .total_cmp(&a.final_score)
            .then_with(|| a.scenario.tie_break_order().cmp(&b.scenario.tie_break_order()))
            .then_with(|| a.product_key.cmp(&b.product_key))
    });
    scores
}

/// Greedy family-aware diversification.
///
/// The first candidate is always kept; afterwards only candidates
/// introducing a new family are kept, until the slate reaches `k`. If the
/// pass leaves fewer than `k` picks, same-family candidates backfill in rank
/// order.
pub fn diversify(
    ranked: &[RecoScore],
    families: &HashMap<String, Option<String>>,
    k: usize,
) -> Vec<RecoScore> {
    if ranked.is_empty() || k == 0 {
        return Vec::new();
    }

    let mut selected: Vec<RecoScore> = Vec::with_capacity(k);
    let mut picked: HashSet<String> = HashSet::new();
    let mut used_families: HashSet<String> = HashSet::new();

    for score in ranked {
        if selected.len() >= k {
            break;
        }
        let family = families.get(&score.product_key).cloned().flatten();
        let is_new_family = match &family {
            Some(family) => !used_families.contains(family),
            None => true,
        };
        if selected.is_empty() || is_new_family {
            if let Some(family) = family {
                used_families.insert(family);
            }
            picked.insert(score.product_key.clone());
            selected.push(score.clone());
        }
    }

    // Backfill with same-family candidates in rank order.
    if selected.len() < k {
        for score in ranked {
            if selected.len() >= k {
                break;
            }
            if !picked.contains(&score.product_key) {
                picked.insert(score.product_key.clone());
                selected.push(score.clone());
            }
        }
    }

    selected
}
