//! Human-readable explanations per scenario.
//!
//! Generation is a total function: every missing piece of data falls back to
//! generic copy, and store failures degrade to the fallback text instead of
//! surfacing.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use reco_core::model::Product;
use reco_core::types::Scenario;

use crate::store::RecoStore;

/// Explanation attached to one recommendation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Explanation {
    pub title: String,
    pub reason: String,
    pub components: Vec<String>,
}

pub struct ExplanationGenerator {
    store: Arc<dyn RecoStore>,
}

impl ExplanationGenerator {
    pub fn new(store: Arc<dyn RecoStore>) -> Self {
        Self { store }
    }

    /// Build the scenario-appropriate explanation. Never fails.
    pub async fn generate(
        &self,
        customer_code: &str,
        product_key: &str,
        scenario: Scenario,
    ) -> Explanation {
        let product = self.store.product(product_key).await.ok().flatten();
        let name = product
            .as_ref()
            .map(|p| p.label.clone())
            .unwrap_or_else(|| product_key.to_string());
        let family = product
            .as_ref()
            .and_then(|p| p.family.clone())
            .unwrap_or_else(|| "wine".to_string());

        match scenario {
            Scenario::Rebuy => self.rebuy(customer_code, product_key, &name, &family).await,
            Scenario::CrossSell => self.cross_sell(customer_code, &name, &family).await,
            Scenario::Upsell => upsell(&name, product.as_ref()),
            Scenario::Winback => winback(&name),
            Scenario::Nurture => nurture(&name, &family),
        }
    }

    async fn rebuy(
        &self,
        customer_code: &str,
        product_key: &str,
        name: &str,
        family: &str,
    ) -> Explanation {
        let mut components = Vec::new();
        if let Ok(Some((last_date, _count))) = self
            .store
            .last_product_purchase(customer_code, product_key)
            .await
        {
            let days_ago = (Utc::now().date_naive() - last_date).num_days().max(0);
            components.push(format!("You previously bought {}", name));
            components.push(format!("Last purchase was {} days ago", days_ago));
        }
        if components.is_empty() {
            components.push("You loved this wine before".to_string());
        }

        Explanation {
            title: format!("Get your favorite {} again", family),
            reason: format!("You've purchased {} before and it's time for more!", name),
            components,
        }
    }

    async fn cross_sell(&self, customer_code: &str, name: &str, family: &str) -> Explanation {
        let mut components = Vec::new();
        if let Ok(spend) = self.store.family_spend(customer_code).await {
            if let Some(favorite) = spend.first() {
                components.push(format!(
                    "Expand from {} to explore {}",
                    favorite.family, family
                ));
            }
        }
        if components.is_empty() {
            components.push(format!("Discover {}", family));
        }
        components.push("Perfect complement to your collection".to_string());

        Explanation {
            title: format!("Explore a new style: {}", family),
            reason: format!("Based on your preferences, you might enjoy {}.", name),
            components,
        }
    }
}

fn upsell(name: &str, product: Option<&Product>) -> Explanation {
    let tier = match product.map(|p| p.premium_tier) {
        Some(tier) if tier > 1 => format!("Grand Reserve (tier {})", tier),
        _ => "Premium".to_string(),
    };
    Explanation {
        title: format!("Upgrade to {}", name),
        reason: format!(
            "As a valued customer, we'd like to offer you {} - our premium selection.",
            name
        ),
        components: vec![
            format!("Experience {} quality", tier),
            "Enhanced flavors and complexity".to_string(),
        ],
    }
}

fn winback(name: &str) -> Explanation {
    Explanation {
        title: "Come back and discover what's new".to_string(),
        reason: format!("We'd love to welcome you back with {}.", name),
        components: vec![
            "We've missed you!".to_string(),
            format!("Try {} - a customer favorite", name),
        ],
    }
}

fn nurture(name: &str, family: &str) -> Explanation {
    Explanation {
        title: format!("Expand your palate with {}", name),
        reason: format!("Discover {} - a great way to explore new flavors.", name),
        components: vec![
            format!("Perfect entry point to {}", family),
            "Great value and quality".to_string(),
            "Recommended for enthusiasts".to_string(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_templates_have_bounded_components() {
        let explanation = winback("Riesling");
        assert_eq!(explanation.components.len(), 2);
        let explanation = nurture("Riesling", "White");
        assert_eq!(explanation.components.len(), 3);
        let explanation = upsell("Riesling", None);
        assert!(explanation.components.len() >= 2);
        assert!(explanation.components[0].contains("Premium"));
    }
}
