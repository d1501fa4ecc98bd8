//! Per-customer feature computation. Pure read path; never mutates.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use reco_core::types::BudgetLevel;

use crate::error::Result;
use crate::store::RecoStore;

/// Fixed-bucket recency score (0..5): independent of the population so a
/// single customer can be scored in isolation.
pub fn recency_score(days_since_purchase: Option<i64>) -> u8 {
    match days_since_purchase {
        None => 0,
        Some(days) if days <= 30 => 5,
        Some(days) if days <= 90 => 4,
        Some(days) if days <= 180 => 3,
        Some(days) if days <= 365 => 2,
        Some(_) => 1,
    }
}

/// Fixed-bucket frequency score (0..5).
pub fn frequency_score(purchase_count: i64) -> u8 {
    if purchase_count >= 10 {
        5
    } else if purchase_count >= 5 {
        4
    } else if purchase_count >= 2 {
        3
    } else if purchase_count == 1 {
        2
    } else {
        0
    }
}

/// Fixed-bucket monetary score (0..5).
pub fn monetary_score(total_spent: f64) -> u8 {
    if total_spent >= 5000.0 {
        5
    } else if total_spent >= 2000.0 {
        4
    } else if total_spent >= 500.0 {
        3
    } else if total_spent >= 100.0 {
        2
    } else if total_spent > 0.0 {
        1
    } else {
        0
    }
}

/// Everything the matcher and scorer need to know about a customer.
#[derive(Debug, Clone, Serialize)]
pub struct CustomerFeatures {
    pub customer_code: String,
    pub computed_at: DateTime<Utc>,
    pub purchase_count: i64,
    pub total_spent: f64,
    pub avg_order_value: f64,
    pub first_purchase_date: Option<NaiveDate>,
    pub last_purchase_date: Option<NaiveDate>,
    pub days_since_purchase: Option<i64>,
    pub recency_score: u8,
    pub frequency_score: u8,
    pub monetary_score: u8,
    /// Revenue share per family in the customer's history.
    pub family_affinity: HashMap<String, f64>,
    pub budget_level: BudgetLevel,
}

/// Computes features from the store.
pub struct FeatureComputer {
    store: Arc<dyn RecoStore>,
}

impl FeatureComputer {
    pub fn new(store: Arc<dyn RecoStore>) -> Self {
        Self { store }
    }

    pub async fn compute(&self, customer_code: &str) -> Result<CustomerFeatures> {
        let today = Utc::now().date_naive();
        self.compute_as_of(customer_code, today).await
    }

    /// Date-injectable variant for deterministic tests.
    pub async fn compute_as_of(
        &self,
        customer_code: &str,
        today: NaiveDate,
    ) -> Result<CustomerFeatures> {
        let stats = self.store.order_stats(customer_code).await?;

        let days_since_purchase = stats
            .last_purchase_date
            .map(|last| (today - last).num_days().max(0));

        let spend = self.store.family_spend(customer_code).await?;
        let total: f64 = spend.iter().map(|s| s.amount_ht).sum();
        let family_affinity: HashMap<String, f64> = if total > 0.0 {
            spend
                .into_iter()
                .map(|s| (s.family, s.amount_ht / total))
                .collect()
        } else {
            HashMap::new()
        };

        Ok(CustomerFeatures {
            customer_code: customer_code.to_string(),
            computed_at: Utc::now(),
            purchase_count: stats.purchase_count,
            total_spent: stats.total_spent,
            avg_order_value: stats.avg_order_value,
            first_purchase_date: stats.first_purchase_date,
            last_purchase_date: stats.last_purchase_date,
            days_since_purchase,
            recency_score: recency_score(days_since_purchase),
            frequency_score: frequency_score(stats.purchase_count),
            monetary_score: monetary_score(stats.total_spent),
            family_affinity,
            budget_level: BudgetLevel::from_avg_order_value(stats.avg_order_value),
        })
    }

    /// True iff the customer was contacted within the last `window_days`.
    pub async fn in_silence_window(
        &self,
        customer_code: &str,
        window_days: i64,
        today: NaiveDate,
    ) -> Result<bool> {
        let last_contact = self.store.last_contact_date(customer_code).await?;
        Ok(match last_contact {
            None => false,
            Some(date) => (today - date).num_days() < window_days,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recency_buckets() {
        assert_eq!(recency_score(None), 0);
        assert_eq!(recency_score(Some(0)), 5);
        assert_eq!(recency_score(Some(30)), 5);
        assert_eq!(recency_score(Some(31)), 4);
        assert_eq!(recency_score(Some(90)), 4);
        assert_eq!(recency_score(Some(180)), 3);
        assert_eq!(recency_score(Some(365)), 2);
        assert_eq!(recency_score(Some(366)), 1);
    }

    #[test]
    fn frequency_buckets() {
        assert_eq!(frequency_score(0), 0);
        assert_eq!(frequency_score(1), 2);
        assert_eq!(frequency_score(2), 3);
        assert_eq!(frequency_score(5), 4);
        assert_eq!(frequency_score(10), 5);
    }

    #[test]
    fn monetary_buckets() {
        assert_eq!(monetary_score(0.0), 0);
        assert_eq!(monetary_score(50.0), 1);
        assert_eq!(monetary_score(100.0), 2);
        assert_eq!(monetary_score(500.0), 3);
        assert_eq!(monetary_score(2000.0), 4);
        assert_eq!(monetary_score(5000.0), 5);
    }
}
