//! End-to-end engine scenarios against an in-memory store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};

use reco_core::config::RecoConfig;
use reco_core::model::{AromaProfile, Customer, Product, RecoRun};
use reco_core::types::Scenario;
use reco_engine::engine::SkipReason;
use reco_engine::store::{
    FamilySpend, NewRecoItem, OrderStats, ProductFilter, ProductView, PurchasedProduct, RecoStore,
};
use reco_engine::RecommendationEngine;

#[derive(Debug, Clone)]
struct Order {
    customer_code: String,
    product_key: String,
    order_date: NaiveDate,
    amount_ht: f64,
}

#[derive(Default)]
struct InMemoryRecoStore {
    products: HashMap<String, ProductView>,
    orders: Vec<Order>,
    last_contacts: HashMap<String, NaiveDate>,
    customers: Vec<String>,
    non_contactable: Vec<String>,
    persisted: Mutex<Vec<(RecoRun, String, Vec<NewRecoItem>)>>,
}

impl InMemoryRecoStore {
    fn add_product(
        &mut self,
        key: &str,
        family: Option<&str>,
        popularity: f64,
        premium_tier: i32,
    ) {
        self.products.insert(
            key.to_string(),
            ProductView {
                product_key: key.to_string(),
                label: format!("{} label", key),
                family: family.map(String::from),
                popularity: Some(popularity),
                premium_tier,
            },
        );
    }

    fn add_order(&mut self, customer: &str, product: &str, days_ago: i64, amount: f64) {
        if !self.customers.contains(&customer.to_string()) {
            self.customers.push(customer.to_string());
        }
        self.orders.push(Order {
            customer_code: customer.to_string(),
            product_key: product.to_string(),
            order_date: Utc::now().date_naive() - Duration::days(days_ago),
            amount_ht: amount,
        });
    }

    fn add_customer(&mut self, customer: &str) {
        if !self.customers.contains(&customer.to_string()) {
            self.customers.push(customer.to_string());
        }
    }

    fn persisted_items(&self) -> Vec<(RecoRun, String, Vec<NewRecoItem>)> {
        self.persisted.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecoStore for InMemoryRecoStore {
    async fn customer(&self, customer_code: &str) -> reco_engine::Result<Option<Customer>> {
        if !self.customers.contains(&customer_code.to_string()) {
            return Ok(None);
        }
        let contactable = !self.non_contactable.contains(&customer_code.to_string());
        Ok(Some(Customer {
            customer_code: customer_code.to_string(),
            last_name: None,
            first_name: None,
            email: None,
            phone: None,
            address: None,
            postal_code: None,
            city: None,
            country: None,
            bounced: !contactable,
            opted_out: false,
            contactable,
            codes_merged: false,
            duplicate_count: 1,
            batch_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }))
    }

    async fn order_stats(&self, customer_code: &str) -> reco_engine::Result<OrderStats> {
        let lines: Vec<&Order> = self
            .orders
            .iter()
            .filter(|o| o.customer_code == customer_code)
            .collect();
        if lines.is_empty() {
            return Ok(OrderStats::default());
        }
        let total: f64 = lines.iter().map(|o| o.amount_ht).sum();
        Ok(OrderStats {
            purchase_count: lines.len() as i64,
            total_spent: total,
            avg_order_value: total / lines.len() as f64,
            first_purchase_date: lines.iter().map(|o| o.order_date).min(),
            last_purchase_date: lines.iter().map(|o| o.order_date).max(),
        })
    }

    async fn family_spend(&self, customer_code: &str) -> reco_engine::Result<Vec<FamilySpend>> {
        let mut by_family: HashMap<String, f64> = HashMap::new();
        for order in self.orders.iter().filter(|o| o.customer_code == customer_code) {
            if let Some(family) = self
                .products
                .get(&order.product_key)
                .and_then(|p| p.family.clone())
            {
                *by_family.entry(family).or_default() += order.amount_ht;
            }
        }
        let mut spend: Vec<FamilySpend> = by_family
            .into_iter()
            .map(|(family, amount_ht)| FamilySpend { family, amount_ht })
            .collect();
        spend.sort_by(|a, b| b.amount_ht.total_cmp(&a.amount_ht));
        Ok(spend)
    }

    async fn last_contact_date(
        &self,
        customer_code: &str,
    ) -> reco_engine::Result<Option<NaiveDate>> {
        Ok(self.last_contacts.get(customer_code).copied())
    }

    async fn purchased_products_before(
        &self,
        customer_code: &str,
        cutoff: NaiveDate,
        min_popularity: f64,
        limit: usize,
    ) -> reco_engine::Result<Vec<PurchasedProduct>> {
        let mut last_dates: HashMap<String, NaiveDate> = HashMap::new();
        for order in self.orders.iter().filter(|o| o.customer_code == customer_code) {
            let entry = last_dates
                .entry(order.product_key.clone())
                .or_insert(order.order_date);
            if order.order_date > *entry {
                *entry = order.order_date;
            }
        }

        let mut products: Vec<PurchasedProduct> = last_dates
            .into_iter()
            .filter(|(_, last)| *last <= cutoff)
            .filter_map(|(key, last)| {
                let popularity = self.products.get(&key).and_then(|p| p.popularity);
                if popularity.unwrap_or(0.0) >= min_popularity {
                    Some(PurchasedProduct {
                        product_key: key,
                        last_order_date: last,
                        popularity,
                    })
                } else {
                    None
                }
            })
            .collect();
        products.sort_by(|a, b| b.last_order_date.cmp(&a.last_order_date));
        products.truncate(limit);
        Ok(products)
    }

    async fn products_by_popularity(
        &self,
        filter: &ProductFilter,
    ) -> reco_engine::Result<Vec<ProductView>> {
        let mut products: Vec<ProductView> = self
            .products
            .values()
            .filter(|p| p.popularity.unwrap_or(0.0) >= filter.min_popularity)
            .filter(|p| !filter.premium_only || p.premium_tier > 0)
            .filter(|p| !filter.require_family || p.family.is_some())
            .filter(|p| {
                p.family
                    .as_ref()
                    .map(|f| !filter.exclude_families.contains(f))
                    .unwrap_or(true)
            })
            .filter(|p| !filter.exclude_products.contains(&p.product_key))
            .cloned()
            .collect();
        products.sort_by(|a, b| {
            b.popularity
                .unwrap_or(0.0)
                .total_cmp(&a.popularity.unwrap_or(0.0))
                .then_with(|| a.product_key.cmp(&b.product_key))
        });
        products.truncate(filter.limit);
        Ok(products)
    }

    async fn product(&self, product_key: &str) -> reco_engine::Result<Option<Product>> {
        Ok(self.products.get(product_key).map(|view| Product {
            product_key: view.product_key.clone(),
            label: view.label.clone(),
            family: view.family.clone(),
            grape: None,
            sucrosity: None,
            price_band: None,
            premium_tier: view.premium_tier,
            aroma: AromaProfile::default(),
            is_active: true,
            is_archived: false,
            popularity: view.popularity,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }))
    }

    async fn last_product_purchase(
        &self,
        customer_code: &str,
        product_key: &str,
    ) -> reco_engine::Result<Option<(NaiveDate, i64)>> {
        let lines: Vec<&Order> = self
            .orders
            .iter()
            .filter(|o| o.customer_code == customer_code && o.product_key == product_key)
            .collect();
        Ok(lines
            .iter()
            .map(|o| o.order_date)
            .max()
            .map(|date| (date, lines.len() as i64)))
    }

    async fn list_customer_codes(&self, limit: usize) -> reco_engine::Result<Vec<String>> {
        Ok(self.customers.iter().take(limit).cloned().collect())
    }

    async fn insert_run_with_items(
        &self,
        run: &RecoRun,
        customer_code: &str,
        items: &[NewRecoItem],
    ) -> reco_engine::Result<()> {
        self.persisted.lock().unwrap().push((
            run.clone(),
            customer_code.to_string(),
            items.to_vec(),
        ));
        Ok(())
    }
}

fn engine_with(store: InMemoryRecoStore) -> (RecommendationEngine, Arc<InMemoryRecoStore>) {
    let store = Arc::new(store);
    (
        RecommendationEngine::new(store.clone(), RecoConfig::default()),
        store,
    )
}

#[tokio::test]
async fn rebuy_match_scores_and_persists() {
    let mut store = InMemoryRecoStore::default();
    store.add_product("WINE001", Some("Riesling"), 0.8, 0);
    store.add_order("C001", "WINE001", 120, 45.0);

    let (engine, store) = engine_with(store);
    let (result, success) = engine.generate("C001", 3, true).await;

    assert!(success);
    assert_eq!(
        result.scenarios_matched,
        vec![(Scenario::Rebuy, vec!["WINE001".to_string()])]
    );
    assert_eq!(result.recommendations.len(), 1);

    let item = &result.recommendations[0];
    assert_eq!(item.rank, 1);
    assert_eq!(item.scenario, Scenario::Rebuy);
    assert!((item.score.base_score - 85.0).abs() < 1e-9);
    assert!((item.score.affinity_score - 75.0).abs() < 1e-9);
    assert!((item.score.popularity_score - 80.0).abs() < 1e-9);
    assert!((item.score.profit_score - 80.0).abs() < 1e-9);
    assert!((item.score.final_score - 78.5).abs() < 1e-9);

    let persisted = store.persisted_items();
    assert_eq!(persisted.len(), 1);
    let (run, customer, items) = &persisted[0];
    assert_eq!(customer, "C001");
    assert_eq!(items.len(), 1);
    assert_eq!(run.run_id, result.run_id);
}

#[tokio::test]
async fn non_contactable_customer_is_skipped() {
    let mut store = InMemoryRecoStore::default();
    store.add_product("WINE001", Some("Riesling"), 0.8, 0);
    store.add_order("C001", "WINE001", 120, 45.0);
    store.non_contactable.push("C001".to_string());

    let (engine, store) = engine_with(store);
    let (result, success) = engine.generate("C001", 3, true).await;

    assert!(!success);
    assert_eq!(result.skip_reason, Some(SkipReason::NotContactable));
    assert!(store.persisted_items().is_empty());
}

#[tokio::test]
async fn silence_window_blocks_generation() {
    let mut store = InMemoryRecoStore::default();
    store.add_product("WINE001", Some("Riesling"), 0.8, 0);
    store.add_order("C001", "WINE001", 120, 45.0);
    store
        .last_contacts
        .insert("C001".to_string(), Utc::now().date_naive() - Duration::days(10));

    let (engine, store) = engine_with(store);
    let (result, success) = engine.generate("C001", 3, true).await;

    assert!(!success);
    assert_eq!(result.skip_reason, Some(SkipReason::SilenceWindow));
    assert!(result.recommendations.is_empty());
    assert!(store.persisted_items().is_empty());
}

#[tokio::test]
async fn silence_window_boundary_passes_at_exactly_n_days() {
    let mut store = InMemoryRecoStore::default();
    store.add_product("WINE001", Some("Riesling"), 0.8, 0);
    store.add_order("C001", "WINE001", 120, 45.0);
    store
        .last_contacts
        .insert("C001".to_string(), Utc::now().date_naive() - Duration::days(30));

    let (engine, _store) = engine_with(store);
    let (_result, success) = engine.generate("C001", 3, true).await;
    assert!(success);
}

#[tokio::test]
async fn disabled_silence_check_ignores_contacts() {
    let mut store = InMemoryRecoStore::default();
    store.add_product("WINE001", Some("Riesling"), 0.8, 0);
    store.add_order("C001", "WINE001", 120, 45.0);
    store
        .last_contacts
        .insert("C001".to_string(), Utc::now().date_naive() - Duration::days(1));

    let (engine, _store) = engine_with(store);
    let (_result, success) = engine.generate("C001", 3, false).await;
    assert!(success);
}

#[tokio::test]
async fn diversification_prefers_second_family() {
    let mut store = InMemoryRecoStore::default();
    store.add_product("P1", Some("Red"), 0.8, 0);
    store.add_product("P2", Some("Red"), 0.75, 0);
    store.add_product("P3", Some("White"), 0.45, 0);
    store.add_order("C002", "P1", 120, 30.0);
    store.add_order("C002", "P2", 130, 30.0);

    let (engine, _store) = engine_with(store);
    let (result, success) = engine.generate("C002", 3, true).await;

    assert!(success);
    let keys: Vec<&str> = result
        .recommendations
        .iter()
        .map(|r| r.product_key.as_str())
        .collect();
    // P3 (White) jumps ahead of the second Red product.
    assert_eq!(keys, vec!["P1", "P3", "P2"]);
    let ranks: Vec<usize> = result.recommendations.iter().map(|r| r.rank).collect();
    assert_eq!(ranks, vec![1, 2, 3]);
}

#[tokio::test]
async fn rank_contract_holds_without_family_reordering() {
    let mut store = InMemoryRecoStore::default();
    store.add_product("P1", Some("Red"), 0.9, 0);
    store.add_product("P2", Some("Red"), 0.6, 0);
    store.add_order("C003", "P1", 100, 40.0);
    store.add_order("C003", "P2", 200, 40.0);

    let (engine, _store) = engine_with(store);
    let (result, success) = engine.generate("C003", 3, true).await;

    assert!(success);
    let k = result.recommendations.len();
    assert!(k >= 1 && k <= 3);
    for (index, item) in result.recommendations.iter().enumerate() {
        assert_eq!(item.rank, index + 1);
    }
    for pair in result.recommendations.windows(2) {
        assert!(pair[0].score.final_score >= pair[1].score.final_score);
    }
}

#[tokio::test]
async fn score_components_stay_in_bounds() {
    let mut store = InMemoryRecoStore::default();
    store.add_product("P1", Some("Red"), 1.0, 2);
    store.add_product("P2", Some("White"), 0.3, 0);
    store.add_product("P3", None, 0.7, 1);
    for (i, product) in ["P1", "P2", "P3"].iter().enumerate() {
        store.add_order("C004", product, 120 + i as i64 * 30, 400.0);
    }

    let (engine, _store) = engine_with(store);
    let (result, success) = engine.generate("C004", 3, true).await;

    assert!(success);
    for item in &result.recommendations {
        let s = &item.score;
        for value in [
            s.base_score,
            s.affinity_score,
            s.popularity_score,
            s.profit_score,
            s.final_score,
        ] {
            assert!((0.0..=100.0).contains(&value), "out of bounds: {}", value);
        }
    }
}

#[tokio::test]
async fn customer_without_history_or_catalog_matches_nothing() {
    let mut store = InMemoryRecoStore::default();
    store.add_customer("C005");

    let (engine, store) = engine_with(store);
    let (result, success) = engine.generate("C005", 3, true).await;

    assert!(!success);
    assert_eq!(result.skip_reason, Some(SkipReason::NoScenarioMatched));
    assert!(store.persisted_items().is_empty());
}

#[tokio::test]
async fn new_customer_gets_nurture_sample() {
    let mut store = InMemoryRecoStore::default();
    store.add_product("P1", Some("Red"), 0.5, 0);
    store.add_product("P2", Some("White"), 0.4, 0);
    store.add_product("P3", Some("Rose"), 0.35, 0);
    store.add_customer("C006");

    let (engine, _store) = engine_with(store);
    let (result, success) = engine.generate("C006", 3, true).await;

    assert!(success);
    assert_eq!(result.scenarios_matched.len(), 1);
    assert_eq!(result.scenarios_matched[0].0, Scenario::Nurture);
    assert!(!result.recommendations.is_empty());
}

#[tokio::test]
async fn upsell_requires_spend_threshold() {
    let mut store = InMemoryRecoStore::default();
    store.add_product("CHEAP", Some("Red"), 0.8, 0);
    store.add_product("PREMIUM", Some("White"), 0.9, 2);
    // 600 EUR of history crosses the 500 EUR threshold.
    store.add_order("C007", "CHEAP", 120, 300.0);
    store.add_order("C007", "CHEAP", 150, 300.0);

    let (engine, _store) = engine_with(store);
    let (result, success) = engine.generate("C007", 3, true).await;

    assert!(success);
    let scenarios: Vec<Scenario> = result.scenarios_matched.iter().map(|(s, _)| *s).collect();
    assert!(scenarios.contains(&Scenario::Upsell));
    let upsell_products = &result
        .scenarios_matched
        .iter()
        .find(|(s, _)| *s == Scenario::Upsell)
        .unwrap()
        .1;
    assert_eq!(upsell_products, &vec!["PREMIUM".to_string()]);
}

#[tokio::test]
async fn winback_targets_long_inactive_customers() {
    let mut store = InMemoryRecoStore::default();
    store.add_product("OLD", Some("Red"), 0.45, 0);
    // Same family as the customer's history so CROSS_SELL cannot claim it.
    store.add_product("STAR", Some("Red"), 0.9, 0);
    store.add_order("C008", "OLD", 400, 100.0);

    let (engine, _store) = engine_with(store);
    let (result, success) = engine.generate("C008", 3, true).await;

    assert!(success);
    let scenarios: Vec<Scenario> = result.scenarios_matched.iter().map(|(s, _)| *s).collect();
    assert!(scenarios.contains(&Scenario::Winback));
}

#[tokio::test]
async fn batch_covers_all_customers() {
    let mut store = InMemoryRecoStore::default();
    store.add_product("WINE001", Some("Riesling"), 0.8, 0);
    store.add_order("C001", "WINE001", 120, 45.0);
    store.add_customer("C009");
    store.add_product("P2", Some("Red"), 0.4, 0);

    let (engine, _store) = engine_with(store);
    let results = engine.generate_batch(None, None).await;

    assert_eq!(results.len(), 2);
    assert!(results.contains_key("C001"));
    assert!(results.contains_key("C009"));
    assert!(results["C001"].1);
}

#[tokio::test]
async fn nurture_sample_is_reproducible_per_run_and_customer() {
    use reco_engine::scenarios::nurture_seed;
    let seed = nurture_seed("run-42", "C001");
    assert_eq!(seed, nurture_seed("run-42", "C001"));
    assert_ne!(seed, nurture_seed("run-42", "C002"));
}
