//! Read/write capability set the engine needs from the store.
//!
//! The engine reads aggregates and product views and writes one run
//! atomically. Tests substitute an in-memory fake.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::{PgPool, Row};

use reco_core::model::{AromaProfile, Customer, Product, RecoRun};
use reco_core::types::Scenario;

use crate::error::Result;
use crate::explain::Explanation;
use crate::scorer::RecoScore;

/// Aggregates over a customer's order lines.
#[derive(Debug, Clone, Default)]
pub struct OrderStats {
    pub purchase_count: i64,
    pub total_spent: f64,
    pub avg_order_value: f64,
    pub first_purchase_date: Option<NaiveDate>,
    pub last_purchase_date: Option<NaiveDate>,
}

/// Revenue per product family for one customer.
#[derive(Debug, Clone)]
pub struct FamilySpend {
    pub family: String,
    pub amount_ht: f64,
}

/// A previously purchased product with its recency.
#[derive(Debug, Clone)]
pub struct PurchasedProduct {
    pub product_key: String,
    pub last_order_date: NaiveDate,
    pub popularity: Option<f64>,
}

/// Lightweight product view for matching, scoring and explanations.
#[derive(Debug, Clone)]
pub struct ProductView {
    pub product_key: String,
    pub label: String,
    pub family: Option<String>,
    pub popularity: Option<f64>,
    pub premium_tier: i32,
}

/// Filter for candidate-product queries.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub min_popularity: f64,
    pub exclude_families: Vec<String>,
    pub exclude_products: Vec<String>,
    pub premium_only: bool,
    pub require_family: bool,
    pub limit: usize,
}

/// One recommendation ready for persistence.
#[derive(Debug, Clone)]
pub struct NewRecoItem {
    pub rank: i32,
    pub scenario: Scenario,
    pub product_key: String,
    pub score: RecoScore,
    pub explanation: Explanation,
}

#[async_trait]
pub trait RecoStore: Send + Sync {
    /// The clean customer record, when one exists.
    async fn customer(&self, customer_code: &str) -> Result<Option<Customer>>;

    async fn order_stats(&self, customer_code: &str) -> Result<OrderStats>;

    /// Family revenue distribution, highest first.
    async fn family_spend(&self, customer_code: &str) -> Result<Vec<FamilySpend>>;

    async fn last_contact_date(&self, customer_code: &str) -> Result<Option<NaiveDate>>;

    /// Products the customer bought on or before `cutoff`, most recent
    /// purchase first, above the popularity floor.
    async fn purchased_products_before(
        &self,
        customer_code: &str,
        cutoff: NaiveDate,
        min_popularity: f64,
        limit: usize,
    ) -> Result<Vec<PurchasedProduct>>;

    /// Candidate products ordered by popularity descending.
    async fn products_by_popularity(&self, filter: &ProductFilter) -> Result<Vec<ProductView>>;

    /// The full canonical product record.
    async fn product(&self, product_key: &str) -> Result<Option<Product>>;

    /// Last purchase date and line count for one (customer, product) pair.
    async fn last_product_purchase(
        &self,
        customer_code: &str,
        product_key: &str,
    ) -> Result<Option<(NaiveDate, i64)>>;

    async fn list_customer_codes(&self, limit: usize) -> Result<Vec<String>>;

    /// Persist the run and all of its items in one transaction: either every
    /// row commits or none do.
    async fn insert_run_with_items(&self, run: &RecoRun, customer_code: &str, items: &[NewRecoItem]) -> Result<()>;
}

/// PostgreSQL implementation of the engine store.
pub struct PostgresRecoStore {
    pool: PgPool,
}

impl PostgresRecoStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecoStore for PostgresRecoStore {
    async fn customer(&self, customer_code: &str) -> Result<Option<Customer>> {
        let row = sqlx::query("SELECT * FROM customer WHERE customer_code = $1")
            .bind(customer_code)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| Customer {
            customer_code: row.get("customer_code"),
            last_name: row.get("last_name"),
            first_name: row.get("first_name"),
            email: row.get("email"),
            phone: row.get("phone"),
            address: row.get("address"),
            postal_code: row.get("postal_code"),
            city: row.get("city"),
            country: row.get("country"),
            bounced: row.get("bounced"),
            opted_out: row.get("opted_out"),
            contactable: row.get("contactable"),
            codes_merged: row.get("codes_merged"),
            duplicate_count: row.get("duplicate_count"),
            batch_id: row.get("batch_id"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }))
    }

    async fn order_stats(&self, customer_code: &str) -> Result<OrderStats> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS purchase_count, \
                    COALESCE(SUM(amount_ht), 0) AS total_spent, \
                    COALESCE(AVG(amount_ht), 0) AS avg_order_value, \
                    MIN(order_date) AS first_purchase_date, \
                    MAX(order_date) AS last_purchase_date \
             FROM order_line WHERE customer_code = $1",
        )
        .bind(customer_code)
        .fetch_one(&self.pool)
        .await?;

        Ok(OrderStats {
            purchase_count: row.get("purchase_count"),
            total_spent: row.get("total_spent"),
            avg_order_value: row.get("avg_order_value"),
            first_purchase_date: row.get("first_purchase_date"),
            last_purchase_date: row.get("last_purchase_date"),
        })
    }

    async fn family_spend(&self, customer_code: &str) -> Result<Vec<FamilySpend>> {
        let rows = sqlx::query(
            "SELECT p.family, SUM(ol.amount_ht) AS amount_ht \
             FROM order_line ol \
             JOIN product p ON ol.product_key = p.product_key \
             WHERE ol.customer_code = $1 AND p.family IS NOT NULL \
             GROUP BY p.family \
             ORDER BY amount_ht DESC",
        )
        .bind(customer_code)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| FamilySpend {
                family: row.get("family"),
                amount_ht: row.get("amount_ht"),
            })
            .collect())
    }

    async fn last_contact_date(&self, customer_code: &str) -> Result<Option<NaiveDate>> {
        let row = sqlx::query(
            "SELECT MAX(contact_date) AS last_contact FROM contact_event WHERE customer_code = $1",
        )
        .bind(customer_code)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("last_contact"))
    }

    async fn purchased_products_before(
        &self,
        customer_code: &str,
        cutoff: NaiveDate,
        min_popularity: f64,
        limit: usize,
    ) -> Result<Vec<PurchasedProduct>> {
        let rows = sqlx::query(
            "SELECT p.product_key, MAX(ol.order_date) AS last_order_date, p.popularity \
             FROM order_line ol \
             JOIN product p ON ol.product_key = p.product_key \
             WHERE ol.customer_code = $1 AND p.popularity >= $2 \
             GROUP BY p.product_key, p.popularity \
             HAVING MAX(ol.order_date) <= $3 \
             ORDER BY MAX(ol.order_date) DESC \
             LIMIT $4",
        )
        .bind(customer_code)
        .bind(min_popularity)
        .bind(cutoff)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| PurchasedProduct {
                product_key: row.get("product_key"),
                last_order_date: row.get("last_order_date"),
                popularity: row.get("popularity"),
            })
            .collect())
    }

    async fn products_by_popularity(&self, filter: &ProductFilter) -> Result<Vec<ProductView>> {
        let mut sql = String::from(
            "SELECT product_key, label, family, popularity, premium_tier \
             FROM product \
             WHERE is_active = true AND is_archived = false AND popularity >= $1 \
             AND (family IS NULL OR NOT (family = ANY($2))) \
             AND NOT (product_key = ANY($3))",
        );
        if filter.premium_only {
            sql.push_str(" AND premium_tier > 0");
        }
        if filter.require_family {
            sql.push_str(" AND family IS NOT NULL");
        }
        sql.push_str(" ORDER BY popularity DESC, product_key LIMIT $4");

        let rows = sqlx::query(&sql)
            .bind(filter.min_popularity)
            .bind(&filter.exclude_families)
            .bind(&filter.exclude_products)
            .bind(filter.limit as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| ProductView {
                product_key: row.get("product_key"),
                label: row.get("label"),
                family: row.get("family"),
                popularity: row.get("popularity"),
                premium_tier: row.get("premium_tier"),
            })
            .collect())
    }

    async fn product(&self, product_key: &str) -> Result<Option<Product>> {
        let row = sqlx::query("SELECT * FROM product WHERE product_key = $1")
            .bind(product_key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| Product {
            product_key: row.get("product_key"),
            label: row.get("label"),
            family: row.get("family"),
            grape: row.get("grape"),
            sucrosity: row.get("sucrosity"),
            price_band: row.get("price_band"),
            premium_tier: row.get("premium_tier"),
            aroma: AromaProfile {
                fruit: row.get("aroma_fruit"),
                floral: row.get("aroma_floral"),
                spice: row.get("aroma_spice"),
                mineral: row.get("aroma_mineral"),
                acidity: row.get("aroma_acidity"),
                body: row.get("aroma_body"),
                tannin: row.get("aroma_tannin"),
            },
            is_active: row.get("is_active"),
            is_archived: row.get("is_archived"),
            popularity: row.get("popularity"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }))
    }

    async fn last_product_purchase(
        &self,
        customer_code: &str,
        product_key: &str,
    ) -> Result<Option<(NaiveDate, i64)>> {
        let row = sqlx::query(
            "SELECT MAX(order_date) AS last_date, COUNT(*) AS line_count \
             FROM order_line WHERE customer_code = $1 AND product_key = $2",
        )
        .bind(customer_code)
        .bind(product_key)
        .fetch_one(&self.pool)
        .await?;

        let last_date: Option<NaiveDate> = row.get("last_date");
        Ok(last_date.map(|date| (date, row.get::<i64, _>("line_count"))))
    }

    async fn list_customer_codes(&self, limit: usize) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT customer_code FROM customer ORDER BY customer_code LIMIT $1")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|row| row.get("customer_code")).collect())
    }

    async fn insert_run_with_items(
        &self,
        run: &RecoRun,
        customer_code: &str,
        items: &[NewRecoItem],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO reco_run \
             (run_id, config_hash, code_version, dataset_version, run_timestamp, \
              total_customers, eligible_customers, exported_customers, duration_seconds, summary_json) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(&run.run_id)
        .bind(&run.config_hash)
        .bind(&run.code_version)
        .bind(&run.dataset_version)
        .bind(run.run_timestamp)
        .bind(run.total_customers)
        .bind(run.eligible_customers)
        .bind(run.exported_customers)
        .bind(run.duration_seconds)
        .bind(&run.summary)
        .execute(&mut *tx)
        .await?;

        for item in items {
            let reasons = serde_json::json!({
                "base_score": item.score.base_score,
                "affinity_score": item.score.affinity_score,
                "popularity_score": item.score.popularity_score,
                "profit_score": item.score.profit_score,
                "explanation": item.explanation,
            });
            sqlx::query(
                "INSERT INTO reco_item \
                 (run_id, customer_code, rank, scenario, product_key, score, \
                  score_affinity, score_popularity, score_profit, score_base, \
                  explain_short, reasons_json, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
            )
            .bind(&run.run_id)
            .bind(customer_code)
            .bind(item.rank)
            .bind(item.scenario.as_str())
            .bind(&item.product_key)
            .bind(item.score.final_score)
            .bind(item.score.affinity_score)
            .bind(item.score.popularity_score)
            .bind(item.score.profit_score)
            .bind(item.score.base_score)
            .bind(&item.explanation.reason)
            .bind(&reasons)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

/// Build a convenience lookup of product families for diversification.
pub async fn product_families(
    store: &dyn RecoStore,
    product_keys: impl IntoIterator<Item = &str>,
) -> Result<HashMap<String, Option<String>>> {
    let mut families = HashMap::new();
    for key in product_keys {
        let family = store.product(key).await?.and_then(|p| p.family);
        families.insert(key.to_string(), family);
    }
    Ok(families)
}
