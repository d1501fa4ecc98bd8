//! Clean-table persistence for the transform pipeline.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::NaiveDate;
use reco_core::model::{AromaProfile, MasterProfile, ProductAlias};
use sqlx::{PgPool, Row};
use tracing::{info, warn};

use super::dedup::DedupedCustomer;
use super::resolver::AliasResolver;
use crate::error::Result;
use crate::ingestion::{ContactRecord, SalesLineRecord};

/// New clean order line derived from a raw sales line.
#[derive(Debug, Clone)]
pub struct NewOrderLine {
    pub customer_code: String,
    pub product_key: String,
    pub order_date: NaiveDate,
    pub doc_ref: String,
    pub doc_type: Option<String>,
    pub qty: f64,
    pub amount_ht: f64,
    pub amount_ttc: Option<f64>,
    pub margin: Option<f64>,
}

/// Per-customer order aggregate used by the profile build.
#[derive(Debug, Clone)]
pub struct CustomerOrderStats {
    pub customer_code: String,
    pub first_order_date: NaiveDate,
    pub last_order_date: NaiveDate,
    pub order_count: i64,
    pub total_amount_ht: f64,
}

/// One order line joined with its product attributes.
#[derive(Debug, Clone)]
pub struct ProductSpend {
    pub amount_ht: f64,
    pub family: Option<String>,
    pub grape: Option<String>,
    pub sucrosity: Option<String>,
    pub price_band: Option<String>,
    pub aroma: AromaProfile,
}

/// Storage operations over the clean tables, owned by the transform pipeline.
#[async_trait]
pub trait CleanRepository: Send + Sync {
    async fn upsert_customer(&self, customer: &DedupedCustomer, batch_id: &str) -> Result<()>;
    async fn insert_order_line(&self, line: &NewOrderLine, batch_id: &str) -> Result<()>;
    async fn insert_contact_event(&self, event: &ContactRecord) -> Result<()>;
    /// The whole alias table.
    async fn load_aliases(&self) -> Result<Vec<ProductAlias>>;
    async fn fetch_order_stats(&self) -> Result<Vec<CustomerOrderStats>>;
    async fn list_customer_codes(&self) -> Result<Vec<String>>;
    async fn fetch_product_spend(&self, customer_code: &str) -> Result<Vec<ProductSpend>>;
    async fn last_contact_date(&self, customer_code: &str) -> Result<Option<NaiveDate>>;
    async fn upsert_profile(&self, profile: &MasterProfile) -> Result<()>;
}

/// PostgreSQL implementation of the clean tables.
pub struct PostgresCleanRepository {
    pool: PgPool,
}

impl PostgresCleanRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CleanRepository for PostgresCleanRepository {
    async fn upsert_customer(&self, customer: &DedupedCustomer, batch_id: &str) -> Result<()> {
        let record = &customer.record;
        // Contact flags default on insert only; later loads never reset them.
        sqlx::query(
            "INSERT INTO customer \
             (customer_code, last_name, first_name, email, phone, address, postal_code, city, country, \
              bounced, opted_out, contactable, codes_merged, duplicate_count, batch_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, false, false, true, $10, $11, $12) \
             ON CONFLICT (customer_code) DO UPDATE SET \
             last_name = EXCLUDED.last_name, \
             first_name = EXCLUDED.first_name, \
             email = EXCLUDED.email, \
             phone = EXCLUDED.phone, \
             address = EXCLUDED.address, \
             postal_code = EXCLUDED.postal_code, \
             city = EXCLUDED.city, \
             country = EXCLUDED.country, \
             codes_merged = EXCLUDED.codes_merged, \
             duplicate_count = EXCLUDED.duplicate_count, \
             batch_id = EXCLUDED.batch_id, \
             updated_at = now()",
        )
        .bind(&record.customer_code)
        .bind(&record.last_name)
        .bind(&record.first_name)
        .bind(&record.email)
        .bind(&record.phone)
        .bind(&record.address)
        .bind(&record.postal_code)
        .bind(&record.city)
        .bind(&record.country)
        .bind(customer.codes_merged)
        .bind(customer.duplicate_count as i32)
        .bind(batch_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_order_line(&self, line: &NewOrderLine, batch_id: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO order_line \
             (customer_code, product_key, order_date, doc_ref, doc_type, qty, amount_ht, amount_ttc, margin, batch_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(&line.customer_code)
        .bind(&line.product_key)
        .bind(line.order_date)
        .bind(&line.doc_ref)
        .bind(&line.doc_type)
        .bind(line.qty)
        .bind(line.amount_ht)
        .bind(line.amount_ttc)
        .bind(line.margin)
        .bind(batch_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_contact_event(&self, event: &ContactRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO contact_event (customer_code, contact_date, channel, status, campaign_id) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&event.customer_code)
        .bind(event.contact_date)
        .bind(&event.channel)
        .bind(&event.status)
        .bind(&event.campaign_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_aliases(&self) -> Result<Vec<ProductAlias>> {
        let rows = sqlx::query("SELECT label_norm, product_key, created_at FROM product_alias")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| ProductAlias {
                label_norm: row.get("label_norm"),
                product_key: row.get("product_key"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    async fn fetch_order_stats(&self) -> Result<Vec<CustomerOrderStats>> {
        let rows = sqlx::query(
            "SELECT customer_code, \
                    MIN(order_date) AS first_order_date, \
                    MAX(order_date) AS last_order_date, \
                    COUNT(*) AS order_count, \
                    COALESCE(SUM(amount_ht), 0) AS total_amount_ht \
             FROM order_line \
             GROUP BY customer_code",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| CustomerOrderStats {
                customer_code: row.get("customer_code"),
                first_order_date: row.get("first_order_date"),
                last_order_date: row.get("last_order_date"),
                order_count: row.get("order_count"),
                total_amount_ht: row.get("total_amount_ht"),
            })
            .collect())
    }

    async fn list_customer_codes(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT customer_code FROM customer ORDER BY customer_code")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|row| row.get("customer_code")).collect())
    }

    async fn fetch_product_spend(&self, customer_code: &str) -> Result<Vec<ProductSpend>> {
        let rows = sqlx::query(
            "SELECT ol.amount_ht, p.family, p.grape, p.sucrosity, p.price_band, \
                    p.aroma_fruit, p.aroma_floral, p.aroma_spice, p.aroma_mineral, \
                    p.aroma_acidity, p.aroma_body, p.aroma_tannin \
             FROM order_line ol \
             JOIN product p ON ol.product_key = p.product_key \
             WHERE ol.customer_code = $1",
        )
        .bind(customer_code)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ProductSpend {
                amount_ht: row.get("amount_ht"),
                family: row.get("family"),
                grape: row.get("grape"),
                sucrosity: row.get("sucrosity"),
                price_band: row.get("price_band"),
                aroma: AromaProfile {
                    fruit: row.get("aroma_fruit"),
                    floral: row.get("aroma_floral"),
                    spice: row.get("aroma_spice"),
                    mineral: row.get("aroma_mineral"),
                    acidity: row.get("aroma_acidity"),
                    body: row.get("aroma_body"),
                    tannin: row.get("aroma_tannin"),
                },
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

    async fn upsert_profile(&self, profile: &MasterProfile) -> Result<()> {
        let top = |prefs: &[reco_core::model::TopPreference], idx: usize| {
            prefs
                .get(idx)
                .map(|p| (Some(p.value.clone()), Some(p.ca_share)))
                .unwrap_or((None, None))
        };
        let (family1, family1_share) = top(&profile.top_families, 0);
        let (family2, family2_share) = top(&profile.top_families, 1);
        let (grape1, grape1_share) = top(&profile.top_grapes, 0);
        let (grape2, grape2_share) = top(&profile.top_grapes, 1);
        let (sugar1, sugar1_share) = top(&profile.top_sucrosities, 0);
        let (sugar2, sugar2_share) = top(&profile.top_sucrosities, 1);
        let (budget1, budget1_share) = top(&profile.top_price_bands, 0);
        let (budget2, budget2_share) = top(&profile.top_price_bands, 1);

        let aroma = |idx: usize| {
            profile
                .aroma_axes
                .get(idx)
                .map(|a| (Some(a.axis.as_str().to_string()), Some(a.score)))
                .unwrap_or((None, None))
        };
        let (aroma1, aroma1_score) = aroma(0);
        let (aroma2, aroma2_score) = aroma(1);
        let (aroma3, aroma3_score) = aroma(2);

        sqlx::query(
            "INSERT INTO client_master_profile \
             (customer_code, first_purchase_date, last_purchase_date, recency_days, order_count, total_ca_ht, \
              r_score, f_score, m_score, rfm, segment, \
              top_family_1, top_family_1_ca_share, top_family_2, top_family_2_ca_share, family_diversity_score, \
              top_grape_1, top_grape_1_ca_share, top_grape_2, top_grape_2_ca_share, \
              top_sugar_1, top_sugar_1_ca_share, top_sugar_2, top_sugar_2_ca_share, \
              top_budget_1, top_budget_1_ca_share, top_budget_2, top_budget_2_ca_share, \
              aroma_axe_1, aroma_score_1, aroma_axe_2, aroma_score_2, aroma_axe_3, aroma_score_3, \
              aroma_confidence, aroma_level) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, \
                     $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, $31, $32, $33, $34, $35, $36) \
             ON CONFLICT (customer_code) DO UPDATE SET \
             first_purchase_date = EXCLUDED.first_purchase_date, \
             last_purchase_date = EXCLUDED.last_purchase_date, \
             recency_days = EXCLUDED.recency_days, \
             order_count = EXCLUDED.order_count, \
             total_ca_ht = EXCLUDED.total_ca_ht, \
             r_score = EXCLUDED.r_score, \
             f_score = EXCLUDED.f_score, \
             m_score = EXCLUDED.m_score, \
             rfm = EXCLUDED.rfm, \
             segment = EXCLUDED.segment, \
             top_family_1 = EXCLUDED.top_family_1, \
             top_family_1_ca_share = EXCLUDED.top_family_1_ca_share, \
             top_family_2 = EXCLUDED.top_family_2, \
             top_family_2_ca_share = EXCLUDED.top_family_2_ca_share, \
             family_diversity_score = EXCLUDED.family_diversity_score, \
             top_grape_1 = EXCLUDED.top_grape_1, \
             top_grape_1_ca_share = EXCLUDED.top_grape_1_ca_share, \
             top_grape_2 = EXCLUDED.top_grape_2, \
             top_grape_2_ca_share = EXCLUDED.top_grape_2_ca_share, \
             top_sugar_1 = EXCLUDED.top_sugar_1, \
             top_sugar_1_ca_share = EXCLUDED.top_sugar_1_ca_share, \
             top_sugar_2 = EXCLUDED.top_sugar_2, \
             top_sugar_2_ca_share = EXCLUDED.top_sugar_2_ca_share, \
             top_budget_1 = EXCLUDED.top_budget_1, \
             top_budget_1_ca_share = EXCLUDED.top_budget_1_ca_share, \
             top_budget_2 = EXCLUDED.top_budget_2, \
             top_budget_2_ca_share = EXCLUDED.top_budget_2_ca_share, \
             aroma_axe_1 = EXCLUDED.aroma_axe_1, \
             aroma_score_1 = EXCLUDED.aroma_score_1, \
             aroma_axe_2 = EXCLUDED.aroma_axe_2, \
             aroma_score_2 = EXCLUDED.aroma_score_2, \
             aroma_axe_3 = EXCLUDED.aroma_axe_3, \
             aroma_score_3 = EXCLUDED.aroma_score_3, \
             aroma_confidence = EXCLUDED.aroma_confidence, \
             aroma_level = EXCLUDED.aroma_level, \
             updated_at = now()",
        )
        .bind(&profile.customer_code)
        .bind(profile.first_purchase_date)
        .bind(profile.last_purchase_date)
        .bind(profile.recency_days)
        .bind(profile.order_count)
        .bind(profile.total_ca_ht)
        .bind(profile.r_score)
        .bind(profile.f_score)
        .bind(profile.m_score)
        .bind(&profile.rfm)
        .bind(profile.segment.as_str())
        .bind(family1)
        .bind(family1_share)
        .bind(family2)
        .bind(family2_share)
        .bind(profile.family_diversity_score)
        .bind(grape1)
        .bind(grape1_share)
        .bind(grape2)
        .bind(grape2_share)
        .bind(sugar1)
        .bind(sugar1_share)
        .bind(sugar2)
        .bind(sugar2_share)
        .bind(budget1)
        .bind(budget1_share)
        .bind(budget2)
        .bind(budget2_share)
        .bind(aroma1)
        .bind(aroma1_score)
        .bind(aroma2)
        .bind(aroma2_score)
        .bind(aroma3)
        .bind(aroma3_score)
        .bind(profile.aroma_confidence)
        .bind(profile.aroma_level.map(|l| l.as_str()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Loads validated records into the clean tables with in-load dedupe and
/// alias resolution.
pub struct TransformLoader<'a> {
    repository: &'a dyn CleanRepository,
}

/// Counters from one order-line load.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrderLineLoadStats {
    pub loaded: usize,
    pub unresolved: usize,
    pub duplicates: usize,
}

impl<'a> TransformLoader<'a> {
    pub fn new(repository: &'a dyn CleanRepository) -> Self {
        Self { repository }
    }

    pub async fn load_customers(
        &self,
        customers: &[DedupedCustomer],
        batch_id: &str,
    ) -> Result<usize> {
        let mut loaded = 0;
        for customer in customers {
            match self.repository.upsert_customer(customer, batch_id).await {
                Ok(()) => loaded += 1,
                Err(e) => warn!(
                    customer_code = %customer.record.customer_code,
                    error = %e,
                    "failed to load customer"
                ),
            }
        }
        info!(loaded, "loaded customers");
        Ok(loaded)
    }

    /// Load order lines, resolving product keys through the alias cache.
    /// Unresolved labels are skipped with a warning; the natural key
    /// `(doc_ref, customer_code, product_key, order_date)` de-duplicates
    /// inside this load.
    pub async fn load_order_lines(
        &self,
        lines: &[SalesLineRecord],
        resolver: &AliasResolver,
        batch_id: &str,
    ) -> Result<OrderLineLoadStats> {
        let mut stats = OrderLineLoadStats::default();
        let mut seen: HashSet<(String, String, String, NaiveDate)> = HashSet::new();

        for line in lines {
            let label_norm = line.product_label_norm.as_deref().unwrap_or("");
            let product_key = match resolver.resolve(label_norm) {
                Some(key) => key.to_string(),
                None => {
                    warn!(label_norm, "unresolved product alias; skipping order line");
                    stats.unresolved += 1;
                    continue;
                }
            };

            let natural_key = (
                line.doc_ref.clone(),
                line.customer_code.clone(),
                product_key.clone(),
                line.order_date,
            );
            if !seen.insert(natural_key) {
                stats.duplicates += 1;
                continue;
            }

            let new_line = NewOrderLine {
                customer_code: line.customer_code.clone(),
                product_key,
                order_date: line.order_date,
                doc_ref: line.doc_ref.clone(),
                doc_type: line.doc_type.clone(),
                qty: line.qty,
                amount_ht: line.amount_ht,
                amount_ttc: line.amount_ttc,
                margin: line.margin,
            };

            match self.repository.insert_order_line(&new_line, batch_id).await {
                Ok(()) => stats.loaded += 1,
                Err(e) => warn!(doc_ref = %new_line.doc_ref, error = %e, "failed to load order line"),
            }
        }

        info!(
            loaded = stats.loaded,
            unresolved = stats.unresolved,
            duplicates = stats.duplicates,
            "loaded order lines"
        );
        Ok(stats)
    }

    pub async fn load_contact_events(&self, events: &[ContactRecord]) -> Result<usize> {
        let mut loaded = 0;
        for event in events {
            match self.repository.insert_contact_event(event).await {
                Ok(()) => loaded += 1,
                Err(e) => warn!(
                    customer_code = %event.customer_code,
                    error = %e,
                    "failed to load contact event"
                ),
            }
        }
        info!(loaded, "loaded contact events");
        Ok(loaded)
    }
}
