//! Product catalog maintenance: upserts, alias registration, archiving and
//! the global popularity refresh.
//!
//! Products are created on first load and mutated by later loads; they are
//! never deleted, only archived. Aliases are immutable once created, but new
//! aliases may be registered for the same product at any time.

use async_trait::async_trait;
use reco_core::model::AromaProfile;
use reco_core::types::PriceSegment;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::error::Result;
use crate::ingestion::normalize::normalize_product_label;

/// Catalog input record from a source system.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub product_key: String,
    pub label: String,
    pub family: Option<String>,
    pub grape: Option<String>,
    pub sucrosity: Option<String>,
    pub list_price_eur: Option<f64>,
    pub premium_tier: i32,
    pub aroma: AromaProfile,
    pub is_active: bool,
}

impl NewProduct {
    /// Price band derived from the unit list price, when known.
    pub fn price_band(&self) -> Option<PriceSegment> {
        self.list_price_eur.map(PriceSegment::from_price)
    }
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn upsert_product(&self, product: &NewProduct) -> Result<()>;
    /// Register an alias; an existing `label_norm` is left untouched.
    async fn register_alias(&self, label_norm: &str, product_key: &str) -> Result<bool>;
    async fn archive_product(&self, product_key: &str) -> Result<bool>;
    /// Refresh `product.popularity` from the sales history: each product's
    /// order-line count relative to the best seller, in [0, 1].
    async fn recompute_popularity(&self) -> Result<u64>;
}

/// PostgreSQL catalog access.
pub struct PostgresCatalogRepository {
    pool: PgPool,
}

impl PostgresCatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogRepository for PostgresCatalogRepository {
    async fn upsert_product(&self, product: &NewProduct) -> Result<()> {
        sqlx::query(
            "INSERT INTO product \
             (product_key, label, family, grape, sucrosity, price_band, premium_tier, \
              aroma_fruit, aroma_floral, aroma_spice, aroma_mineral, aroma_acidity, \
              aroma_body, aroma_tannin, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
             ON CONFLICT (product_key) DO UPDATE SET \
             label = EXCLUDED.label, \
             family = EXCLUDED.family, \
             grape = EXCLUDED.grape, \
             sucrosity = EXCLUDED.sucrosity, \
             price_band = EXCLUDED.price_band, \
             premium_tier = EXCLUDED.premium_tier, \
             aroma_fruit = EXCLUDED.aroma_fruit, \
             aroma_floral = EXCLUDED.aroma_floral, \
             aroma_spice = EXCLUDED.aroma_spice, \
             aroma_mineral = EXCLUDED.aroma_mineral, \
             aroma_acidity = EXCLUDED.aroma_acidity, \
             aroma_body = EXCLUDED.aroma_body, \
             aroma_tannin = EXCLUDED.aroma_tannin, \
             is_active = EXCLUDED.is_active, \
             updated_at = now()",
        )
        .bind(&product.product_key)
        .bind(&product.label)
        .bind(&product.family)
        .bind(&product.grape)
        .bind(&product.sucrosity)
        .bind(product.price_band().map(|b| b.as_str()))
        .bind(product.premium_tier)
        .bind(product.aroma.fruit)
        .bind(product.aroma.floral)
        .bind(product.aroma.spice)
        .bind(product.aroma.mineral)
        .bind(product.aroma.acidity)
        .bind(product.aroma.body)
        .bind(product.aroma.tannin)
        .bind(product.is_active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn register_alias(&self, label_norm: &str, product_key: &str) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO product_alias (label_norm, product_key) VALUES ($1, $2) \
             ON CONFLICT (label_norm) DO NOTHING",
        )
        .bind(label_norm)
        .bind(product_key)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn archive_product(&self, product_key: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE product SET is_archived = true, is_active = false, updated_at = now() \
             WHERE product_key = $1",
        )
        .bind(product_key)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn recompute_popularity(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE product p SET popularity = sales.relative_count, updated_at = now() \
             FROM (SELECT product_key, \
                          COUNT(*)::double precision / GREATEST(MAX(COUNT(*)) OVER (), 1) AS relative_count \
                   FROM order_line GROUP BY product_key) sales \
             WHERE p.product_key = sales.product_key",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

/// Loads catalog records, registering each product's own label as an alias.
pub struct CatalogLoader<'a> {
    repository: &'a dyn CatalogRepository,
}

/// Counters from one catalog load.
#[derive(Debug, Default, Clone, Copy)]
pub struct CatalogLoadStats {
    pub products_upserted: usize,
    pub aliases_registered: usize,
}

impl<'a> CatalogLoader<'a> {
    pub fn new(repository: &'a dyn CatalogRepository) -> Self {
        Self { repository }
    }

    pub async fn load_products(&self, products: &[NewProduct]) -> Result<CatalogLoadStats> {
        let mut stats = CatalogLoadStats::default();

        for product in products {
            match self.repository.upsert_product(product).await {
                Ok(()) => stats.products_upserted += 1,
                Err(e) => {
                    warn!(product_key = %product.product_key, error = %e, "failed to upsert product");
                    continue;
                }
            }

            if let Some(label_norm) = normalize_product_label(&product.label) {
                match self
                    .repository
                    .register_alias(&label_norm, &product.product_key)
                    .await
                {
                    Ok(true) => stats.aliases_registered += 1,
                    Ok(false) => {}
                    Err(e) => warn!(
                        label_norm,
                        error = %e,
                        "failed to register product alias"
                    ),
                }
            }
        }

        info!(
            products = stats.products_upserted,
            aliases = stats.aliases_registered,
            "catalog load complete"
        );
        Ok(stats)
    }

    /// Register one additional foreign label for an existing product.
    pub async fn register_label(&self, label: &str, product_key: &str) -> Result<bool> {
        match normalize_product_label(label) {
            Some(label_norm) => self.repository.register_alias(&label_norm, product_key).await,
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct InMemoryCatalog {
        products: Mutex<HashMap<String, NewProduct>>,
        aliases: Mutex<HashMap<String, String>>,
        archived: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CatalogRepository for InMemoryCatalog {
        async fn upsert_product(&self, product: &NewProduct) -> Result<()> {
            self.products
                .lock()
                .unwrap()
                .insert(product.product_key.clone(), product.clone());
            Ok(())
        }

        async fn register_alias(&self, label_norm: &str, product_key: &str) -> Result<bool> {
            let mut aliases = self.aliases.lock().unwrap();
            if aliases.contains_key(label_norm) {
                return Ok(false);
            }
            aliases.insert(label_norm.to_string(), product_key.to_string());
            Ok(true)
        }

        async fn archive_product(&self, product_key: &str) -> Result<bool> {
            let exists = self.products.lock().unwrap().contains_key(product_key);
            if exists {
                self.archived.lock().unwrap().push(product_key.to_string());
            }
            Ok(exists)
        }

        async fn recompute_popularity(&self) -> Result<u64> {
            Ok(self.products.lock().unwrap().len() as u64)
        }
    }

    fn product(key: &str, label: &str, price: f64) -> NewProduct {
        NewProduct {
            product_key: key.to_string(),
            label: label.to_string(),
            family: Some("Riesling".to_string()),
            grape: Some("Riesling".to_string()),
            sucrosity: None,
            list_price_eur: Some(price),
            premium_tier: 0,
            aroma: AromaProfile::default(),
            is_active: true,
        }
    }

    #[test]
    fn price_band_follows_segments() {
        assert_eq!(product("P1", "x", 12.0).price_band(), Some(PriceSegment::Entry));
        assert_eq!(product("P1", "x", 40.0).price_band(), Some(PriceSegment::Premium));
        let mut unpriced = product("P1", "x", 0.0);
        unpriced.list_price_eur = None;
        assert_eq!(unpriced.price_band(), None);
    }

    #[tokio::test]
    async fn load_registers_label_aliases() {
        let repo = InMemoryCatalog::default();
        let loader = CatalogLoader::new(&repo);

        let stats = loader
            .load_products(&[
                product("WINE001", "Riesling  Grand Cru 2020", 25.0),
                product("WINE002", "Gewurztraminer VT", 32.0),
            ])
            .await
            .unwrap();

        assert_eq!(stats.products_upserted, 2);
        assert_eq!(stats.aliases_registered, 2);
        let aliases = repo.aliases.lock().unwrap();
        assert_eq!(
            aliases.get("riesling grand cru 2020").map(String::as_str),
            Some("WINE001")
        );
    }

    #[tokio::test]
    async fn reload_keeps_existing_aliases() {
        let repo = InMemoryCatalog::default();
        let loader = CatalogLoader::new(&repo);
        let products = vec![product("WINE001", "Riesling 2020", 25.0)];

        loader.load_products(&products).await.unwrap();
        let stats = loader.load_products(&products).await.unwrap();

        assert_eq!(stats.products_upserted, 1);
        assert_eq!(stats.aliases_registered, 0);
    }

    #[tokio::test]
    async fn extra_labels_map_to_same_product() {
        let repo = InMemoryCatalog::default();
        let loader = CatalogLoader::new(&repo);
        loader
            .load_products(&[product("WINE001", "Riesling 2020", 25.0)])
            .await
            .unwrap();

        assert!(loader
            .register_label("RIESLING  2020 75CL", "WINE001")
            .await
            .unwrap());
        let aliases = repo.aliases.lock().unwrap();
        assert_eq!(aliases.len(), 2);
        assert_eq!(
            aliases.get("riesling 2020 75cl").map(String::as_str),
            Some("WINE001")
        );
    }
}
