use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AromaAxis, AromaLevel, CustomerSegment};

/// Canonical product record.
///
/// Created on first load, mutated by subsequent loads (upsert on
/// `product_key`), never deleted; discontinued products are archived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub product_key: String,
    pub label: String,
    pub family: Option<String>,
    pub grape: Option<String>,
    pub sucrosity: Option<String>,
    pub price_band: Option<String>,
    pub premium_tier: i32,
    pub aroma: AromaProfile,
    pub is_active: bool,
    pub is_archived: bool,
    /// Global popularity in [0, 1], recomputed from sales history.
    pub popularity: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn is_premium(&self) -> bool {
        self.premium_tier > 0
    }
}

/// Seven-axis aroma profile, each axis on a 1-5 scale when known.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AromaProfile {
    pub fruit: Option<i16>,
    pub floral: Option<i16>,
    pub spice: Option<i16>,
    pub mineral: Option<i16>,
    pub acidity: Option<i16>,
    pub body: Option<i16>,
    pub tannin: Option<i16>,
}

impl AromaProfile {
    /// Axis values in the canonical axis order.
    pub fn axes(&self) -> [(AromaAxis, Option<i16>); 7] {
        [
            (AromaAxis::Fruit, self.fruit),
            (AromaAxis::Floral, self.floral),
            (AromaAxis::Spice, self.spice),
            (AromaAxis::Mineral, self.mineral),
            (AromaAxis::Acidity, self.acidity),
            (AromaAxis::Body, self.body),
            (AromaAxis::Tannin, self.tannin),
        ]
    }
}

/// Mapping from a normalized foreign product label to a canonical key.
///
/// Immutable once created; many aliases may point at one product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductAlias {
    pub label_norm: String,
    pub product_key: String,
    pub created_at: DateTime<Utc>,
}

/// Clean, deduplicated customer record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub customer_code: String,
    pub last_name: Option<String>,
    pub first_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub bounced: bool,
    pub opted_out: bool,
    pub contactable: bool,
    /// True when this record was merged from duplicate source rows.
    pub codes_merged: bool,
    pub duplicate_count: i32,
    pub batch_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// Derived contactability unless explicitly overridden.
    pub fn derive_contactable(bounced: bool, opted_out: bool) -> bool {
        !bounced && !opted_out
    }
}

/// Append-only sales fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: i64,
    pub customer_code: String,
    pub product_key: String,
    pub order_date: NaiveDate,
    pub doc_ref: String,
    pub doc_type: Option<String>,
    pub qty: f64,
    pub amount_ht: f64,
    pub amount_ttc: Option<f64>,
    pub margin: Option<f64>,
    pub batch_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Append-only marketing touch fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactEvent {
    pub id: i64,
    pub customer_code: String,
    pub contact_date: NaiveDate,
    pub channel: Option<String>,
    pub status: Option<String>,
    pub campaign_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One preference value with its share of the customer's revenue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopPreference {
    pub value: String,
    pub ca_share: f64,
}

/// One preferred aroma axis with its weighted score in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AromaPreference {
    pub axis: AromaAxis,
    pub score: f64,
}

/// Consolidated per-customer profile rebuilt by each transform run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterProfile {
    pub customer_code: String,
    pub first_purchase_date: Option<NaiveDate>,
    pub last_purchase_date: Option<NaiveDate>,
    pub recency_days: Option<i32>,
    pub order_count: i32,
    pub total_ca_ht: f64,
    pub r_score: Option<i16>,
    pub f_score: Option<i16>,
    pub m_score: Option<i16>,
    /// Concatenated digit scores, e.g. "432".
    pub rfm: Option<String>,
    pub segment: CustomerSegment,
    pub top_families: Vec<TopPreference>,
    pub family_diversity_score: Option<f64>,
    pub top_grapes: Vec<TopPreference>,
    pub top_sucrosities: Vec<TopPreference>,
    pub top_price_bands: Vec<TopPreference>,
    pub aroma_axes: Vec<AromaPreference>,
    pub aroma_confidence: Option<f64>,
    pub aroma_level: Option<AromaLevel>,
    pub updated_at: DateTime<Utc>,
}

/// Metadata for one recommendation batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoRun {
    pub run_id: String,
    pub config_hash: String,
    pub code_version: Option<String>,
    pub dataset_version: Option<String>,
    pub run_timestamp: DateTime<Utc>,
    pub total_customers: i32,
    pub eligible_customers: i32,
    pub exported_customers: i32,
    pub duration_seconds: Option<f64>,
    pub summary: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// One persisted recommendation row. Owned by its run, never edited in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoItemRow {
    pub id: i64,
    pub run_id: String,
    pub customer_code: String,
    pub rank: i32,
    pub scenario: String,
    pub product_key: String,
    pub score: f64,
    pub score_affinity: f64,
    pub score_popularity: f64,
    pub score_profit: f64,
    pub score_base: f64,
    pub explain_short: Option<String>,
    pub reasons: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
