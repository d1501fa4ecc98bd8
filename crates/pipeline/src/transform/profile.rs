//! Stage E: master-profile computation.
//!
//! RFM scores use quartile bucketing over the current customer population
//! (quartile 1 = worst, quartile 4 = best); preferences and the aroma
//! profile are weighted by each customer's revenue distribution.

use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use reco_core::model::{AromaPreference, MasterProfile, TopPreference};
use reco_core::types::{AromaAxis, AromaLevel, CustomerSegment};
use tracing::{info, warn};

use super::loader::{CleanRepository, CustomerOrderStats, ProductSpend};
use crate::error::Result;

/// Attributable CA (EUR) at which aroma confidence saturates at 1.0.
pub const AROMA_CONFIDENCE_CA_EUR: f64 = 500.0;

/// Quartile thresholds computed once per profile build.
#[derive(Debug, Clone)]
pub struct RfmQuartiles {
    recency_days: Vec<i64>,
    frequency: Vec<i64>,
    monetary: Vec<f64>,
}

impl RfmQuartiles {
    pub fn from_stats(stats: &[CustomerOrderStats], today: NaiveDate) -> Self {
        let mut recency_days: Vec<i64> = stats
            .iter()
            .map(|s| (today - s.last_order_date).num_days().max(0))
            .collect();
        let mut frequency: Vec<i64> = stats.iter().map(|s| s.order_count).collect();
        let mut monetary: Vec<f64> = stats.iter().map(|s| s.total_amount_ht).collect();

        recency_days.sort_unstable();
        frequency.sort_unstable();
        monetary.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        Self {
            recency_days,
            frequency,
            monetary,
        }
    }

    /// Recency: more recent (fewer days) is better; oldest quartile scores 1.
    pub fn r_score(&self, recency_days: i64) -> i16 {
        let n = self.recency_days.len();
        if n == 0 {
            return 1;
        }
        // Rank among the population by how many customers are strictly worse
        // (older) than this one.
        let worse = n - self.recency_days.partition_point(|&v| v <= recency_days);
        quartile_of_rank(worse, n)
    }

    /// Frequency: quartile 1 = fewest orders.
    pub fn f_score(&self, order_count: i64) -> i16 {
        let n = self.frequency.len();
        if n == 0 {
            return 1;
        }
        let below = self.frequency.partition_point(|&v| v < order_count);
        quartile_of_rank(below, n)
    }

    /// Monetary: quartile 1 = smallest spend.
    pub fn m_score(&self, total_amount: f64) -> i16 {
        let n = self.monetary.len();
        if n == 0 {
            return 1;
        }
        let below = self.monetary.partition_point(|&v| v < total_amount);
        quartile_of_rank(below, n)
    }
}

fn quartile_of_rank(rank: usize, n: usize) -> i16 {
    (1 + (rank * 4) / n).min(4) as i16
}

/// Segment assignment from RFM scores and activity.
pub fn assign_segment(r: i16, f: i16, m: i16, recency_days: i64) -> CustomerSegment {
    let avg = f64::from(r + f + m) / 3.0;
    if avg >= 3.5 {
        CustomerSegment::Vip
    } else if avg <= 1.5 {
        CustomerSegment::AtRisk
    } else if recency_days > 180 && f == 1 {
        CustomerSegment::Inactive
    } else {
        CustomerSegment::Standard
    }
}

/// Top-2 values of one dimension with their CA shares (shares are relative
/// to the dimension's non-null revenue).
pub fn top_preferences(
    spend: &[ProductSpend],
    dimension: impl Fn(&ProductSpend) -> Option<&str>,
) -> Vec<TopPreference> {
    let mut totals: HashMap<String, f64> = HashMap::new();
    let mut dimension_total = 0.0;
    for line in spend {
        if let Some(value) = dimension(line) {
            *totals.entry(value.to_string()).or_default() += line.amount_ht;
            dimension_total += line.amount_ht;
        }
    }
    if dimension_total <= 0.0 {
        return Vec::new();
    }

    let mut entries: Vec<(String, f64)> = totals.into_iter().collect();
    entries.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    entries
        .into_iter()
        .take(2)
        .map(|(value, amount)| TopPreference {
            value,
            ca_share: amount / dimension_total,
        })
        .collect()
}

/// Herfindahl complement over the family revenue shares: 1 - sum(share^2).
pub fn family_diversity_score(spend: &[ProductSpend]) -> Option<f64> {
    let mut totals: HashMap<&str, f64> = HashMap::new();
    let mut total = 0.0;
    for line in spend {
        if let Some(family) = line.family.as_deref() {
            *totals.entry(family).or_default() += line.amount_ht;
            total += line.amount_ht;
        }
    }
    if total <= 0.0 {
        return None;
    }
    let herfindahl: f64 = totals.values().map(|amount| (amount / total).powi(2)).sum();
    Some(1.0 - herfindahl)
}

/// Top-3 aroma axes weighted by revenue, plus the confidence in the signal.
pub fn aroma_preferences(spend: &[ProductSpend]) -> (Vec<AromaPreference>, f64) {
    let mut axis_weight: HashMap<AromaAxis, f64> = HashMap::new();
    let mut axis_weighted_value: HashMap<AromaAxis, f64> = HashMap::new();
    let mut attributable_ca = 0.0;

    for line in spend {
        let axes = line.aroma.axes();
        if axes.iter().any(|(_, v)| v.is_some()) {
            attributable_ca += line.amount_ht;
        }
        for (axis, value) in axes {
            if let Some(value) = value {
                *axis_weight.entry(axis).or_default() += line.amount_ht;
                *axis_weighted_value.entry(axis).or_default() +=
                    line.amount_ht * f64::from(value) / 5.0;
            }
        }
    }

    let mut preferences: Vec<AromaPreference> = axis_weight
        .iter()
        .filter(|(_, weight)| **weight > 0.0)
        .map(|(axis, weight)| AromaPreference {
            axis: *axis,
            score: (axis_weighted_value[axis] / weight).clamp(0.0, 1.0),
        })
        .collect();

    preferences.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.axis.as_str().cmp(b.axis.as_str()))
    });
    preferences.truncate(3);

    let confidence = (attributable_ca / AROMA_CONFIDENCE_CA_EUR).min(1.0);
    (preferences, confidence)
}

/// Build one customer's profile from aggregates and joined spend.
pub fn build_profile(
    customer_code: &str,
    stats: Option<&CustomerOrderStats>,
    spend: &[ProductSpend],
    quartiles: &RfmQuartiles,
    today: NaiveDate,
) -> MasterProfile {
    match stats {
        None => MasterProfile {
            customer_code: customer_code.to_string(),
            first_purchase_date: None,
            last_purchase_date: None,
            recency_days: None,
            order_count: 0,
            total_ca_ht: 0.0,
            r_score: None,
            f_score: None,
            m_score: None,
            rfm: None,
            segment: CustomerSegment::Prospect,
            top_families: Vec::new(),
            family_diversity_score: None,
            top_grapes: Vec::new(),
            top_sucrosities: Vec::new(),
            top_price_bands: Vec::new(),
            aroma_axes: Vec::new(),
            aroma_confidence: None,
            aroma_level: None,
            updated_at: Utc::now(),
        },
        Some(stats) => {
            let recency_days = (today - stats.last_order_date).num_days().max(0);
            let r = quartiles.r_score(recency_days);
            let f = quartiles.f_score(stats.order_count);
            let m = quartiles.m_score(stats.total_amount_ht);
            let (aroma_axes, aroma_confidence) = aroma_preferences(spend);

            MasterProfile {
                customer_code: customer_code.to_string(),
                first_purchase_date: Some(stats.first_order_date),
                last_purchase_date: Some(stats.last_order_date),
                recency_days: Some(recency_days as i32),
                order_count: stats.order_count as i32,
                total_ca_ht: stats.total_amount_ht,
                r_score: Some(r),
                f_score: Some(f),
                m_score: Some(m),
                rfm: Some(format!("{}{}{}", r, f, m)),
                segment: assign_segment(r, f, m, recency_days),
                top_families: top_preferences(spend, |s| s.family.as_deref()),
                family_diversity_score: family_diversity_score(spend),
                top_grapes: top_preferences(spend, |s| s.grape.as_deref()),
                top_sucrosities: top_preferences(spend, |s| s.sucrosity.as_deref()),
                top_price_bands: top_preferences(spend, |s| s.price_band.as_deref()),
                aroma_level: Some(AromaLevel::from_confidence(aroma_confidence)),
                aroma_axes,
                aroma_confidence: Some(aroma_confidence),
                updated_at: Utc::now(),
            }
        }
    }
}

/// Builds and upserts profiles for every known customer.
pub struct ProfileBuilder<'a> {
    repository: &'a dyn CleanRepository,
}

impl<'a> ProfileBuilder<'a> {
    pub fn new(repository: &'a dyn CleanRepository) -> Self {
        Self { repository }
    }

    /// One profile per customer; customers without orders become prospects.
    pub async fn build_all(&self) -> Result<usize> {
        let today = Utc::now().date_naive();
        let stats = self.repository.fetch_order_stats().await?;
        let quartiles = RfmQuartiles::from_stats(&stats, today);
        let by_code: HashMap<&str, &CustomerOrderStats> = stats
            .iter()
            .map(|s| (s.customer_code.as_str(), s))
            .collect();

        let codes = self.repository.list_customer_codes().await?;
        info!(customers = codes.len(), "building master profiles");

        let mut built = 0;
        for code in &codes {
            let stats = by_code.get(code.as_str()).copied();
            let spend = if stats.is_some() {
                self.repository.fetch_product_spend(code).await?
            } else {
                Vec::new()
            };
            let profile = build_profile(code, stats, &spend, &quartiles, today);
            match self.repository.upsert_profile(&profile).await {
                Ok(()) => built += 1,
                Err(e) => warn!(customer_code = %code, error = %e, "failed to upsert profile"),
            }
        }

        info!(built, "master profiles upserted");
        Ok(built)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reco_core::model::AromaProfile;

    fn stats(code: &str, last: NaiveDate, count: i64, total: f64) -> CustomerOrderStats {
        CustomerOrderStats {
            customer_code: code.to_string(),
            first_order_date: last,
            last_order_date: last,
            order_count: count,
            total_amount_ht: total,
        }
    }

    fn spend(amount: f64, family: Option<&str>) -> ProductSpend {
        ProductSpend {
            amount_ht: amount,
            family: family.map(String::from),
            grape: None,
            sucrosity: None,
            price_band: None,
            aroma: AromaProfile::default(),
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn rfm_scores_are_monotone() {
        let today = day(2024, 6, 1);
        let population = vec![
            stats("A", day(2024, 5, 25), 1, 50.0),
            stats("B", day(2024, 3, 1), 4, 400.0),
            stats("C", day(2023, 10, 1), 8, 1500.0),
            stats("D", day(2022, 6, 1), 12, 6000.0),
        ];
        let quartiles = RfmQuartiles::from_stats(&population, today);

        // More recent => not-lower r.
        assert!(quartiles.r_score(7) >= quartiles.r_score(92));
        assert!(quartiles.r_score(92) >= quartiles.r_score(243));
        assert!(quartiles.r_score(243) >= quartiles.r_score(731));

        // More orders => not-lower f.
        assert!(quartiles.f_score(12) >= quartiles.f_score(8));
        assert!(quartiles.f_score(8) >= quartiles.f_score(4));
        assert!(quartiles.f_score(4) >= quartiles.f_score(1));

        // Higher spend => not-lower m.
        assert!(quartiles.m_score(6000.0) >= quartiles.m_score(1500.0));
        assert!(quartiles.m_score(1500.0) >= quartiles.m_score(50.0));

        // Extremes land on quartiles 1 and 4.
        assert_eq!(quartiles.f_score(1), 1);
        assert_eq!(quartiles.f_score(12), 4);
    }

    #[test]
    fn equal_values_share_a_quartile() {
        let today = day(2024, 6, 1);
        let population: Vec<CustomerOrderStats> = (0..4)
            .map(|i| stats(&format!("C{}", i), day(2024, 5, 1), 3, 100.0))
            .collect();
        let quartiles = RfmQuartiles::from_stats(&population, today);
        assert_eq!(quartiles.f_score(3), 1);
        assert_eq!(quartiles.m_score(100.0), 1);
    }

    #[test]
    fn segment_rules() {
        assert_eq!(assign_segment(4, 4, 4, 10), CustomerSegment::Vip);
        assert_eq!(assign_segment(4, 3, 4, 10), CustomerSegment::Vip); // avg 3.67
        assert_eq!(assign_segment(1, 1, 2, 30), CustomerSegment::AtRisk);
        assert_eq!(assign_segment(2, 1, 3, 200), CustomerSegment::Inactive);
        assert_eq!(assign_segment(3, 2, 2, 30), CustomerSegment::Standard);
    }

    #[test]
    fn top_preferences_rank_by_revenue() {
        let lines = vec![
            spend(100.0, Some("Riesling")),
            spend(300.0, Some("Pinot Noir")),
            spend(100.0, Some("Pinot Noir")),
            spend(50.0, None),
        ];
        let prefs = top_preferences(&lines, |s| s.family.as_deref());
        assert_eq!(prefs.len(), 2);
        assert_eq!(prefs[0].value, "Pinot Noir");
        assert!((prefs[0].ca_share - 0.8).abs() < 1e-9);
        assert_eq!(prefs[1].value, "Riesling");
        assert!((prefs[1].ca_share - 0.2).abs() < 1e-9);
    }

    #[test]
    fn diversity_is_herfindahl_complement() {
        let lines = vec![spend(50.0, Some("A")), spend(50.0, Some("B"))];
        let diversity = family_diversity_score(&lines).unwrap();
        assert!((diversity - 0.5).abs() < 1e-9);

        let single = vec![spend(100.0, Some("A"))];
        assert!((family_diversity_score(&single).unwrap() - 0.0).abs() < 1e-9);

        assert!(family_diversity_score(&[spend(10.0, None)]).is_none());
    }

    #[test]
    fn aroma_axes_weighted_by_revenue() {
        let mut fruity = spend(400.0, Some("A"));
        fruity.aroma = AromaProfile {
            fruit: Some(5),
            floral: Some(1),
            ..Default::default()
        };
        let mut floral = spend(100.0, Some("B"));
        floral.aroma = AromaProfile {
            fruit: Some(1),
            floral: Some(5),
            ..Default::default()
        };

        let (axes, confidence) = aroma_preferences(&[fruity, floral]);
        assert_eq!(axes[0].axis, AromaAxis::Fruit);
        // 400*1.0 + 100*0.2 over 500 EUR of weight.
        assert!((axes[0].score - 0.84).abs() < 1e-9);
        assert!((confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn customer_without_orders_is_prospect() {
        let quartiles = RfmQuartiles::from_stats(&[], day(2024, 6, 1));
        let profile = build_profile("C009", None, &[], &quartiles, day(2024, 6, 1));
        assert_eq!(profile.segment, CustomerSegment::Prospect);
        assert_eq!(profile.order_count, 0);
        assert!(profile.rfm.is_none());
    }

    #[test]
    fn rfm_string_concatenates_digits() {
        let today = day(2024, 6, 1);
        let population = vec![
            stats("A", day(2024, 5, 25), 10, 5000.0),
            stats("B", day(2023, 1, 1), 1, 50.0),
        ];
        let quartiles = RfmQuartiles::from_stats(&population, today);
        let profile = build_profile("A", Some(&population[0]), &[], &quartiles, today);
        assert_eq!(profile.rfm.as_deref(), Some("333"));
    }
}
