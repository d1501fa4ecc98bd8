use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Wine product categories used across the canonical schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductCategory {
    Red,
    White,
    Rose,
    SparklingNatural, // pétillant naturel
    Sparkling,
    Fortified,
    Other,
}

impl ProductCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductCategory::Red => "RED",
            ProductCategory::White => "WHITE",
            ProductCategory::Rose => "ROSE",
            ProductCategory::SparklingNatural => "SPARKLING_NATURAL",
            ProductCategory::Sparkling => "SPARKLING",
            ProductCategory::Fortified => "FORTIFIED",
            ProductCategory::Other => "OTHER",
        }
    }
}

impl fmt::Display for ProductCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RED" => Ok(ProductCategory::Red),
            "WHITE" => Ok(ProductCategory::White),
            "ROSE" => Ok(ProductCategory::Rose),
            "SPARKLING_NATURAL" => Ok(ProductCategory::SparklingNatural),
            "SPARKLING" => Ok(ProductCategory::Sparkling),
            "FORTIFIED" => Ok(ProductCategory::Fortified),
            "OTHER" => Ok(ProductCategory::Other),
            other => Err(format!("unknown product category: {}", other)),
        }
    }
}

/// Price segments over the unit list price in EUR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceSegment {
    Entry,    // < 15 EUR
    Standard, // 15-30 EUR
    Premium,  // 30-75 EUR
    Luxury,   // >= 75 EUR
}

impl PriceSegment {
    /// Bucket a unit list price (EUR) into its segment.
    pub fn from_price(price_eur: f64) -> Self {
        if price_eur >= 75.0 {
            PriceSegment::Luxury
        } else if price_eur >= 30.0 {
            PriceSegment::Premium
        } else if price_eur >= 15.0 {
            PriceSegment::Standard
        } else {
            PriceSegment::Entry
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PriceSegment::Entry => "ENTRY",
            PriceSegment::Standard => "STANDARD",
            PriceSegment::Premium => "PREMIUM",
            PriceSegment::Luxury => "LUXURY",
        }
    }
}

impl fmt::Display for PriceSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Customer value segments assigned by the master-profile build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CustomerSegment {
    Vip,
    Standard,
    AtRisk,
    Prospect,
    Inactive,
}

impl CustomerSegment {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomerSegment::Vip => "VIP",
            CustomerSegment::Standard => "STANDARD",
            CustomerSegment::AtRisk => "AT_RISK",
            CustomerSegment::Prospect => "PROSPECT",
            CustomerSegment::Inactive => "INACTIVE",
        }
    }
}

impl fmt::Display for CustomerSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CustomerSegment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "VIP" => Ok(CustomerSegment::Vip),
            "STANDARD" => Ok(CustomerSegment::Standard),
            "AT_RISK" => Ok(CustomerSegment::AtRisk),
            "PROSPECT" => Ok(CustomerSegment::Prospect),
            "INACTIVE" => Ok(CustomerSegment::Inactive),
            other => Err(format!("unknown customer segment: {}", other)),
        }
    }
}

/// Recommendation scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scenario {
    Rebuy,
    CrossSell,
    Upsell,
    Winback,
    Nurture,
}

impl Scenario {
    pub const ALL: [Scenario; 5] = [
        Scenario::Rebuy,
        Scenario::CrossSell,
        Scenario::Upsell,
        Scenario::Winback,
        Scenario::Nurture,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::Rebuy => "REBUY",
            Scenario::CrossSell => "CROSS_SELL",
            Scenario::Upsell => "UPSELL",
            Scenario::Winback => "WINBACK",
            Scenario::Nurture => "NURTURE",
        }
    }

    /// Base score contributed by the scenario match itself.
    pub fn base_score(&self) -> f64 {
        match self {
            Scenario::Rebuy => 85.0,
            Scenario::CrossSell => 75.0,
            Scenario::Upsell => 80.0,
            Scenario::Winback => 70.0,
            Scenario::Nurture => 65.0,
        }
    }

    /// Tie-break position when candidates overlap across scenarios:
    /// REBUY > UPSELL > CROSS_SELL > WINBACK > NURTURE.
    pub fn tie_break_order(&self) -> u8 {
        match self {
            Scenario::Rebuy => 0,
            Scenario::Upsell => 1,
            Scenario::CrossSell => 2,
            Scenario::Winback => 3,
            Scenario::Nurture => 4,
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REBUY" => Ok(Scenario::Rebuy),
            "CROSS_SELL" => Ok(Scenario::CrossSell),
            "UPSELL" => Ok(Scenario::Upsell),
            "WINBACK" => Ok(Scenario::Winback),
            "NURTURE" => Ok(Scenario::Nurture),
            other => Err(format!("unknown scenario: {}", other)),
        }
    }
}

/// Approval state of an audited recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Flagged,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "PENDING",
            ApprovalStatus::Approved => "APPROVED",
            ApprovalStatus::Rejected => "REJECTED",
            ApprovalStatus::Flagged => "FLAGGED",
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApprovalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ApprovalStatus::Pending),
            "APPROVED" => Ok(ApprovalStatus::Approved),
            "REJECTED" => Ok(ApprovalStatus::Rejected),
            "FLAGGED" => Ok(ApprovalStatus::Flagged),
            other => Err(format!("unknown approval status: {}", other)),
        }
    }
}

/// Run-level quality assessment bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityLevel {
    Excellent,  // >= 0.90
    Good,       // >= 0.75
    Acceptable, // >= 0.60
    Poor,
}

impl QualityLevel {
    /// Derive the level from a composite quality score in [0, 1].
    pub fn from_score(score: f64) -> Self {
        if score >= 0.90 {
            QualityLevel::Excellent
        } else if score >= 0.75 {
            QualityLevel::Good
        } else if score >= 0.60 {
            QualityLevel::Acceptable
        } else {
            QualityLevel::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityLevel::Excellent => "EXCELLENT",
            QualityLevel::Good => "GOOD",
            QualityLevel::Acceptable => "ACCEPTABLE",
            QualityLevel::Poor => "POOR",
        }
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EXCELLENT" => Ok(QualityLevel::Excellent),
            "GOOD" => Ok(QualityLevel::Good),
            "ACCEPTABLE" => Ok(QualityLevel::Acceptable),
            "POOR" => Ok(QualityLevel::Poor),
            other => Err(format!("unknown quality level: {}", other)),
        }
    }
}

/// Customer budget bands derived from average order value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BudgetLevel {
    Budget,
    Standard,
    Premium,
    Luxury,
}

impl BudgetLevel {
    pub fn from_avg_order_value(avg_eur: f64) -> Self {
        if avg_eur >= 500.0 {
            BudgetLevel::Luxury
        } else if avg_eur >= 200.0 {
            BudgetLevel::Premium
        } else if avg_eur >= 50.0 {
            BudgetLevel::Standard
        } else {
            BudgetLevel::Budget
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetLevel::Budget => "BUDGET",
            BudgetLevel::Standard => "STANDARD",
            BudgetLevel::Premium => "PREMIUM",
            BudgetLevel::Luxury => "LUXURY",
        }
    }
}

impl fmt::Display for BudgetLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confidence bands for the aroma preference profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AromaLevel {
    Low,
    Medium,
    High,
}

impl AromaLevel {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.66 {
            AromaLevel::High
        } else if confidence >= 0.33 {
            AromaLevel::Medium
        } else {
            AromaLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AromaLevel::Low => "LOW",
            AromaLevel::Medium => "MEDIUM",
            AromaLevel::High => "HIGH",
        }
    }
}

impl fmt::Display for AromaLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The seven aroma axes carried on every product (scale 1-5 each).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AromaAxis {
    Fruit,
    Floral,
    Spice,
    Mineral,
    Acidity,
    Body,
    Tannin,
}

impl AromaAxis {
    pub const ALL: [AromaAxis; 7] = [
        AromaAxis::Fruit,
        AromaAxis::Floral,
        AromaAxis::Spice,
        AromaAxis::Mineral,
        AromaAxis::Acidity,
        AromaAxis::Body,
        AromaAxis::Tannin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AromaAxis::Fruit => "fruit",
            AromaAxis::Floral => "floral",
            AromaAxis::Spice => "spice",
            AromaAxis::Mineral => "mineral",
            AromaAxis::Acidity => "acidity",
            AromaAxis::Body => "body",
            AromaAxis::Tannin => "tannin",
        }
    }
}

impl fmt::Display for AromaAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sales units and their normalized 75-cl bottle equivalence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SalesUnit {
    Bottle75,
    Magnum150,
    Case12,
    Other,
}

impl SalesUnit {
    /// Parse a free-form unit label from an export file.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "bottle" | "bouteille" | "75cl" | "0.75" => SalesUnit::Bottle75,
            "magnum" | "150cl" | "1.5" => SalesUnit::Magnum150,
            "case" | "caisse" | "case12" | "carton" => SalesUnit::Case12,
            _ => SalesUnit::Other,
        }
    }

    /// 75-cl bottle equivalents per native unit.
    pub fn bottles_75cl_factor(&self) -> f64 {
        match self {
            SalesUnit::Bottle75 => 1.0,
            SalesUnit::Magnum150 => 2.0,
            SalesUnit::Case12 => 12.0,
            SalesUnit::Other => 1.0,
        }
    }

    /// Normalize a native quantity into 75-cl bottle equivalents.
    pub fn bottles_75cl_equivalent(&self, qty_units: f64) -> f64 {
        qty_units * self.bottles_75cl_factor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_segment_buckets() {
        assert_eq!(PriceSegment::from_price(0.0), PriceSegment::Entry);
        assert_eq!(PriceSegment::from_price(14.99), PriceSegment::Entry);
        assert_eq!(PriceSegment::from_price(15.0), PriceSegment::Standard);
        assert_eq!(PriceSegment::from_price(29.99), PriceSegment::Standard);
        assert_eq!(PriceSegment::from_price(30.0), PriceSegment::Premium);
        assert_eq!(PriceSegment::from_price(74.99), PriceSegment::Premium);
        assert_eq!(PriceSegment::from_price(75.0), PriceSegment::Luxury);
    }

    #[test]
    fn quality_level_thresholds() {
        assert_eq!(QualityLevel::from_score(0.95), QualityLevel::Excellent);
        assert_eq!(QualityLevel::from_score(0.90), QualityLevel::Excellent);
        assert_eq!(QualityLevel::from_score(0.89), QualityLevel::Good);
        assert_eq!(QualityLevel::from_score(0.75), QualityLevel::Good);
        assert_eq!(QualityLevel::from_score(0.60), QualityLevel::Acceptable);
        assert_eq!(QualityLevel::from_score(0.59), QualityLevel::Poor);
    }

    #[test]
    fn scenario_round_trip_and_order() {
        for scenario in Scenario::ALL {
            assert_eq!(scenario.as_str().parse::<Scenario>().unwrap(), scenario);
        }
        assert!(Scenario::Rebuy.tie_break_order() < Scenario::Upsell.tie_break_order());
        assert!(Scenario::Upsell.tie_break_order() < Scenario::CrossSell.tie_break_order());
        assert!(Scenario::CrossSell.tie_break_order() < Scenario::Winback.tie_break_order());
        assert!(Scenario::Winback.tie_break_order() < Scenario::Nurture.tie_break_order());
    }

    #[test]
    fn unit_normalization() {
        assert_eq!(SalesUnit::parse("Bouteille").bottles_75cl_equivalent(6.0), 6.0);
        assert_eq!(SalesUnit::parse("magnum").bottles_75cl_equivalent(2.0), 4.0);
        assert_eq!(SalesUnit::parse("case").bottles_75cl_equivalent(1.0), 12.0);
        assert_eq!(SalesUnit::parse("demi").bottles_75cl_equivalent(3.0), 3.0);
    }

    #[test]
    fn budget_level_buckets() {
        assert_eq!(BudgetLevel::from_avg_order_value(30.0), BudgetLevel::Budget);
        assert_eq!(BudgetLevel::from_avg_order_value(50.0), BudgetLevel::Standard);
        assert_eq!(BudgetLevel::from_avg_order_value(200.0), BudgetLevel::Premium);
        assert_eq!(BudgetLevel::from_avg_order_value(500.0), BudgetLevel::Luxury);
    }
}
