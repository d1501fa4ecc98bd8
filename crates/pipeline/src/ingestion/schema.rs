//! Declarative row schemas for CSV imports.
//!
//! Raw CSV rows are string maps; each file type has a typed record built by
//! `from_raw` (normalization + parsing) and checked by `validate`
//! (constraints). Failures are reported as tagged `IngestionError` values
//! carrying the row number and the offending raw row, never as panics.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use validator::{Validate, ValidationError};

use super::normalize;

/// A raw CSV row keyed by normalized column name. BTreeMap keeps the key
/// order stable for content hashing.
pub type RawRow = BTreeMap<String, String>;

/// Supported CSV file types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Customers,
    SalesLines,
    Contacts,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Customers => "customers",
            FileType::SalesLines => "sales_lines",
            FileType::Contacts => "contacts",
        }
    }

    /// Raw-staging table backing this file type.
    pub fn staging_table(&self) -> &'static str {
        match self {
            FileType::Customers => "raw_customers",
            FileType::SalesLines => "raw_sales_lines",
            FileType::Contacts => "raw_contacts",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customers" => Ok(FileType::Customers),
            "sales_lines" => Ok(FileType::SalesLines),
            "contacts" => Ok(FileType::Contacts),
            other => Err(format!("unknown file type: {}", other)),
        }
    }
}

/// Row-level error codes captured on the ingestion report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IngestionErrorCode {
    ValidationError,
    DuplicateCustomer,
    InvalidProductLabel,
    CustomerNotFound,
    ProductNotFound,
}

impl IngestionErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestionErrorCode::ValidationError => "VALIDATION_ERROR",
            IngestionErrorCode::DuplicateCustomer => "DUPLICATE_CUSTOMER",
            IngestionErrorCode::InvalidProductLabel => "INVALID_PRODUCT_LABEL",
            IngestionErrorCode::CustomerNotFound => "CUSTOMER_NOT_FOUND",
            IngestionErrorCode::ProductNotFound => "PRODUCT_NOT_FOUND",
        }
    }
}

impl fmt::Display for IngestionErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One rejected row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionError {
    pub row_number: usize,
    pub file_type: FileType,
    pub code: IngestionErrorCode,
    pub message: String,
    pub raw_row: serde_json::Value,
}

/// Report for one ingested file within a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionReport {
    pub batch_id: String,
    pub file_type: FileType,
    pub total_rows: usize,
    pub valid_rows: usize,
    pub error_rows: usize,
    pub errors: Vec<IngestionError>,
}

impl IngestionReport {
    pub fn empty(batch_id: &str, file_type: FileType) -> Self {
        Self {
            batch_id: batch_id.to_string(),
            file_type,
            total_rows: 0,
            valid_rows: 0,
            error_rows: 0,
            errors: Vec::new(),
        }
    }

    /// Success rate as a percentage; an empty file counts as fully successful.
    pub fn success_rate(&self) -> f64 {
        if self.total_rows == 0 {
            100.0
        } else {
            (self.valid_rows as f64 / self.total_rows as f64) * 100.0
        }
    }
}

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^@]+@[^@]+\.[^@]+$").expect("email regex"));
static POSTAL_CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9\-]{2,20}$").expect("postal code regex"));

fn validate_email_format(email: &str) -> Result<(), ValidationError> {
    if EMAIL_RE.is_match(email) {
        Ok(())
    } else {
        let mut err = ValidationError::new("email");
        err.message = Some("invalid email format".into());
        Err(err)
    }
}

fn validate_postal_code(code: &str) -> Result<(), ValidationError> {
    if POSTAL_CODE_RE.is_match(code) {
        Ok(())
    } else {
        let mut err = ValidationError::new("postal_code");
        err.message = Some("invalid postal code".into());
        Err(err)
    }
}

fn get(row: &RawRow, key: &str) -> String {
    row.get(key).cloned().unwrap_or_default()
}

/// Typed record for `customers.csv`.
#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
pub struct CustomerRecord {
    #[validate(length(min = 1, message = "customer_code is required"))]
    pub customer_code: String,
    pub last_name: Option<String>,
    pub first_name: Option<String>,
    #[validate(custom(function = "validate_email_format"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    #[validate(custom(function = "validate_postal_code"))]
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
}

impl CustomerRecord {
    /// Normalize a raw row into a typed record. Parsing never fails for
    /// customers; constraint violations surface through `validate()`.
    pub fn from_raw(row: &RawRow) -> Self {
        Self {
            customer_code: get(row, "customer_code").trim().to_string(),
            last_name: normalize::normalize_text(&get(row, "last_name")),
            first_name: normalize::normalize_text(&get(row, "first_name")),
            email: normalize::normalize_email(&get(row, "email")),
            phone: normalize::normalize_phone(&get(row, "phone")),
            address: normalize::normalize_text(&get(row, "address")),
            postal_code: normalize::normalize_text(&get(row, "postal_code")),
            city: normalize::normalize_text(&get(row, "city")),
            country: normalize::normalize_text(&get(row, "country")),
        }
    }
}

/// Typed record for `sales_lines.csv`.
#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
pub struct SalesLineRecord {
    #[validate(length(min = 1, message = "customer_code is required"))]
    pub customer_code: String,
    pub order_date: NaiveDate,
    #[validate(length(min = 1, message = "doc_ref is required"))]
    pub doc_ref: String,
    pub doc_type: Option<String>,
    #[validate(length(min = 1, message = "product_label is required"))]
    pub product_label: String,
    pub product_label_norm: Option<String>,
    #[validate(range(exclusive_min = 0.0, message = "qty must be positive"))]
    pub qty: f64,
    #[validate(range(min = 0.0, message = "amount_ht must be non-negative"))]
    pub amount_ht: f64,
    #[validate(range(min = 0.0, message = "amount_ttc must be non-negative"))]
    pub amount_ttc: Option<f64>,
    #[validate(range(min = 0.0, message = "margin must be non-negative"))]
    pub margin: Option<f64>,
}

impl SalesLineRecord {
    /// Normalize and parse a raw row. Returns `Err` with a field message when
    /// a required value cannot be parsed at all.
    pub fn from_raw(row: &RawRow) -> Result<Self, String> {
        let order_date = normalize::normalize_date(&get(row, "order_date"))
            .ok_or_else(|| format!("order_date: invalid date: {}", get(row, "order_date")))?;
        let qty = normalize::normalize_decimal(&get(row, "qty"))
            .ok_or_else(|| format!("qty: invalid number: {}", get(row, "qty")))?;
        let amount_ht = normalize::normalize_decimal(&get(row, "amount_ht"))
            .ok_or_else(|| format!("amount_ht: invalid number: {}", get(row, "amount_ht")))?;

        let product_label = get(row, "product_label").trim().to_string();
        Ok(Self {
            customer_code: get(row, "customer_code").trim().to_string(),
            order_date,
            doc_ref: get(row, "doc_ref").trim().to_string(),
            doc_type: normalize::normalize_text(&get(row, "doc_type")),
            product_label_norm: normalize::normalize_product_label(&product_label),
            product_label,
            qty,
            amount_ht,
            amount_ttc: normalize::normalize_decimal(&get(row, "amount_ttc")),
            margin: normalize::normalize_decimal(&get(row, "margin")),
        })
    }
}

/// Typed record for `contacts.csv`.
#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
pub struct ContactRecord {
    #[validate(length(min = 1, message = "customer_code is required"))]
    pub customer_code: String,
    pub contact_date: NaiveDate,
    pub channel: Option<String>,
    pub status: Option<String>,
    pub campaign_id: Option<String>,
}

impl ContactRecord {
    pub fn from_raw(row: &RawRow) -> Result<Self, String> {
        let contact_date = normalize::normalize_date(&get(row, "contact_date"))
            .ok_or_else(|| format!("contact_date: invalid date: {}", get(row, "contact_date")))?;
        Ok(Self {
            customer_code: get(row, "customer_code").trim().to_string(),
            contact_date,
            channel: normalize::normalize_text(&get(row, "channel")),
            status: normalize::normalize_text(&get(row, "status")),
            campaign_id: normalize::normalize_text(&get(row, "campaign_id")),
        })
    }
}

/// Flatten validator output into one pipe-separated message.
pub fn validation_message(errors: &validator::ValidationErrors) -> String {
    let mut parts: Vec<String> = Vec::new();
    for (field, field_errors) in errors.field_errors() {
        for error in field_errors {
            let detail = error
                .message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| error.code.to_string());
            parts.push(format!("{}: {}", field, detail));
        }
    }
    parts.sort();
    parts.join(" | ")
}

/// Build a JSON value of a raw row for error reporting.
pub fn raw_row_json(row: &RawRow) -> serde_json::Value {
    serde_json::to_value(row).unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, &str)]) -> RawRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn customer_record_normalizes_email() {
        let row = raw(&[
            ("customer_code", "C002"),
            ("last_name", "Martin"),
            ("first_name", "Marie"),
            ("email", "MARIE @ ex.com "),
        ]);
        let record = CustomerRecord::from_raw(&row);
        assert_eq!(record.email.as_deref(), Some("marie@ex.com"));
        assert!(record.validate().is_ok());
    }

    #[test]
    fn customer_record_rejects_bad_email() {
        let row = raw(&[("customer_code", "C001"), ("email", "not-an-email")]);
        let record = CustomerRecord::from_raw(&row);
        let errors = record.validate().unwrap_err();
        assert!(validation_message(&errors).contains("email"));
    }

    #[test]
    fn customer_record_requires_code() {
        let row = raw(&[("customer_code", "  "), ("city", "Paris")]);
        let record = CustomerRecord::from_raw(&row);
        assert!(record.validate().is_err());
    }

    #[test]
    fn postal_code_constraint() {
        let ok = CustomerRecord::from_raw(&raw(&[("customer_code", "C1"), ("postal_code", "75002")]));
        assert!(ok.validate().is_ok());
        let bad = CustomerRecord::from_raw(&raw(&[("customer_code", "C1"), ("postal_code", "7")]));
        assert!(bad.validate().is_err());
    }

    #[test]
    fn sales_line_parses_comma_decimals_and_french_dates() {
        let row = raw(&[
            ("customer_code", "C001"),
            ("order_date", "15/03/2024"),
            ("doc_ref", "INV-1"),
            ("product_label", " Riesling  2020 "),
            ("qty", "2"),
            ("amount_ht", "24,90"),
        ]);
        let record = SalesLineRecord::from_raw(&row).unwrap();
        assert_eq!(record.order_date, NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        assert_eq!(record.amount_ht, 24.9);
        assert_eq!(record.product_label_norm.as_deref(), Some("riesling 2020"));
        assert!(record.validate().is_ok());
    }

    #[test]
    fn sales_line_rejects_non_positive_qty() {
        let row = raw(&[
            ("customer_code", "C001"),
            ("order_date", "2024-03-15"),
            ("doc_ref", "INV-1"),
            ("product_label", "Riesling"),
            ("qty", "0"),
            ("amount_ht", "10"),
        ]);
        let record = SalesLineRecord::from_raw(&row).unwrap();
        assert!(record.validate().is_err());
    }

    #[test]
    fn sales_line_unparseable_date_fails_early() {
        let row = raw(&[
            ("customer_code", "C001"),
            ("order_date", "tomorrow"),
            ("doc_ref", "INV-1"),
            ("product_label", "Riesling"),
            ("qty", "1"),
            ("amount_ht", "10"),
        ]);
        assert!(SalesLineRecord::from_raw(&row).is_err());
    }

    #[test]
    fn success_rate_of_empty_report_is_full() {
        let report = IngestionReport::empty("b1", FileType::Customers);
        assert_eq!(report.success_rate(), 100.0);
    }
}
