//! Batch validation: per-row schema checks, in-batch duplicate detection and
//! cross-batch dependency checks.
//!
//! A single invalid row never stops the batch; every rejection becomes an
//! `IngestionError` on the report and the row is withheld from staging.

use std::collections::{HashMap, HashSet};

use validator::Validate;

use super::schema::{
    raw_row_json, validation_message, ContactRecord, CustomerRecord, FileType, IngestionError,
    IngestionErrorCode, RawRow, SalesLineRecord,
};

/// Reference data from previously ingested batches, used for dependency
/// checks on sales lines and contacts.
#[derive(Debug, Default, Clone)]
pub struct BatchReferences {
    pub customer_codes: HashSet<String>,
    /// label_norm -> product_key
    pub product_aliases: HashMap<String, String>,
}

/// Output of one batch validation pass.
pub struct ValidatedBatch<T> {
    pub valid: Vec<T>,
    pub errors: Vec<IngestionError>,
}

// CSV data rows start at 2; the header occupies row 1.
const FIRST_DATA_ROW: usize = 2;

pub fn validate_customers(rows: &[RawRow]) -> ValidatedBatch<CustomerRecord> {
    let mut valid = Vec::new();
    let mut errors = Vec::new();
    let mut seen_codes: HashSet<String> = HashSet::new();

    for (idx, row) in rows.iter().enumerate() {
        let row_number = idx + FIRST_DATA_ROW;
        let record = CustomerRecord::from_raw(row);

        // Duplicate codes inside the batch: first occurrence wins.
        if !record.customer_code.is_empty() && !seen_codes.insert(record.customer_code.clone()) {
            errors.push(IngestionError {
                row_number,
                file_type: FileType::Customers,
                code: IngestionErrorCode::DuplicateCustomer,
                message: format!("Duplicate customer_code: {}", record.customer_code),
                raw_row: raw_row_json(row),
            });
            continue;
        }

        match record.validate() {
            Ok(()) => valid.push(record),
            Err(validation_errors) => errors.push(IngestionError {
                row_number,
                file_type: FileType::Customers,
                code: IngestionErrorCode::ValidationError,
                message: validation_message(&validation_errors),
                raw_row: raw_row_json(row),
            }),
        }
    }

    ValidatedBatch { valid, errors }
}

pub fn validate_sales_lines(
    rows: &[RawRow],
    references: Option<&BatchReferences>,
) -> ValidatedBatch<SalesLineRecord> {
    let mut valid = Vec::new();
    let mut errors = Vec::new();

    for (idx, row) in rows.iter().enumerate() {
        let row_number = idx + FIRST_DATA_ROW;

        let record = match SalesLineRecord::from_raw(row) {
            Ok(record) => record,
            Err(message) => {
                errors.push(IngestionError {
                    row_number,
                    file_type: FileType::SalesLines,
                    code: IngestionErrorCode::ValidationError,
                    message,
                    raw_row: raw_row_json(row),
                });
                continue;
            }
        };

        if let Err(validation_errors) = record.validate() {
            errors.push(IngestionError {
                row_number,
                file_type: FileType::SalesLines,
                code: IngestionErrorCode::ValidationError,
                message: validation_message(&validation_errors),
                raw_row: raw_row_json(row),
            });
            continue;
        }

        let label_norm = match record.product_label_norm.as_deref() {
            Some(norm) if !norm.is_empty() => norm.to_string(),
            _ => {
                errors.push(IngestionError {
                    row_number,
                    file_type: FileType::SalesLines,
                    code: IngestionErrorCode::InvalidProductLabel,
                    message: format!(
                        "Product label could not be normalized: {}",
                        record.product_label
                    ),
                    raw_row: raw_row_json(row),
                });
                continue;
            }
        };

        if let Some(refs) = references {
            if !refs.customer_codes.contains(&record.customer_code) {
                errors.push(IngestionError {
                    row_number,
                    file_type: FileType::SalesLines,
                    code: IngestionErrorCode::CustomerNotFound,
                    message: format!(
                        "Customer not found in customers batch: {}",
                        record.customer_code
                    ),
                    raw_row: raw_row_json(row),
                });
                continue;
            }
            if !refs.product_aliases.contains_key(&label_norm) {
                errors.push(IngestionError {
                    row_number,
                    file_type: FileType::SalesLines,
                    code: IngestionErrorCode::ProductNotFound,
                    message: format!("Product not in alias mapping: {}", label_norm),
                    raw_row: raw_row_json(row),
                });
                continue;
            }
        }

        valid.push(record);
    }

    ValidatedBatch { valid, errors }
}

pub fn validate_contacts(
    rows: &[RawRow],
    references: Option<&BatchReferences>,
) -> ValidatedBatch<ContactRecord> {
    let mut valid = Vec::new();
    let mut errors = Vec::new();

    for (idx, row) in rows.iter().enumerate() {
        let row_number = idx + FIRST_DATA_ROW;

        let record = match ContactRecord::from_raw(row) {
            Ok(record) => record,
            Err(message) => {
                errors.push(IngestionError {
                    row_number,
                    file_type: FileType::Contacts,
                    code: IngestionErrorCode::ValidationError,
                    message,
                    raw_row: raw_row_json(row),
                });
                continue;
            }
        };

        if let Err(validation_errors) = record.validate() {
            errors.push(IngestionError {
                row_number,
                file_type: FileType::Contacts,
                code: IngestionErrorCode::ValidationError,
                message: validation_message(&validation_errors),
                raw_row: raw_row_json(row),
            });
            continue;
        }

        if let Some(refs) = references {
            if !refs.customer_codes.contains(&record.customer_code) {
                errors.push(IngestionError {
                    row_number,
                    file_type: FileType::Contacts,
                    code: IngestionErrorCode::CustomerNotFound,
                    message: format!(
                        "Customer not found in customers batch: {}",
                        record.customer_code
                    ),
                    raw_row: raw_row_json(row),
                });
                continue;
            }
        }

        valid.push(record);
    }

    ValidatedBatch { valid, errors }
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

    fn sales_row(code: &str, label: &str) -> RawRow {
        raw(&[
            ("customer_code", code),
            ("order_date", "2024-01-10"),
            ("doc_ref", "INV-1"),
            ("product_label", label),
            ("qty", "1"),
            ("amount_ht", "20"),
        ])
    }

    #[test]
    fn duplicate_customer_keeps_first_occurrence() {
        let rows = vec![
            raw(&[("customer_code", "C001"), ("city", "Paris")]),
            raw(&[("customer_code", "C001"), ("city", "Lyon")]),
            raw(&[("customer_code", "C002")]),
        ];
        let batch = validate_customers(&rows);
        assert_eq!(batch.valid.len(), 2);
        assert_eq!(batch.errors.len(), 1);
        assert_eq!(batch.errors[0].code, IngestionErrorCode::DuplicateCustomer);
        assert_eq!(batch.errors[0].row_number, 3);
        assert_eq!(batch.valid[0].city.as_deref(), Some("Paris"));
    }

    #[test]
    fn exactly_one_error_per_invalid_row() {
        let rows = vec![
            raw(&[("customer_code", "C001"), ("email", "bad-email")]),
            raw(&[("customer_code", "C002"), ("email", "ok@ex.com")]),
        ];
        let batch = validate_customers(&rows);
        assert_eq!(batch.valid.len(), 1);
        assert_eq!(batch.errors.len(), 1);
        assert_eq!(batch.errors[0].code, IngestionErrorCode::ValidationError);
    }

    #[test]
    fn sales_line_dependency_checks() {
        let mut refs = BatchReferences::default();
        refs.customer_codes.insert("C001".to_string());
        refs.product_aliases
            .insert("riesling 2020".to_string(), "WINE001".to_string());

        let rows = vec![
            sales_row("C001", "Riesling 2020"),
            sales_row("C999", "Riesling 2020"),
            sales_row("C001", "Unknown Wine"),
        ];
        let batch = validate_sales_lines(&rows, Some(&refs));
        assert_eq!(batch.valid.len(), 1);
        assert_eq!(batch.errors.len(), 2);
        assert_eq!(batch.errors[0].code, IngestionErrorCode::CustomerNotFound);
        assert_eq!(batch.errors[1].code, IngestionErrorCode::ProductNotFound);
    }

    #[test]
    fn sales_lines_without_references_skip_dependency_checks() {
        let rows = vec![sales_row("C999", "Anything")];
        let batch = validate_sales_lines(&rows, None);
        assert_eq!(batch.valid.len(), 1);
        assert!(batch.errors.is_empty());
    }

    #[test]
    fn contact_requires_date() {
        let rows = vec![
            raw(&[("customer_code", "C001"), ("contact_date", "2024-02-01")]),
            raw(&[("customer_code", "C002"), ("contact_date", "")]),
        ];
        let batch = validate_contacts(&rows, None);
        assert_eq!(batch.valid.len(), 1);
        assert_eq!(batch.errors.len(), 1);
        assert_eq!(batch.errors[0].code, IngestionErrorCode::ValidationError);
    }
}
