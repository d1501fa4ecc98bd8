//! Stage A: customer deduplication.
//!
//! Raw customer rows of one ingestion batch are partitioned by non-null
//! email, then the remainder by non-null phone. Groups of size > 1 collapse
//! into one merged record: first non-null value per field in insertion
//! order, with the merged `customer_code` being the comma-joined list of all
//! source codes. Rows with neither email nor phone pass through unchanged.

use std::collections::HashMap;

use crate::ingestion::CustomerRecord;

/// One deduplicated customer emitted by Stage A.
#[derive(Debug, Clone)]
pub struct DedupedCustomer {
    pub record: CustomerRecord,
    /// Source codes folded into this record (single element when unmerged).
    pub source_codes: Vec<String>,
    pub codes_merged: bool,
    pub duplicate_count: usize,
}

impl DedupedCustomer {
    fn singleton(record: CustomerRecord) -> Self {
        let code = record.customer_code.clone();
        Self {
            record,
            source_codes: vec![code],
            codes_merged: false,
            duplicate_count: 1,
        }
    }
}

/// Deduplicate a batch of raw customer records.
pub fn deduplicate(rows: Vec<CustomerRecord>) -> Vec<DedupedCustomer> {
    let mut email_groups: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, row) in rows.iter().enumerate() {
        if let Some(email) = row.email.as_deref() {
            email_groups.entry(email.to_string()).or_default().push(idx);
        }
    }

    let mut consumed = vec![false; rows.len()];
    let mut merged_at: Vec<Option<DedupedCustomer>> = vec![None; rows.len()];

    // Email groups first; a multi-row group merges at its first row's position.
    for indices in email_groups.values() {
        if indices.len() > 1 {
            let group: Vec<&CustomerRecord> = indices.iter().map(|&i| &rows[i]).collect();
            merged_at[indices[0]] = Some(merge_group(&group));
            for &i in indices {
                consumed[i] = true;
            }
        }
    }

    // Phone groups over what's left.
    let mut phone_groups: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, row) in rows.iter().enumerate() {
        if consumed[idx] {
            continue;
        }
        if let Some(phone) = row.phone.as_deref() {
            phone_groups.entry(phone.to_string()).or_default().push(idx);
        }
    }
    for indices in phone_groups.values() {
        if indices.len() > 1 {
            let group: Vec<&CustomerRecord> = indices.iter().map(|&i| &rows[i]).collect();
            merged_at[indices[0]] = Some(merge_group(&group));
            for &i in indices {
                consumed[i] = true;
            }
        }
    }

    let mut result = Vec::new();
    for (idx, row) in rows.into_iter().enumerate() {
        if let Some(merged) = merged_at[idx].take() {
            result.push(merged);
        } else if !consumed[idx] {
            result.push(DedupedCustomer::singleton(row));
        }
    }
    result
}

fn merge_group(group: &[&CustomerRecord]) -> DedupedCustomer {
    let codes: Vec<String> = group.iter().map(|r| r.customer_code.clone()).collect();

    let mut merged = (*group[0]).clone();
    for row in &group[1..] {
        merge_field(&mut merged.last_name, &row.last_name);
        merge_field(&mut merged.first_name, &row.first_name);
        merge_field(&mut merged.email, &row.email);
        merge_field(&mut merged.phone, &row.phone);
        merge_field(&mut merged.address, &row.address);
        merge_field(&mut merged.postal_code, &row.postal_code);
        merge_field(&mut merged.city, &row.city);
        merge_field(&mut merged.country, &row.country);
    }
    merged.customer_code = codes.join(",");

    DedupedCustomer {
        record: merged,
        codes_merged: codes.len() > 1,
        duplicate_count: group.len(),
        source_codes: codes,
    }
}

fn merge_field(target: &mut Option<String>, source: &Option<String>) {
    if target.is_none() {
        if let Some(value) = source {
            *target = Some(value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer(code: &str, email: Option<&str>, phone: Option<&str>) -> CustomerRecord {
        CustomerRecord {
            customer_code: code.to_string(),
            last_name: None,
            first_name: None,
            email: email.map(String::from),
            phone: phone.map(String::from),
            address: None,
            postal_code: None,
            city: None,
            country: None,
        }
    }

    #[test]
    fn merges_same_email_rows() {
        let rows = vec![
            customer("C001", Some("a@x"), None),
            customer("C002", Some("a@x"), None),
            customer("C003", Some("b@x"), None),
        ];
        let deduped = deduplicate(rows);
        assert_eq!(deduped.len(), 2);

        let merged = deduped.iter().find(|d| d.codes_merged).unwrap();
        assert_eq!(merged.record.customer_code, "C001,C002");
        assert_eq!(merged.duplicate_count, 2);
        assert_eq!(merged.source_codes, vec!["C001", "C002"]);
    }

    #[test]
    fn merges_by_phone_when_no_email_overlap() {
        let rows = vec![
            customer("C001", None, Some("0601")),
            customer("C002", None, Some("0601")),
            customer("C003", None, Some("0602")),
        ];
        let deduped = deduplicate(rows);
        assert_eq!(deduped.len(), 2);
        let merged = deduped.iter().find(|d| d.codes_merged).unwrap();
        assert_eq!(merged.record.customer_code, "C001,C002");
    }

    #[test]
    fn rows_without_email_or_phone_pass_through() {
        let rows = vec![
            customer("C001", None, None),
            customer("C002", None, None),
        ];
        let deduped = deduplicate(rows);
        assert_eq!(deduped.len(), 2);
        assert!(deduped.iter().all(|d| !d.codes_merged));
    }

    #[test]
    fn merge_takes_first_non_null_field() {
        let mut first = customer("C001", Some("a@x"), None);
        first.city = None;
        let mut second = customer("C002", Some("a@x"), Some("0601"));
        second.city = Some("Paris".to_string());
        let mut third = customer("C003", Some("a@x"), Some("0699"));
        third.city = Some("Lyon".to_string());

        let deduped = deduplicate(vec![first, second, third]);
        assert_eq!(deduped.len(), 1);
        let merged = &deduped[0];
        // First non-null in insertion order wins.
        assert_eq!(merged.record.city.as_deref(), Some("Paris"));
        assert_eq!(merged.record.phone.as_deref(), Some("0601"));
        assert_eq!(merged.duplicate_count, 3);
    }

    #[test]
    fn unique_count_matches_group_structure() {
        // 5 rows: one email pair, one phone pair, one bare row.
        let rows = vec![
            customer("C001", Some("a@x"), None),
            customer("C002", Some("a@x"), None),
            customer("C003", None, Some("0601")),
            customer("C004", None, Some("0601")),
            customer("C005", None, None),
        ];
        let deduped = deduplicate(rows);
        assert_eq!(deduped.len(), 3);
    }
}
