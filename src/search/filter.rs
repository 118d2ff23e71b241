//! Direct content filtering over records.
//!
//! This is the fallback search path: a pure, case- and diacritic-insensitive
//! substring match over the four text fields, OR-combined, ordered newest
//! first. It reads conclusively correct data straight from the store, so it
//! also serves as the sole search mechanism in deployments without an index.

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::model::types::TransactionRecord;

/// Fold text for matching: NFD-decompose, drop combining marks, lowercase.
/// "Café" and "cafe" fold to the same string.
pub fn fold_for_match(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

fn field_matches(field: Option<&str>, folded_query: &str) -> bool {
    field.is_some_and(|f| fold_for_match(f).contains(folded_query))
}

/// Whether any of the record's text fields contains the folded query.
pub fn record_matches(record: &TransactionRecord, folded_query: &str) -> bool {
    field_matches(Some(record.merchant_name.as_str()), folded_query)
        || field_matches(record.description.as_deref(), folded_query)
        || field_matches(record.category.as_deref(), folded_query)
        || field_matches(record.location.as_deref(), folded_query)
}

/// Filter `records` down to those matching `query`, sorted by timestamp
/// descending. The sort is stable, so ties keep their input order.
pub fn filter_records(mut records: Vec<TransactionRecord>, query: &str) -> Vec<TransactionRecord> {
    let folded = fold_for_match(query.trim());
    if folded.is_empty() {
        return Vec::new();
    }
    records.retain(|r| record_matches(r, &folded));
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::NewTransaction;
    use chrono::{TimeZone, Utc};

    fn record(merchant: &str, ts_ms: i64) -> TransactionRecord {
        NewTransaction {
            merchant_name: merchant.into(),
            amount: -1.0,
            timestamp: Some(Utc.timestamp_millis_opt(ts_ms).unwrap()),
            ..Default::default()
        }
        .normalize("CAD")
        .unwrap()
    }

    #[test]
    fn fold_strips_diacritics_and_case() {
        assert_eq!(fold_for_match("Café"), "cafe");
        assert_eq!(fold_for_match("ÀÉÎÕÜ"), "aeiou");
    }

    #[test]
    fn query_cafe_matches_stored_cafe_with_accent() {
        let records = vec![record("Café Olimpico", 1_000)];
        let hits = filter_records(records, "cafe");
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn matches_any_of_the_four_fields() {
        let mut r = record("Metro", 1_000);
        r.location = Some("Montréal".into());
        let hits = filter_records(vec![r], "montreal");
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn orders_newest_first() {
        let records = vec![record("Starbucks", 1_000), record("Star Market", 2_000)];
        let hits = filter_records(records, "star");
        let names: Vec<_> = hits.iter().map(|r| r.merchant_name.as_str()).collect();
        assert_eq!(names, vec!["Star Market", "Starbucks"]);
    }

    #[test]
    fn ties_keep_input_order() {
        let a = record("Star One", 1_000);
        let b = record("Star Two", 1_000);
        let hits = filter_records(vec![a.clone(), b.clone()], "star");
        assert_eq!(hits, vec![a, b]);
    }

    #[test]
    fn blank_query_matches_nothing() {
        let records = vec![record("Starbucks", 1_000)];
        assert!(filter_records(records, "   ").is_empty());
    }

    #[test]
    fn non_matching_query_is_empty() {
        let records = vec![record("Starbucks", 1_000)];
        assert!(filter_records(records, "pharmacy").is_empty());
    }
}
