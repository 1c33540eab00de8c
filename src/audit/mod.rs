//! Audit calculators and orchestrators.
//!
//! The per-entity calculators are pure reductions over fetched
//! records; the orchestrators drive them (and the estimator) in a
//! fixed sequential order and persist the results.

pub mod accounts;
pub mod attribution;
pub mod contacts;
pub mod data_audit;
pub mod events;
pub mod kpi;
pub mod leads;
pub mod opportunities;

use crate::models::Record;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Trailing window used for the activity buckets, in days.
pub const ACTIVITY_WINDOW_DAYS: i64 = 90;

/// Counts of records by sales-activity recency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActivityBuckets {
    /// No activity date at all.
    pub never: u64,
    /// Last activity older than the trailing window.
    pub over_90_days: u64,
    /// Last activity inside the trailing window.
    pub within_90_days: u64,
}

/// Bucket records by a date field against `today`.
pub fn activity_buckets(records: &[Record], key: &str, today: NaiveDate) -> ActivityBuckets {
    let threshold = today - chrono::Duration::days(ACTIVITY_WINDOW_DAYS);
    let mut buckets = ActivityBuckets::default();
    for record in records {
        match date_field(record, key) {
            None => buckets.never += 1,
            Some(date) if date < threshold => buckets.over_90_days += 1,
            Some(_) => buckets.within_90_days += 1,
        }
    }
    buckets
}

/// String field value, when present and non-null.
pub fn text_field<'a>(record: &'a Record, key: &str) -> Option<&'a str> {
    record.get(key).and_then(Value::as_str)
}

/// True when the field is missing, null, or a blank string.
pub fn is_blank(record: &Record, key: &str) -> bool {
    match record.get(key) {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

/// Parse a Salesforce date or datetime field to a date.
///
/// The API emits datetimes like `2023-04-01T12:34:56.000+0000` and
/// plain dates like `2023-04-01`.
pub fn date_field(record: &Record, key: &str) -> Option<NaiveDate> {
    let raw = text_field(record, key)?;
    if let Ok(dt) = chrono::DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

/// Numeric field value, tolerating numbers encoded as strings.
pub fn number_field(record: &Record, key: &str) -> Option<f64> {
    match record.get(key) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Boolean field value, tolerating `"true"`/`"false"` strings.
pub fn bool_field(record: &Record, key: &str) -> bool {
    match record.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Frequency table over a string field. Null/blank values are skipped.
pub fn value_counts(records: &[Record], key: &str) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for record in records {
        if let Some(value) = text_field(record, key) {
            if !value.trim().is_empty() {
                *counts.entry(value.to_string()).or_insert(0) += 1;
            }
        }
    }
    counts
}

/// Percentage with a zero-denominator guard, rounded to 2 decimals.
pub fn pct(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    let value = (numerator as f64 / denominator as f64) * 100.0;
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use serde_json::json;

    /// Build a record from (key, value) pairs.
    pub fn record(pairs: &[(&str, Value)]) -> Record {
        let mut record = Record::new();
        for (key, value) in pairs {
            record.insert(key.to_string(), value.clone());
        }
        record
    }

    pub fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[test]
    fn test_date_field_parses_both_shapes() {
        let r = record(&[
            ("CreatedDate", json!("2023-04-01T12:34:56.000+0000")),
            ("LastActivityDate", json!("2023-04-02")),
        ]);
        assert_eq!(
            date_field(&r, "CreatedDate"),
            NaiveDate::from_ymd_opt(2023, 4, 1)
        );
        assert_eq!(
            date_field(&r, "LastActivityDate"),
            NaiveDate::from_ymd_opt(2023, 4, 2)
        );
        assert_eq!(date_field(&r, "Missing"), None);
    }

    #[test]
    fn test_activity_buckets() {
        let records = vec![
            record(&[("LastActivityDate", Value::Null)]),
            record(&[("LastActivityDate", json!("2024-01-01"))]),
            record(&[("LastActivityDate", json!("2024-05-20"))]),
        ];
        let buckets = activity_buckets(&records, "LastActivityDate", today());
        assert_eq!(buckets.never, 1);
        assert_eq!(buckets.over_90_days, 1);
        assert_eq!(buckets.within_90_days, 1);
    }

    #[test]
    fn test_pct_guards_zero_denominator() {
        assert_eq!(pct(1, 0), 0.0);
        assert_eq!(pct(1, 3), 33.33);
    }
}
