//! Query interface and record helpers.

use crate::error::SfResult;
use crate::models::{EntitySchema, Record};
use async_trait::async_trait;
use serde_json::Value;

/// One page of SOQL results.
#[derive(Debug, Clone, Default)]
pub struct QueryPage {
    /// Total size reported by the API (for `count()` queries this is
    /// the count itself).
    pub total_size: u64,
    pub done: bool,
    pub records: Vec<Record>,
}

/// Read access to one org. Implemented by [`crate::sf::SfCli`] and by
/// in-memory mocks in tests.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// `SELECT count() FROM <entity>`.
    async fn count_records(&self, entity: &str) -> SfResult<u64>;

    /// Run a SOQL query and return the first page of records.
    async fn query(&self, soql: &str) -> SfResult<QueryPage>;

    /// Fetch the entity schema (field descriptors).
    async fn describe(&self, entity: &str) -> SfResult<EntitySchema>;
}

/// Escape a string for use inside a single-quoted SOQL literal.
pub fn escape_soql_literal(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

/// The record Id, when present.
pub fn record_id(record: &Record) -> Option<&str> {
    record.get("Id").and_then(Value::as_str)
}

/// Non-empty test for a field value.
///
/// Scalars count when not null and, for strings, not blank. Nested
/// objects (compound values such as addresses) count when any
/// sub-component is non-null.
pub fn non_null_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Object(map)) => map.values().any(|v| !v.is_null()),
        Some(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_escape_soql_literal() {
        assert_eq!(escape_soql_literal("O'Brien"), "O\\'Brien");
        assert_eq!(escape_soql_literal("plain"), "plain");
    }

    #[test]
    fn test_non_null_scalars() {
        assert!(!non_null_value(None));
        assert!(!non_null_value(Some(&Value::Null)));
        assert!(!non_null_value(Some(&json!(""))));
        assert!(!non_null_value(Some(&json!("   "))));
        assert!(non_null_value(Some(&json!("x"))));
        assert!(non_null_value(Some(&json!(0))));
        assert!(non_null_value(Some(&json!(false))));
    }

    #[test]
    fn test_non_null_compound_any_subpart() {
        let all_null = json!({"street": null, "city": null});
        assert!(!non_null_value(Some(&all_null)));

        let one_set = json!({"street": null, "city": "Oslo"});
        assert!(non_null_value(Some(&one_set)));
    }
}
