//! Field-level keyword search.
//!
//! Scans field names, labels, and descriptions across a set of
//! objects. A failed describe skips that object rather than aborting
//! the sweep.

use crate::error::SfResult;
use crate::models::FieldDescriptor;
use crate::search::matcher::MatchPolicy;
use crate::sf::query::DataSource;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Matching fields per object, per search term.
pub type FieldSearchResults = BTreeMap<String, BTreeMap<String, Vec<FieldDescriptor>>>;

/// Fields on `object` matching `term` by name, label, or description.
pub fn filter_fields<'a>(
    fields: &'a [FieldDescriptor],
    term: &str,
    policy: &MatchPolicy,
) -> Vec<&'a FieldDescriptor> {
    fields
        .iter()
        .filter(|f| {
            policy.matches(term, &f.name)
                || policy.matches(term, &f.label)
                || policy.matches_opt(term, f.description.as_deref())
        })
        .collect()
}

/// Search several terms across several objects.
pub async fn search_fields_multi_terms(
    source: &dyn DataSource,
    objects: &[String],
    terms: &[String],
    policy: &MatchPolicy,
) -> SfResult<FieldSearchResults> {
    let mut schemas = Vec::new();
    for object in objects {
        match source.describe(object).await {
            Ok(schema) => schemas.push(schema),
            Err(e) => warn!("Failed to get fields for object {}: {}", object, e),
        }
    }

    let mut results: FieldSearchResults = BTreeMap::new();
    for term in terms {
        let mut per_object = BTreeMap::new();
        for schema in &schemas {
            let matches: Vec<FieldDescriptor> = filter_fields(&schema.fields, term, policy)
                .into_iter()
                .cloned()
                .collect();
            if !matches.is_empty() {
                info!(
                    "Found {} matching fields in {} for '{}'",
                    matches.len(),
                    schema.entity,
                    term
                );
                per_object.insert(schema.entity.clone(), matches);
            }
        }
        results.insert(term.clone(), per_object);
    }
    Ok(results)
}

/// Flatten detailed results to `Field_{term}_{object}` presence flags.
pub fn summarize(results: &FieldSearchResults, objects: &[String]) -> BTreeMap<String, bool> {
    let mut summary = BTreeMap::new();
    for (term, per_object) in results {
        for object in objects {
            let key = format!("Field_{}_{}", term, object);
            let present = per_object.get(object).map(|v| !v.is_empty()).unwrap_or(false);
            summary.insert(key, present);
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str, label: &str) -> FieldDescriptor {
        FieldDescriptor {
            name: name.to_string(),
            label: label.to_string(),
            field_type: "string".to_string(),
            description: None,
        }
    }

    #[test]
    fn test_filter_matches_name_and_label() {
        let fields = vec![
            descriptor("First_Touch_Source__c", "First Touch Source"),
            descriptor("Website", "Website"),
        ];
        let policy = MatchPolicy::default();

        let hits = filter_fields(&fields, "touch", &policy);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "First_Touch_Source__c");

        assert!(filter_fields(&fields, "nonsense", &policy).is_empty());
    }

    #[test]
    fn test_summary_keys_cover_every_object() {
        let mut per_object = BTreeMap::new();
        per_object.insert(
            "Lead".to_string(),
            vec![descriptor("UTM_Source__c", "UTM Source")],
        );
        let mut results = FieldSearchResults::new();
        results.insert("utm".to_string(), per_object);

        let objects = vec!["Lead".to_string(), "Account".to_string()];
        let summary = summarize(&results, &objects);

        assert_eq!(summary.get("Field_utm_Lead"), Some(&true));
        assert_eq!(summary.get("Field_utm_Account"), Some(&false));
    }
}
