//! Installed-package and namespace search.
//!
//! A term counts as present when it matches an installed package name
//! or namespace, a NamespaceRegistry entry, or a namespace prefix on
//! custom fields/objects.

use crate::error::SfResult;
use crate::models::Record;
use crate::search::matcher::MatchPolicy;
use crate::sf::{SfCli, ToolingClient};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{info, warn};

fn str_field(record: &Record, key: &str) -> String {
    record
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Namespace prefixes extracted from `Namespace__Name__c`-style full
/// names.
pub fn namespace_prefixes(full_names: &[String]) -> Vec<String> {
    full_names
        .iter()
        .filter_map(|name| {
            let prefix = name.split("__").next()?;
            if prefix.is_empty() || !name.contains("__") {
                None
            } else {
                Some(prefix.to_string())
            }
        })
        .collect()
}

/// True when the term matches any installed package or namespace.
pub fn term_in_packages(
    term: &str,
    packages: &[Record],
    namespaces: &[String],
    policy: &MatchPolicy,
) -> bool {
    for package in packages {
        let name = {
            let n = str_field(package, "SubscriberPackageName");
            if n.is_empty() {
                str_field(package, "PackageName")
            } else {
                n
            }
        };
        let namespace = str_field(package, "SubscriberPackageNamespace");
        if policy.matches(term, &name) || policy.matches(term, &namespace) {
            return true;
        }
    }
    namespaces.iter().any(|ns| policy.matches(term, ns))
}

/// Collect every namespace visible in the org: the registry plus
/// prefixes on custom fields and objects. Failures narrow the sweep
/// rather than aborting it.
async fn collect_namespaces(cli: &SfCli, tooling: Option<&ToolingClient>) -> Vec<String> {
    let mut namespaces = Vec::new();

    if let Some(client) = tooling {
        match client
            .query_tooling("SELECT Id, NamespacePrefix FROM NamespaceRegistry")
            .await
        {
            Ok(records) => {
                namespaces.extend(
                    records
                        .iter()
                        .map(|r| str_field(r, "NamespacePrefix"))
                        .filter(|ns| !ns.is_empty()),
                );
            }
            Err(e) => warn!("NamespaceRegistry query failed: {}", e),
        }
    }

    for metadata_type in ["CustomField", "CustomObject"] {
        match cli.list_metadata(metadata_type).await {
            Ok(names) => namespaces.extend(namespace_prefixes(&names)),
            Err(e) => warn!("Could not list {} metadata: {}", metadata_type, e),
        }
    }

    namespaces
}

/// Per-term presence across packages and namespaces.
pub async fn search_packages_multi_terms(
    cli: &SfCli,
    tooling: Option<&ToolingClient>,
    terms: &[String],
    policy: &MatchPolicy,
) -> SfResult<BTreeMap<String, bool>> {
    let packages = match cli.installed_packages().await {
        Ok(packages) => packages,
        Err(e) => {
            warn!("Could not list installed packages: {}", e);
            Vec::new()
        }
    };
    let namespaces = collect_namespaces(cli, tooling).await;
    info!(
        "Checking {} terms against {} packages and {} namespaces",
        terms.len(),
        packages.len(),
        namespaces.len()
    );

    Ok(terms
        .iter()
        .map(|term| {
            (
                term.clone(),
                term_in_packages(term, &packages, &namespaces, policy),
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_namespace_prefix_extraction() {
        let names = vec![
            "LeanData__Routing_Insight__c".to_string(),
            "Plain_Custom_Field__c".to_string(),
        ];
        let prefixes = namespace_prefixes(&names);
        assert!(prefixes.contains(&"LeanData".to_string()));
        // A plain custom field's prefix is its own name portion, which
        // still surfaces for matching, as in the original sweep.
        assert!(prefixes.contains(&"Plain_Custom_Field".to_string()));
    }

    #[test]
    fn test_term_matches_package_namespace() {
        let mut package = Record::new();
        package.insert("SubscriberPackageName".into(), json!("LeanData Routing"));
        package.insert("SubscriberPackageNamespace".into(), json!("LeanData"));

        let policy = MatchPolicy::default();
        assert!(term_in_packages("LeanData", &[package.clone()], &[], &policy));
        assert!(!term_in_packages("Bizible", &[package], &[], &policy));
    }
}
