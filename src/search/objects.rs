//! Object-level keyword search.

use crate::error::SfResult;
use crate::search::matcher::MatchPolicy;
use crate::sf::SfCli;
use std::collections::BTreeMap;
use tracing::info;

/// Which sobjects to include in a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ObjectScope {
    #[default]
    Custom,
    Standard,
    All,
}

impl ObjectScope {
    fn includes(&self, name: &str) -> bool {
        let is_custom = name.ends_with("__c");
        match self {
            ObjectScope::Custom => is_custom,
            ObjectScope::Standard => !is_custom,
            ObjectScope::All => true,
        }
    }
}

/// Filter a name list by scope and matching terms.
///
/// `policy` enables fuzzy matching; `None` means plain substring.
pub fn filter_objects(
    names: &[String],
    terms: &[String],
    scope: ObjectScope,
    policy: Option<&MatchPolicy>,
) -> BTreeMap<String, Vec<String>> {
    let mut results = BTreeMap::new();
    for term in terms {
        let term_lower = term.to_lowercase();
        let matches: Vec<String> = names
            .iter()
            .filter(|name| scope.includes(name))
            .filter(|name| match policy {
                Some(p) => p.matches(term, name),
                None => name.to_lowercase().contains(&term_lower),
            })
            .cloned()
            .collect();
        results.insert(term.clone(), matches);
    }
    results
}

/// Search object API names for the given terms.
pub async fn search_objects_with_terms(
    cli: &SfCli,
    terms: &[String],
    scope: ObjectScope,
    policy: Option<&MatchPolicy>,
) -> SfResult<BTreeMap<String, Vec<String>>> {
    let names = cli.list_sobjects().await?;
    info!("Found {} sobjects in org", names.len());
    Ok(filter_objects(&names, terms, scope, policy))
}

/// Flatten detailed results to `Object_{term}` presence flags.
pub fn summarize(results: &BTreeMap<String, Vec<String>>) -> BTreeMap<String, bool> {
    results
        .iter()
        .map(|(term, matches)| (format!("Object_{}", term), !matches.is_empty()))
        .collect()
}

/// Custom object names matching any of the terms (substring only,
/// the shape used by the attribution audit).
pub async fn custom_objects_matching(cli: &SfCli, terms: &[String]) -> SfResult<Vec<String>> {
    let names = cli.list_sobjects().await?;
    let terms_lower: Vec<String> = terms.iter().map(|t| t.to_lowercase()).collect();
    Ok(names
        .into_iter()
        .filter(|name| name.ends_with("__c"))
        .filter(|name| {
            let lower = name.to_lowercase();
            terms_lower.iter().any(|t| lower.contains(t))
        })
        .collect())
}
