//! Apex class/trigger keyword search.
//!
//! Names are fetched first (lightweight), bodies only for candidates.
//! The Tooling API is the primary path; the CLI's tooling query is the
//! fallback when HTTP access is unavailable or fails.

use crate::error::SfResult;
use crate::models::Record;
use crate::search::matcher::MatchPolicy;
use crate::sf::query::escape_soql_literal;
use crate::sf::{SfCli, ToolingClient};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// How many Ids go into one body-fetch IN clause.
const BODY_BATCH_SIZE: usize = 10;

/// Which Apex artifacts to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ApexType {
    Class,
    Trigger,
    #[default]
    Both,
}

impl ApexType {
    fn objects(&self) -> Vec<&'static str> {
        match self {
            ApexType::Class => vec!["ApexClass"],
            ApexType::Trigger => vec!["ApexTrigger"],
            ApexType::Both => vec!["ApexClass", "ApexTrigger"],
        }
    }
}

/// One matching Apex artifact.
#[derive(Debug, Clone, Serialize)]
pub struct ApexMatch {
    pub name: String,
    pub id: String,
    pub apex_type: String,
    pub body: String,
}

fn str_field(record: &Record, key: &str) -> String {
    record
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Search one term across Apex names and bodies.
pub async fn search_apex_with_term(
    cli: &SfCli,
    tooling: Option<&ToolingClient>,
    term: &str,
    apex_type: ApexType,
    policy: &MatchPolicy,
) -> SfResult<Vec<ApexMatch>> {
    match tooling {
        Some(client) => match search_via_tooling(client, term, apex_type, policy).await {
            Ok(matches) => Ok(matches),
            Err(e) => {
                warn!("Tooling API Apex search failed: {}; trying CLI fallback", e);
                search_via_cli(cli, term, apex_type, policy).await
            }
        },
        None => search_via_cli(cli, term, apex_type, policy).await,
    }
}

async fn search_via_tooling(
    client: &ToolingClient,
    term: &str,
    apex_type: ApexType,
    policy: &MatchPolicy,
) -> SfResult<Vec<ApexMatch>> {
    let mut matches: Vec<ApexMatch> = Vec::new();

    for object in apex_type.objects() {
        let names = client
            .query_tooling(&format!("SELECT Id, Name FROM {}", object))
            .await?;
        info!("Found {} {} records", names.len(), object);

        // First pass: match by name, fetch only those bodies.
        let name_hits: Vec<&Record> = names
            .iter()
            .filter(|r| policy.matches(term, &str_field(r, "Name")))
            .collect();
        for record in &name_hits {
            let id = str_field(record, "Id");
            let body_records = client
                .query_tooling(&format!(
                    "SELECT Id, Name, Body FROM {} WHERE Id = '{}'",
                    object,
                    escape_soql_literal(&id)
                ))
                .await?;
            if let Some(full) = body_records.first() {
                matches.push(ApexMatch {
                    name: str_field(full, "Name"),
                    id: str_field(full, "Id"),
                    apex_type: object.to_string(),
                    body: str_field(full, "Body"),
                });
            }
        }

        // Second pass: body search over everything else, batched.
        for batch in names.chunks(BODY_BATCH_SIZE) {
            let ids: Vec<String> = batch
                .iter()
                .map(|r| format!("'{}'", escape_soql_literal(&str_field(r, "Id"))))
                .collect();
            let body_records = match client
                .query_tooling(&format!(
                    "SELECT Id, Name, Body FROM {} WHERE Id IN ({})",
                    object,
                    ids.join(",")
                ))
                .await
            {
                Ok(records) => records,
                Err(e) => {
                    warn!("Error getting batch bodies: {}", e);
                    continue;
                }
            };

            for record in &body_records {
                let id = str_field(record, "Id");
                if matches.iter().any(|m| m.id == id) {
                    continue;
                }
                if policy.matches(term, &str_field(record, "Body")) {
                    matches.push(ApexMatch {
                        name: str_field(record, "Name"),
                        id,
                        apex_type: object.to_string(),
                        body: str_field(record, "Body"),
                    });
                }
            }
        }
    }

    matches.sort_by(|a, b| (&a.apex_type, &a.name).cmp(&(&b.apex_type, &b.name)));
    Ok(matches)
}

async fn search_via_cli(
    cli: &SfCli,
    term: &str,
    apex_type: ApexType,
    policy: &MatchPolicy,
) -> SfResult<Vec<ApexMatch>> {
    let mut matches = Vec::new();
    for object in apex_type.objects() {
        let records = cli
            .query_tooling_cli(&format!("SELECT Id, Name, Body FROM {}", object))
            .await?;
        for record in &records {
            let name = str_field(record, "Name");
            let body = str_field(record, "Body");
            if policy.matches(term, &name) || policy.matches(term, &body) {
                matches.push(ApexMatch {
                    name,
                    id: str_field(record, "Id"),
                    apex_type: object.to_string(),
                    body,
                });
            }
        }
    }
    matches.sort_by(|a, b| (&a.apex_type, &a.name).cmp(&(&b.apex_type, &b.name)));
    Ok(matches)
}

/// Per-term presence summary across names and bodies.
pub async fn search_apex_multi_terms_summary(
    cli: &SfCli,
    tooling: Option<&ToolingClient>,
    terms: &[String],
    apex_type: ApexType,
    policy: &MatchPolicy,
) -> BTreeMap<String, bool> {
    let mut summary = BTreeMap::new();
    for term in terms {
        let present = match search_apex_with_term(cli, tooling, term, apex_type, policy).await {
            Ok(matches) => !matches.is_empty(),
            Err(e) => {
                warn!("Apex search for '{}' failed: {}", term, e);
                false
            }
        };
        summary.insert(term.clone(), present);
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apex_type_objects() {
        assert_eq!(ApexType::Class.objects(), vec!["ApexClass"]);
        assert_eq!(ApexType::Both.objects(), vec!["ApexClass", "ApexTrigger"]);
    }

    #[test]
    fn test_str_field_tolerates_missing_keys() {
        let record = Record::new();
        assert_eq!(str_field(&record, "Name"), "");
    }
}
