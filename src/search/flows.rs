//! Flow label keyword search.

use crate::error::SfResult;
use crate::models::Record;
use crate::search::matcher::MatchPolicy;
use crate::sf::{SfCli, ToolingClient};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// One matching Flow version.
#[derive(Debug, Clone, Serialize)]
pub struct FlowMatch {
    pub master_label: String,
    pub definition_id: String,
    pub status: String,
    pub id: String,
}

fn str_field(record: &Record, key: &str) -> String {
    record
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Flows whose MasterLabel matches `term`, optionally restricted by
/// status (e.g. "Active").
pub fn filter_flows(
    records: &[Record],
    term: &str,
    policy: &MatchPolicy,
    status_filter: Option<&str>,
) -> Vec<FlowMatch> {
    let mut matches: Vec<FlowMatch> = records
        .iter()
        .filter(|r| policy.matches(term, &str_field(r, "MasterLabel")))
        .filter(|r| {
            status_filter
                .map(|s| str_field(r, "Status") == s)
                .unwrap_or(true)
        })
        .map(|r| FlowMatch {
            master_label: str_field(r, "MasterLabel"),
            definition_id: {
                let id = str_field(r, "DefinitionId");
                if id.is_empty() {
                    "N/A".to_string()
                } else {
                    id
                }
            },
            status: str_field(r, "Status"),
            id: str_field(r, "Id"),
        })
        .collect();
    matches.sort_by(|a, b| a.master_label.cmp(&b.master_label));
    matches
}

async fn fetch_flows(
    cli: &SfCli,
    tooling: Option<&ToolingClient>,
    status_filter: Option<&str>,
) -> SfResult<Vec<Record>> {
    if let Some(client) = tooling {
        let soql = match status_filter {
            Some(status) => format!(
                "SELECT Id, MasterLabel, DefinitionId, Status FROM Flow WHERE Status = '{}'",
                status
            ),
            None => "SELECT Id, MasterLabel, DefinitionId, Status FROM Flow".to_string(),
        };
        match client.query_tooling(&soql).await {
            Ok(records) => return Ok(records),
            Err(e) => warn!("Tooling API flow query failed: {}; trying CLI fallback", e),
        }
    }
    // DefinitionId is unavailable through this path.
    cli.query_tooling_cli("SELECT Id, MasterLabel, Status FROM Flow")
        .await
}

/// Search several terms over the org's Flow labels with one fetch.
pub async fn search_flows_multi_terms(
    cli: &SfCli,
    tooling: Option<&ToolingClient>,
    terms: &[String],
    policy: &MatchPolicy,
    status_filter: Option<&str>,
) -> SfResult<BTreeMap<String, Vec<FlowMatch>>> {
    let records = fetch_flows(cli, tooling, status_filter).await?;
    info!("Found {} total flows", records.len());

    let mut results = BTreeMap::new();
    for term in terms {
        results.insert(
            term.clone(),
            filter_flows(&records, term, policy, status_filter),
        );
    }
    Ok(results)
}

/// Per-term presence summary.
pub fn summarize(results: &BTreeMap<String, Vec<FlowMatch>>) -> BTreeMap<String, bool> {
    results
        .iter()
        .map(|(term, matches)| (term.clone(), !matches.is_empty()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn flow(label: &str, status: &str) -> Record {
        let mut record = Record::new();
        record.insert("Id".into(), json!("301000000000001"));
        record.insert("MasterLabel".into(), json!(label));
        record.insert("Status".into(), json!(status));
        record
    }

    #[test]
    fn test_filter_flows_by_label() {
        let records = vec![
            flow("Campaign Attribution Rollup", "Active"),
            flow("Welcome Email", "Active"),
        ];
        let policy = MatchPolicy::default();

        let hits = filter_flows(&records, "Attribution", &policy, None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].master_label, "Campaign Attribution Rollup");
        assert_eq!(hits[0].definition_id, "N/A");
    }

    #[test]
    fn test_status_filter_applies() {
        let records = vec![
            flow("Touchpoint Capture", "Draft"),
            flow("Touchpoint Sync", "Active"),
        ];
        let policy = MatchPolicy::default();

        let active = filter_flows(&records, "Touchpoint", &policy, Some("Active"));
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].status, "Active");
    }
}
