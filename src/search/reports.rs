//! Report and dashboard title search.

use crate::error::SfResult;
use crate::models::Record;
use crate::search::matcher::MatchPolicy;
use crate::sf::query::DataSource;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::info;

/// One matching report or dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMatch {
    pub name: String,
    pub id: String,
    pub description: String,
    pub folder_name: String,
}

/// Results for one term: reports and dashboards separately.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReportSearchResult {
    pub reports: Vec<ReportMatch>,
    pub dashboards: Vec<ReportMatch>,
}

fn str_field(record: &Record, key: &str) -> String {
    record
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Records whose title/description/folder matches `term`. The title
/// lives under `title_key` ("Name" for reports, "Title" for
/// dashboards).
pub fn filter_by_title(
    records: &[Record],
    title_key: &str,
    term: &str,
    policy: &MatchPolicy,
) -> Vec<ReportMatch> {
    records
        .iter()
        .filter(|r| {
            policy.matches(term, &str_field(r, title_key))
                || policy.matches(term, &str_field(r, "Description"))
                || policy.matches(term, &str_field(r, "FolderName"))
        })
        .map(|r| ReportMatch {
            name: str_field(r, title_key),
            id: str_field(r, "Id"),
            description: str_field(r, "Description"),
            folder_name: str_field(r, "FolderName"),
        })
        .collect()
}

/// Search reports and dashboards for several terms with one fetch of
/// each surface.
pub async fn search_reports_and_dashboards(
    source: &dyn DataSource,
    terms: &[String],
    policy: &MatchPolicy,
) -> SfResult<BTreeMap<String, ReportSearchResult>> {
    let reports = source
        .query("SELECT Id, Name, Description, FolderName FROM Report")
        .await?
        .records;
    info!("Found {} total reports", reports.len());

    let dashboards = source
        .query("SELECT Id, Title, Description, FolderName FROM Dashboard")
        .await?
        .records;
    info!("Found {} total dashboards", dashboards.len());

    let mut results = BTreeMap::new();
    for term in terms {
        results.insert(
            term.clone(),
            ReportSearchResult {
                reports: filter_by_title(&reports, "Name", term, policy),
                dashboards: filter_by_title(&dashboards, "Title", term, policy),
            },
        );
    }
    Ok(results)
}

/// Flatten to `Report_{term}` / `Dashboard_{term}` presence flags.
pub fn summarize(results: &BTreeMap<String, ReportSearchResult>) -> BTreeMap<String, bool> {
    let mut summary = BTreeMap::new();
    for (term, result) in results {
        summary.insert(format!("Report_{}", term), !result.reports.is_empty());
        summary.insert(format!("Dashboard_{}", term), !result.dashboards.is_empty());
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report(name: &str, folder: &str) -> Record {
        let mut record = Record::new();
        record.insert("Id".into(), json!("00O000000000001"));
        record.insert("Name".into(), json!(name));
        record.insert("Description".into(), Value::Null);
        record.insert("FolderName".into(), json!(folder));
        record
    }

    #[test]
    fn test_folder_name_counts_as_a_hit() {
        let records = vec![
            report("Pipeline by Stage", "Attribution Reports"),
            report("Pipeline by Owner", "Sales"),
        ];
        let policy = MatchPolicy::default();

        let hits = filter_by_title(&records, "Name", "Attribution", &policy);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].folder_name, "Attribution Reports");
    }

    #[test]
    fn test_summary_splits_reports_and_dashboards() {
        let mut results = BTreeMap::new();
        results.insert(
            "Touch".to_string(),
            ReportSearchResult {
                reports: vec![],
                dashboards: vec![ReportMatch {
                    name: "Touch Overview".into(),
                    id: "01Z".into(),
                    description: String::new(),
                    folder_name: String::new(),
                }],
            },
        );
        let summary = summarize(&results);
        assert_eq!(summary.get("Report_Touch"), Some(&false));
        assert_eq!(summary.get("Dashboard_Touch"), Some(&true));
    }
}
