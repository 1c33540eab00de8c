//! Marketing-attribution audit orchestrator.
//!
//! Runs every check in a fixed sequence. A failing check logs a
//! warning and leaves its section at the default value; it never
//! aborts the rest of the audit.

use crate::error::SfResult;
use crate::models::{
    AttributionAudit, CampaignTypeAudit, FieldDescriptor, KeywordConfig, MemberStatusAudit,
};
use crate::search::matcher::MatchPolicy;
use crate::search::{apex, fields, flows, influence, objects, packages, reports};
use crate::search::apex::ApexType;
use crate::sf::query::DataSource;
use crate::sf::{SfCli, ToolingClient};
use crate::usage::{analyze_fields, EstimatorOptions};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Standard Campaign Type picklist values shipped by Salesforce.
pub const STANDARD_CAMPAIGN_TYPES: &[&str] = &[
    "Conference",
    "Webinar",
    "Trade Show",
    "Public Relations",
    "Partners",
    "Referral Program",
    "Advertisement",
    "Banner Ads",
    "Direct Mail",
    "Email",
    "Telemarketing",
    "Other",
];

/// Standard CampaignMemberStatus labels (lowercased for comparison).
pub const STANDARD_MEMBER_STATUSES: &[&str] = &["sent", "responded"];

/// Fields with usage below this share get a review recommendation.
pub const LOW_USAGE_THRESHOLD: f64 = 10.0;

/// Everything the audit needs to run.
pub struct AttributionContext<'a> {
    pub cli: &'a SfCli,
    pub tooling: Option<&'a ToolingClient>,
    pub policy: MatchPolicy,
    pub keywords: KeywordConfig,
    pub estimator: EstimatorOptions,
}

/// Run the full attribution audit.
pub async fn run_attribution_audit(ctx: &AttributionContext<'_>) -> SfResult<AttributionAudit> {
    let mut audit = AttributionAudit {
        company_name: ctx.cli.company_name().await,
        ..Default::default()
    };

    info!("Searching for attribution-related custom objects");
    match objects::custom_objects_matching(ctx.cli, &ctx.keywords.lowercase_terms()).await {
        Ok(found) => audit.attribution_custom_objects = found,
        Err(e) => warn!("Error searching for custom objects: {}", e),
    }

    info!("Checking Campaign Influence configuration");
    match influence::check_status(ctx.cli, ctx.tooling).await {
        Ok(status) => {
            audit.campaign_influence_enabled = status.enabled;
            audit.influence_data_present = status.data_present;
        }
        Err(e) => warn!("Error checking Campaign Influence: {}", e),
    }

    info!("Checking for attribution-related packages");
    match packages::search_packages_multi_terms(
        ctx.cli,
        ctx.tooling,
        &ctx.keywords.packages,
        &ctx.policy,
    )
    .await
    {
        Ok(found) => audit.installed_packages = found,
        Err(e) => warn!("Error checking installed packages: {}", e),
    }

    info!("Checking for attribution-related fields in standard objects");
    audit.custom_schema_matches =
        schema_matches(ctx.cli, &ctx.keywords, &ctx.policy).await;

    info!("Checking for attribution-related reports and dashboards");
    match reports::search_reports_and_dashboards(ctx.cli, &ctx.keywords.reports, &ctx.policy).await
    {
        Ok(found) => audit.report_dashboard_usage = reports::summarize(&found),
        Err(e) => warn!("Error checking reports and dashboards: {}", e),
    }

    info!("Checking for attribution-related Apex code");
    audit.apex_references = apex::search_apex_multi_terms_summary(
        ctx.cli,
        ctx.tooling,
        &ctx.keywords.code,
        ApexType::Both,
        &ctx.policy,
    )
    .await;

    info!("Checking for attribution-related Flows");
    match flows::search_flows_multi_terms(ctx.cli, ctx.tooling, &ctx.keywords.flows, &ctx.policy, None)
        .await
    {
        Ok(found) => audit.flow_references = flows::summarize(&found),
        Err(e) => warn!("Error checking Flow references: {}", e),
    }

    info!("Checking campaign member statuses");
    match member_statuses(ctx.cli).await {
        Ok(statuses) => audit.campaign_member_statuses = statuses,
        Err(e) => {
            warn!("Error checking campaign member statuses: {}", e);
            audit.campaign_member_statuses.error = Some(e.to_string());
        }
    }

    info!("Checking campaign type values");
    match campaign_types(ctx.tooling).await {
        Ok(types) => audit.campaign_type_values = types,
        Err(e) => {
            warn!("Error checking campaign type values: {}", e);
            audit.campaign_type_values.error = Some(e.to_string());
        }
    }

    if !audit.custom_schema_matches.is_empty() {
        info!("Analyzing field usage for attribution-related fields");
        audit.field_usage_data = field_usage(ctx, &audit.custom_schema_matches).await;
    }

    Ok(audit)
}

/// Attribution-related fields on each configured standard object.
async fn schema_matches(
    cli: &SfCli,
    keywords: &KeywordConfig,
    policy: &MatchPolicy,
) -> BTreeMap<String, Vec<FieldDescriptor>> {
    let mut matches = BTreeMap::new();
    for object in &keywords.standard_objects {
        let schema = match cli.describe(object).await {
            Ok(schema) => schema,
            Err(e) => {
                warn!("Could not describe {}: {}", object, e);
                continue;
            }
        };
        let mut hits: Vec<FieldDescriptor> = Vec::new();
        for term in &keywords.schema {
            for field in fields::filter_fields(&schema.fields, term, policy) {
                if !hits.iter().any(|f| f.name == field.name) {
                    hits.push(field.clone());
                }
            }
        }
        if !hits.is_empty() {
            matches.insert(object.clone(), hits);
        }
    }
    matches
}

/// Usage of every discovered attribution field, per object.
async fn field_usage(
    ctx: &AttributionContext<'_>,
    schema_matches: &BTreeMap<String, Vec<FieldDescriptor>>,
) -> BTreeMap<String, Vec<crate::models::UsageResult>> {
    let mut usage = BTreeMap::new();
    for (object, fields) in schema_matches {
        let names: Vec<String> = fields.iter().map(|f| f.name.clone()).collect();
        match analyze_fields(ctx.cli, object, &names, None, &ctx.estimator).await {
            Ok(results) if !results.is_empty() => {
                usage.insert(object.clone(), results);
            }
            Ok(_) => {}
            Err(e) => warn!("Error analyzing field usage for {}: {}", object, e),
        }
    }
    usage
}

/// Compare CampaignMemberStatus labels against the standard set.
async fn member_statuses(source: &dyn DataSource) -> SfResult<MemberStatusAudit> {
    let page = source
        .query("SELECT Id, Label, CampaignId FROM CampaignMemberStatus")
        .await?;

    let labels: Vec<String> = page
        .records
        .iter()
        .filter_map(|r| r.get("Label").and_then(Value::as_str))
        .map(String::from)
        .collect();

    Ok(classify_member_statuses(&labels))
}

/// A label is custom when no standard status appears inside it.
pub fn classify_member_statuses(labels: &[String]) -> MemberStatusAudit {
    let mut all: Vec<String> = Vec::new();
    let mut custom: Vec<String> = Vec::new();

    for label in labels {
        if label.is_empty() || all.contains(label) {
            continue;
        }
        all.push(label.clone());
        let lower = label.to_lowercase();
        if STANDARD_MEMBER_STATUSES.iter().all(|std| !lower.contains(std)) {
            custom.push(label.clone());
        }
    }
    all.sort();
    custom.sort();

    MemberStatusAudit {
        has_custom_statuses: !custom.is_empty(),
        total_status_count: all.len(),
        all_statuses: all,
        custom_statuses: custom,
        error: None,
    }
}

/// Compare Campaign Type picklist values against the standard set.
async fn campaign_types(tooling: Option<&ToolingClient>) -> SfResult<CampaignTypeAudit> {
    let Some(client) = tooling else {
        return Ok(CampaignTypeAudit {
            error: Some("no API access for Campaign describe".to_string()),
            ..Default::default()
        });
    };

    let describe = client.describe_object("Campaign").await?;
    let values: Vec<String> = describe
        .get("fields")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|f| f.get("name").and_then(Value::as_str) == Some("Type"))
        .filter_map(|f| f.get("picklistValues").and_then(Value::as_array))
        .flatten()
        .filter_map(|v| v.get("value").and_then(Value::as_str))
        .map(String::from)
        .collect();

    Ok(classify_campaign_types(&values))
}

pub fn classify_campaign_types(values: &[String]) -> CampaignTypeAudit {
    let mut all: Vec<String> = values.to_vec();
    all.sort();
    all.dedup();

    let custom: Vec<String> = all
        .iter()
        .filter(|v| !STANDARD_CAMPAIGN_TYPES.contains(&v.as_str()))
        .cloned()
        .collect();

    CampaignTypeAudit {
        has_custom_types: !custom.is_empty(),
        custom_types: custom,
        all_types: all,
        error: None,
    }
}

/// Console summary with low-usage recommendations.
pub fn print_summary(audit: &AttributionAudit) {
    if !audit.field_usage_data.is_empty() {
        println!("\n===== FIELD USAGE SUMMARY =====");
        for (object, usage) in &audit.field_usage_data {
            crate::report::print_usage_table(object, usage);
            if !usage.is_empty() {
                let avg: f64 =
                    usage.iter().map(|u| u.usage_pct).sum::<f64>() / usage.len() as f64;
                println!("Average usage: {:.2}%", avg);
            }
        }

        println!("\n===== RECOMMENDATIONS =====");
        for (object, usage) in &audit.field_usage_data {
            let low: Vec<&str> = usage
                .iter()
                .filter(|u| u.usage_pct < LOW_USAGE_THRESHOLD)
                .map(|u| u.attribute.as_str())
                .collect();
            if !low.is_empty() {
                println!(
                    "\n{}: Consider reviewing the following low-usage attribution fields:",
                    object
                );
                for field in low {
                    println!("  - {}", field);
                }
            }
        }
    }

    if audit.campaign_member_statuses.has_custom_statuses {
        println!("\nCustom Campaign Member Statuses:");
        for status in &audit.campaign_member_statuses.custom_statuses {
            println!("  - {}", status);
        }
    }
    if audit.campaign_type_values.has_custom_types {
        println!("\nCustom Campaign Type Values:");
        for campaign_type in &audit.campaign_type_values.custom_types {
            println!("  - {}", campaign_type);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_status_classification() {
        let labels = vec![
            "Sent".to_string(),
            "Responded".to_string(),
            "Attended Webinar".to_string(),
            "Email Sent".to_string(),
        ];
        let audit = classify_member_statuses(&labels);
        assert!(audit.has_custom_statuses);
        // "Email Sent" contains "sent", so only "Attended Webinar" is custom.
        assert_eq!(audit.custom_statuses, vec!["Attended Webinar".to_string()]);
        assert_eq!(audit.total_status_count, 4);
    }

    #[test]
    fn test_campaign_type_classification() {
        let values = vec![
            "Webinar".to_string(),
            "Email".to_string(),
            "Paid Social".to_string(),
        ];
        let audit = classify_campaign_types(&values);
        assert!(audit.has_custom_types);
        assert_eq!(audit.custom_types, vec!["Paid Social".to_string()]);
        assert_eq!(audit.all_types.len(), 3);
    }

    #[test]
    fn test_all_standard_types_flag_nothing() {
        let values: Vec<String> = STANDARD_CAMPAIGN_TYPES.iter().map(|s| s.to_string()).collect();
        let audit = classify_campaign_types(&values);
        assert!(!audit.has_custom_types);
        assert!(audit.custom_types.is_empty());
    }
}
