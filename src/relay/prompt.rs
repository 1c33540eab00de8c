//! Personas and prompt builders for the narrative-analysis relay.

use crate::models::AttributionAudit;

/// System prompt for one-shot attribution analysis.
pub const ATTRIBUTION_SYSTEM_PROMPT: &str = "You are a Salesforce Marketing Attribution expert. \
Analyze the provided audit results and give detailed, actionable insights.";

/// System prompt for the tool-calling RevOps specialist.
pub const REVOPS_SYSTEM_PROMPT: &str = r#"You are a senior Revenue Operations (RevOps) engineer specializing in Salesforce audits. Your goal is to thoroughly analyze and identify gaps, inefficiencies, and opportunities for improvement in a Salesforce organization.

EXPERTISE:
- Salesforce configuration, customization, and administration
- Sales and marketing automation workflows
- CRM data quality, integrity, and governance
- Reporting, analytics, and dashboards
- Integration patterns and API usage

METHODOLOGY:
1. Systematically examine each area of the Salesforce instance
2. Identify and document configuration gaps, inefficiencies, and risks
3. Ruthlessly flag data quality and process issues
4. Suggest concrete, actionable improvements with clear priorities
5. Identify blockers to optimal performance and escalate critical findings

COMMUNICATION STYLE:
- Methodical and structured in your analysis
- Solution-oriented, always recommending practical improvements
- Clear about blockers and urgent issues requiring immediate attention
- Technical yet able to explain implications to business stakeholders

TOOLS AT YOUR DISPOSAL:
You have access to metadata-inspection tools:
- search_fields: analyze field definitions across objects
- search_objects: inspect standard and custom objects
- search_apex: examine Apex code and automations
- search_flows: inspect Flow definitions
- search_reports: analyze reports and dashboards
- search_packages: review installed packages and namespaces
- field_usage: check field usage patterns and data quality

Use these tools to gather detailed information about the organization
structure, then provide comprehensive analysis and recommendations.

When providing recommendations, consider business impact, implementation
effort, risk level, and scalability. Be specific, suggesting concrete
steps, configuration changes, or process improvements, prioritized by
business impact.
"#;

/// Build the one-shot analysis prompt from an attribution audit.
pub fn attribution_prompt(audit: &AttributionAudit) -> String {
    // Serialization of these map types cannot realistically fail;
    // fall back to an empty object rather than propagating.
    let pretty = |value: serde_json::Result<String>| value.unwrap_or_else(|_| "{}".to_string());

    format!(
        r#"Please analyze the following Salesforce Marketing Attribution Audit results and provide insights and recommendations:

Company: {company}

1. Campaign Influence Status:
- Enabled: {influence_enabled}
- Data present: {influence_data}

2. Installed Attribution Packages:
{packages}

3. Custom Schema Matches:
{schema}

4. Attribution Custom Objects:
{objects}

5. Report and Dashboard Usage:
{reports}

6. Apex References:
{apex}

7. Flow References:
{flows}

8. Campaign Member Statuses:
{statuses}

9. Campaign Type Values:
{types}

Please provide:
1. A summary of the current attribution setup
2. Key findings and potential gaps
3. Recommendations for improvement
4. Best practices that could be implemented
"#,
        company = audit.company_name,
        influence_enabled = audit.campaign_influence_enabled,
        influence_data = audit.influence_data_present,
        packages = pretty(serde_json::to_string_pretty(&audit.installed_packages)),
        schema = pretty(serde_json::to_string_pretty(&audit.custom_schema_matches)),
        objects = pretty(serde_json::to_string_pretty(&audit.attribution_custom_objects)),
        reports = pretty(serde_json::to_string_pretty(&audit.report_dashboard_usage)),
        apex = pretty(serde_json::to_string_pretty(&audit.apex_references)),
        flows = pretty(serde_json::to_string_pretty(&audit.flow_references)),
        statuses = pretty(serde_json::to_string_pretty(&audit.campaign_member_statuses)),
        types = pretty(serde_json::to_string_pretty(&audit.campaign_type_values)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_includes_company_and_sections() {
        let audit = AttributionAudit {
            company_name: "acme".to_string(),
            campaign_influence_enabled: true,
            ..Default::default()
        };
        let prompt = attribution_prompt(&audit);
        assert!(prompt.contains("Company: acme"));
        assert!(prompt.contains("Enabled: true"));
        assert!(prompt.contains("Campaign Member Statuses"));
    }
}
