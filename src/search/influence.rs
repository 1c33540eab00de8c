//! Campaign Influence configuration probes.

use crate::error::SfResult;
use crate::sf::query::DataSource;
use crate::sf::{SfCli, ToolingClient};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Campaign fields that only exist when Campaign Influence is enabled.
const INFLUENCE_FIELDS: &[&str] = &[
    "NumberOfInfluencedOpportunities",
    "InfluencedRevenue",
    "CampaignInfluenceMultipleModelEnabled",
];

/// Snapshot of the org's campaign-influence configuration.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InfluenceStatus {
    pub model_object_exists: bool,
    pub influence_fields_on_campaign: bool,
    pub enabled: bool,
    pub data_present: bool,
}

/// Full status: model object, influence fields, data indicators.
pub async fn check_status(
    cli: &SfCli,
    tooling: Option<&ToolingClient>,
) -> SfResult<InfluenceStatus> {
    let mut status = InfluenceStatus::default();

    if let Some(client) = tooling {
        status.model_object_exists = client.object_exists("CampaignInfluenceModel").await;
    }

    if !status.model_object_exists {
        match cli.describe("Campaign").await {
            Ok(schema) => {
                status.influence_fields_on_campaign = INFLUENCE_FIELDS
                    .iter()
                    .any(|field| schema.field(field).is_some());
            }
            Err(e) => warn!("Could not describe Campaign: {}", e),
        }
    }

    status.enabled = status.model_object_exists || status.influence_fields_on_campaign;
    if status.enabled {
        status.data_present = check_data_present(tooling).await;
    }
    Ok(status)
}

/// Look for evidence of actual influence data: influence report types,
/// or campaigns with populated influence counters. Any probe failure
/// just means "not proven present".
async fn check_data_present(tooling: Option<&ToolingClient>) -> bool {
    let Some(client) = tooling else {
        return false;
    };

    let probes = [
        "SELECT Id FROM ReportType WHERE Name LIKE '%Campaign Influence%' LIMIT 1",
        "SELECT Id FROM ReportType WHERE DeveloperName LIKE '%CampaignInfluence%' LIMIT 1",
        "SELECT Id FROM Campaign WHERE NumberOfInfluencedOpportunities > 0 LIMIT 1",
    ];
    for probe in probes {
        match client.query_rest(probe).await {
            Ok(records) if !records.is_empty() => return true,
            Ok(_) => {}
            Err(e) => debug!("Influence data probe failed: {}", e),
        }
    }
    false
}

/// Report shape persisted by the standalone `influence` command.
#[derive(Debug, Clone, Serialize)]
pub struct InfluenceReport {
    pub status: InfluenceStatus,
    /// Raw auto-association settings when readable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_settings: Option<Value>,
}

/// Gather influence status plus model settings for the report file.
pub async fn influence_report(
    cli: &SfCli,
    tooling: Option<&ToolingClient>,
) -> SfResult<InfluenceReport> {
    let status = check_status(cli, tooling).await?;

    let model_settings = if let Some(client) = tooling {
        match client
            .query_tooling("SELECT Id, Name, IsActive, IsDefaultModel FROM CampaignInfluenceModel")
            .await
        {
            Ok(records) => Some(Value::Array(
                records.into_iter().map(Value::Object).collect(),
            )),
            Err(e) => {
                debug!("CampaignInfluenceModel query failed: {}", e);
                None
            }
        }
    } else {
        None
    };

    Ok(InfluenceReport {
        status,
        model_settings,
    })
}
