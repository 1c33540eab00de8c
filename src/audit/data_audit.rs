//! Field-usage audit across multiple entity types.
//!
//! Runs the estimator over a configurable plan of entities and
//! fields, then persists JSON and flattened CSV reports.

use crate::error::SfResult;
use crate::models::UsageResult;
use crate::sf::query::DataSource;
use crate::usage::{analyze_fields, EstimatorOptions};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// One entity and the fields to measure on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntity {
    pub entity: String,
    pub fields: Vec<String>,
}

/// The full audit plan, in execution order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditPlan {
    pub entities: Vec<AuditEntity>,
}

impl Default for AuditPlan {
    fn default() -> Self {
        let entry = |entity: &str, fields: &[&str]| AuditEntity {
            entity: entity.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        };
        Self {
            entities: vec![
                entry(
                    "Lead",
                    &[
                        "FirstName",
                        "LastName",
                        "Title",
                        "Phone",
                        "MobilePhone",
                        "Email",
                        "Website",
                        "Company",
                        "State",
                        "Country",
                        "IsConverted",
                        "LeadSource",
                        "Status",
                        "Industry",
                        "Rating",
                        "AnnualRevenue",
                        "NumberOfEmployees",
                        "ConvertedOpportunityId",
                        "LastActivityDate",
                    ],
                ),
                entry(
                    "Contact",
                    &[
                        "FirstName",
                        "LastName",
                        "AccountId",
                        "Title",
                        "Email",
                        "Phone",
                        "MobilePhone",
                        "MailingState",
                        "MailingCountry",
                        "LeadSource",
                    ],
                ),
                entry(
                    "Account",
                    &[
                        "Type",
                        "ParentId",
                        "Phone",
                        "Website",
                        "NumberOfEmployees",
                        "AnnualRevenue",
                        "Sic",
                        "Industry",
                        "BillingCity",
                        "BillingCountry",
                    ],
                ),
                entry(
                    "Opportunity",
                    &[
                        "Type",
                        "Amount",
                        "NextStep",
                        "ForecastCategory",
                        "CampaignId",
                        "IsWon",
                        "IsClosed",
                    ],
                ),
            ],
        }
    }
}

impl AuditPlan {
    /// Restrict the plan to the named entities, preserving order.
    pub fn restrict_to(&self, entities: &[String]) -> Self {
        Self {
            entities: self
                .entities
                .iter()
                .filter(|e| entities.iter().any(|n| n.eq_ignore_ascii_case(&e.entity)))
                .cloned()
                .collect(),
        }
    }
}

/// Run the estimator for every entity in the plan. A failed entity is
/// skipped with a warning; the audit continues.
pub async fn run_audit(
    source: &dyn DataSource,
    plan: &AuditPlan,
    options: &EstimatorOptions,
) -> SfResult<BTreeMap<String, Vec<UsageResult>>> {
    let mut results = BTreeMap::new();

    for entry in &plan.entities {
        if entry.fields.is_empty() {
            warn!("No fields configured for {}, skipping", entry.entity);
            continue;
        }
        info!("Analyzing fields for {}", entry.entity);

        match analyze_fields(source, &entry.entity, &entry.fields, None, options).await {
            Ok(usage) => {
                results.insert(entry.entity.clone(), usage);
            }
            Err(e) => warn!("Audit of {} failed: {}; skipping", entry.entity, e),
        }
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_plan_covers_core_entities() {
        let plan = AuditPlan::default();
        let names: Vec<&str> = plan.entities.iter().map(|e| e.entity.as_str()).collect();
        assert_eq!(names, vec!["Lead", "Contact", "Account", "Opportunity"]);
        assert!(plan.entities[0].fields.contains(&"LeadSource".to_string()));
    }

    #[test]
    fn test_restrict_preserves_order_and_ignores_unknown() {
        let plan = AuditPlan::default();
        let restricted =
            plan.restrict_to(&["opportunity".to_string(), "Lead".to_string(), "Bogus".to_string()]);
        let names: Vec<&str> = restricted.entities.iter().map(|e| e.entity.as_str()).collect();
        assert_eq!(names, vec!["Lead", "Opportunity"]);
    }
}
