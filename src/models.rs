//! Data models for the org auditor.
//!
//! This module contains the core data structures used throughout the
//! application for representing field usage, schema metadata, and
//! audit reports.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// A single record returned by a SOQL query, minus the `attributes`
/// envelope key.
pub type Record = Map<String, Value>;

/// Usage statistics for one (entity type, attribute) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageResult {
    /// Entity type API name (e.g. "Account").
    pub entity: String,
    /// Attribute API name (e.g. "Website").
    pub attribute: String,
    /// Population size at the time of the run.
    pub total_records: u64,
    /// Exact or extrapolated count of records with a non-empty value.
    pub non_null_records: u64,
    /// Share of records with a non-empty value, in [0, 100].
    pub usage_pct: f64,
    /// True when `non_null_records` and `usage_pct` were extrapolated
    /// from a subset of the population.
    pub is_estimated: bool,
    /// Number of records in the sample, when sampling was used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_size: Option<u64>,
    /// Records actually examined by an exhaustive run that fell short
    /// of the full population.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records_analyzed: Option<u64>,
}

impl UsageResult {
    /// A 0% result for an empty population.
    pub fn empty(entity: &str, attribute: &str) -> Self {
        Self {
            entity: entity.to_string(),
            attribute: attribute.to_string(),
            total_records: 0,
            non_null_records: 0,
            usage_pct: 0.0,
            is_estimated: false,
            sample_size: None,
            records_analyzed: None,
        }
    }
}

/// A field descriptor from the entity schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// API name with canonical casing.
    pub name: String,
    /// Human-readable label.
    #[serde(default)]
    pub label: String,
    /// Declared type, lowercased (e.g. "string", "address", "base64").
    #[serde(rename = "type")]
    pub field_type: String,
    /// Optional description text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// How an attribute's null test must be evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    /// Ordinary scalar: present and not null/empty string.
    Scalar,
    /// Structured value (address, location): present if any
    /// sub-component is non-null.
    Compound,
}

/// Declared types that cannot be filtered with `!= null` in SOQL.
const NON_FILTERABLE_TYPES: &[&str] = &["address", "location", "richtext", "base64", "encrypted"];

/// Characters that are unsafe inside a SOQL field reference.
const UNSAFE_NAME_CHARS: &[char] = &[
    '$', '%', '^', '&', '*', '+', '=', '`', '~', '"', '\'', '(', ')', '[', ']', '{', '}', '<', '>',
    '?', '\\', '|',
];

impl FieldDescriptor {
    /// Classify the attribute for null testing.
    pub fn kind(&self) -> AttributeKind {
        match self.field_type.as_str() {
            "address" | "location" => AttributeKind::Compound,
            _ => AttributeKind::Scalar,
        }
    }

    /// True when the attribute can never appear in a `!= null` filter
    /// and must be evaluated by fetching rows and inspecting values.
    pub fn needs_value_inspection(&self) -> bool {
        NON_FILTERABLE_TYPES.contains(&self.field_type.as_str())
            || self.name.contains(UNSAFE_NAME_CHARS)
    }
}

impl fmt::Display for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.field_type)
    }
}

/// Schema for one entity type.
#[derive(Debug, Clone, Default)]
pub struct EntitySchema {
    pub entity: String,
    pub fields: Vec<FieldDescriptor>,
}

impl EntitySchema {
    /// Case-insensitive lookup returning the canonical descriptor.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }
}

/// Keyword sets driving the attribution searches. Passed explicitly to
/// the orchestrator instead of living in module-level globals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordConfig {
    /// Terms matched against field names/labels on standard objects.
    pub schema: Vec<String>,
    /// Terms matched against report and dashboard titles.
    pub reports: Vec<String>,
    /// Terms matched against Apex class/trigger names and bodies.
    pub code: Vec<String>,
    /// Terms matched against Flow labels.
    pub flows: Vec<String>,
    /// Package namespaces checked for attribution vendors.
    pub packages: Vec<String>,
    /// Standard objects scanned for attribution-related fields.
    pub standard_objects: Vec<String>,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        let base = [
            "attribution",
            "touch",
            "touchpoint",
            "influence",
            "influenced",
            "model",
            "credit",
            "campaign",
            "source",
            "conversion",
            "utm",
        ];
        Self {
            schema: base.iter().map(|k| title_case(k)).collect(),
            reports: vec!["Attribution".into(), "Touch".into(), "Influence".into()],
            code: vec![
                "CampaignInfluence".into(),
                "Attribution".into(),
                "Touchpoint".into(),
            ],
            flows: vec![
                "CampaignInfluence".into(),
                "Attribution".into(),
                "Touch".into(),
                "Influence".into(),
                "Credit".into(),
            ],
            packages: vec![
                "biz".into(),
                "scaleMatters".into(),
                "FullCircle".into(),
                "LeanData".into(),
                "pi".into(),
            ],
            standard_objects: vec![
                "Account".into(),
                "Opportunity".into(),
                "Lead".into(),
                "Contact".into(),
                "Campaign".into(),
            ],
        }
    }
}

impl KeywordConfig {
    /// Lowercased schema terms, used for custom-object name matching.
    pub fn lowercase_terms(&self) -> Vec<String> {
        self.schema.iter().map(|t| t.to_lowercase()).collect()
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Complete output of the attribution audit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributionAudit {
    pub company_name: String,
    pub campaign_influence_enabled: bool,
    pub influence_data_present: bool,
    /// Per-namespace presence of known attribution packages.
    pub installed_packages: BTreeMap<String, bool>,
    /// Object name -> attribution-related field descriptors.
    pub custom_schema_matches: BTreeMap<String, Vec<FieldDescriptor>>,
    /// Custom object API names matching attribution terms.
    pub attribution_custom_objects: Vec<String>,
    /// Summary keys like `Report_Attribution` -> presence.
    pub report_dashboard_usage: BTreeMap<String, bool>,
    /// Per-term presence in Apex classes and triggers.
    pub apex_references: BTreeMap<String, bool>,
    /// Per-term presence in Flow labels.
    pub flow_references: BTreeMap<String, bool>,
    pub campaign_member_statuses: MemberStatusAudit,
    pub campaign_type_values: CampaignTypeAudit,
    /// Object name -> usage results for discovered attribution fields.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub field_usage_data: BTreeMap<String, Vec<UsageResult>>,
}

/// Custom vs standard CampaignMemberStatus values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemberStatusAudit {
    pub has_custom_statuses: bool,
    pub custom_statuses: Vec<String>,
    pub all_statuses: Vec<String>,
    pub total_status_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Custom vs standard Campaign Type picklist values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignTypeAudit {
    pub has_custom_types: bool,
    pub custom_types: Vec<String>,
    pub all_types: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compound_classification() {
        let addr = FieldDescriptor {
            name: "BillingAddress".into(),
            label: "Billing Address".into(),
            field_type: "address".into(),
            description: None,
        };
        assert_eq!(addr.kind(), AttributeKind::Compound);
        assert!(addr.needs_value_inspection());

        let plain = FieldDescriptor {
            name: "Website".into(),
            label: "Website".into(),
            field_type: "url".into(),
            description: None,
        };
        assert_eq!(plain.kind(), AttributeKind::Scalar);
        assert!(!plain.needs_value_inspection());
    }

    #[test]
    fn test_unsafe_name_forces_inspection() {
        let odd = FieldDescriptor {
            name: "Weird$Field".into(),
            label: String::new(),
            field_type: "string".into(),
            description: None,
        };
        assert!(odd.needs_value_inspection());
    }

    #[test]
    fn test_schema_lookup_is_case_insensitive() {
        let schema = EntitySchema {
            entity: "Account".into(),
            fields: vec![FieldDescriptor {
                name: "Industry".into(),
                label: "Industry".into(),
                field_type: "picklist".into(),
                description: None,
            }],
        };
        assert_eq!(schema.field("industry").unwrap().name, "Industry");
        assert!(schema.field("Missing").is_none());
    }

    #[test]
    fn test_default_keywords_title_cased_for_schema() {
        let config = KeywordConfig::default();
        assert!(config.schema.contains(&"Attribution".to_string()));
        assert!(config.schema.contains(&"Utm".to_string()));
        assert!(config.packages.contains(&"LeanData".to_string()));
    }
}
