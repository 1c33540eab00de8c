//! Tool definitions and executor for the narrative-analysis relay.
//!
//! The model is handed a fixed set of keyword-search tools. Each
//! capability is an explicit member of [`Toolbox`]; an absent one is
//! reported as unavailable instead of being discovered at runtime.

use crate::search::apex::ApexType;
use crate::search::matcher::MatchPolicy;
use crate::search::objects::ObjectScope;
use crate::search::{apex, fields, flows, objects, packages, reports};
use crate::sf::{SfCli, ToolingClient};
use crate::usage::{analyze_fields, EstimatorOptions};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Size budget applied to every tool result before it reaches the
/// model. Oversized payloads are truncated with an explicit marker,
/// never rejected.
#[derive(Debug, Clone, Copy)]
pub struct TruncationPolicy {
    /// Maximum serialized size in bytes.
    pub max_bytes: usize,
    /// Maximum list items kept.
    pub max_items: usize,
}

impl Default for TruncationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: 40_000,
            max_items: 30,
        }
    }
}

impl TruncationPolicy {
    /// Serialize a tool result within the budget.
    pub fn apply(&self, value: &Value) -> String {
        if let Value::Array(items) = value {
            if items.len() > self.max_items {
                let truncated = json!({
                    "truncated_response": true,
                    "original_length": items.len(),
                    "truncated_items": items[..self.max_items],
                    "message": format!(
                        "Response was truncated from {} items to {} items due to size limits.",
                        items.len(),
                        self.max_items
                    ),
                });
                return self.clamp(serde_json::to_string_pretty(&truncated).unwrap_or_default());
            }
        }

        if let Value::Object(map) = value {
            let serialized = serde_json::to_string_pretty(value).unwrap_or_default();
            if serialized.len() > self.max_bytes {
                let keys: Vec<&String> = map.keys().collect();
                let truncated = json!({
                    "truncated_response": true,
                    "original_size_bytes": serialized.len(),
                    "keys_available": keys,
                    "message": "Response was truncated due to size limits. Here are the available keys.",
                });
                return self.clamp(serde_json::to_string_pretty(&truncated).unwrap_or_default());
            }
            return serialized;
        }

        self.clamp(serde_json::to_string_pretty(value).unwrap_or_default())
    }

    fn clamp(&self, serialized: String) -> String {
        if serialized.len() > self.max_bytes {
            let keep = self.max_bytes.saturating_sub(100);
            let mut cut = keep;
            while cut > 0 && !serialized.is_char_boundary(cut) {
                cut -= 1;
            }
            format!("{}\n\n... [truncated due to size]", &serialized[..cut])
        } else {
            serialized
        }
    }
}

/// Tool definition in the chat API's function-calling shape.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

fn tool(name: &str, description: &str, parameters: Value) -> ToolDefinition {
    ToolDefinition {
        tool_type: "function".to_string(),
        function: FunctionDefinition {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        },
    }
}

/// The capabilities exposed to the model.
pub struct Toolbox<'a> {
    pub cli: &'a SfCli,
    pub tooling: Option<&'a ToolingClient>,
    pub policy: MatchPolicy,
    pub truncation: TruncationPolicy,
    /// Field-usage analysis is optional; when `None` the tool is not
    /// offered.
    pub usage_options: Option<EstimatorOptions>,
}

impl<'a> Toolbox<'a> {
    /// Tool definitions for the capabilities actually present.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let terms_param = || {
            json!({
                "type": "array",
                "items": {"type": "string"},
                "description": "Search terms"
            })
        };

        let mut definitions = vec![
            tool(
                "search_fields",
                "Search field names, labels, and descriptions on the given objects for keywords.",
                json!({
                    "type": "object",
                    "properties": {
                        "terms": terms_param(),
                        "objects": {
                            "type": "array",
                            "items": {"type": "string"},
                            "description": "Object API names to search"
                        }
                    },
                    "required": ["terms", "objects"]
                }),
            ),
            tool(
                "search_objects",
                "Search object API names for keywords. Scope is custom, standard, or all.",
                json!({
                    "type": "object",
                    "properties": {
                        "terms": terms_param(),
                        "scope": {"type": "string", "enum": ["custom", "standard", "all"]}
                    },
                    "required": ["terms"]
                }),
            ),
            tool(
                "search_reports",
                "Search report and dashboard titles, descriptions, and folders for keywords.",
                json!({
                    "type": "object",
                    "properties": {"terms": terms_param()},
                    "required": ["terms"]
                }),
            ),
            tool(
                "search_packages",
                "Check installed packages and namespaces for keywords.",
                json!({
                    "type": "object",
                    "properties": {"terms": terms_param()},
                    "required": ["terms"]
                }),
            ),
            tool(
                "search_flows",
                "Search Flow labels for keywords, optionally filtered by status.",
                json!({
                    "type": "object",
                    "properties": {
                        "terms": terms_param(),
                        "status": {"type": "string", "description": "e.g. Active"}
                    },
                    "required": ["terms"]
                }),
            ),
            tool(
                "search_apex",
                "Search Apex class and trigger names and bodies for keywords.",
                json!({
                    "type": "object",
                    "properties": {"terms": terms_param()},
                    "required": ["terms"]
                }),
            ),
        ];

        if self.usage_options.is_some() {
            definitions.push(tool(
                "field_usage",
                "Measure the share of records with a non-empty value for each field on an object.",
                json!({
                    "type": "object",
                    "properties": {
                        "object": {"type": "string", "description": "Object API name"},
                        "fields": {
                            "type": "array",
                            "items": {"type": "string"},
                            "description": "Field API names to measure"
                        }
                    },
                    "required": ["object", "fields"]
                }),
            ));
        }

        definitions
    }

    /// Execute one tool call. Failures come back as error text for
    /// the model rather than aborting the conversation.
    pub async fn execute(&self, name: &str, args: &Value) -> String {
        debug!("Executing tool {} with args {}", name, args);
        let result = self.dispatch(name, args).await;
        match result {
            Ok(value) => self.truncation.apply(&value),
            Err(message) => {
                warn!("Tool {} failed: {}", name, message);
                format!("Error: {}", message)
            }
        }
    }

    async fn dispatch(&self, name: &str, args: &Value) -> Result<Value, String> {
        let terms = string_list(args, "terms");

        match name {
            "search_fields" => {
                let objects = string_list(args, "objects");
                if terms.is_empty() || objects.is_empty() {
                    return Err("search_fields requires `terms` and `objects`".to_string());
                }
                let results =
                    fields::search_fields_multi_terms(self.cli, &objects, &terms, &self.policy)
                        .await
                        .map_err(|e| e.to_string())?;
                serde_json::to_value(fields::summarize(&results, &objects))
                    .map_err(|e| e.to_string())
            }
            "search_objects" => {
                if terms.is_empty() {
                    return Err("search_objects requires `terms`".to_string());
                }
                let scope = match args.get("scope").and_then(Value::as_str) {
                    Some("standard") => ObjectScope::Standard,
                    Some("all") => ObjectScope::All,
                    _ => ObjectScope::Custom,
                };
                let results =
                    objects::search_objects_with_terms(self.cli, &terms, scope, Some(&self.policy))
                        .await
                        .map_err(|e| e.to_string())?;
                serde_json::to_value(results).map_err(|e| e.to_string())
            }
            "search_reports" => {
                if terms.is_empty() {
                    return Err("search_reports requires `terms`".to_string());
                }
                let results =
                    reports::search_reports_and_dashboards(self.cli, &terms, &self.policy)
                        .await
                        .map_err(|e| e.to_string())?;
                serde_json::to_value(reports::summarize(&results)).map_err(|e| e.to_string())
            }
            "search_packages" => {
                if terms.is_empty() {
                    return Err("search_packages requires `terms`".to_string());
                }
                let results = packages::search_packages_multi_terms(
                    self.cli,
                    self.tooling,
                    &terms,
                    &self.policy,
                )
                .await
                .map_err(|e| e.to_string())?;
                serde_json::to_value(results).map_err(|e| e.to_string())
            }
            "search_flows" => {
                if terms.is_empty() {
                    return Err("search_flows requires `terms`".to_string());
                }
                let status = args.get("status").and_then(Value::as_str);
                let results = flows::search_flows_multi_terms(
                    self.cli,
                    self.tooling,
                    &terms,
                    &self.policy,
                    status,
                )
                .await
                .map_err(|e| e.to_string())?;
                serde_json::to_value(flows::summarize(&results)).map_err(|e| e.to_string())
            }
            "search_apex" => {
                if terms.is_empty() {
                    return Err("search_apex requires `terms`".to_string());
                }
                let summary = apex::search_apex_multi_terms_summary(
                    self.cli,
                    self.tooling,
                    &terms,
                    ApexType::Both,
                    &self.policy,
                )
                .await;
                serde_json::to_value(summary).map_err(|e| e.to_string())
            }
            "field_usage" => {
                let Some(ref options) = self.usage_options else {
                    return Err("field usage analysis is not available".to_string());
                };
                let object = args
                    .get("object")
                    .and_then(Value::as_str)
                    .ok_or("field_usage requires `object`")?;
                let field_names = string_list(args, "fields");
                if field_names.is_empty() {
                    return Err("field_usage requires `fields`".to_string());
                }
                let results = analyze_fields(self.cli, object, &field_names, None, options)
                    .await
                    .map_err(|e| e.to_string())?;
                serde_json::to_value(results).map_err(|e| e.to_string())
            }
            other => Err(format!("Function '{}' not found.", other)),
        }
    }
}

fn string_list(args: &Value, key: &str) -> Vec<String> {
    args.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_large_list_truncated_with_marker() {
        let policy = TruncationPolicy {
            max_bytes: 100_000,
            max_items: 5,
        };
        let value = Value::Array((0..50).map(|i| json!(i)).collect());
        let out = policy.apply(&value);
        assert!(out.contains("truncated_response"));
        assert!(out.contains("\"original_length\": 50"));
    }

    #[test]
    fn test_large_object_reduced_to_keys() {
        let policy = TruncationPolicy {
            max_bytes: 200,
            max_items: 30,
        };
        let value = json!({
            "alpha": "x".repeat(500),
            "beta": 1,
        });
        let out = policy.apply(&value);
        assert!(out.contains("keys_available"));
        assert!(out.contains("alpha"));
        assert!(!out.contains(&"x".repeat(500)));
    }

    #[test]
    fn test_small_payload_untouched() {
        let policy = TruncationPolicy::default();
        let value = json!({"ok": true});
        let out = policy.apply(&value);
        assert!(!out.contains("truncated_response"));
        assert!(out.contains("\"ok\": true"));
    }

    #[test]
    fn test_scalar_clamped_at_byte_budget() {
        let policy = TruncationPolicy {
            max_bytes: 120,
            max_items: 30,
        };
        let value = json!("y".repeat(500));
        let out = policy.apply(&value);
        assert!(out.ends_with("[truncated due to size]"));
        assert!(out.len() < 200);
    }

    #[test]
    fn test_string_list_parsing() {
        let args = json!({"terms": ["a", "b"], "other": 1});
        assert_eq!(string_list(&args, "terms"), vec!["a", "b"]);
        assert!(string_list(&args, "missing").is_empty());
    }
}
