//! `sf` CLI wrapper.
//!
//! Every CLI invocation goes through [`SfCli::run_json`], which parses
//! the `--json` envelope and maps failures onto [`SfError`].

use crate::error::{SfError, SfResult};
use crate::models::{EntitySchema, FieldDescriptor, Record};
use crate::sf::query::{DataSource, QueryPage};
use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, warn};

/// Max raw-output excerpt length logged for malformed JSON.
const EXCERPT_LEN: usize = 1000;

/// Authentication details for the current default org.
#[derive(Debug, Clone, Default)]
pub struct OrgInfo {
    pub org_name: Option<String>,
    pub username: Option<String>,
    pub instance_url: Option<String>,
    pub access_token: Option<String>,
}

/// Handle to the `sf` command-line tool.
#[derive(Debug, Clone)]
pub struct SfCli {
    bin: String,
    target_org: Option<String>,
}

impl Default for SfCli {
    fn default() -> Self {
        Self {
            bin: "sf".to_string(),
            target_org: None,
        }
    }
}

impl SfCli {
    pub fn new(bin: impl Into<String>, target_org: Option<String>) -> Self {
        Self {
            bin: bin.into(),
            target_org,
        }
    }

    /// Run an `sf` subcommand with `--json` and return the `result`
    /// value from the envelope.
    pub async fn run_json(&self, args: &[&str]) -> SfResult<Value> {
        let mut cmd = Command::new(&self.bin);
        cmd.args(args);
        if let Some(ref org) = self.target_org {
            cmd.args(["--target-org", org]);
        }
        cmd.arg("--json");

        let command_line = format!("{} {} --json", self.bin, args.join(" "));
        debug!("Running: {}", command_line);

        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SfError::CliNotFound
            } else {
                SfError::Io(e)
            }
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

        if !output.status.success() {
            // The CLI still emits a JSON envelope on most failures;
            // surface its message when available.
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            let message = serde_json::from_str::<Value>(&stdout)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(String::from))
                .unwrap_or(stderr);
            return Err(SfError::CommandFailed {
                command: command_line,
                stderr: message,
            });
        }

        let envelope: Value = serde_json::from_str(&stdout).map_err(|e| {
            let excerpt: String = stdout.chars().take(EXCERPT_LEN).collect();
            SfError::MalformedResponse {
                command: command_line.clone(),
                detail: e.to_string(),
                excerpt,
            }
        })?;

        envelope
            .get("result")
            .cloned()
            .ok_or_else(|| SfError::MalformedResponse {
                command: command_line,
                detail: "missing `result` key".to_string(),
                excerpt: stdout.chars().take(EXCERPT_LEN).collect(),
            })
    }

    /// Verify the CLI is present and an org is authenticated.
    ///
    /// Credential problems are fatal for the whole run, so this
    /// returns the hard [`SfError::NotAuthenticated`] variant.
    pub async fn check_installed(&self) -> SfResult<OrgInfo> {
        let version = Command::new(&self.bin).arg("--version").output().await;
        match version {
            Ok(out) if out.status.success() => {}
            _ => return Err(SfError::CliNotFound),
        }

        let info = self.org_display().await?;
        if info.username.is_none() && info.access_token.is_none() {
            return Err(SfError::NotAuthenticated);
        }
        Ok(info)
    }

    /// `sf org display` — connection details for the default org.
    pub async fn org_display(&self) -> SfResult<OrgInfo> {
        let result = self
            .run_json(&["org", "display"])
            .await
            .map_err(|e| match e {
                SfError::CommandFailed { .. } => SfError::NotAuthenticated,
                other => other,
            })?;

        let field = |key: &str| result.get(key).and_then(Value::as_str).map(String::from);
        Ok(OrgInfo {
            org_name: field("name"),
            username: field("username"),
            instance_url: field("instanceUrl"),
            access_token: field("accessToken"),
        })
    }

    /// Run a SOQL query against the Tooling API through the CLI
    /// (fallback path when direct HTTP access is unavailable).
    pub async fn query_tooling_cli(&self, soql: &str) -> SfResult<Vec<Record>> {
        let result = self
            .run_json(&["data", "query", "--query", soql, "--use-tooling-api"])
            .await?;
        Ok(parse_records(&result))
    }

    /// `sf sobject list` — all sobject API names. The payload shape
    /// varies between CLI versions; both the flat list and the nested
    /// `sobjects` key are handled.
    pub async fn list_sobjects(&self) -> SfResult<Vec<String>> {
        let result = self.run_json(&["sobject", "list"]).await?;

        let mut names = Vec::new();
        if let Some(items) = result.as_array() {
            collect_sobject_names(items, &mut names);
        } else if let Some(items) = result.get("sobjects").and_then(Value::as_array) {
            collect_sobject_names(items, &mut names);
        }
        Ok(names)
    }

    /// `sf org list metadata` — full names for one metadata type.
    pub async fn list_metadata(&self, metadata_type: &str) -> SfResult<Vec<String>> {
        let result = self
            .run_json(&["org", "list", "metadata", "--metadata-type", metadata_type])
            .await?;
        Ok(result
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.get("fullName").and_then(Value::as_str))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default())
    }

    /// `sf package installed list` — installed package records.
    pub async fn installed_packages(&self) -> SfResult<Vec<Record>> {
        let result = self.run_json(&["package", "installed", "list"]).await?;
        Ok(result
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_object)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Resolve a company name for report filenames: org name, then
    /// username domain, then the Organization record, then a default.
    pub async fn company_name(&self) -> String {
        if let Ok(info) = self.org_display().await {
            if let Some(name) = info.org_name {
                // Org ids sometimes leak into the name field.
                if !name.starts_with("00D") {
                    return crate::report::sanitize_filename(&name);
                }
            }
            if let Some(username) = info.username {
                if let Some(domain) = username.split('@').nth(1) {
                    if let Some(host) = domain.split('.').next() {
                        return crate::report::sanitize_filename(host);
                    }
                }
            }
        }

        match self.query("SELECT Name FROM Organization LIMIT 1").await {
            Ok(page) => {
                if let Some(name) = page
                    .records
                    .first()
                    .and_then(|r| r.get("Name"))
                    .and_then(Value::as_str)
                {
                    return crate::report::sanitize_filename(name);
                }
            }
            Err(e) => warn!("Could not query Organization name: {}", e),
        }

        "salesforce_org".to_string()
    }
}

fn collect_sobject_names(items: &[Value], names: &mut Vec<String>) {
    for item in items {
        match item {
            Value::String(s) => names.push(s.clone()),
            Value::Object(obj) => {
                if let Some(name) = obj.get("name").and_then(Value::as_str) {
                    names.push(name.to_string());
                }
            }
            _ => {}
        }
    }
}

fn parse_records(result: &Value) -> Vec<Record> {
    result
        .get("records")
        .and_then(Value::as_array)
        .map(|records| {
            records
                .iter()
                .filter_map(Value::as_object)
                .map(|obj| {
                    let mut record = obj.clone();
                    record.remove("attributes");
                    record
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl DataSource for SfCli {
    async fn count_records(&self, entity: &str) -> SfResult<u64> {
        let soql = format!("SELECT count() FROM {}", entity);
        let result = self.run_json(&["data", "query", "--query", &soql]).await?;
        result
            .get("totalSize")
            .and_then(Value::as_u64)
            .ok_or_else(|| SfError::Query(format!("no totalSize for count on {}", entity)))
    }

    async fn query(&self, soql: &str) -> SfResult<QueryPage> {
        let result = self.run_json(&["data", "query", "--query", soql]).await?;
        Ok(QueryPage {
            total_size: result.get("totalSize").and_then(Value::as_u64).unwrap_or(0),
            done: result.get("done").and_then(Value::as_bool).unwrap_or(true),
            records: parse_records(&result),
        })
    }

    async fn describe(&self, entity: &str) -> SfResult<EntitySchema> {
        let result = self
            .run_json(&["sobject", "describe", "--sobject", entity])
            .await
            .map_err(|_| SfError::SchemaLookup(entity.to_string()))?;

        let fields = result
            .get("fields")
            .and_then(Value::as_array)
            .ok_or_else(|| SfError::SchemaLookup(entity.to_string()))?
            .iter()
            .filter_map(|f| {
                Some(FieldDescriptor {
                    name: f.get("name")?.as_str()?.to_string(),
                    label: f
                        .get("label")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    field_type: f
                        .get("type")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_lowercase(),
                    description: f
                        .get("description")
                        .and_then(Value::as_str)
                        .map(String::from),
                })
            })
            .collect();

        Ok(EntitySchema {
            entity: entity.to_string(),
            fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_records_strips_attributes() {
        let result = json!({
            "records": [
                {"attributes": {"type": "Account"}, "Id": "001", "Name": "Acme"},
                {"Id": "002", "Name": "Globex"}
            ]
        });
        let records = parse_records(&result);
        assert_eq!(records.len(), 2);
        assert!(records[0].get("attributes").is_none());
        assert_eq!(records[0].get("Name"), Some(&json!("Acme")));
    }

    #[test]
    fn test_parse_records_tolerates_missing_array() {
        assert!(parse_records(&json!({})).is_empty());
    }
}
