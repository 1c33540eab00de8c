//! REST and Tooling API client.
//!
//! Some metadata surfaces (Apex bodies, Flow versions, namespace
//! registry, influence settings) are only reachable over HTTP. API
//! versions are probed newest-first because orgs differ in what they
//! expose.

use crate::error::{SfError, SfResult};
use crate::models::Record;
use crate::sf::cli::OrgInfo;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// API versions to try, newest first.
const API_VERSIONS: &[&str] = &["57.0", "56.0", "55.0", "54.0", "53.0", "52.0", "51.0", "50.0"];

const HTTP_TIMEOUT_SECS: u64 = 120;

/// Authenticated HTTP client for one org.
pub struct ToolingClient {
    http: reqwest::Client,
    instance_url: String,
    access_token: String,
}

impl ToolingClient {
    /// Build a client from `sf org display` output. Returns an auth
    /// error when the token or instance URL is missing.
    pub fn from_org(info: &OrgInfo) -> SfResult<Self> {
        let instance_url = info
            .instance_url
            .clone()
            .ok_or(SfError::NotAuthenticated)?;
        let access_token = info.access_token.clone().ok_or(SfError::NotAuthenticated)?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(SfError::Http)?;

        Ok(Self {
            http,
            instance_url: instance_url.trim_end_matches('/').to_string(),
            access_token,
        })
    }

    /// Run a Tooling API query.
    pub async fn query_tooling(&self, soql: &str) -> SfResult<Vec<Record>> {
        self.query_endpoint("tooling/query", soql).await
    }

    /// Run a plain REST query (same shape, different endpoint).
    pub async fn query_rest(&self, soql: &str) -> SfResult<Vec<Record>> {
        self.query_endpoint("query", soql).await
    }

    async fn query_endpoint(&self, endpoint: &str, soql: &str) -> SfResult<Vec<Record>> {
        for version in API_VERSIONS {
            let url = format!(
                "{}/services/data/v{}/{}",
                self.instance_url, version, endpoint
            );
            debug!("Querying {} (v{})", endpoint, version);

            let response = self
                .http
                .get(&url)
                .bearer_auth(&self.access_token)
                .query(&[("q", soql)])
                .send()
                .await?;

            let status = response.status();
            if status.as_u16() == 404 {
                debug!("API v{} not available, trying older version", version);
                continue;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                warn!(
                    "API v{} returned {}: {}",
                    version,
                    status,
                    body.chars().take(500).collect::<String>()
                );
                continue;
            }

            let result: Value = response.json().await?;
            return Ok(parse_records(&result));
        }
        Err(SfError::NoApiVersion)
    }

    /// True when the object describes successfully (exists in the org).
    pub async fn object_exists(&self, object: &str) -> bool {
        let url = format!(
            "{}/services/data/v{}/sobjects/{}/describe",
            self.instance_url,
            API_VERSIONS.last().unwrap_or(&"50.0"),
            object
        );
        match self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Fetch the describe payload for an object (picklist values etc.).
    pub async fn describe_object(&self, object: &str) -> SfResult<Value> {
        for version in API_VERSIONS {
            let url = format!(
                "{}/services/data/v{}/sobjects/{}/describe",
                self.instance_url, version, object
            );
            let response = self
                .http
                .get(&url)
                .bearer_auth(&self.access_token)
                .send()
                .await?;
            if response.status().as_u16() == 404 {
                continue;
            }
            if !response.status().is_success() {
                continue;
            }
            return Ok(response.json().await?);
        }
        Err(SfError::NoApiVersion)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versions_probed_newest_first() {
        assert_eq!(API_VERSIONS.first(), Some(&"57.0"));
        assert_eq!(API_VERSIONS.last(), Some(&"50.0"));
    }

    #[test]
    fn test_missing_auth_is_rejected() {
        let info = OrgInfo::default();
        assert!(matches!(
            ToolingClient::from_org(&info),
            Err(SfError::NotAuthenticated)
        ));
    }
}
