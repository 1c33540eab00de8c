//! Documentation-service and webhook forwarding.
//!
//! The documentation service follows the Notion pages API shape:
//! create a page under a database with title properties and paragraph
//! blocks, get the created page id back.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::info;

/// Service limit on one rich-text block.
const BLOCK_TEXT_LIMIT: usize = 2000;

const DOCS_API_VERSION: &str = "2022-06-28";

/// Client for the documentation service.
pub struct DocsClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl DocsClient {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .context("Failed to create HTTP client")?,
            base_url: "https://api.notion.com/v1".to_string(),
            token: token.into(),
        })
    }

    /// Create a page with a title, extra property values, and
    /// paragraph content. Returns the created page id.
    pub async fn create_page(
        &self,
        database_id: &str,
        title: &str,
        mut properties: Value,
        paragraphs: &[String],
    ) -> Result<String> {
        if !properties.is_object() {
            properties = json!({});
        }
        properties["Name"] = json!({
            "title": [{"text": {"content": title}}]
        });

        let children: Vec<Value> = paragraphs
            .iter()
            .flat_map(|text| chunk_text(text, BLOCK_TEXT_LIMIT))
            .map(|chunk| {
                json!({
                    "object": "block",
                    "type": "paragraph",
                    "paragraph": {
                        "rich_text": [{"type": "text", "text": {"content": chunk}}]
                    }
                })
            })
            .collect();

        let body = json!({
            "parent": {"database_id": database_id},
            "properties": properties,
            "children": children,
        });

        let response = self
            .http
            .post(format!("{}/pages", self.base_url))
            .bearer_auth(&self.token)
            .header("Notion-Version", DOCS_API_VERSION)
            .json(&body)
            .send()
            .await
            .context("Failed to reach documentation service")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Documentation service error {}: {}", status, text);
        }

        let created: Value = response
            .json()
            .await
            .context("Malformed documentation-service response")?;
        let id = created
            .get("id")
            .and_then(Value::as_str)
            .context("Documentation service returned no page id")?
            .to_string();
        info!("Created documentation page {}", id);
        Ok(id)
    }
}

/// Split text into chunks under the block size limit, on char
/// boundaries.
fn chunk_text(text: &str, limit: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut chunks = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if current.len() + c.len_utf8() > limit {
            chunks.push(std::mem::take(&mut current));
        }
        current.push(c);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// POST a JSON payload to a webhook, tagging its source.
pub async fn send_webhook(url: &str, payload: &Value, source: Option<&str>) -> Result<()> {
    let mut body = payload.clone();
    if let (Some(source), Some(map)) = (source, body.as_object_mut()) {
        map.insert("webhook_source".to_string(), json!(source));
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .context("Failed to create HTTP client")?;

    let response = client
        .post(url)
        .json(&body)
        .send()
        .await
        .context("Failed to reach webhook")?;

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        anyhow::bail!("Webhook returned {}: {}", status, text);
    }
    info!(
        "Sent data to webhook from {}",
        source.unwrap_or("unknown source")
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_text_respects_limit() {
        let text = "a".repeat(4500);
        let chunks = chunk_text(&text, 2000);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 2000);
        assert_eq!(chunks[2].len(), 500);
    }

    #[test]
    fn test_chunk_text_handles_multibyte() {
        let text = "ø".repeat(1500); // 2 bytes each
        let chunks = chunk_text(&text, 2000);
        assert_eq!(chunks.len(), 2);
        for chunk in &chunks {
            assert!(chunk.len() <= 2000);
        }
    }

    #[test]
    fn test_empty_text_produces_no_blocks() {
        assert!(chunk_text("", 2000).is_empty());
    }
}
