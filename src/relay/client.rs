//! Chat relay for narrative analysis.
//!
//! Implements both:
//! - Simple mode: one request with the formatted audit report
//! - Tool-calling mode: bounded conversation where the model may
//!   invoke the keyword-search tools

use crate::relay::tools::Toolbox;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for the relay.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Maximum conversation turns in tool-calling mode.
    pub max_turns: usize,
    pub timeout_seconds: u64,
    /// Prune the conversation once its text grows past this size.
    pub max_conversation_chars: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: String::new(),
            model: "gpt-4o".to_string(),
            temperature: 0.2,
            max_tokens: 4000,
            max_turns: 10,
            timeout_seconds: 300,
            max_conversation_chars: 300_000,
        }
    }
}

/// Message in the chat history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallMessage>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    fn plain(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    fn chars(&self) -> usize {
        self.content.as_deref().map(str::len).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: ToolCallFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    /// JSON-encoded arguments string, as the API sends them.
    pub arguments: String,
}

/// Chat API request.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'a str>,
    temperature: f32,
    max_tokens: u32,
}

/// Chat API response.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[allow(dead_code)]
    role: String,
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallMessage>>,
}

/// The narrative-analysis relay.
pub struct NarrativeRelay {
    config: RelayConfig,
    http_client: reqwest::Client,
}

impl NarrativeRelay {
    pub fn new(config: RelayConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            config,
            http_client,
        })
    }

    /// Simple mode: one request, no tools.
    pub async fn analyze(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let messages = vec![
            ChatMessage::plain("system", system_prompt),
            ChatMessage::plain("user", user_prompt),
        ];
        let response = self.send(&messages, None).await?;
        response
            .content
            .filter(|c| !c.is_empty())
            .context("No response from assistant")
    }

    /// Tool-calling mode: bounded conversation loop. The model may
    /// invoke toolbox capabilities; results flow back as tool
    /// messages until it answers in plain text or the turn budget
    /// runs out.
    pub async fn analyze_with_tools(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        toolbox: &Toolbox<'_>,
    ) -> Result<String> {
        let tools: Vec<Value> = toolbox
            .definitions()
            .iter()
            .map(|t| serde_json::to_value(t).unwrap_or_default())
            .collect();

        let mut messages = vec![
            ChatMessage::plain("system", system_prompt),
            ChatMessage::plain("user", user_prompt),
        ];

        for turn in 1..=self.config.max_turns {
            info!("Turn {}: sending request", turn);

            let response = match self.send(&messages, Some(tools.as_slice())).await {
                Ok(response) => response,
                Err(e) if is_context_overflow(&e) => {
                    warn!("Context length exceeded, pruning conversation");
                    messages.truncate(2);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let content = response.content.clone().unwrap_or_default();

            match response.tool_calls {
                Some(tool_calls) if !tool_calls.is_empty() => {
                    info!("Assistant requested {} tool calls", tool_calls.len());
                    messages.push(ChatMessage {
                        role: "assistant".to_string(),
                        content: Some(content),
                        tool_calls: Some(tool_calls.clone()),
                        tool_call_id: None,
                        name: None,
                    });

                    for call in &tool_calls {
                        let result = self.execute_call(call, toolbox).await;
                        messages.push(ChatMessage {
                            role: "tool".to_string(),
                            content: Some(result),
                            tool_calls: None,
                            tool_call_id: Some(call.id.clone()),
                            name: Some(call.function.name.clone()),
                        });
                    }

                    self.prune_if_oversized(&mut messages);
                }
                _ => {
                    if content.is_empty() {
                        return Ok("No response from assistant.".to_string());
                    }
                    return Ok(content);
                }
            }
        }

        let last = messages
            .iter()
            .rev()
            .find_map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(format!(
            "Analysis exceeded maximum number of turns. Partial results:\n\n{}",
            last
        ))
    }

    async fn execute_call(&self, call: &ToolCallMessage, toolbox: &Toolbox<'_>) -> String {
        let args: Value = match serde_json::from_str(&call.function.arguments) {
            Ok(args) => args,
            Err(_) => {
                return format!(
                    "Error: Invalid JSON in function arguments for '{}'",
                    call.function.name
                )
            }
        };
        info!("Executing: {}({})", call.function.name, args);
        toolbox.execute(&call.function.name, &args).await
    }

    /// Sliding window: keep the system and initial user messages plus
    /// the most recent exchange once the transcript grows too large.
    fn prune_if_oversized(&self, messages: &mut Vec<ChatMessage>) {
        let total: usize = messages.iter().map(ChatMessage::chars).sum();
        if total <= self.config.max_conversation_chars || messages.len() <= 4 {
            return;
        }
        debug!("Conversation at {} chars, pruning older messages", total);

        let mut recent = messages.split_off(messages.len() - 8.min(messages.len() - 2));
        // Dropping a tool message without its assistant request (or
        // vice versa) breaks the protocol; cut down to the last plain
        // exchange instead.
        while recent
            .first()
            .map(|m| m.role == "tool")
            .unwrap_or(false)
        {
            recent.remove(0);
        }
        messages.truncate(2);
        messages.append(&mut recent);
    }

    async fn send(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[Value]>,
    ) -> Result<ResponseMessage> {
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            tools: tools.map(|t| t.to_vec()),
            tool_choice: tools.map(|_| "auto"),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        debug!("Sending chat request with {} messages", messages.len());

        let response = self
            .http_client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow::anyhow!("Request timed out after {}s", self.config.timeout_seconds)
                } else if e.is_connect() {
                    anyhow::anyhow!("Cannot connect to {}", self.config.api_url)
                } else {
                    anyhow::anyhow!("Failed to send request: {}", e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 401 {
                anyhow::bail!(
                    "Authentication failed ({}). Check OPENAI_API_KEY in your environment.",
                    status
                );
            }
            anyhow::bail!("Chat API error {}: {}", status, body);
        }

        let mut chat_response: ChatResponse = response
            .json()
            .await
            .context("Failed to parse chat response")?;

        if chat_response.choices.is_empty() {
            anyhow::bail!("Chat API returned no choices");
        }
        Ok(chat_response.choices.remove(0).message)
    }
}

fn is_context_overflow(error: &anyhow::Error) -> bool {
    let text = error.to_string();
    text.contains("context_length_exceeded") || text.contains("maximum context length")
}
