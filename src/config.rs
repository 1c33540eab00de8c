//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.orgaudit.toml` files.

use crate::search::Similarity;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Org connection settings.
    #[serde(default)]
    pub org: OrgConfig,

    /// Usage-estimator settings.
    #[serde(default)]
    pub estimator: EstimatorConfig,

    /// Keyword-search settings.
    #[serde(default)]
    pub search: SearchConfig,

    /// Narrative-analysis relay settings.
    #[serde(default)]
    pub model: ModelConfig,
}

/// Org connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgConfig {
    /// Salesforce CLI binary.
    #[serde(default = "default_cli_bin")]
    pub cli_bin: String,

    /// Org alias or username; the CLI default org when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_org: Option<String>,
}

impl Default for OrgConfig {
    fn default() -> Self {
        Self {
            cli_bin: default_cli_bin(),
            target_org: None,
        }
    }
}

fn default_cli_bin() -> String {
    "sf".to_string()
}

/// Usage-estimator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// Maximum records per query; also the sampling cap.
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,

    /// Populations above this are never scanned exhaustively.
    #[serde(default = "default_full_scan_ceiling")]
    pub full_scan_ceiling: u64,

    /// Cursor pagination page-size cap.
    #[serde(default = "default_cursor_page_cap")]
    pub cursor_page_cap: u64,

    /// Offset fallback page size.
    #[serde(default = "default_offset_page_size")]
    pub offset_page_size: u64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            full_scan_ceiling: default_full_scan_ceiling(),
            cursor_page_cap: default_cursor_page_cap(),
            offset_page_size: default_offset_page_size(),
        }
    }
}

fn default_batch_size() -> u64 {
    5000
}

fn default_full_scan_ceiling() -> u64 {
    50_000
}

fn default_cursor_page_cap() -> u64 {
    2000
}

fn default_offset_page_size() -> u64 {
    500
}

/// Keyword-search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Minimum similarity score for fuzzy matches (0-1).
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Similarity algorithm.
    #[serde(default)]
    pub algorithm: Similarity,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            algorithm: Similarity::default(),
        }
    }
}

fn default_threshold() -> f64 {
    0.6
}

/// Narrative-analysis relay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Chat completions endpoint.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Model name.
    #[serde(default = "default_model")]
    pub name: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens in one response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Maximum tool-calling conversation turns.
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            name: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_turns: default_max_turns(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    4000
}

fn default_max_turns() -> usize {
    10
}

fn default_timeout() -> u64 {
    300
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it
    /// exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(".orgaudit.toml");

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.org.cli_bin, "sf");
        assert_eq!(config.estimator.batch_size, 5000);
        assert_eq!(config.estimator.full_scan_ceiling, 50_000);
        assert_eq!(config.search.threshold, 0.6);
        assert_eq!(config.model.name, "gpt-4o");
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[org]
target_org = "prod"

[estimator]
batch_size = 2000

[search]
threshold = 0.8
algorithm = "jaro-winkler"

[model]
name = "gpt-4-turbo"
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.org.target_org.as_deref(), Some("prod"));
        assert_eq!(config.estimator.batch_size, 2000);
        assert_eq!(config.search.threshold, 0.8);
        assert_eq!(config.search.algorithm, Similarity::JaroWinkler);
        assert_eq!(config.model.name, "gpt-4-turbo");
        // Unset sections keep their defaults.
        assert_eq!(config.estimator.offset_page_size, 500);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(!toml_str.is_empty());
        assert!(toml_str.contains("[org]"));
        assert!(toml_str.contains("[estimator]"));
        assert!(toml_str.contains("[search]"));
        assert!(toml_str.contains("[model]"));
    }
}
