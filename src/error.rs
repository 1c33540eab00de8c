//! Error types for the org data-access layer.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("sf CLI not found or not installed")]
    CliNotFound,

    #[error("no authenticated Salesforce org (run `sf org login web`)")]
    NotAuthenticated,

    #[error("command failed: {command}: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("malformed JSON from {command}: {detail} (output starts: {excerpt})")]
    MalformedResponse {
        command: String,
        detail: String,
        excerpt: String,
    },

    #[error("schema lookup failed for {0}")]
    SchemaLookup(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no working Tooling API version found")]
    NoApiVersion,
}

impl SfError {
    /// Exit code for this error when it aborts the whole run.
    pub fn exit_code(&self) -> i32 {
        match self {
            SfError::CliNotFound | SfError::NotAuthenticated => 2,
            _ => 1,
        }
    }
}

pub type SfResult<T> = std::result::Result<T, SfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_errors_use_distinct_exit_code() {
        assert_eq!(SfError::NotAuthenticated.exit_code(), 2);
        assert_eq!(SfError::CliNotFound.exit_code(), 2);
        assert_eq!(SfError::Query("x".into()).exit_code(), 1);
    }
}
