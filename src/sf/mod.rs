//! Salesforce org access layer.
//!
//! All org data flows through here: the `sf` CLI for SOQL queries and
//! schema describes, and the REST/Tooling API for metadata surfaces the
//! CLI cannot reach.

pub mod cli;
pub mod query;
pub mod tooling;

pub use cli::{OrgInfo, SfCli};
pub use query::{escape_soql_literal, non_null_value, record_id, DataSource, QueryPage};
pub use tooling::ToolingClient;
