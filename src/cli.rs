//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::search::apex::ApexType;
use crate::search::objects::ObjectScope;
use crate::search::Similarity;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// OrgAudit - CRM data quality and attribution auditor
///
/// Audit a Salesforce org for field usage, data quality KPIs, and
/// marketing-attribution signals, with optional AI narrative analysis.
///
/// Examples:
///   orgaudit usage --object Account --fields Name,Industry,AnnualRevenue
///   orgaudit data-audit --full-dataset
///   orgaudit attribution --analyze
///   orgaudit search fields touch,utm --objects Lead,Contact
///   orgaudit init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file
    ///
    /// If not specified, looks for .orgaudit.toml in the current directory
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Org alias or username (defaults to the CLI's default org)
    #[arg(short = 'o', long, global = true, value_name = "ORG", env = "ORGAUDIT_TARGET_ORG")]
    pub target_org: Option<String>,

    /// Minimum similarity score for fuzzy matching (0-1)
    #[arg(short = 't', long, global = true, value_name = "SCORE")]
    pub threshold: Option<f64>,

    /// Similarity algorithm for fuzzy matching
    #[arg(long, global = true, value_enum)]
    pub similarity: Option<Similarity>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Measure field usage for one object
    Usage {
        /// Object API name to analyze
        #[arg(short = 'O', long, default_value = "Account")]
        object: String,

        /// Field API names to analyze (comma-separated)
        #[arg(short, long, value_delimiter = ',', default_value = "Name,Industry,AnnualRevenue")]
        fields: Vec<String>,

        /// Maximum number of records to query in a batch
        #[arg(short, long, value_name = "COUNT")]
        batch_size: Option<u64>,

        /// Analyze the full dataset even if large (may take longer)
        #[arg(long)]
        full_dataset: bool,
    },

    /// Run the field-usage audit across the configured objects
    DataAudit {
        /// Specific objects to analyze (default: all configured)
        #[arg(long, value_delimiter = ',')]
        objects: Option<Vec<String>>,

        /// Output file path for JSON results
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output file path for CSV results
        #[arg(long, value_name = "FILE")]
        csv_output: Option<PathBuf>,

        /// Maximum number of records to query in a batch
        #[arg(short, long, value_name = "COUNT")]
        batch_size: Option<u64>,

        /// Sample large objects instead of scanning exhaustively
        #[arg(long)]
        sample: bool,
    },

    /// Run the data-quality KPI audits across the core entities
    Kpi {
        /// Specific entities to audit (default: all of Account,
        /// Contact, Lead, Opportunity, Event)
        #[arg(long, value_delimiter = ',')]
        objects: Option<Vec<String>>,

        /// Output file path for JSON results
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Run the marketing-attribution audit
    Attribution {
        /// Output file path for JSON results
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Send the finished audit for AI narrative analysis
        #[arg(long)]
        analyze: bool,

        /// Let the model call the keyword-search tools during analysis
        #[arg(long, requires = "analyze")]
        with_tools: bool,

        /// API key for the analysis service
        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },

    /// Search metadata surfaces for keywords
    Search {
        #[command(subcommand)]
        surface: SearchCommand,
    },

    /// Check the campaign-influence configuration
    Influence {
        /// Output file path for JSON results
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Analyze a saved audit report with the AI relay
    Analyze {
        /// Path to a saved audit JSON file
        input: PathBuf,

        /// Output file for the analysis text
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Let the model call the keyword-search tools
        #[arg(long)]
        with_tools: bool,

        /// Extra question to put to the analyst
        #[arg(short = 'Q', long)]
        query: Option<String>,

        /// API key for the analysis service
        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },

    /// Forward a saved report to the documentation service or a webhook
    Publish {
        /// Path to a saved report (JSON) or analysis text file
        input: PathBuf,

        /// Documentation-service database id to create the page under
        #[arg(long, value_name = "ID")]
        database: Option<String>,

        /// Documentation-service API token
        #[arg(long, env = "NOTION_TOKEN", hide_env_values = true)]
        docs_token: Option<String>,

        /// Page title (default: derived from the input filename)
        #[arg(long)]
        title: Option<String>,

        /// Webhook URL to POST the report to
        #[arg(long, value_name = "URL")]
        webhook: Option<String>,

        /// Source tag attached to the webhook payload
        #[arg(long)]
        source: Option<String>,
    },

    /// Generate a default .orgaudit.toml configuration file
    InitConfig,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SearchCommand {
    /// Search field names, labels, and descriptions
    Fields {
        /// Text to search for (comma-separated for multiple terms)
        terms: String,

        /// Objects to search (comma-separated)
        #[arg(long, value_delimiter = ',', required = true)]
        objects: Vec<String>,
    },

    /// Search object API names
    Objects {
        /// Text to search for (comma-separated for multiple terms)
        terms: String,

        /// Which objects to include
        #[arg(long, value_enum, default_value = "custom")]
        scope: ObjectScope,

        /// Use fuzzy matching instead of plain substring
        #[arg(long)]
        fuzzy: bool,
    },

    /// Search Apex class and trigger names and bodies
    Apex {
        /// Text to search for (comma-separated for multiple terms)
        terms: String,

        /// Type of Apex to search
        #[arg(long, value_enum, default_value = "both")]
        apex_type: ApexType,
    },

    /// Search Flow labels
    Flows {
        /// Text to search for (comma-separated for multiple terms)
        terms: String,

        /// Only include flows with this status (e.g. Active)
        #[arg(long)]
        status: Option<String>,
    },

    /// Search report and dashboard titles
    Reports {
        /// Text to search for (comma-separated for multiple terms)
        terms: String,
    },

    /// Search installed packages and namespaces
    Packages {
        /// Text to search for (comma-separated for multiple terms)
        terms: String,
    },
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(threshold) = self.threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err("Threshold must be between 0.0 and 1.0".to_string());
            }
        }

        if let Command::Usage { batch_size, fields, .. } = &self.command {
            if batch_size == &Some(0) {
                return Err("Batch size must be at least 1".to_string());
            }
            if fields.is_empty() {
                return Err("At least one field is required".to_string());
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

/// Split a comma-separated terms argument into trimmed terms.
pub fn split_terms(terms: &str) -> Vec<String> {
    terms
        .split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(args)
    }

    #[test]
    fn test_usage_defaults() {
        let args = parse(&["orgaudit", "usage"]).unwrap();
        let Command::Usage { object, fields, full_dataset, .. } = args.command else {
            panic!("expected usage command");
        };
        assert_eq!(object, "Account");
        assert_eq!(fields, vec!["Name", "Industry", "AnnualRevenue"]);
        assert!(!full_dataset);
    }

    #[test]
    fn test_conflicting_verbosity_rejected() {
        let args = parse(&["orgaudit", "-v", "-q", "usage"]).unwrap();
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_threshold_range_validated() {
        let args = parse(&["orgaudit", "-t", "1.5", "usage"]).unwrap();
        assert!(args.validate().is_err());

        let args = parse(&["orgaudit", "-t", "0.8", "usage"]).unwrap();
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_search_fields_requires_objects() {
        assert!(parse(&["orgaudit", "search", "fields", "touch"]).is_err());
        let args =
            parse(&["orgaudit", "search", "fields", "touch,utm", "--objects", "Lead,Contact"])
                .unwrap();
        let Command::Search { surface: SearchCommand::Fields { terms, objects } } = args.command
        else {
            panic!("expected search fields");
        };
        assert_eq!(split_terms(&terms), vec!["touch", "utm"]);
        assert_eq!(objects, vec!["Lead", "Contact"]);
    }

    #[test]
    fn test_split_terms_trims_and_drops_empty() {
        assert_eq!(split_terms(" a , b ,,c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_log_level() {
        let mut args = parse(&["orgaudit", "usage"]).unwrap();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
