//! OrgAudit - CRM data quality and attribution auditor
//!
//! A CLI tool that queries a Salesforce org through the `sf` CLI,
//! computes field-usage and data-quality statistics, searches
//! metadata for attribution signals, and optionally relays the
//! aggregated results to an AI analyst.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (query, config, relay failure, etc.)
//!   2 - Credential/CLI failure (no `sf`, no authenticated org)

mod audit;
mod cli;
mod config;
mod error;
mod models;
mod relay;
mod report;
mod search;
mod sf;
mod usage;

use anyhow::{Context, Result};
use clap::CommandFactory;
use cli::{split_terms, Args, Command, SearchCommand};
use config::Config;
use error::SfError;
use models::{AttributionAudit, KeywordConfig};
use relay::prompt;
use relay::{NarrativeRelay, RelayConfig, Toolbox, TruncationPolicy};
use search::matcher::MatchPolicy;
use sf::{SfCli, ToolingClient};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use usage::EstimatorOptions;

#[tokio::main]
async fn main() {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        let _ = Args::command().print_help();
        eprintln!("\nError: {}", e);
        std::process::exit(1);
    }

    if matches!(args.command, Command::InitConfig) {
        std::process::exit(handle_init_config());
    }

    init_logging(&args);
    info!("OrgAudit v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    if let Err(e) = run(args).await {
        error!("Audit failed: {}", e);
        eprintln!("\n❌ Error: {:#}", e);
        let code = e
            .downcast_ref::<SfError>()
            .map(SfError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

/// Handle init-config: generate a default .orgaudit.toml.
fn handle_init_config() -> i32 {
    let path = Path::new(".orgaudit.toml");
    if path.exists() {
        eprintln!("⚠️  .orgaudit.toml already exists. Remove it first or edit it manually.");
        return 1;
    }

    match std::fs::write(path, Config::default_toml()) {
        Ok(()) => {
            println!("✅ Created .orgaudit.toml with default settings.");
            println!("   Edit it to customize org, estimator, search, and model settings.");
            0
        }
        Err(e) => {
            eprintln!("Failed to write .orgaudit.toml: {}", e);
            1
        }
    }
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level())
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from .orgaudit.toml");
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = load_config(&args)?;
    if let Some(ref target_org) = args.target_org {
        config.org.target_org = Some(target_org.clone());
    }
    if let Some(threshold) = args.threshold {
        config.search.threshold = threshold;
    }
    if let Some(similarity) = args.similarity {
        config.search.algorithm = similarity;
    }

    let cli = SfCli::new(&config.org.cli_bin, config.org.target_org.clone());
    let policy = MatchPolicy::new(config.search.threshold, config.search.algorithm);
    let estimator = estimator_options(&config, None, false);
    let quiet = args.quiet;

    match args.command {
        Command::Usage {
            object,
            fields,
            batch_size,
            full_dataset,
        } => {
            let options = estimator_options(&config, batch_size, full_dataset);
            handle_usage(&cli, &object, &fields, &options, quiet).await
        }
        Command::DataAudit {
            objects,
            output,
            csv_output,
            batch_size,
            sample,
        } => {
            let options = estimator_options(&config, batch_size, !sample);
            handle_data_audit(&cli, objects, output, csv_output, &options).await
        }
        Command::Kpi { objects, output } => handle_kpi(&cli, objects, output).await,
        Command::Attribution {
            output,
            analyze,
            with_tools,
            api_key,
        } => {
            handle_attribution(
                &cli, &config, policy, estimator, output, analyze, with_tools, api_key,
            )
            .await
        }
        Command::Search { surface } => handle_search(&cli, policy, surface).await,
        Command::Influence { output } => handle_influence(&cli, output).await,
        Command::Analyze {
            input,
            output,
            with_tools,
            query,
            api_key,
        } => {
            handle_analyze(&cli, &config, policy, estimator, input, output, with_tools, query, api_key)
                .await
        }
        Command::Publish {
            input,
            database,
            docs_token,
            title,
            webhook,
            source,
        } => handle_publish(input, database, docs_token, title, webhook, source).await,
        Command::InitConfig => unreachable!("handled before logging init"),
    }
}

/// Forward a saved report to the documentation service and/or a
/// webhook.
async fn handle_publish(
    input: PathBuf,
    database: Option<String>,
    docs_token: Option<String>,
    title: Option<String>,
    webhook: Option<String>,
    source: Option<String>,
) -> Result<()> {
    if database.is_none() && webhook.is_none() {
        anyhow::bail!("Nothing to publish: pass --database and/or --webhook");
    }

    let raw = std::fs::read_to_string(&input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let parsed: Option<serde_json::Value> = serde_json::from_str(&raw).ok();

    if let Some(database_id) = database {
        let token = docs_token.context(
            "Documentation-service token not found. Set NOTION_TOKEN or pass --docs-token.",
        )?;
        let client = relay::docs::DocsClient::new(token)?;

        let page_title = title.unwrap_or_else(|| {
            input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "Audit Report".to_string())
        });
        let paragraphs: Vec<String> = match &parsed {
            Some(value) => vec![serde_json::to_string_pretty(value)?],
            None => raw.split("\n\n").map(String::from).collect(),
        };

        let page_id = client
            .create_page(&database_id, &page_title, serde_json::json!({}), &paragraphs)
            .await?;
        println!("Created documentation page: {}", page_id);
    }

    if let Some(url) = webhook {
        let payload = parsed
            .clone()
            .unwrap_or_else(|| serde_json::json!({ "text": raw }));
        relay::docs::send_webhook(&url, &payload, source.as_deref()).await?;
        println!("Report sent to webhook");
    }

    Ok(())
}

fn estimator_options(config: &Config, batch_size: Option<u64>, full_dataset: bool) -> EstimatorOptions {
    EstimatorOptions {
        batch_size: batch_size.unwrap_or(config.estimator.batch_size),
        full_dataset,
        full_scan_ceiling: config.estimator.full_scan_ceiling,
        cursor_page_cap: config.estimator.cursor_page_cap,
        offset_page_size: config.estimator.offset_page_size,
        show_progress: true,
    }
}

/// Build the Tooling API client, degrading to CLI-only access when
/// the org connection details are incomplete.
async fn tooling_client(cli: &SfCli) -> Option<ToolingClient> {
    match cli.org_display().await {
        Ok(info) => match ToolingClient::from_org(&info) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!("No direct API access ({}); using CLI fallbacks", e);
                None
            }
        },
        Err(e) => {
            warn!("Could not read org connection details: {}", e);
            None
        }
    }
}

async fn handle_usage(
    cli: &SfCli,
    object: &str,
    fields: &[String],
    options: &EstimatorOptions,
    quiet: bool,
) -> Result<()> {
    cli.check_installed().await?;

    println!(
        "Analyzing usage for fields in {}: {}",
        object,
        fields.join(", ")
    );
    println!(
        "Using {}",
        if options.full_dataset {
            "complete dataset".to_string()
        } else {
            format!("batches of {} records", options.batch_size)
        }
    );

    let results = usage::analyze_fields(cli, object, fields, None, options).await?;
    if !quiet {
        report::print_usage_table(object, &results);
    }
    Ok(())
}

async fn handle_data_audit(
    cli: &SfCli,
    objects: Option<Vec<String>>,
    output: Option<PathBuf>,
    csv_output: Option<PathBuf>,
    options: &EstimatorOptions,
) -> Result<()> {
    cli.check_installed().await?;

    println!("Starting field usage audit");
    println!("Batch size: {}", options.batch_size);

    let mut plan = audit::data_audit::AuditPlan::default();
    if let Some(ref objects) = objects {
        plan = plan.restrict_to(objects);
        if plan.entities.is_empty() {
            anyhow::bail!("No valid objects specified for audit");
        }
    }

    let results = audit::data_audit::run_audit(cli, &plan, options).await?;

    let company = cli.company_name().await;
    let json_path = output.unwrap_or_else(|| PathBuf::from(format!("{}_data_audit.json", company)));
    let csv_path =
        csv_output.unwrap_or_else(|| PathBuf::from(format!("{}_data_audit.csv", company)));

    report::write_json(&results, &json_path)?;
    println!("\nAudit results saved to {}", json_path.display());
    report::write_usage_csv(&results, &csv_path)?;
    println!("CSV results saved to {}", csv_path.display());

    println!("\n{}", "=".repeat(90));
    println!("FIELD USAGE AUDIT SUMMARY");
    println!("{}", "=".repeat(90));
    for (entity, usage) in &results {
        report::print_usage_table(entity, usage);
    }
    Ok(())
}

async fn handle_kpi(
    cli: &SfCli,
    objects: Option<Vec<String>>,
    output: Option<PathBuf>,
) -> Result<()> {
    cli.check_installed().await?;

    println!("Starting KPI audits");
    let entities = objects.unwrap_or_default();
    let today = chrono::Local::now().date_naive();
    let result = audit::kpi::run_kpi_audit(cli, &entities, today).await;

    audit::kpi::print_summary(&result);

    let company = cli.company_name().await;
    let path = output.unwrap_or_else(|| PathBuf::from(format!("{}_kpi_audit.json", company)));
    report::write_json(&result, &path)?;
    println!("\nKPI results saved to {}", path.display());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn handle_attribution(
    cli: &SfCli,
    config: &Config,
    policy: MatchPolicy,
    estimator: EstimatorOptions,
    output: Option<PathBuf>,
    analyze: bool,
    with_tools: bool,
    api_key: Option<String>,
) -> Result<()> {
    cli.check_installed().await?;
    let tooling = tooling_client(cli).await;

    let ctx = audit::attribution::AttributionContext {
        cli,
        tooling: tooling.as_ref(),
        policy,
        keywords: KeywordConfig::default(),
        estimator: estimator.clone(),
    };

    println!("🔎 Running attribution audit...");
    let result = audit::attribution::run_attribution_audit(&ctx).await?;

    let json_path = output.unwrap_or_else(|| {
        PathBuf::from(format!("{}_attribution_audit.json", result.company_name))
    });
    report::write_json(&result, &json_path)?;
    println!("\n===== AUDIT RESULTS SAVED =====");
    println!("Results saved to: {}", json_path.display());

    audit::attribution::print_summary(&result);

    if analyze {
        let analysis = run_analysis(cli, config, policy, estimator, &result, with_tools, api_key, None)
            .await?;
        let analysis_path = PathBuf::from(format!("{}_analysis.txt", result.company_name));
        std::fs::write(&analysis_path, &analysis)
            .with_context(|| format!("Failed to write {}", analysis_path.display()))?;
        println!("\nAnalysis saved to: {}", analysis_path.display());
    }
    Ok(())
}

/// Relay an audit to the AI analyst, with or without tool access.
#[allow(clippy::too_many_arguments)]
async fn run_analysis(
    cli: &SfCli,
    config: &Config,
    policy: MatchPolicy,
    estimator: EstimatorOptions,
    audit_result: &AttributionAudit,
    with_tools: bool,
    api_key: Option<String>,
    extra_query: Option<&str>,
) -> Result<String> {
    let api_key = api_key.context(
        "API key not found. Set OPENAI_API_KEY in your environment or pass --api-key.",
    )?;

    let relay = NarrativeRelay::new(RelayConfig {
        api_url: config.model.api_url.clone(),
        api_key,
        model: config.model.name.clone(),
        temperature: config.model.temperature,
        max_tokens: config.model.max_tokens,
        max_turns: config.model.max_turns,
        timeout_seconds: config.model.timeout_seconds,
        ..Default::default()
    })?;

    let mut user_prompt = prompt::attribution_prompt(audit_result);
    if let Some(query) = extra_query {
        user_prompt.push_str("\nAdditional question: ");
        user_prompt.push_str(query);
    }

    println!("\n🤖 Analyzing audit with {}...", config.model.name);
    if with_tools {
        let tooling = tooling_client(cli).await;
        let toolbox = Toolbox {
            cli,
            tooling: tooling.as_ref(),
            policy,
            truncation: TruncationPolicy::default(),
            usage_options: Some(estimator),
        };
        relay
            .analyze_with_tools(prompt::REVOPS_SYSTEM_PROMPT, &user_prompt, &toolbox)
            .await
    } else {
        relay
            .analyze(prompt::ATTRIBUTION_SYSTEM_PROMPT, &user_prompt)
            .await
    }
}

async fn handle_search(cli: &SfCli, policy: MatchPolicy, surface: SearchCommand) -> Result<()> {
    cli.check_installed().await?;

    match surface {
        SearchCommand::Fields { terms, objects } => {
            let terms = split_terms(&terms);
            let results =
                search::fields::search_fields_multi_terms(cli, &objects, &terms, &policy).await?;
            print_json(&results)?;
            print_json(&search::fields::summarize(&results, &objects))?;
        }
        SearchCommand::Objects { terms, scope, fuzzy } => {
            let terms = split_terms(&terms);
            let fuzzy_policy = fuzzy.then_some(&policy);
            let results =
                search::objects::search_objects_with_terms(cli, &terms, scope, fuzzy_policy)
                    .await?;
            print_json(&results)?;
            print_json(&search::objects::summarize(&results))?;
        }
        SearchCommand::Apex { terms, apex_type } => {
            let tooling = tooling_client(cli).await;
            for term in split_terms(&terms) {
                let matches = search::apex::search_apex_with_term(
                    cli,
                    tooling.as_ref(),
                    &term,
                    apex_type,
                    &policy,
                )
                .await?;
                println!("\nResults for term '{}':", term);
                for m in &matches {
                    println!("  {} {} ({})", m.apex_type, m.name, m.id);
                }
                if matches.is_empty() {
                    println!("  No matching Apex found");
                }
            }
        }
        SearchCommand::Flows { terms, status } => {
            let tooling = tooling_client(cli).await;
            let terms = split_terms(&terms);
            let results = search::flows::search_flows_multi_terms(
                cli,
                tooling.as_ref(),
                &terms,
                &policy,
                status.as_deref(),
            )
            .await?;
            print_json(&results)?;
        }
        SearchCommand::Reports { terms } => {
            let terms = split_terms(&terms);
            let results =
                search::reports::search_reports_and_dashboards(cli, &terms, &policy).await?;
            print_json(&results)?;
            print_json(&search::reports::summarize(&results))?;
        }
        SearchCommand::Packages { terms } => {
            let tooling = tooling_client(cli).await;
            let terms = split_terms(&terms);
            let results = search::packages::search_packages_multi_terms(
                cli,
                tooling.as_ref(),
                &terms,
                &policy,
            )
            .await?;
            print_json(&results)?;
        }
    }
    Ok(())
}

async fn handle_influence(cli: &SfCli, output: Option<PathBuf>) -> Result<()> {
    cli.check_installed().await?;
    let tooling = tooling_client(cli).await;

    let result = search::influence::influence_report(cli, tooling.as_ref()).await?;
    print_json(&result)?;

    let path = output.unwrap_or_else(|| PathBuf::from("campaign_influence_settings.json"));
    report::write_json(&result, &path)?;
    println!("\nResults saved to: {}", path.display());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn handle_analyze(
    cli: &SfCli,
    config: &Config,
    policy: MatchPolicy,
    estimator: EstimatorOptions,
    input: PathBuf,
    output: Option<PathBuf>,
    with_tools: bool,
    query: Option<String>,
    api_key: Option<String>,
) -> Result<()> {
    println!("Loading data from: {}", input.display());
    let raw = std::fs::read_to_string(&input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let audit_result: AttributionAudit = serde_json::from_str(&raw)
        .with_context(|| format!("'{}' is not a valid audit report", input.display()))?;

    if with_tools {
        cli.check_installed().await?;
    }

    let analysis = run_analysis(
        cli,
        config,
        policy,
        estimator,
        &audit_result,
        with_tools,
        api_key,
        query.as_deref(),
    )
    .await?;

    let path = output.unwrap_or_else(|| {
        let stem = if audit_result.company_name.is_empty() {
            input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "audit".to_string())
        } else {
            audit_result.company_name.clone()
        };
        PathBuf::from(format!("{}_analysis.txt", stem))
    });
    std::fs::write(&path, &analysis)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("\nAnalysis saved to: {}", path.display());
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to format results")?
    );
    Ok(())
}
