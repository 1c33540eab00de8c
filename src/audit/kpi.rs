//! Sequential driver for the per-entity KPI audits.
//!
//! Fetches each entity's records and runs the pure calculators in a
//! fixed order. A failed section is recorded and skipped; the rest of
//! the run continues.

use super::accounts::AccountMetrics;
use super::contacts::ContactMetrics;
use super::events::EventMetrics;
use super::leads::LeadMetrics;
use super::opportunities::OpportunityMetrics;
use super::text_field;
use crate::models::Record;
use crate::sf::query::DataSource;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Combined output of one KPI run. Sections are absent when their
/// queries failed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct KpiReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accounts: Option<AccountMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contacts: Option<ContactMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leads: Option<LeadMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opportunities: Option<OpportunityMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<EventMetrics>,
    /// Sections that failed, with the reason.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_sections: Vec<String>,
}

async fn fetch(source: &dyn DataSource, soql: &str) -> Result<Vec<Record>, String> {
    source
        .query(soql)
        .await
        .map(|page| page.records)
        .map_err(|e| e.to_string())
}

/// Run every KPI audit in sequence against `today`.
pub async fn run_kpi_audit(
    source: &dyn DataSource,
    entities: &[String],
    today: NaiveDate,
) -> KpiReport {
    let mut report = KpiReport::default();
    let wanted =
        |name: &str| entities.is_empty() || entities.iter().any(|e| e.eq_ignore_ascii_case(name));
    let fail = |section: &str, reason: String, failed: &mut Vec<String>| {
        warn!("{} audit failed: {}", section, reason);
        failed.push(format!("{}: {}", section, reason));
    };

    if wanted("Account") {
        info!("Running Account audit");
        let accounts = fetch(
            source,
            "SELECT Id, Name, CreatedDate, LastActivityDate, Industry, Type, Website FROM Account",
        )
        .await;
        let won = fetch(
            source,
            "SELECT Id, AccountId, Account.Name, Amount FROM Opportunity WHERE IsWon = TRUE",
        )
        .await;
        match accounts {
            Ok(accounts) => {
                // Won opportunities are optional enrichment.
                let won = won.unwrap_or_else(|e| {
                    warn!("Won-opportunity query failed: {}", e);
                    Vec::new()
                });
                report.accounts = Some(AccountMetrics::compute(&accounts, &won, today));
            }
            Err(e) => fail("Account", e, &mut report.failed_sections),
        }
    }

    if wanted("Contact") {
        info!("Running Contact audit");
        match fetch(
            source,
            "SELECT AccountId, Email, Id, LastActivityDate, Title FROM Contact",
        )
        .await
        {
            Ok(contacts) => report.contacts = Some(ContactMetrics::compute(&contacts, today)),
            Err(e) => fail("Contact", e, &mut report.failed_sections),
        }
    }

    if wanted("Lead") {
        info!("Running Lead audit");
        match fetch(
            source,
            "SELECT Email, Id, LastActivityDate, Title, IsConverted FROM Lead",
        )
        .await
        {
            Ok(leads) => report.leads = Some(LeadMetrics::compute(&leads, today)),
            Err(e) => fail("Lead", e, &mut report.failed_sections),
        }
    }

    if wanted("Opportunity") {
        info!("Running Opportunity audit");
        match fetch(
            source,
            "SELECT Amount, CloseDate, CreatedDate, ForecastCategoryName, Id, IsClosed, IsWon, \
             LastActivityDate, NextStep, Probability, StageName FROM Opportunity",
        )
        .await
        {
            Ok(opportunities) => {
                report.opportunities = Some(OpportunityMetrics::compute(&opportunities, today))
            }
            Err(e) => fail("Opportunity", e, &mut report.failed_sections),
        }
    }

    if wanted("Event") {
        info!("Running Event audit");
        let events = fetch(
            source,
            "SELECT Id, Subject, ActivityDate, WhatId, WhoId, CreatedDate FROM Event",
        )
        .await;
        let accounts = fetch(source, "SELECT Id FROM Account").await;
        let opportunities = fetch(
            source,
            "SELECT Id, AccountId, CreatedDate FROM Opportunity ORDER BY CreatedDate ASC",
        )
        .await;

        match (events, accounts, opportunities) {
            (Ok(events), Ok(accounts), Ok(opportunities)) => {
                let account_ids: BTreeSet<String> = accounts
                    .iter()
                    .filter_map(|r| text_field(r, "Id"))
                    .map(String::from)
                    .collect();
                report.events = Some(EventMetrics::compute(&events, &account_ids, &opportunities));
            }
            (events, accounts, opportunities) => {
                let reason = [
                    events.err().map(|e| format!("events: {}", e)),
                    accounts.err().map(|e| format!("accounts: {}", e)),
                    opportunities.err().map(|e| format!("opportunities: {}", e)),
                ]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join("; ");
                fail("Event", reason, &mut report.failed_sections);
            }
        }
    }

    report
}

/// Console summary in the original per-entity layout.
pub fn print_summary(report: &KpiReport) {
    if let Some(ref m) = report.accounts {
        println!("\n--- Account KPIs ---");
        println!("Total Accounts = {}", m.total_accounts);
        println!(
            "  No Website = {} ({:.2}%)",
            m.blank_website, m.blank_website_pct
        );
        println!("No Sales Activity");
        println!("  Ever = {}", m.activity.never);
        println!("  >90 Days = {}", m.activity.over_90_days);
        println!("  <90 Days = {}", m.activity.within_90_days);
        println!(
            "Customer Count = {} ({:.2}%)",
            m.customer_count, m.customer_pct
        );
        println!(
            "Average Lifetime Customer Value = ${:.2}",
            m.average_lifetime_value
        );
        if !m.top_accounts_by_lifetime_value.is_empty() {
            println!("Top Accounts by Lifetime Value:");
            for (i, top) in m.top_accounts_by_lifetime_value.iter().enumerate() {
                println!("  {}. {}: ${:.2}", i + 1, top.name, top.lifetime_value);
            }
        }
    }

    if let Some(ref m) = report.contacts {
        println!("\n--- Contact KPIs ---");
        println!("Total Contacts = {}", m.total_contacts);
        println!(
            "  No Account = {} ({:.2}%)",
            m.missing_account, m.missing_account_pct
        );
        println!(
            "  No Email = {} ({:.2}%)",
            m.missing_email, m.missing_email_pct
        );
        println!(
            "  No Title = {} ({:.2}%)",
            m.missing_title, m.missing_title_pct
        );
    }

    if let Some(ref m) = report.leads {
        println!("\n--- Lead KPIs ---");
        println!("Leads = {}", m.total_leads);
        println!(
            "  No Email = {} ({:.2}%)",
            m.missing_email, m.missing_email_pct
        );
        println!(
            "  Converted = {} ({:.2}%)",
            m.converted, m.converted_pct
        );
    }

    if let Some(ref m) = report.opportunities {
        println!("\n--- Opportunity KPIs ---");
        println!("Total Opportunities = {}", m.total_opportunities);
        println!("  Open = {} ({:.1}%)", m.open, m.open_pct);
        println!(
            "  Past Close Date = {} ({:.1}%)",
            m.past_close_date, m.past_close_date_pct
        );
        println!("  Won = {} ({:.1}%)", m.won, m.won_pct);
        println!("  Lost = {} ({:.1}%)", m.lost, m.lost_pct);
        println!("  Win Rate = {:.2}%", m.win_rate_pct);
        println!("  Avg. Deal Size (Won) = ${:.2}", m.average_won_deal_size);
        if let Some(cycle) = m.average_sales_cycle_days {
            println!("  Avg. Sales Cycle (days to Won): {:.2}", cycle);
        }
        println!("  Total Pipeline Value: ${:.2}", m.pipeline_value);
        println!(
            "  Weighted Pipeline Value: ${:.2}",
            m.weighted_pipeline_value
        );
    }

    if let Some(ref m) = report.events {
        println!("\n--- Event KPIs ---");
        println!("  Total Events = {}", m.total_events);
        println!(
            "  Avg. Meetings to 1st Opp: {:.2}",
            m.avg_events_before_first_opportunity
        );
    }

    if !report.failed_sections.is_empty() {
        println!("\nFailed sections:");
        for section in &report.failed_sections {
            println!("  ✗ {}", section);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{SfError, SfResult};
    use crate::models::EntitySchema;
    use crate::sf::query::QueryPage;
    use async_trait::async_trait;
    use serde_json::json;

    /// Serves canned records per entity; `fail_entity` queries error.
    struct CannedSource {
        fail_entity: Option<&'static str>,
    }

    #[async_trait]
    impl DataSource for CannedSource {
        async fn count_records(&self, _entity: &str) -> SfResult<u64> {
            Ok(0)
        }

        async fn query(&self, soql: &str) -> SfResult<QueryPage> {
            if let Some(entity) = self.fail_entity {
                if soql.contains(&format!("FROM {}", entity)) {
                    return Err(SfError::Query("simulated failure".into()));
                }
            }
            let records = if soql.contains("FROM Account") {
                vec![record(&[
                    ("Id", json!("001A")),
                    ("Name", json!("Acme")),
                    ("Website", json!("https://acme.io")),
                    ("CreatedDate", json!("2024-01-01")),
                ])]
            } else if soql.contains("FROM Contact") {
                vec![record(&[("Id", json!("003A")), ("Email", json!("a@b.c"))])]
            } else {
                Vec::new()
            };
            let total_size = records.len() as u64;
            Ok(QueryPage {
                total_size,
                done: true,
                records,
            })
        }

        async fn describe(&self, entity: &str) -> SfResult<EntitySchema> {
            Ok(EntitySchema {
                entity: entity.to_string(),
                fields: Vec::new(),
            })
        }
    }

    use crate::audit::test_support::{record, today};

    #[tokio::test]
    async fn test_all_sections_run() {
        let source = CannedSource { fail_entity: None };
        let report = run_kpi_audit(&source, &[], today()).await;
        assert!(report.accounts.is_some());
        assert!(report.contacts.is_some());
        assert!(report.leads.is_some());
        assert!(report.opportunities.is_some());
        assert!(report.events.is_some());
        assert!(report.failed_sections.is_empty());
    }

    #[tokio::test]
    async fn test_failed_section_is_isolated() {
        let source = CannedSource {
            fail_entity: Some("Contact"),
        };
        let report = run_kpi_audit(&source, &[], today()).await;
        assert!(report.contacts.is_none());
        assert!(report.accounts.is_some());
        assert_eq!(report.failed_sections.len(), 1);
        assert!(report.failed_sections[0].starts_with("Contact"));
    }

    #[tokio::test]
    async fn test_entity_filter() {
        let source = CannedSource { fail_entity: None };
        let report = run_kpi_audit(&source, &["Lead".to_string()], today()).await;
        assert!(report.accounts.is_none());
        assert!(report.leads.is_some());
    }
}
