//! Account KPI calculator.

use super::{activity_buckets, date_field, is_blank, number_field, pct, text_field, value_counts, ActivityBuckets};
use crate::models::Record;
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// One account in the lifetime-value ranking.
#[derive(Debug, Clone, Serialize)]
pub struct TopAccount {
    pub account_id: String,
    pub name: String,
    pub lifetime_value: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AccountMetrics {
    pub total_accounts: u64,
    pub blank_website: u64,
    pub blank_website_pct: f64,
    pub activity: ActivityBuckets,
    /// Year-over-year growth of created accounts; absent when last
    /// year had none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub growth_rate_pct: Option<f64>,
    pub accounts_by_industry: BTreeMap<String, u64>,
    pub accounts_by_type: BTreeMap<String, u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_account_age_years: Option<f64>,
    /// Accounts with at least one won opportunity.
    pub customer_count: u64,
    pub customer_pct: f64,
    pub average_lifetime_value: f64,
    pub top_accounts_by_lifetime_value: Vec<TopAccount>,
}

/// How many accounts make the lifetime-value ranking.
const TOP_ACCOUNTS: usize = 10;

impl AccountMetrics {
    /// Reduce account records plus won-opportunity records to KPIs.
    pub fn compute(accounts: &[Record], won_opportunities: &[Record], today: NaiveDate) -> Self {
        let total = accounts.len() as u64;

        let blank_website = accounts.iter().filter(|r| is_blank(r, "Website")).count() as u64;

        let current_year = today.year();
        let created_years: Vec<i32> = accounts
            .iter()
            .filter_map(|r| date_field(r, "CreatedDate"))
            .map(|d| d.year())
            .collect();
        let count_current = created_years.iter().filter(|y| **y == current_year).count() as i64;
        let count_previous = created_years
            .iter()
            .filter(|y| **y == current_year - 1)
            .count() as i64;
        let growth_rate_pct = if count_previous > 0 {
            let rate = (count_current - count_previous) as f64 / count_previous as f64 * 100.0;
            Some((rate * 100.0).round() / 100.0)
        } else {
            None
        };

        let ages: Vec<i64> = accounts
            .iter()
            .filter_map(|r| date_field(r, "CreatedDate"))
            .map(|d| (today - d).num_days())
            .collect();
        let average_account_age_years = if ages.is_empty() {
            None
        } else {
            let mean_days = ages.iter().sum::<i64>() as f64 / ages.len() as f64;
            Some(mean_days / 365.0)
        };

        // Lifetime value per account from won opportunities.
        let mut lifetime_values: BTreeMap<String, f64> = BTreeMap::new();
        let mut opp_account_names: BTreeMap<String, String> = BTreeMap::new();
        let account_names: BTreeMap<&str, &str> = accounts
            .iter()
            .filter_map(|r| Some((text_field(r, "Id")?, text_field(r, "Name")?)))
            .collect();

        for opp in won_opportunities {
            let Some(account_id) = text_field(opp, "AccountId") else {
                continue;
            };
            let amount = number_field(opp, "Amount").unwrap_or(0.0);
            *lifetime_values.entry(account_id.to_string()).or_insert(0.0) += amount;

            let name = opp
                .get("Account")
                .and_then(Value::as_object)
                .and_then(|a| a.get("Name"))
                .and_then(Value::as_str)
                .or_else(|| account_names.get(account_id).copied())
                .unwrap_or("Unknown");
            opp_account_names.insert(account_id.to_string(), name.to_string());
        }

        let customer_count = lifetime_values.len() as u64;
        let average_lifetime_value = if customer_count > 0 {
            lifetime_values.values().sum::<f64>() / customer_count as f64
        } else {
            0.0
        };

        let mut ranked: Vec<TopAccount> = lifetime_values
            .iter()
            .map(|(account_id, value)| TopAccount {
                account_id: account_id.clone(),
                name: opp_account_names
                    .get(account_id)
                    .cloned()
                    .unwrap_or_else(|| "Unknown".to_string()),
                lifetime_value: *value,
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.lifetime_value
                .partial_cmp(&a.lifetime_value)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(TOP_ACCOUNTS);

        Self {
            total_accounts: total,
            blank_website,
            blank_website_pct: pct(blank_website, total),
            activity: activity_buckets(accounts, "LastActivityDate", today),
            growth_rate_pct,
            accounts_by_industry: value_counts(accounts, "Industry"),
            accounts_by_type: value_counts(accounts, "Type"),
            average_account_age_years,
            customer_count,
            customer_pct: pct(customer_count, total),
            average_lifetime_value,
            top_accounts_by_lifetime_value: ranked,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::test_support::{record, today};
    use serde_json::json;

    fn account(id: &str, name: &str, website: Value, created: &str, industry: &str) -> Record {
        record(&[
            ("Id", json!(id)),
            ("Name", json!(name)),
            ("Website", website),
            ("CreatedDate", json!(created)),
            ("Industry", json!(industry)),
            ("Type", json!("Customer")),
            ("LastActivityDate", Value::Null),
        ])
    }

    fn won_opp(account_id: &str, amount: f64) -> Record {
        record(&[("AccountId", json!(account_id)), ("Amount", json!(amount))])
    }

    #[test]
    fn test_account_metrics() {
        let accounts = vec![
            account("001A", "Acme", json!("https://acme.io"), "2024-02-01", "Software"),
            account("001B", "Globex", Value::Null, "2023-03-01", "Software"),
            account("001C", "Initech", json!(""), "2023-05-01", "Finance"),
        ];
        let won = vec![won_opp("001A", 1000.0), won_opp("001A", 500.0), won_opp("001B", 200.0)];

        let metrics = AccountMetrics::compute(&accounts, &won, today());

        assert_eq!(metrics.total_accounts, 3);
        assert_eq!(metrics.blank_website, 2);
        assert_eq!(metrics.activity.never, 3);
        assert_eq!(metrics.accounts_by_industry.get("Software"), Some(&2));
        assert_eq!(metrics.customer_count, 2);
        assert_eq!(metrics.average_lifetime_value, 850.0);
        assert_eq!(metrics.top_accounts_by_lifetime_value[0].account_id, "001A");
        assert_eq!(
            metrics.top_accounts_by_lifetime_value[0].lifetime_value,
            1500.0
        );
        // 1 created this year vs 2 last year.
        assert_eq!(metrics.growth_rate_pct, Some(-50.0));
    }

    #[test]
    fn test_no_won_opportunities() {
        let accounts = vec![account(
            "001A",
            "Acme",
            json!("x"),
            "2024-01-01",
            "Software",
        )];
        let metrics = AccountMetrics::compute(&accounts, &[], today());
        assert_eq!(metrics.customer_count, 0);
        assert_eq!(metrics.average_lifetime_value, 0.0);
        assert!(metrics.top_accounts_by_lifetime_value.is_empty());
    }
}
