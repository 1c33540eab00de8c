//! Opportunity KPI calculator.

use super::{
    activity_buckets, bool_field, date_field, is_blank, number_field, pct, text_field,
    value_counts, ActivityBuckets,
};
use crate::models::Record;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize)]
pub struct OpportunityMetrics {
    pub total_opportunities: u64,
    pub open: u64,
    pub open_pct: f64,
    pub won: u64,
    pub won_pct: f64,
    pub lost: u64,
    pub lost_pct: f64,
    /// Open opportunities whose close date has already passed.
    pub past_close_date: u64,
    pub past_close_date_pct: f64,
    pub win_rate_pct: f64,
    pub blank_next_step: u64,
    pub blank_next_step_pct: f64,
    pub activity: ActivityBuckets,
    pub pipeline_value: f64,
    pub weighted_pipeline_value: f64,
    pub average_won_deal_size: f64,
    /// Mean days from creation to close for won deals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_sales_cycle_days: Option<f64>,
    pub stage_distribution: BTreeMap<String, u64>,
    /// Share of closed deals whose forecast category was "Closed".
    pub forecast_accuracy_pct: f64,
}

impl OpportunityMetrics {
    pub fn compute(opportunities: &[Record], today: NaiveDate) -> Self {
        let total = opportunities.len() as u64;

        let open: Vec<&Record> = opportunities
            .iter()
            .filter(|r| !bool_field(r, "IsClosed"))
            .collect();
        let closed: Vec<&Record> = opportunities
            .iter()
            .filter(|r| bool_field(r, "IsClosed"))
            .collect();
        let won: Vec<&Record> = opportunities
            .iter()
            .filter(|r| bool_field(r, "IsWon"))
            .collect();

        let closed_won = closed.iter().filter(|r| bool_field(r, "IsWon")).count() as u64;
        let lost = closed.len() as u64 - closed_won;
        let win_rate_pct = pct(closed_won, closed.len() as u64);

        let blank_next_step = opportunities
            .iter()
            .filter(|r| is_blank(r, "NextStep"))
            .count() as u64;

        let pipeline_value: f64 = open
            .iter()
            .filter_map(|r| number_field(r, "Amount"))
            .sum();
        let weighted_pipeline_value: f64 = open
            .iter()
            .filter_map(|r| {
                let amount = number_field(r, "Amount")?;
                let probability = number_field(r, "Probability")?;
                Some(amount * probability / 100.0)
            })
            .sum();

        let won_amounts: Vec<f64> = won
            .iter()
            .filter_map(|r| number_field(r, "Amount"))
            .collect();
        let average_won_deal_size = if won_amounts.is_empty() {
            0.0
        } else {
            won_amounts.iter().sum::<f64>() / won_amounts.len() as f64
        };

        let cycles: Vec<i64> = won
            .iter()
            .filter_map(|r| {
                let created = date_field(r, "CreatedDate")?;
                let closed_date = date_field(r, "CloseDate")?;
                Some((closed_date - created).num_days())
            })
            .collect();
        let average_sales_cycle_days = if cycles.is_empty() {
            None
        } else {
            Some(cycles.iter().sum::<i64>() as f64 / cycles.len() as f64)
        };

        let past_close_date = open
            .iter()
            .filter(|r| {
                date_field(r, "CloseDate")
                    .map(|d| d < today)
                    .unwrap_or(false)
            })
            .count() as u64;

        let accurate_forecasts = closed
            .iter()
            .filter(|r| {
                text_field(r, "ForecastCategoryName")
                    .map(|c| c.eq_ignore_ascii_case("closed"))
                    .unwrap_or(false)
            })
            .count() as u64;

        Self {
            total_opportunities: total,
            open: open.len() as u64,
            open_pct: pct(open.len() as u64, total),
            won: won.len() as u64,
            won_pct: pct(won.len() as u64, total),
            lost,
            lost_pct: pct(lost, total),
            past_close_date,
            past_close_date_pct: pct(past_close_date, total),
            win_rate_pct,
            blank_next_step,
            blank_next_step_pct: pct(blank_next_step, total),
            activity: activity_buckets(opportunities, "LastActivityDate", today),
            pipeline_value,
            weighted_pipeline_value,
            average_won_deal_size,
            average_sales_cycle_days,
            stage_distribution: value_counts(opportunities, "StageName"),
            forecast_accuracy_pct: pct(accurate_forecasts, closed.len() as u64),
        }
    }
}
