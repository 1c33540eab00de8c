//! Lead KPI calculator.

use super::{activity_buckets, bool_field, is_blank, pct, ActivityBuckets};
use crate::models::Record;
use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct LeadMetrics {
    pub total_leads: u64,
    pub missing_email: u64,
    pub missing_email_pct: f64,
    pub missing_title: u64,
    pub missing_title_pct: f64,
    pub converted: u64,
    pub converted_pct: f64,
    pub activity: ActivityBuckets,
}

impl LeadMetrics {
    pub fn compute(leads: &[Record], today: NaiveDate) -> Self {
        let total = leads.len() as u64;

        let missing_email = leads.iter().filter(|r| is_blank(r, "Email")).count() as u64;
        let missing_title = leads.iter().filter(|r| is_blank(r, "Title")).count() as u64;
        let converted = leads.iter().filter(|r| bool_field(r, "IsConverted")).count() as u64;

        Self {
            total_leads: total,
            missing_email,
            missing_email_pct: pct(missing_email, total),
            missing_title,
            missing_title_pct: pct(missing_title, total),
            converted,
            converted_pct: pct(converted, total),
            activity: activity_buckets(leads, "LastActivityDate", today),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::test_support::{record, today};
    use serde_json::{json, Value};

    #[test]
    fn test_lead_metrics() {
        let leads = vec![
            record(&[
                ("Email", json!("lead@x.io")),
                ("Title", Value::Null),
                ("IsConverted", json!(true)),
                ("LastActivityDate", json!("2023-01-01")),
            ]),
            record(&[
                ("Email", Value::Null),
                ("Title", json!("VP")),
                ("IsConverted", json!("false")),
                ("LastActivityDate", Value::Null),
            ]),
        ];

        let metrics = LeadMetrics::compute(&leads, today());
        assert_eq!(metrics.total_leads, 2);
        assert_eq!(metrics.missing_email, 1);
        assert_eq!(metrics.missing_title, 1);
        assert_eq!(metrics.converted, 1);
        assert_eq!(metrics.converted_pct, 50.0);
        assert_eq!(metrics.activity.over_90_days, 1);
        assert_eq!(metrics.activity.never, 1);
    }

    #[test]
    fn test_boolean_strings_count_as_converted() {
        let leads = vec![record(&[("IsConverted", json!("TRUE"))])];
        let metrics = LeadMetrics::compute(&leads, today());
        assert_eq!(metrics.converted, 1);
    }
}
