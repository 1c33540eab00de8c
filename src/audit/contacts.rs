//! Contact KPI calculator.

use super::{activity_buckets, is_blank, pct, ActivityBuckets};
use crate::models::Record;
use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ContactMetrics {
    pub total_contacts: u64,
    pub missing_account: u64,
    pub missing_account_pct: f64,
    pub missing_email: u64,
    pub missing_email_pct: f64,
    pub missing_title: u64,
    pub missing_title_pct: f64,
    pub activity: ActivityBuckets,
}

impl ContactMetrics {
    pub fn compute(contacts: &[Record], today: NaiveDate) -> Self {
        let total = contacts.len() as u64;
        let missing = |key: &str| contacts.iter().filter(|r| is_blank(r, key)).count() as u64;

        let missing_account = missing("AccountId");
        let missing_email = missing("Email");
        let missing_title = missing("Title");

        Self {
            total_contacts: total,
            missing_account,
            missing_account_pct: pct(missing_account, total),
            missing_email,
            missing_email_pct: pct(missing_email, total),
            missing_title,
            missing_title_pct: pct(missing_title, total),
            activity: activity_buckets(contacts, "LastActivityDate", today),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::test_support::{record, today};
    use serde_json::{json, Value};

    #[test]
    fn test_contact_metrics() {
        let contacts = vec![
            record(&[
                ("AccountId", json!("001A")),
                ("Email", json!("a@acme.io")),
                ("Title", json!("CTO")),
                ("LastActivityDate", json!("2024-05-30")),
            ]),
            record(&[
                ("AccountId", Value::Null),
                ("Email", json!("")),
                ("Title", Value::Null),
                ("LastActivityDate", Value::Null),
            ]),
        ];

        let metrics = ContactMetrics::compute(&contacts, today());
        assert_eq!(metrics.total_contacts, 2);
        assert_eq!(metrics.missing_account, 1);
        assert_eq!(metrics.missing_email, 1);
        assert_eq!(metrics.missing_title, 1);
        assert_eq!(metrics.missing_email_pct, 50.0);
        assert_eq!(metrics.activity.never, 1);
        assert_eq!(metrics.activity.within_90_days, 1);
    }
}
