//! Event (meeting) KPI calculator.
//!
//! Measures how many meetings happen on an account before its first
//! opportunity is created.

use super::{date_field, text_field};
use crate::models::Record;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, Serialize)]
pub struct EventMetrics {
    pub total_events: u64,
    /// Events whose WhatId points at a known account.
    pub account_events: u64,
    /// Accounts that had at least one event before their first
    /// opportunity.
    pub accounts_with_pre_opp_events: u64,
    /// Mean events before the first opportunity, over those accounts.
    pub avg_events_before_first_opportunity: f64,
}

impl EventMetrics {
    /// `events` need `WhatId` and `CreatedDate`; `opportunities` need
    /// `AccountId` and `CreatedDate`; `account_ids` scopes events to
    /// real accounts.
    pub fn compute(
        events: &[Record],
        account_ids: &BTreeSet<String>,
        opportunities: &[Record],
    ) -> Self {
        let total_events = events.len() as u64;

        let account_events: Vec<&Record> = events
            .iter()
            .filter(|e| {
                text_field(e, "WhatId")
                    .map(|id| account_ids.contains(id))
                    .unwrap_or(false)
            })
            .collect();

        // Earliest opportunity per account.
        let mut first_opp = BTreeMap::new();
        for opp in opportunities {
            let (Some(account_id), Some(created)) =
                (text_field(opp, "AccountId"), date_field(opp, "CreatedDate"))
            else {
                continue;
            };
            first_opp
                .entry(account_id.to_string())
                .and_modify(|existing| {
                    if created < *existing {
                        *existing = created;
                    }
                })
                .or_insert(created);
        }

        let mut accounts_with_events = 0u64;
        let mut total_before = 0u64;
        for (account_id, first_date) in &first_opp {
            let before = account_events
                .iter()
                .filter(|e| text_field(e, "WhatId") == Some(account_id.as_str()))
                .filter(|e| {
                    date_field(e, "CreatedDate")
                        .map(|d| d < *first_date)
                        .unwrap_or(false)
                })
                .count() as u64;
            if before > 0 {
                accounts_with_events += 1;
                total_before += before;
            }
        }

        let avg = if accounts_with_events > 0 {
            total_before as f64 / accounts_with_events as f64
        } else {
            0.0
        };

        Self {
            total_events,
            account_events: account_events.len() as u64,
            accounts_with_pre_opp_events: accounts_with_events,
            avg_events_before_first_opportunity: avg,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::test_support::record;
    use serde_json::json;

    fn event(what_id: &str, created: &str) -> Record {
        record(&[("WhatId", json!(what_id)), ("CreatedDate", json!(created))])
    }

    fn opp(account_id: &str, created: &str) -> Record {
        record(&[
            ("AccountId", json!(account_id)),
            ("CreatedDate", json!(created)),
        ])
    }

    #[test]
    fn test_events_before_first_opportunity() {
        let accounts: BTreeSet<String> = ["001A", "001B"].iter().map(|s| s.to_string()).collect();
        let events = vec![
            event("001A", "2024-01-01"),
            event("001A", "2024-01-15"),
            event("001A", "2024-03-01"), // after the first opp
            event("001B", "2024-02-01"), // account without opportunities
            event("003X", "2024-01-01"), // not an account
        ];
        let opportunities = vec![opp("001A", "2024-02-01"), opp("001A", "2024-04-01")];

        let metrics = EventMetrics::compute(&events, &accounts, &opportunities);
        assert_eq!(metrics.total_events, 5);
        assert_eq!(metrics.account_events, 4);
        assert_eq!(metrics.accounts_with_pre_opp_events, 1);
        assert_eq!(metrics.avg_events_before_first_opportunity, 2.0);
    }

    #[test]
    fn test_no_opportunities_yields_zero_average() {
        let accounts: BTreeSet<String> = ["001A".to_string()].into_iter().collect();
        let events = vec![event("001A", "2024-01-01")];
        let metrics = EventMetrics::compute(&events, &accounts, &[]);
        assert_eq!(metrics.avg_events_before_first_opportunity, 0.0);
    }
}
