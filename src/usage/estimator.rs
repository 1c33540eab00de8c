//! Field-usage estimator.
//!
//! For a set of attributes on one entity type, produces a
//! [`UsageResult`] per attribute, choosing the cheapest strategy that
//! still yields an accurate-enough answer:
//!
//! - small populations are read in a single query and measured exactly;
//! - large populations with exhaustive analysis requested are paged
//!   through cursor pagination, falling back to small offset batches,
//!   falling back to sampling;
//! - everything else is sampled and extrapolated, with the result
//!   marked `is_estimated`.

use crate::error::{SfError, SfResult};
use crate::models::{AttributeKind, FieldDescriptor, Record, UsageResult};
use crate::sf::query::{non_null_value, record_id, DataSource};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Tuning knobs for the estimator.
#[derive(Debug, Clone)]
pub struct EstimatorOptions {
    /// Maximum records fetched in one query; also the sample size cap.
    pub batch_size: u64,
    /// Analyze the full population even when it exceeds `batch_size`.
    pub full_dataset: bool,
    /// Populations above this are never scanned exhaustively; the run
    /// downgrades to sampling with a warning. A cost guard, not a
    /// correctness guard.
    pub full_scan_ceiling: u64,
    /// Hard cap on cursor page size.
    pub cursor_page_cap: u64,
    /// Page size for the offset-based fallback.
    pub offset_page_size: u64,
    /// Render a progress bar during pagination.
    pub show_progress: bool,
}

impl Default for EstimatorOptions {
    fn default() -> Self {
        Self {
            batch_size: 5000,
            full_dataset: false,
            full_scan_ceiling: 50_000,
            cursor_page_cap: 2000,
            offset_page_size: 500,
            show_progress: false,
        }
    }
}

/// Analyze usage for `attributes` on `entity`.
///
/// `known_total` skips the count query when the caller already holds
/// the population size. Attributes missing from the schema are dropped
/// with a warning; a failed schema lookup aborts with an error.
pub async fn analyze_fields(
    source: &dyn DataSource,
    entity: &str,
    attributes: &[String],
    known_total: Option<u64>,
    options: &EstimatorOptions,
) -> SfResult<Vec<UsageResult>> {
    let total = match known_total {
        Some(n) => n,
        None => source.count_records(entity).await?,
    };
    info!("Total {} records: {}", entity, total);

    if total == 0 {
        return Ok(attributes
            .iter()
            .map(|a| UsageResult::empty(entity, a))
            .collect());
    }

    let schema = source.describe(entity).await?;
    let mut valid: Vec<FieldDescriptor> = Vec::new();
    for name in attributes {
        match schema.field(name) {
            Some(descriptor) => {
                if descriptor.needs_value_inspection() {
                    debug!(
                        "Field '{}' ({}) can't be tested with a SOQL null filter; \
                         evaluating fetched values instead",
                        descriptor.name, descriptor.field_type
                    );
                }
                valid.push(descriptor.clone());
            }
            None => warn!("Field '{}' does not exist on {}", name, entity),
        }
    }
    if valid.is_empty() {
        warn!("No valid fields found for {}", entity);
        return Ok(Vec::new());
    }

    let mut full_dataset = options.full_dataset;
    if total > options.full_scan_ceiling && full_dataset {
        warn!(
            "Population is very large ({} records); using sampling instead of full analysis",
            total
        );
        full_dataset = false;
    }

    if full_dataset && total > options.batch_size {
        info!("Analyzing full dataset of {} records using pagination", total);
        match cursor_paginate(source, entity, &valid, total, options).await {
            Ok(results) => return Ok(results),
            Err(e) => warn!("Cursor-based pagination failed: {}", e),
        }
        info!("Falling back to smaller batch sizes");
        match offset_paginate(source, entity, &valid, total, options).await {
            Ok(results) => return Ok(results),
            Err(e) => warn!("Small batch processing failed: {}", e),
        }
        info!("Falling back to sampling method");
    }

    sample_once(source, entity, &valid, total, options).await
}

/// Single-query path: exact measurement when the whole population
/// fits in one batch, extrapolated sampling otherwise.
async fn sample_once(
    source: &dyn DataSource,
    entity: &str,
    fields: &[FieldDescriptor],
    total: u64,
    options: &EstimatorOptions,
) -> SfResult<Vec<UsageResult>> {
    let sample_size = options.batch_size.min(total);
    let sampling = sample_size < total;
    if sampling {
        info!(
            "Using sampling with {} records (out of {} total)",
            sample_size, total
        );
    }

    let mut soql = select_clause(entity, fields);
    if sampling {
        soql.push_str(&format!(" LIMIT {}", sample_size));
    }

    let page = source.query(&soql).await?;
    let examined = page.records.len() as u64;

    let mut results = Vec::with_capacity(fields.len());
    for field in fields {
        let non_null = count_non_null(&page.records, field);
        let usage_pct = percentage(non_null, examined);

        if sampling {
            let estimated = ((usage_pct / 100.0) * total as f64).round() as u64;
            results.push(UsageResult {
                entity: entity.to_string(),
                attribute: field.name.clone(),
                total_records: total,
                non_null_records: estimated,
                usage_pct,
                is_estimated: true,
                sample_size: Some(examined),
                records_analyzed: None,
            });
        } else {
            results.push(UsageResult {
                entity: entity.to_string(),
                attribute: field.name.clone(),
                total_records: total,
                non_null_records: non_null,
                usage_pct,
                is_estimated: false,
                sample_size: None,
                records_analyzed: None,
            });
        }
    }
    Ok(results)
}

/// Primary exhaustive strategy: pages ordered by Id, each next page
/// filtered past the last-seen key. Any page failure aborts the whole
/// strategy so the caller can switch to the offset fallback.
async fn cursor_paginate(
    source: &dyn DataSource,
    entity: &str,
    fields: &[FieldDescriptor],
    total: u64,
    options: &EstimatorOptions,
) -> SfResult<Vec<UsageResult>> {
    let page_size = options.batch_size.min(options.cursor_page_cap);
    let progress = progress_bar(total, options.show_progress);

    let mut counts: BTreeMap<String, u64> = fields.iter().map(|f| (f.name.clone(), 0)).collect();
    let mut processed: u64 = 0;
    let mut cursor: Option<String> = None;

    loop {
        let mut soql = select_clause(entity, fields);
        if let Some(ref last_id) = cursor {
            soql.push_str(&format!(" WHERE Id > '{}'", last_id));
        }
        soql.push_str(&format!(" ORDER BY Id LIMIT {}", page_size));

        let page = source.query(&soql).await?;
        if page.records.is_empty() {
            break;
        }

        accumulate(&mut counts, &page.records, fields);
        processed += page.records.len() as u64;
        progress.set_position(processed.min(total));

        if processed >= total || (page.records.len() as u64) < page_size {
            break;
        }

        cursor = match page.records.last().and_then(record_id) {
            Some(id) => Some(id.to_string()),
            // A page without Ids cannot advance the cursor; treat the
            // strategy as broken rather than loop forever.
            None => {
                return Err(SfError::Query(
                    "cursor pagination returned records without Id".to_string(),
                ))
            }
        };
    }
    progress.finish_and_clear();

    Ok(paginated_results(entity, fields, &counts, total, processed))
}

/// Fallback exhaustive strategy: fixed-size offset pages. A failed
/// page is skipped (undercounting its contribution) rather than
/// aborting; the strategy only fails when no page succeeds.
async fn offset_paginate(
    source: &dyn DataSource,
    entity: &str,
    fields: &[FieldDescriptor],
    total: u64,
    options: &EstimatorOptions,
) -> SfResult<Vec<UsageResult>> {
    let page_size = options.offset_page_size.max(1);
    let num_batches = total.div_ceil(page_size);
    info!(
        "Processing with small batches: {} batches of {} records each",
        num_batches, page_size
    );
    let progress = progress_bar(total, options.show_progress);

    let mut counts: BTreeMap<String, u64> = fields.iter().map(|f| (f.name.clone(), 0)).collect();
    let mut processed: u64 = 0;
    let mut any_page_succeeded = false;

    for batch in 0..num_batches {
        let offset = batch * page_size;
        let soql = format!(
            "{} LIMIT {} OFFSET {}",
            select_clause(entity, fields),
            page_size,
            offset
        );

        let page = match source.query(&soql).await {
            Ok(page) => page,
            Err(e) => {
                warn!(
                    "Batch {}/{} failed at offset {}: {}; skipping",
                    batch + 1,
                    num_batches,
                    offset,
                    e
                );
                continue;
            }
        };
        any_page_succeeded = true;
        if page.records.is_empty() {
            break;
        }

        accumulate(&mut counts, &page.records, fields);
        processed += page.records.len() as u64;
        progress.set_position(processed.min(total));
    }
    progress.finish_and_clear();

    if !any_page_succeeded {
        return Err(SfError::Query(
            "offset pagination failed for every batch".to_string(),
        ));
    }

    Ok(paginated_results(entity, fields, &counts, total, processed))
}

fn paginated_results(
    entity: &str,
    fields: &[FieldDescriptor],
    counts: &BTreeMap<String, u64>,
    total: u64,
    processed: u64,
) -> Vec<UsageResult> {
    fields
        .iter()
        .map(|field| {
            let non_null = counts.get(&field.name).copied().unwrap_or(0);
            UsageResult {
                entity: entity.to_string(),
                attribute: field.name.clone(),
                total_records: total,
                non_null_records: non_null,
                usage_pct: percentage(non_null, processed),
                is_estimated: processed < total,
                sample_size: None,
                records_analyzed: Some(processed),
            }
        })
        .collect()
}

fn accumulate(counts: &mut BTreeMap<String, u64>, records: &[Record], fields: &[FieldDescriptor]) {
    for field in fields {
        let n = count_non_null(records, field);
        if let Some(entry) = counts.get_mut(&field.name) {
            *entry += n;
        }
    }
}

fn count_non_null(records: &[Record], field: &FieldDescriptor) -> u64 {
    records
        .iter()
        .filter(|r| match field.kind() {
            // Any non-null sub-component counts.
            AttributeKind::Compound => match r.get(&field.name) {
                Some(serde_json::Value::Object(map)) => map.values().any(|v| !v.is_null()),
                other => non_null_value(other),
            },
            AttributeKind::Scalar => non_null_value(r.get(&field.name)),
        })
        .count() as u64
}

fn select_clause(entity: &str, fields: &[FieldDescriptor]) -> String {
    let field_list = fields
        .iter()
        .map(|f| f.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!("SELECT Id, {} FROM {}", field_list, entity)
}

fn percentage(non_null: u64, examined: u64) -> f64 {
    if examined == 0 {
        return 0.0;
    }
    let pct = (non_null as f64 / examined as f64) * 100.0;
    (pct * 100.0).round() / 100.0
}

fn progress_bar(total: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} records")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntitySchema;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Which queries the mock should reject.
    #[derive(Debug, Default)]
    struct FailurePlan {
        /// 1-based cursor page number at which cursor queries start failing.
        fail_cursor_from_page: Option<usize>,
        /// 0-based offset batch indices that error.
        fail_offset_batches: Vec<u64>,
        /// Every offset batch errors.
        fail_all_offset: bool,
    }

    struct MockSource {
        records: Vec<Record>,
        fields: Vec<FieldDescriptor>,
        /// Overrides the record count reported to the estimator.
        reported_total: Option<u64>,
        plan: FailurePlan,
        count_queries: AtomicUsize,
        data_queries: AtomicUsize,
        cursor_pages_seen: Mutex<usize>,
    }

    impl MockSource {
        fn new(records: Vec<Record>, fields: Vec<FieldDescriptor>) -> Self {
            Self {
                records,
                fields,
                reported_total: None,
                plan: FailurePlan::default(),
                count_queries: AtomicUsize::new(0),
                data_queries: AtomicUsize::new(0),
                cursor_pages_seen: Mutex::new(0),
            }
        }
    }

    fn parse_after(soql: &str, keyword: &str) -> Option<u64> {
        let idx = soql.find(keyword)?;
        soql[idx + keyword.len()..]
            .split_whitespace()
            .next()?
            .parse()
            .ok()
    }

    fn parse_cursor(soql: &str) -> Option<String> {
        let idx = soql.find("WHERE Id > '")?;
        let rest = &soql[idx + "WHERE Id > '".len()..];
        Some(rest.split('\'').next()?.to_string())
    }

    #[async_trait]
    impl DataSource for MockSource {
        async fn count_records(&self, _entity: &str) -> SfResult<u64> {
            self.count_queries.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .reported_total
                .unwrap_or(self.records.len() as u64))
        }

        async fn query(&self, soql: &str) -> SfResult<QueryPage> {
            self.data_queries.fetch_add(1, Ordering::SeqCst);

            if soql.contains("ORDER BY Id") {
                let mut pages = self.cursor_pages_seen.lock().unwrap();
                *pages += 1;
                if let Some(from) = self.plan.fail_cursor_from_page {
                    if *pages >= from {
                        return Err(SfError::Query("simulated cursor failure".into()));
                    }
                }
            }

            if soql.contains("OFFSET") {
                let offset = parse_after(soql, "OFFSET ").unwrap_or(0);
                let limit = parse_after(soql, "LIMIT ").unwrap_or(u64::MAX);
                let batch = offset / limit.max(1);
                if self.plan.fail_all_offset || self.plan.fail_offset_batches.contains(&batch) {
                    return Err(SfError::Query("simulated offset failure".into()));
                }
            }

            let mut records = self.records.clone();
            if let Some(cursor) = parse_cursor(soql) {
                records.retain(|r| record_id(r).map(|id| id > cursor.as_str()).unwrap_or(false));
            }
            if let Some(offset) = parse_after(soql, "OFFSET ") {
                let offset = (offset as usize).min(records.len());
                records.drain(..offset);
            }
            if let Some(limit) = parse_after(soql, "LIMIT ") {
                records.truncate(limit as usize);
            }
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
                fields: self.fields.clone(),
            })
        }
    }

    use crate::sf::query::QueryPage;

    fn field(name: &str, field_type: &str) -> FieldDescriptor {
        FieldDescriptor {
            name: name.to_string(),
            label: name.to_string(),
            field_type: field_type.to_string(),
            description: None,
        }
    }

    /// `count` records with zero-padded Ids; `website_set` of them get
    /// a Website value, all of them get an Industry value.
    fn account_records(count: usize, website_set: usize) -> Vec<Record> {
        (0..count)
            .map(|i| {
                let mut record = Record::new();
                record.insert("Id".into(), json!(format!("001{:09}", i)));
                if i < website_set {
                    record.insert("Website".into(), json!("https://example.com"));
                } else {
                    record.insert("Website".into(), Value::Null);
                }
                record.insert("Industry".into(), json!("Software"));
                record
            })
            .collect()
    }

    fn account_fields() -> Vec<FieldDescriptor> {
        vec![field("Website", "url"), field("Industry", "picklist")]
    }

    fn attrs(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_zero_population_issues_no_data_queries() {
        let source = MockSource::new(Vec::new(), account_fields());
        let results = analyze_fields(
            &source,
            "Account",
            &attrs(&["Website", "Industry"]),
            None,
            &EstimatorOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(results.len(), 2);
        for r in &results {
            assert_eq!(r.usage_pct, 0.0);
            assert_eq!(r.total_records, 0);
            assert!(!r.is_estimated);
        }
        assert_eq!(source.count_queries.load(Ordering::SeqCst), 1);
        assert_eq!(source.data_queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_exact_measurement_for_small_population() {
        let source = MockSource::new(account_records(100, 40), account_fields());
        let options = EstimatorOptions {
            full_dataset: true,
            ..Default::default()
        };
        let results = analyze_fields(
            &source,
            "Account",
            &attrs(&["Website", "Industry"]),
            None,
            &options,
        )
        .await
        .unwrap();

        let website = results.iter().find(|r| r.attribute == "Website").unwrap();
        assert_eq!(website.usage_pct, 40.0);
        assert_eq!(website.non_null_records, 40);
        assert!(!website.is_estimated);

        let industry = results.iter().find(|r| r.attribute == "Industry").unwrap();
        assert_eq!(industry.usage_pct, 100.0);
        assert_eq!(industry.non_null_records, 100);
        assert!(!industry.is_estimated);
    }

    #[tokio::test]
    async fn test_exhaustive_pagination_examines_whole_population() {
        let source = MockSource::new(account_records(250, 75), account_fields());
        let options = EstimatorOptions {
            batch_size: 100,
            full_dataset: true,
            ..Default::default()
        };
        let results = analyze_fields(&source, "Account", &attrs(&["Website"]), None, &options)
            .await
            .unwrap();

        let website = &results[0];
        assert_eq!(website.records_analyzed, Some(250));
        assert!(!website.is_estimated);
        assert_eq!(website.non_null_records, 75);
        assert_eq!(website.usage_pct, 30.0);
    }

    #[tokio::test]
    async fn test_sampling_bounds_and_extrapolation() {
        let source = MockSource::new(account_records(250, 50), account_fields());
        let options = EstimatorOptions {
            batch_size: 100,
            full_dataset: false,
            ..Default::default()
        };
        let results = analyze_fields(&source, "Account", &attrs(&["Website"]), None, &options)
            .await
            .unwrap();

        let website = &results[0];
        assert!(website.is_estimated);
        let sample = website.sample_size.unwrap();
        assert!(sample <= 100 && sample <= 250);
        // First 100 records carry 50 websites: 50% of sample,
        // extrapolated to 125 of 250.
        assert_eq!(website.usage_pct, 50.0);
        assert_eq!(website.non_null_records, 125);
    }

    #[tokio::test]
    async fn test_exhaustive_runs_are_idempotent() {
        let source = MockSource::new(account_records(250, 83), account_fields());
        let options = EstimatorOptions {
            batch_size: 100,
            full_dataset: true,
            ..Default::default()
        };

        let first = analyze_fields(&source, "Account", &attrs(&["Website"]), None, &options)
            .await
            .unwrap();
        *source.cursor_pages_seen.lock().unwrap() = 0;
        let second = analyze_fields(&source, "Account", &attrs(&["Website"]), None, &options)
            .await
            .unwrap();

        assert_eq!(first[0].non_null_records, second[0].non_null_records);
        assert_eq!(first[0].usage_pct, second[0].usage_pct);
    }

    #[tokio::test]
    async fn test_ceiling_downgrades_full_analysis_to_sampling() {
        let mut source = MockSource::new(account_records(10, 5), account_fields());
        source.reported_total = Some(200_000);
        let options = EstimatorOptions {
            full_dataset: true,
            ..Default::default()
        };
        let results = analyze_fields(&source, "Account", &attrs(&["Website"]), None, &options)
            .await
            .unwrap();

        let website = &results[0];
        assert!(website.is_estimated);
        assert_eq!(website.total_records, 200_000);
        assert_eq!(website.sample_size, Some(10));
        // No pagination happened: a single sampling query.
        assert_eq!(source.data_queries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cursor_failure_falls_back_to_offset_batches() {
        let mut source = MockSource::new(account_records(250, 100), account_fields());
        source.plan.fail_cursor_from_page = Some(3);
        // One offset batch is also lost, so the fallback undercounts.
        source.plan.fail_offset_batches = vec![0];
        let options = EstimatorOptions {
            batch_size: 100,
            full_dataset: true,
            offset_page_size: 50,
            ..Default::default()
        };
        let results = analyze_fields(&source, "Account", &attrs(&["Website"]), None, &options)
            .await
            .unwrap();

        let website = &results[0];
        let analyzed = website.records_analyzed.unwrap();
        assert!(analyzed < 250);
        assert_eq!(analyzed, 200);
        assert!(website.is_estimated);
        // Batch 0 held 50 website values; the rest survived.
        assert_eq!(website.non_null_records, 50);
    }

    #[tokio::test]
    async fn test_both_pagination_strategies_failing_samples_instead() {
        let mut source = MockSource::new(account_records(250, 100), account_fields());
        source.plan.fail_cursor_from_page = Some(1);
        source.plan.fail_all_offset = true;
        let options = EstimatorOptions {
            batch_size: 100,
            full_dataset: true,
            ..Default::default()
        };
        let results = analyze_fields(&source, "Account", &attrs(&["Website"]), None, &options)
            .await
            .unwrap();

        let website = &results[0];
        assert!(website.is_estimated);
        assert!(website.sample_size.is_some());
    }

    #[tokio::test]
    async fn test_unknown_attribute_dropped_with_partial_results() {
        let source = MockSource::new(account_records(10, 4), account_fields());
        let results = analyze_fields(
            &source,
            "Account",
            &attrs(&["Website", "NoSuchField"]),
            None,
            &EstimatorOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].attribute, "Website");
        assert_eq!(results[0].usage_pct, 40.0);
    }

    #[tokio::test]
    async fn test_compound_attribute_counts_any_subpart() {
        let mut records = Vec::new();
        for i in 0..4 {
            let mut record = Record::new();
            record.insert("Id".into(), json!(format!("001{:09}", i)));
            let address = if i < 3 {
                json!({"street": null, "city": "Oslo"})
            } else {
                json!({"street": null, "city": null})
            };
            record.insert("BillingAddress".into(), address);
            records.push(record);
        }
        let source = MockSource::new(records, vec![field("BillingAddress", "address")]);
        let results = analyze_fields(
            &source,
            "Account",
            &attrs(&["BillingAddress"]),
            None,
            &EstimatorOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(results[0].non_null_records, 3);
        assert_eq!(results[0].usage_pct, 75.0);
    }

    #[tokio::test]
    async fn test_known_total_skips_count_query() {
        let source = MockSource::new(account_records(10, 10), account_fields());
        analyze_fields(
            &source,
            "Account",
            &attrs(&["Website"]),
            Some(10),
            &EstimatorOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(source.count_queries.load(Ordering::SeqCst), 0);
    }
}
