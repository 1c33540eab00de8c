//! Report persistence and console output.

use crate::models::UsageResult;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Clean a string for use in a filename: alphanumerics kept, runs of
/// spaces/dashes collapsed to underscores, everything lowercased.
pub fn sanitize_filename(name: &str) -> String {
    let mut cleaned = String::with_capacity(name.len());
    let mut last_was_sep = false;
    for c in name.chars() {
        if c.is_alphanumeric() || c == '_' {
            cleaned.push(c.to_ascii_lowercase());
            last_was_sep = false;
        } else if (c.is_whitespace() || c == '-') && !last_was_sep && !cleaned.is_empty() {
            cleaned.push('_');
            last_was_sep = true;
        }
    }
    while cleaned.ends_with('_') {
        cleaned.pop();
    }
    cleaned
}

/// Write any serializable report as pretty JSON.
pub fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize report")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    Ok(())
}

/// Flattened usage table: one row per (entity, attribute), sorted by
/// descending usage within each entity.
pub fn write_usage_csv(
    results: &BTreeMap<String, Vec<UsageResult>>,
    path: &Path,
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create CSV at {}", path.display()))?;

    writer.write_record([
        "Object",
        "Field",
        "Usage %",
        "Non-null Records",
        "Total Records",
        "Is Estimated",
    ])?;

    for (entity, usage) in results {
        for result in sorted_by_usage(usage) {
            let usage_pct = format!("{:.2}", result.usage_pct);
            let non_null = result.non_null_records.to_string();
            let total = result.total_records.to_string();
            writer.write_record([
                entity.as_str(),
                result.attribute.as_str(),
                usage_pct.as_str(),
                non_null.as_str(),
                total.as_str(),
                if result.is_estimated { "Yes" } else { "No" },
            ])?;
        }
    }

    writer.flush().context("Failed to flush CSV")?;
    Ok(())
}

/// Results sorted by descending usage percentage.
pub fn sorted_by_usage(results: &[UsageResult]) -> Vec<&UsageResult> {
    let mut sorted: Vec<&UsageResult> = results.iter().collect();
    sorted.sort_by(|a, b| {
        b.usage_pct
            .partial_cmp(&a.usage_pct)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    sorted
}

/// Console table for one entity's usage results.
pub fn print_usage_table(entity: &str, results: &[UsageResult]) {
    println!("\n{}:", entity);
    println!("{}", "-".repeat(90));
    println!(
        "{:<40} {:<10} {:<20} {:<15}",
        "Field", "Usage %", "Non-null Records", "Total Records"
    );
    println!("{}", "-".repeat(90));

    for result in sorted_by_usage(results) {
        let estimated = if result.is_estimated { "(estimated)" } else { "" };
        println!(
            "{:<40} {:<10.2} {:<20} {:<15} {}",
            result.attribute,
            result.usage_pct,
            result.non_null_records,
            result.total_records,
            estimated
        );
    }
    println!("{}", "-".repeat(90));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(attribute: &str, pct: f64, estimated: bool) -> UsageResult {
        UsageResult {
            entity: "Account".into(),
            attribute: attribute.into(),
            total_records: 100,
            non_null_records: pct as u64,
            usage_pct: pct,
            is_estimated: estimated,
            sample_size: None,
            records_analyzed: None,
        }
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Acme Corp"), "acme_corp");
        assert_eq!(sanitize_filename("Acme, Inc. (EMEA)"), "acme_inc_emea");
        assert_eq!(sanitize_filename("already_clean"), "already_clean");
    }

    #[test]
    fn test_sorted_by_usage_descending() {
        let results = vec![usage("A", 10.0, false), usage("B", 90.0, false)];
        let sorted = sorted_by_usage(&results);
        assert_eq!(sorted[0].attribute, "B");
    }

    #[test]
    fn test_csv_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.csv");

        let mut all = BTreeMap::new();
        all.insert(
            "Account".to_string(),
            vec![usage("Website", 40.0, true), usage("Industry", 100.0, false)],
        );
        write_usage_csv(&all, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Object,Field,Usage %,Non-null Records,Total Records,Is Estimated"
        );
        // Sorted by usage: Industry first.
        assert!(lines.next().unwrap().starts_with("Account,Industry,100.00"));
        let website = lines.next().unwrap();
        assert!(website.starts_with("Account,Website,40.00"));
        assert!(website.ends_with("Yes"));
    }

    #[test]
    fn test_write_json_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        write_json(&vec![usage("Website", 40.0, false)], &path).unwrap();

        let parsed: Vec<UsageResult> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed[0].attribute, "Website");
    }
}
