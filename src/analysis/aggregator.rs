//! Failure aggregation and intermittent detection.
//!
//! This module merges run records into a cumulative summary, filters the
//! tests that failed often enough to be labeled intermittent, and computes
//! the per-test statistics used by the digest report.

use crate::models::{FailureSummary, IntermittentStats, RunRecord, TestInfo};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// Merge every test of a run record into the cumulative summary.
pub fn merge_record(summary: &mut FailureSummary, record: &RunRecord) {
    for (name, info) in record.iter() {
        summary.merge_test(name, info);
    }
}

/// Tests whose failure count meets or exceeds `threshold`.
///
/// Entries are copied unchanged and keep their relative order.
pub fn filter_intermittents(summary: &FailureSummary, threshold: u64) -> FailureSummary {
    let mut intermittents = FailureSummary::new();

    for (name, info) in summary.iter() {
        if info.failure_count >= threshold {
            intermittents.insert_counted(name, info);
        }
    }

    intermittents
}

/// Convert an epoch-seconds timestamp to a UTC date.
pub fn timestamp_to_datetime(ts: f64) -> Option<DateTime<Utc>> {
    if !ts.is_finite() {
        return None;
    }
    let secs = ts.floor();
    let nanos = ((ts - secs) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(secs as i64, nanos)
}

/// Sorted distinct values of a field.
fn distinct(values: &[String]) -> Vec<String> {
    values
        .iter()
        .filter(|v| !v.is_empty())
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Compute the digest statistics of one test.
pub fn test_stats(name: &str, info: &TestInfo) -> IntermittentStats {
    IntermittentStats {
        name: name.to_string(),
        failure_count: info.failure_count,
        first_failure: info.earliest_failure().and_then(timestamp_to_datetime),
        last_failure: info.latest_failure().and_then(timestamp_to_datetime),
        nodes: distinct(&info.node_name),
        jobs: distinct(&info.jenkins_job_name),
        categories: distinct(&info.test_category),
    }
}

/// Statistics for every test of a summary, most failures first.
///
/// Ties keep summary order.
pub fn summarize(summary: &FailureSummary) -> Vec<IntermittentStats> {
    let mut stats: Vec<_> = summary
        .iter()
        .map(|(name, info)| test_stats(name, info))
        .collect();

    stats.sort_by_key(|s| std::cmp::Reverse(s.failure_count));
    stats
}
