//! Data models for failure aggregation.
//!
//! This module contains the structures exchanged with CI failure dumps
//! (run records and per-test metadata) and the ordered summary built by
//! merging them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A build identifier. Jenkins dumps carry either numbers or strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BuildId {
    Number(i64),
    Text(String),
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildId::Number(n) => write!(f, "{}", n),
            BuildId::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for BuildId {
    fn from(n: i64) -> Self {
        BuildId::Number(n)
    }
}

impl From<&str> for BuildId {
    fn from(s: &str) -> Self {
        BuildId::Text(s.to_string())
    }
}

/// Failure metadata for a single test.
///
/// The sequence fields are index-aligned: entry `i` of every sequence
/// describes the same failure event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestInfo {
    /// Jenkins job names the failures were observed under.
    #[serde(rename = "JenkinsJobName")]
    pub jenkins_job_name: Vec<String>,
    /// Build identifiers.
    #[serde(rename = "BuildID")]
    pub build_id: Vec<BuildId>,
    /// Failure times in epoch seconds.
    #[serde(rename = "Timestamp")]
    pub timestamp: Vec<f64>,
    /// Commit under test at failure time.
    #[serde(rename = "GitHash")]
    pub git_hash: Vec<String>,
    /// Suite label (JUnit, PyUnit, RUnit, ...).
    #[serde(rename = "TestCategory")]
    pub test_category: Vec<String>,
    /// Machine that ran the job.
    #[serde(rename = "NodeName")]
    pub node_name: Vec<String>,
    /// Failure messages, absent from older dumps.
    #[serde(
        rename = "FailureMessages",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub failure_messages: Vec<String>,
    /// Number of failures accumulated so far.
    #[serde(rename = "FailureCount", default)]
    pub failure_count: u64,
}

impl TestInfo {
    /// Number of failure events carried by this entry.
    pub fn event_count(&self) -> usize {
        self.node_name.len()
    }

    /// Whether every mandatory sequence field has the same length.
    pub fn is_aligned(&self) -> bool {
        let n = self.node_name.len();
        self.jenkins_job_name.len() == n
            && self.build_id.len() == n
            && self.timestamp.len() == n
            && self.git_hash.len() == n
            && self.test_category.len() == n
    }

    /// Concatenate the other entry's sequences onto this one.
    ///
    /// Once either side carries messages, `failure_messages` is kept one per
    /// event, with `""` standing in for events that came without one.
    fn extend_events(&mut self, other: &TestInfo) {
        let before = self.event_count();

        self.jenkins_job_name
            .extend_from_slice(&other.jenkins_job_name);
        self.build_id.extend_from_slice(&other.build_id);
        self.timestamp.extend_from_slice(&other.timestamp);
        self.git_hash.extend_from_slice(&other.git_hash);
        self.test_category.extend_from_slice(&other.test_category);
        self.node_name.extend_from_slice(&other.node_name);

        if self.failure_messages.is_empty() && other.failure_messages.is_empty() {
            return;
        }
        self.failure_messages.resize(before, String::new());
        self.failure_messages.extend(
            other
                .failure_messages
                .iter()
                .take(other.event_count())
                .cloned(),
        );
        self.failure_messages
            .resize(self.event_count(), String::new());
    }

    /// Merge a freshly observed entry into this one.
    ///
    /// Sequences are concatenated in order and the failure count grows by
    /// the number of events the incoming entry carries.
    pub fn merge_from(&mut self, other: &TestInfo) {
        self.extend_events(other);
        self.failure_count += other.event_count() as u64;
    }

    /// Combine two already-counted entries, summing their counts.
    fn absorb(&mut self, other: &TestInfo) {
        self.extend_events(other);
        self.failure_count += other.failure_count;
    }

    /// Earliest failure timestamp, ignoring NaN values.
    pub fn earliest_failure(&self) -> Option<f64> {
        self.timestamp
            .iter()
            .copied()
            .filter(|t| !t.is_nan())
            .reduce(f64::min)
    }

    /// Latest failure timestamp, ignoring NaN values.
    pub fn latest_failure(&self) -> Option<f64> {
        self.timestamp
            .iter()
            .copied()
            .filter(|t| !t.is_nan())
            .reduce(f64::max)
    }
}

/// A per-run failure dump: parallel `TestName` / `TestInfo` lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    #[serde(rename = "TestName")]
    pub test_names: Vec<String>,
    #[serde(rename = "TestInfo")]
    pub test_info: Vec<TestInfo>,
}

impl RunRecord {
    /// Number of tests listed in the record.
    pub fn len(&self) -> usize {
        self.test_names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.test_names.is_empty()
    }

    /// Whether both lists have the same length.
    pub fn is_aligned(&self) -> bool {
        self.test_names.len() == self.test_info.len()
    }

    /// Iterate over `(name, info)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TestInfo)> {
        self.test_names
            .iter()
            .map(String::as_str)
            .zip(self.test_info.iter())
    }

    /// Append a test entry.
    #[allow(dead_code)] // Builder utility for hand-made records
    pub fn push(&mut self, name: impl Into<String>, info: TestInfo) {
        self.test_names.push(name.into());
        self.test_info.push(info);
    }
}

/// Ordered mapping from test name to accumulated failure metadata.
///
/// Insertion order is the order in which a name was first seen. On the wire
/// it has the same shape as a [`RunRecord`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RunRecord", into = "RunRecord")]
pub struct FailureSummary {
    names: Vec<String>,
    info: Vec<TestInfo>,
    index: HashMap<String, usize>,
}

impl FailureSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    #[allow(dead_code)] // Lookup utility
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    #[allow(dead_code)] // Lookup utility
    pub fn get(&self, name: &str) -> Option<&TestInfo> {
        self.index.get(name).map(|&i| &self.info[i])
    }

    /// Test names in insertion order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Iterate over `(name, info)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TestInfo)> {
        self.names.iter().map(String::as_str).zip(self.info.iter())
    }

    /// Position of `name`, creating an empty entry if it is new.
    fn slot(&mut self, name: &str) -> usize {
        if let Some(&i) = self.index.get(name) {
            return i;
        }
        let i = self.names.len();
        self.names.push(name.to_string());
        self.info.push(TestInfo::default());
        self.index.insert(name.to_string(), i);
        i
    }

    /// Merge one observed test entry, creating the test if unseen.
    pub fn merge_test(&mut self, name: &str, info: &TestInfo) {
        let i = self.slot(name);
        self.info[i].merge_from(info);
    }

    /// Insert an already-counted entry, keeping its failure count.
    pub fn insert_counted(&mut self, name: &str, info: &TestInfo) {
        let i = self.slot(name);
        self.info[i].absorb(info);
    }

    /// Sum of the failure counts of every test.
    pub fn total_failures(&self) -> u64 {
        self.info.iter().map(|i| i.failure_count).sum()
    }
}

impl TryFrom<RunRecord> for FailureSummary {
    type Error = String;

    /// Rebuild a saved summary. Mismatched `TestName` / `TestInfo` lengths are rejected.
    fn try_from(record: RunRecord) -> Result<Self, Self::Error> {
        if !record.is_aligned() {
            return Err(format!(
                "summary lists {} test names but {} TestInfo entries",
                record.test_names.len(),
                record.test_info.len()
            ));
        }

        let mut summary = FailureSummary::new();
        for (name, info) in record.iter() {
            summary.insert_counted(name, info);
        }
        Ok(summary)
    }
}

impl From<FailureSummary> for RunRecord {
    fn from(summary: FailureSummary) -> Self {
        RunRecord {
            test_names: summary.names,
            test_info: summary.info,
        }
    }
}

/// Digest of one intermittent test, used by the summary report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntermittentStats {
    /// Test name.
    pub name: String,
    /// Accumulated failure count.
    pub failure_count: u64,
    /// Earliest failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_failure: Option<DateTime<Utc>>,
    /// Most recent failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<DateTime<Utc>>,
    /// Distinct machines the test failed on.
    pub nodes: Vec<String>,
    /// Distinct Jenkins jobs the test failed under.
    pub jobs: Vec<String>,
    /// Distinct suite labels.
    pub categories: Vec<String>,
}

/// Metadata about an aggregation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestMetadata {
    /// When the digest was produced.
    pub generated_at: DateTime<Utc>,
    /// Failure count at which a test is labeled intermittent.
    pub threshold: u64,
    /// Number of record files merged.
    pub files_loaded: usize,
    /// Number of distinct failing tests seen.
    pub tests_seen: usize,
    /// Total failures across every test seen.
    pub total_failures: u64,
    /// Number of tests labeled intermittent.
    pub intermittent_count: usize,
}

/// The complete digest written by `--summary`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Digest {
    pub metadata: DigestMetadata,
    pub intermittents: Vec<IntermittentStats>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(node: &str, ts: f64) -> TestInfo {
        TestInfo {
            jenkins_job_name: vec!["h2o_master".to_string()],
            build_id: vec![BuildId::Number(42)],
            timestamp: vec![ts],
            git_hash: vec!["abc123".to_string()],
            test_category: vec!["PyUnit".to_string()],
            node_name: vec![node.to_string()],
            failure_messages: Vec::new(),
            failure_count: 1,
        }
    }

    #[test]
    fn test_merge_from_concatenates_in_order() {
        let mut info = TestInfo::default();
        info.merge_from(&event("mr-0x1", 100.0));
        info.merge_from(&event("mr-0x2", 50.0));

        assert_eq!(info.node_name, vec!["mr-0x1", "mr-0x2"]);
        assert_eq!(info.timestamp, vec![100.0, 50.0]);
        assert_eq!(info.failure_count, 2);
        assert!(info.is_aligned());
    }

    #[test]
    fn test_failure_count_uses_event_count() {
        let mut incoming = event("mr-0x1", 1.0);
        incoming.merge_from(&event("mr-0x2", 2.0));
        incoming.failure_count = 99;

        let mut info = TestInfo::default();
        info.merge_from(&incoming);
        assert_eq!(info.failure_count, 2);
    }

    #[test]
    fn test_earliest_and_latest_failure() {
        let mut info = event("a", 100.0);
        info.timestamp.push(f64::NAN);
        info.timestamp.push(50.0);
        assert_eq!(info.earliest_failure(), Some(50.0));
        assert_eq!(info.latest_failure(), Some(100.0));
        assert_eq!(TestInfo::default().earliest_failure(), None);
    }

    #[test]
    fn test_summary_keeps_first_seen_order() {
        let mut summary = FailureSummary::new();
        summary.merge_test("b", &event("n", 1.0));
        summary.merge_test("a", &event("n", 2.0));
        summary.merge_test("b", &event("n", 3.0));

        assert_eq!(summary.names(), &["b".to_string(), "a".to_string()]);
        assert_eq!(summary.get("b").map(|i| i.failure_count), Some(2));
        assert!(summary.contains("a"));
        assert!(!summary.contains("c"));
        assert_eq!(summary.total_failures(), 3);
    }

    #[test]
    fn test_summary_from_record_preserves_counts() {
        let mut record = RunRecord::default();
        let mut info = event("n", 1.0);
        info.failure_count = 7;
        record.push("t", info);
        record.push("t", event("m", 2.0));

        let summary = FailureSummary::try_from(record).unwrap();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary.get("t").map(|i| i.failure_count), Some(8));
        assert_eq!(summary.get("t").map(|i| i.event_count()), Some(2));
    }

    #[test]
    fn test_summary_from_misaligned_record_is_rejected() {
        let record = RunRecord {
            test_names: vec!["a".to_string(), "b".to_string()],
            test_info: vec![event("n", 1.0)],
        };

        let err = FailureSummary::try_from(record).unwrap_err();
        assert!(err.contains("2 test names but 1 TestInfo"));
    }

    fn with_message(node: &str, ts: f64, message: &str) -> TestInfo {
        let mut info = event(node, ts);
        info.failure_messages = vec![message.to_string()];
        info
    }

    #[test]
    fn test_messages_stay_aligned_when_old_dump_comes_first() {
        let mut info = TestInfo::default();
        info.merge_from(&event("old-node", 1.0));
        info.merge_from(&with_message("new-node", 2.0, "AssertionError"));

        assert_eq!(info.node_name, vec!["old-node", "new-node"]);
        assert_eq!(info.failure_messages, vec!["", "AssertionError"]);
    }

    #[test]
    fn test_messages_stay_aligned_when_old_dump_comes_last() {
        let mut info = TestInfo::default();
        info.merge_from(&with_message("new-node", 2.0, "AssertionError"));
        info.merge_from(&event("old-node", 1.0));

        assert_eq!(info.node_name, vec!["new-node", "old-node"]);
        assert_eq!(info.failure_messages, vec!["AssertionError", ""]);
    }

    #[test]
    fn test_entries_without_messages_keep_none() {
        let mut info = TestInfo::default();
        info.merge_from(&event("a", 1.0));
        info.merge_from(&event("b", 2.0));
        assert!(info.failure_messages.is_empty());
    }

    #[test]
    fn test_build_id_display() {
        assert_eq!(BuildId::from(17).to_string(), "17");
        assert_eq!(BuildId::from("nightly-3").to_string(), "nightly-3");
    }
}
