//! Intermittent report generation.
//!
//! This module renders the console lines for each intermittent test and
//! the optional Markdown/JSON digest.

use crate::analysis::timestamp_to_datetime;
use crate::models::{Digest, DigestMetadata, FailureSummary, IntermittentStats, TestInfo};
use anyhow::Result;
use chrono::{DateTime, Local, TimeZone};
use std::fmt::Display;

/// Render a date like C `ctime`, e.g. `Wed Oct 12 16:27:01 2016`.
pub fn format_ctime<Tz: TimeZone>(dt: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    dt.format("%a %b %e %H:%M:%S %Y").to_string()
}

/// Local ctime rendering of the earliest failure, or `unknown`.
fn since_label(info: &TestInfo) -> String {
    info.earliest_failure()
        .and_then(timestamp_to_datetime)
        .map(|dt| format_ctime(&dt.with_timezone(&Local)))
        .unwrap_or_else(|| "unknown".to_string())
}

/// One console line for an intermittent test.
pub fn intermittent_line(name: &str, info: &TestInfo) -> String {
    format!(
        "Intermittent test: {} has failed {} times in the past since {}",
        name,
        info.failure_count,
        since_label(info)
    )
}

/// Console lines for every intermittent test, in summary order.
pub fn intermittent_lines(intermittents: &FailureSummary) -> Vec<String> {
    intermittents
        .iter()
        .map(|(name, info)| intermittent_line(name, info))
        .collect()
}

/// Generate a complete Markdown digest.
pub fn generate_markdown_report(digest: &Digest) -> String {
    let mut output = String::new();

    output.push_str("# Intermittent Test Report\n\n");
    output.push_str(&generate_metadata_section(&digest.metadata));
    output.push_str(&generate_table_section(&digest.intermittents));
    output.push_str(&generate_details_section(&digest.intermittents));
    output.push_str("---\n\n*Report generated by FlakeTally*\n");

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &DigestMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Threshold:** {} failures\n", metadata.threshold));
    section.push_str(&format!("- **Record Files:** {}\n", metadata.files_loaded));
    section.push_str(&format!("- **Failing Tests:** {}\n", metadata.tests_seen));
    section.push_str(&format!("- **Total Failures:** {}\n", metadata.total_failures));
    section.push_str(&format!(
        "- **Intermittent Tests:** {}\n",
        metadata.intermittent_count
    ));
    section.push('\n');

    section
}

/// Generate the overview table.
fn generate_table_section(stats: &[IntermittentStats]) -> String {
    let mut section = String::new();

    section.push_str("## Intermittent Tests\n\n");

    if stats.is_empty() {
        section.push_str("No test reached the failure threshold.\n\n");
        return section;
    }

    section.push_str("| Test | Failures | First Failure | Last Failure | Nodes |\n");
    section.push_str("|:---|:---:|:---|:---|:---:|\n");

    for s in stats {
        section.push_str(&format!(
            "| `{}` | {} | {} | {} | {} |\n",
            s.name,
            s.failure_count,
            format_date(s.first_failure.as_ref()),
            format_date(s.last_failure.as_ref()),
            s.nodes.len()
        ));
    }
    section.push('\n');

    section
}

/// Generate the per-test details.
fn generate_details_section(stats: &[IntermittentStats]) -> String {
    let mut section = String::new();

    for s in stats {
        section.push_str(&format!("### {}\n\n", s.name));
        if !s.categories.is_empty() {
            section.push_str(&format!("- **Categories:** {}\n", s.categories.join(", ")));
        }
        if !s.jobs.is_empty() {
            section.push_str(&format!("- **Jobs:** {}\n", s.jobs.join(", ")));
        }
        if !s.nodes.is_empty() {
            section.push_str(&format!("- **Nodes:** {}\n", s.nodes.join(", ")));
        }
        section.push('\n');
    }

    section
}

fn format_date<Tz: TimeZone>(dt: Option<&DateTime<Tz>>) -> String
where
    Tz::Offset: Display,
{
    dt.map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Generate a JSON digest.
pub fn generate_json_report(digest: &Digest) -> Result<String> {
    serde_json::to_string_pretty(digest).map_err(Into::into)
}
