//! Best-effort retrieval of remote failure dumps.
//!
//! This module runs an external copy tool (s3cmd by default) once per
//! prefix to pull matching dumps into the working directory. Failures are
//! logged and skipped; aggregation continues with whatever is local.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Options for fetching remote dumps.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Program to run.
    pub command: String,
    /// Arguments placed before the remote pattern.
    pub args: Vec<String>,
    /// Base remote location, e.g. `s3://ai.h2o.tests/jenkins`.
    pub remote_path: String,
    /// Directory the files are copied into.
    pub dest_dir: PathBuf,
    /// Whether to show a spinner.
    pub show_progress: bool,
}

/// Result of a fetch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Number of prefixes a copy was attempted for.
    pub attempted: usize,
    /// Number of copies that exited successfully.
    pub succeeded: usize,
}

/// Remote glob for one prefix: `<remote_path>/<prefix>*`.
pub fn remote_pattern(remote_path: &str, prefix: &str) -> String {
    format!("{}/{}*", remote_path.trim_end_matches('/'), prefix)
}

/// Fetch the dumps of every prefix, one copy command per prefix.
///
/// Never fails: errors are logged and the next prefix is tried.
pub fn fetch_prefixes(options: &FetchOptions, prefixes: &[String]) -> FetchOutcome {
    let mut outcome = FetchOutcome::default();

    let spinner = if options.show_progress {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(style);
        }
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    } else {
        None
    };

    for prefix in prefixes {
        let pattern = remote_pattern(&options.remote_path, prefix);
        outcome.attempted += 1;

        if let Some(ref pb) = spinner {
            pb.set_message(format!("Fetching {}", pattern));
        }

        match fetch_one(options, &pattern) {
            Ok(()) => {
                outcome.succeeded += 1;
                info!("Fetched {}", pattern);
            }
            Err(e) => {
                warn!("Could not fetch {}: {:#}", pattern, e);
            }
        }
    }

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    outcome
}

/// Run the copy command for one remote pattern.
fn fetch_one(options: &FetchOptions, pattern: &str) -> Result<()> {
    debug!(
        "Running {} {} {} in {}",
        options.command,
        options.args.join(" "),
        pattern,
        options.dest_dir.display()
    );

    let output = Command::new(&options.command)
        .args(&options.args)
        .arg(pattern)
        .current_dir(&options.dest_dir)
        .output()
        .with_context(|| format!("Failed to run {}", options.command))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        debug!("{}", stdout.trim());
    }

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("{} exited with {}: {}", options.command, output.status, stderr.trim());
    }

    Ok(())
}
