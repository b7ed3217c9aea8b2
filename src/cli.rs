//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::codec::RecordFormat;
use clap::Parser;
use std::path::PathBuf;

/// FlakeTally - intermittent test detector for CI failure dumps
///
/// Pulls the failed-test dumps written by CI runs, merges them per test
/// and labels every test that failed at least THRESHOLD times as
/// intermittent. The intermittents are printed and saved to OUTPUT_FILENAME.
///
/// Examples:
///   flaketally 2 intermittents.pickle s3://ai.h2o.tests/jenkins failed_pyunits failed_junits
///   flaketally 3 flaky.json s3://bucket/ci failed_pyunits failed_junits --format json --skip-fetch
///   flaketally 2 out.pickle s3://bucket/ci failed_pyunits failed_runits --summary flaky.md
///   flaketally --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Failure count at which a test is labeled intermittent
    #[arg(value_name = "THRESHOLD", required_unless_present = "init_config")]
    pub threshold: Option<u64>,

    /// File the intermittents are saved to, relative to --dir
    #[arg(value_name = "OUTPUT_FILENAME", required_unless_present = "init_config")]
    pub output_filename: Option<PathBuf>,

    /// Remote location the dumps are fetched from (e.g. s3://ai.h2o.tests/jenkins)
    #[arg(value_name = "REMOTE_PATH", required_unless_present = "init_config")]
    pub remote_path: Option<String>,

    /// Substrings identifying failure dump files; at least two are required
    #[arg(
        value_name = "FILE_PREFIX",
        num_args = 2..,
        required_unless_present = "init_config"
    )]
    pub file_prefixes: Vec<String>,

    /// Working directory holding the dumps and the output file
    ///
    /// Defaults to the current directory.
    #[arg(short, long, value_name = "DIR", env = "FLAKETALLY_DIR")]
    pub dir: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .flaketally.toml in the working directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Serialization of the dumps and the output file (pickle, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<RecordFormat>,

    /// Do not run the remote copy command; use local files only
    #[arg(long)]
    pub skip_fetch: bool,

    /// Also write a digest of the intermittents to this file
    #[arg(long, value_name = "FILE")]
    pub summary: Option<PathBuf>,

    /// Digest format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub summary_format: SummaryFormat,

    /// Exit with code 2 when at least one intermittent test is found
    ///
    /// Useful for CI pipelines.
    #[arg(long)]
    pub fail_on_intermittent: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .flaketally.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SummaryFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Failure threshold (zero before validation).
    pub fn threshold(&self) -> u64 {
        self.threshold.unwrap_or(0)
    }

    /// Remote base path, empty if not set (should be validated first).
    pub fn remote_path(&self) -> &str {
        self.remote_path.as_deref().unwrap_or("")
    }

    /// Directory holding the dumps and the output file.
    pub fn working_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Output file resolved against the working directory.
    pub fn output_path(&self) -> PathBuf {
        let output = self.output_filename.clone().unwrap_or_default();
        self.working_dir().join(output)
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        match self.output_filename {
            Some(ref output) if !output.as_os_str().is_empty() => {}
            _ => return Err("Output filename must not be empty".to_string()),
        }

        if self.file_prefixes.len() < 2 {
            return Err("At least two file prefixes are required".to_string());
        }

        if self.file_prefixes.iter().any(|p| p.is_empty()) {
            return Err("File prefixes must not be empty".to_string());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        // Validate working directory if provided
        if let Some(ref dir) = self.dir {
            if !dir.exists() {
                return Err(format!("Directory does not exist: {}", dir.display()));
            }
            if !dir.is_dir() {
                return Err(format!("Path is not a directory: {}", dir.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
