//! FlakeTally - intermittent test detector for CI failure dumps
//!
//! A CLI tool that fetches the failed-test dumps written by CI runs,
//! merges them per test and flags tests that failed at least a given
//! number of times as intermittent.
//!
//! Exit codes:
//!   0 - Success (or intermittents found without --fail-on-intermittent)
//!   1 - Usage or runtime error (bad arguments, unreadable dump, write failure)
//!   2 - Intermittent tests found and --fail-on-intermittent set

mod analysis;
mod cli;
mod codec;
mod config;
mod models;
mod remote;
mod report;
mod scanner;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use cli::{Args, SummaryFormat};
use config::Config;
use models::{Digest, DigestMetadata, FailureSummary};
use std::ffi::OsString;
use std::path::Path;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    // Parse and validate command-line arguments
    let args = match parse_args_from(std::env::args_os()) {
        Ok(args) => args,
        Err(call) => {
            println!("{}", call.message);
            std::process::exit(call.exit_code);
        }
    };

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config(&args);
    }

    // Initialize logging
    init_logging(&args);

    info!("FlakeTally v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args) {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Aggregation failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// A rejected invocation: the text printed to stdout and the exit status.
#[derive(Debug)]
struct WrongCall {
    message: String,
    exit_code: i32,
}

impl WrongCall {
    fn new(reason: &str, detail: Option<String>) -> Self {
        let mut message = format!("Wrong call. {}\n", reason);
        if let Some(detail) = detail {
            message.push_str(detail.trim_end());
            message.push('\n');
        }
        message.push('\n');
        message.push_str(&Args::command().render_help().to_string());

        Self {
            message,
            exit_code: 1,
        }
    }
}

/// Parse and validate arguments.
///
/// Help and version requests are printed by clap and exit right away.
fn parse_args_from<I, T>(argv: I) -> std::result::Result<Args, WrongCall>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args = match Args::try_parse_from(argv) {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => return Err(usage_error(&e)),
    };

    args.validate()
        .map_err(|reason| WrongCall::new(&reason, None))?;
    Ok(args)
}

/// Wrong-call text for a clap parse failure.
fn usage_error(e: &clap::Error) -> WrongCall {
    let reason = match e.kind() {
        ErrorKind::MissingRequiredArgument
        | ErrorKind::TooFewValues
        | ErrorKind::WrongNumberOfValues => "Not enough arguments.",
        _ => "Invalid arguments.",
    };
    WrongCall::new(reason, Some(e.render().to_string()))
}

/// Handle --init-config: generate a default .flaketally.toml.
fn handle_init_config(args: &Args) -> Result<()> {
    let path = args.working_dir().join(config::CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            path.display()
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(&path, &content)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("✅ Created {} with default settings.", path.display());
    println!("   Edit it to customize the fetch command and record format.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the complete aggregation. Returns exit code (0 or 2).
fn run(args: Args) -> Result<i32> {
    let work_dir = args.working_dir();
    let output_path = args.output_path();
    let threshold = args.threshold();

    // Load configuration
    let mut config = load_config(&args, &work_dir)?;
    config.merge_with_args(&args);
    let format = config.input.format;

    // Step 1: Retrieval
    if config.fetch.enabled {
        println!("📥 Fetching failure dumps from {}", args.remote_path());
        let fetch_options = remote::FetchOptions {
            command: config.fetch.command.clone(),
            args: config.fetch.args.clone(),
            remote_path: args.remote_path().to_string(),
            dest_dir: work_dir.clone(),
            show_progress: !args.quiet,
        };
        let outcome = remote::fetch_prefixes(&fetch_options, &args.file_prefixes);
        if outcome.succeeded < outcome.attempted {
            warn!(
                "{} of {} fetches failed; using local files only for those prefixes",
                outcome.attempted - outcome.succeeded,
                outcome.attempted
            );
        }
    } else {
        info!("Skipping remote fetch");
    }

    // Step 2: Load and merge
    let mut excluded = vec![output_path.clone()];
    if let Some(ref summary_path) = args.summary {
        excluded.push(work_dir.join(summary_path));
    }
    let scan_config = scanner::ScanConfig {
        prefixes: args.file_prefixes.clone(),
        format,
        excluded,
    };
    let record_scanner = scanner::RecordScanner::new(work_dir.clone(), scan_config);
    let files = record_scanner.scan()?;

    if files.is_empty() {
        warn!("No failure dumps found in {}", work_dir.display());
    }

    let mut cumulative = FailureSummary::new();
    for file in &files {
        let record = record_scanner.load(file)?;
        if record.is_empty() {
            debug!("{} lists no failed tests", file.path.display());
        }
        info!(
            "Merging {} tests from {} (prefix {})",
            record.len(),
            file.path.display(),
            file.prefix
        );
        analysis::merge_record(&mut cumulative, &record);
    }

    info!(
        "Merged {} files: {} failing tests, {} failures",
        files.len(),
        cumulative.len(),
        cumulative.total_failures()
    );

    // Step 3: Filter
    let intermittents = analysis::filter_intermittents(&cumulative, threshold);
    debug!("Intermittents: {:?}", intermittents.names());

    // Step 4: Report and persist
    for line in report::intermittent_lines(&intermittents) {
        println!("{}", line);
    }

    report::save_summary(&output_path, &intermittents, format)?;
    println!(
        "\n✅ {} intermittent tests saved to: {}",
        intermittents.len(),
        output_path.display()
    );

    if let Some(ref summary_path) = args.summary {
        let digest = Digest {
            metadata: DigestMetadata {
                generated_at: Utc::now(),
                threshold,
                files_loaded: files.len(),
                tests_seen: cumulative.len(),
                total_failures: cumulative.total_failures(),
                intermittent_count: intermittents.len(),
            },
            intermittents: analysis::summarize(&intermittents),
        };
        write_digest(&digest, &work_dir.join(summary_path), args.summary_format)?;
    }

    if config.general.fail_on_intermittent && !intermittents.is_empty() {
        eprintln!(
            "\n⛔ {} intermittent tests found. Failing (exit code 2).",
            intermittents.len()
        );
        return Ok(2);
    }

    Ok(0)
}

/// Render and save the digest.
fn write_digest(digest: &Digest, path: &Path, format: SummaryFormat) -> Result<()> {
    let output = match format {
        SummaryFormat::Json => report::generate_json_report(digest)?,
        SummaryFormat::Markdown => report::generate_markdown_report(digest),
    };

    report::write_atomic(path, output.as_bytes())?;
    println!("📝 Digest saved to: {}", path.display());
    Ok(())
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args, work_dir: &Path) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_from_dir(work_dir) {
        Ok(Some(config)) => {
            info!("Loaded config from {}", config::CONFIG_FILE_NAME);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {:#}", e);
            Ok(Config::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::RecordFormat;
    use crate::models::{BuildId, RunRecord, TestInfo};
    use tempfile::TempDir;

    fn failures(node: &str, timestamps: &[f64]) -> TestInfo {
        let mut info = TestInfo::default();
        for ts in timestamps {
            info.jenkins_job_name.push("h2o_master".to_string());
            info.build_id.push(BuildId::Number(*ts as i64));
            info.timestamp.push(*ts);
            info.git_hash.push("abc".to_string());
            info.test_category.push("PyUnit".to_string());
            info.node_name.push(node.to_string());
        }
        info.failure_count = timestamps.len() as u64;
        info
    }

    fn write_dump(dir: &TempDir, name: &str, tests: &[(&str, TestInfo)]) {
        let mut record = RunRecord::default();
        for (test, info) in tests {
            record.push(*test, info.clone());
        }
        let bytes = RecordFormat::Pickle.encode(&record).unwrap();
        std::fs::write(dir.path().join(name), bytes).unwrap();
    }

    fn args_for(dir: &TempDir, extra: &[&str]) -> Args {
        let mut argv = vec![
            "flaketally".to_string(),
            "--skip-fetch".to_string(),
            "--dir".to_string(),
            dir.path().display().to_string(),
        ];
        argv.extend(extra.iter().map(|s| s.to_string()));
        Args::parse_from(argv)
    }

    #[test]
    fn test_run_flags_and_saves_intermittents() {
        let dir = TempDir::new().unwrap();
        write_dump(
            &dir,
            "failed_pyunits_run1",
            &[("A", failures("n1", &[100.0, 200.0])), ("B", failures("n1", &[300.0]))],
        );
        write_dump(&dir, "failed_pyunits_run2", &[("A", failures("n2", &[50.0]))]);
        std::fs::write(dir.path().join("unrelated.txt"), "ignored").unwrap();

        let args = args_for(
            &dir,
            &["2", "failed_intermittents.pickle", "s3://bucket/ci", "failed_", "jenkins_"],
        );
        assert_eq!(run(args).unwrap(), 0);

        let bytes = std::fs::read(dir.path().join("failed_intermittents.pickle")).unwrap();
        let saved: FailureSummary = RecordFormat::Pickle.decode(&bytes).unwrap();
        assert_eq!(saved.names(), &["A"]);
        let a = saved.get("A").unwrap();
        assert_eq!(a.failure_count, 3);
        assert_eq!(a.earliest_failure(), Some(50.0));
        assert_eq!(a.node_name, vec!["n1", "n1", "n2"]);

        // The saved summary matches the prefix but is not read back as input.
        let args = args_for(
            &dir,
            &["2", "failed_intermittents.pickle", "s3://bucket/ci", "failed_", "jenkins_"],
        );
        assert_eq!(run(args).unwrap(), 0);
        let bytes = std::fs::read(dir.path().join("failed_intermittents.pickle")).unwrap();
        let again: FailureSummary = RecordFormat::Pickle.decode(&bytes).unwrap();
        assert_eq!(again, saved);
    }

    #[test]
    fn test_run_fail_on_intermittent_and_digest() {
        let dir = TempDir::new().unwrap();
        write_dump(&dir, "failed_junits_1", &[("C", failures("n1", &[10.0, 20.0]))]);

        let args = args_for(
            &dir,
            &[
                "--fail-on-intermittent",
                "--summary",
                "digest.md",
                "1",
                "out.pickle",
                "s3://bucket/ci",
                "failed_junits",
                "failed_pyunits",
            ],
        );
        assert_eq!(run(args).unwrap(), 2);

        let digest = std::fs::read_to_string(dir.path().join("digest.md")).unwrap();
        assert!(digest.contains("| `C` | 2 |"));
    }

    #[test]
    fn test_run_aborts_on_malformed_dump() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("failed_broken"), "not a pickle").unwrap();

        let args = args_for(&dir, &["2", "out.pickle", "s3://bucket/ci", "failed_", "jenkins_"]);
        let err = run(args).unwrap_err();

        assert!(format!("{:#}", err).contains("failed_broken"));
        assert!(!dir.path().join("out.pickle").exists());
    }

    #[test]
    fn test_single_prefix_is_a_wrong_call() {
        let call = parse_args_from(["flaketally", "2", "out.pickle", "s3://b", "failed_"])
            .unwrap_err();

        assert_eq!(call.exit_code, 1);
        assert!(call.message.starts_with("Wrong call. Not enough arguments."));
        assert!(call.message.contains("Usage:"));
    }

    #[test]
    fn test_missing_positionals_are_a_wrong_call() {
        let call = parse_args_from(["flaketally", "2"]).unwrap_err();
        assert_eq!(call.exit_code, 1);
        assert!(call.message.starts_with("Wrong call. Not enough arguments."));
    }

    #[test]
    fn test_invalid_arguments_print_usage() {
        let call = parse_args_from([
            "flaketally",
            "--dir",
            "/definitely/not/a/real/dir",
            "2",
            "out.pickle",
            "s3://b",
            "failed_pyunits",
            "failed_junits",
        ])
        .unwrap_err();

        assert_eq!(call.exit_code, 1);
        assert!(call.message.starts_with("Wrong call. Directory does not exist"));
        assert!(call.message.contains("Usage:"));

        let call = parse_args_from(["flaketally", "lots", "o", "s3://b", "a", "b"]).unwrap_err();
        assert!(call.message.starts_with("Wrong call. Invalid arguments."));
    }

    #[test]
    fn test_valid_call_parses() {
        let args = parse_args_from([
            "flaketally",
            "2",
            "out.pickle",
            "s3://b",
            "failed_pyunits",
            "failed_junits",
        ])
        .unwrap();
        assert_eq!(args.file_prefixes.len(), 2);
    }
}
