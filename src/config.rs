//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.flaketally.toml` files.

use crate::codec::RecordFormat;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".flaketally.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Remote retrieval settings.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Record file settings.
    #[serde(default)]
    pub input: InputConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Exit with code 2 when intermittent tests are found.
    #[serde(default)]
    pub fail_on_intermittent: bool,
}

/// Remote retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Run the copy command before aggregating.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Copy program.
    #[serde(default = "default_fetch_command")]
    pub command: String,

    /// Arguments placed before the remote pattern.
    #[serde(default = "default_fetch_args")]
    pub args: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: default_fetch_command(),
            args: default_fetch_args(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_fetch_command() -> String {
    "s3cmd".to_string()
}

fn default_fetch_args() -> Vec<String> {
    vec!["get".to_string(), "--force".to_string()]
}

/// Record file settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputConfig {
    /// Serialization of record and summary files.
    #[serde(default)]
    pub format: RecordFormat,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from a directory.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if args.skip_fetch {
            self.fetch.enabled = false;
        }

        if let Some(format) = args.format {
            self.input.format = format;
        }

        // Flags always override
        if args.fail_on_intermittent {
            self.general.fail_on_intermittent = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
