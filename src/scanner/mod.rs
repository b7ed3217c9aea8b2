//! Record file discovery and loading.
//!
//! This module finds the failure dumps sitting in the working directory
//! and decodes them into [`RunRecord`]s.

use crate::codec::{CodecError, RecordFormat};
use crate::models::RunRecord;
use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Configuration for record discovery.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Substrings identifying record files (e.g. ["failed_pyunits_", "failed_junits_"])
    pub prefixes: Vec<String>,
    /// Format the records are stored in
    pub format: RecordFormat,
    /// Files never treated as input, such as the summary being written
    pub excluded: Vec<PathBuf>,
}

/// A record file that matched one of the prefixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFile {
    /// Full path to the file
    pub path: PathBuf,
    /// Prefix that selected the file
    pub prefix: String,
}

/// Error raised while loading a single record file.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("failed to read record file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode record file {}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: CodecError,
    },
    #[error(
        "record file {} lists {names} test names but {infos} TestInfo entries",
        .path.display()
    )]
    Misaligned {
        path: PathBuf,
        names: usize,
        infos: usize,
    },
}

/// Scanner for failure record files in a single directory.
pub struct RecordScanner {
    config: ScanConfig,
    root: PathBuf,
}

impl RecordScanner {
    /// Create a new record scanner.
    pub fn new(root: PathBuf, config: ScanConfig) -> Self {
        Self { config, root }
    }

    /// List record files in the root directory, sorted by file name.
    ///
    /// Only regular files directly inside the root are considered. Each
    /// file is returned once, tagged with the first prefix its name contains.
    pub fn scan(&self) -> Result<Vec<RecordFile>> {
        if !self.root.is_dir() {
            anyhow::bail!("Record directory not found: {}", self.root.display());
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if self.is_excluded(path) {
                debug!("Ignoring excluded file: {}", path.display());
                continue;
            }

            let name = entry.file_name().to_string_lossy();
            if let Some(prefix) = self.matching_prefix(&name) {
                debug!("Found record file {} (prefix {})", name, prefix);
                files.push(RecordFile {
                    path: path.to_path_buf(),
                    prefix: prefix.to_string(),
                });
            }
        }

        Ok(files)
    }

    /// First configured prefix contained in `file_name`.
    pub fn matching_prefix(&self, file_name: &str) -> Option<&str> {
        self.config
            .prefixes
            .iter()
            .find(|p| !p.is_empty() && file_name.contains(p.as_str()))
            .map(String::as_str)
    }

    /// Load a record file found by [`scan`](Self::scan).
    pub fn load(&self, file: &RecordFile) -> Result<RunRecord, RecordError> {
        load_record(&file.path, self.config.format)
    }

    fn is_excluded(&self, path: &Path) -> bool {
        self.config.excluded.iter().any(|p| same_file(p, path))
    }
}

/// Read and decode one run record.
pub fn load_record(path: &Path, format: RecordFormat) -> Result<RunRecord, RecordError> {
    let bytes = fs::read(path).map_err(|source| RecordError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let record: RunRecord = format
        .decode(&bytes)
        .map_err(|source| RecordError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

    if !record.is_aligned() {
        return Err(RecordError::Misaligned {
            path: path.to_path_buf(),
            names: record.test_names.len(),
            infos: record.test_info.len(),
        });
    }

    for (name, info) in record.iter() {
        if !info.is_aligned() {
            warn!(
                "{}: failure fields of {} have different lengths",
                path.display(),
                name
            );
        }
    }

    Ok(record)
}

/// Compare two paths, resolving them when both exist.
fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
