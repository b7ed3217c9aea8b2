//! Persistence of the intermittents summary.

use crate::codec::RecordFormat;
use crate::models::FailureSummary;
use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Serialize the summary to `path`, replacing any previous file atomically.
pub fn save_summary(path: &Path, summary: &FailureSummary, format: RecordFormat) -> Result<()> {
    let bytes = format
        .encode(summary)
        .with_context(|| format!("Failed to encode summary for {}", path.display()))?;

    write_atomic(path, &bytes)?;
    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

/// Write text or bytes to `path` through a temporary file in the same directory.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
    file.write_all(content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    set_output_permissions(file.as_file(), path)?;
    file.persist(path)
        .with_context(|| format!("Failed to save {}", path.display()))?;

    Ok(())
}

/// Give the temporary file the mode of the file it replaces, or 0644 for a new one.
#[cfg(unix)]
fn set_output_permissions(file: &std::fs::File, path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let permissions = match std::fs::metadata(path) {
        Ok(meta) => meta.permissions(),
        Err(_) => std::fs::Permissions::from_mode(0o644),
    };
    file.set_permissions(permissions)
        .with_context(|| format!("Failed to set permissions for {}", path.display()))
}

#[cfg(not(unix))]
fn set_output_permissions(_file: &std::fs::File, _path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BuildId, TestInfo};
    use tempfile::TempDir;

    fn load_summary(path: &Path, format: RecordFormat) -> FailureSummary {
        format.decode(&std::fs::read(path).unwrap()).unwrap()
    }

    fn sample() -> FailureSummary {
        let info = TestInfo {
            jenkins_job_name: vec!["job".to_string()],
            build_id: vec![BuildId::Number(3)],
            timestamp: vec![1000.0],
            git_hash: vec!["abc".to_string()],
            test_category: vec!["RUnit".to_string()],
            node_name: vec!["node".to_string()],
            failure_messages: Vec::new(),
            failure_count: 1,
        };
        let mut summary = FailureSummary::new();
        summary.merge_test("runit_kmeans.R", &info);
        summary
    }

    #[test]
    fn test_save_and_load_pickle() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("intermittents.pickle");

        save_summary(&path, &sample(), RecordFormat::Pickle).unwrap();
        let loaded = load_summary(&path, RecordFormat::Pickle);

        assert_eq!(loaded, sample());
    }

    #[test]
    fn test_save_overwrites_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("intermittents.json");
        std::fs::write(&path, "stale").unwrap();

        save_summary(&path, &FailureSummary::new(), RecordFormat::Json).unwrap();
        let loaded = load_summary(&path, RecordFormat::Json);

        assert!(loaded.is_empty());
    }

    #[test]
    fn test_save_into_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("out.pickle");

        assert!(save_summary(&path, &sample(), RecordFormat::Pickle).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_new_file_is_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("intermittents.pickle");
        save_summary(&path, &sample(), RecordFormat::Pickle).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[cfg(unix)]
    #[test]
    fn test_overwrite_keeps_existing_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("intermittents.pickle");
        std::fs::write(&path, "stale").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).unwrap();

        save_summary(&path, &sample(), RecordFormat::Pickle).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }
}
