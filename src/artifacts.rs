//! Local directory artifact store
//!
//! Persists flushed log files under a root directory, keyed by artifact name.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};

use crate::logging::{ArtifactSink, LogLevel};

/// Copies notified files into `<root>/<artifact_name>`
///
/// With `overwrite` the previous copy is replaced; without it each
/// notification writes a new `<artifact_name>.v<N>` version.
#[derive(Debug)]
pub struct LocalArtifactStore {
    root: PathBuf,
    notifications: AtomicUsize,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            notifications: AtomicUsize::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of notifications received so far
    pub fn notification_count(&self) -> usize {
        self.notifications.load(Ordering::Relaxed)
    }

    /// Path an artifact name maps to, rejecting names that escape the root
    pub fn artifact_path(&self, artifact_name: &str) -> Result<PathBuf> {
        let relative = Path::new(artifact_name);
        let escapes = relative.components().any(|c| {
            !matches!(c, std::path::Component::Normal(_) | std::path::Component::CurDir)
        });
        if artifact_name.is_empty() || escapes {
            anyhow::bail!("Invalid artifact name '{}'", artifact_name);
        }
        Ok(self.root.join(relative))
    }

    /// Find the first unused `<path>.v<N>`
    fn next_version(path: &Path) -> PathBuf {
        let mut version = 1;
        loop {
            let mut name = path.as_os_str().to_os_string();
            name.push(format!(".v{}", version));
            let candidate = PathBuf::from(name);
            if !candidate.exists() {
                return candidate;
            }
            version += 1;
        }
    }
}

impl ArtifactSink for LocalArtifactStore {
    fn log_file_artifact(
        &self,
        level: LogLevel,
        artifact_name: &str,
        file_path: &Path,
        overwrite: bool,
    ) -> Result<()> {
        let mut target = self.artifact_path(artifact_name)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).context("Failed to create artifact directory")?;
        }
        if !overwrite && target.exists() {
            target = Self::next_version(&target);
        }

        fs::copy(file_path, &target).with_context(|| {
            format!(
                "Failed to copy {} to {}",
                file_path.display(),
                target.display()
            )
        })?;
        self.notifications.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            "Stored {} artifact {} at {}",
            level,
            artifact_name,
            target.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn source_file(temp_dir: &TempDir, content: &str) -> PathBuf {
        let path = temp_dir.path().join("source.log");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_overwrite_replaces_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalArtifactStore::new(temp_dir.path().join("artifacts"));
        let source = source_file(&temp_dir, "first\n");

        store
            .log_file_artifact(LogLevel::Fit, "run/rank0.log", &source, true)
            .unwrap();
        fs::write(&source, "first\nsecond\n").unwrap();
        store
            .log_file_artifact(LogLevel::Fit, "run/rank0.log", &source, true)
            .unwrap();

        let stored = store.artifact_path("run/rank0.log").unwrap();
        assert_eq!(fs::read_to_string(stored).unwrap(), "first\nsecond\n");
        assert_eq!(store.notification_count(), 2);
    }

    #[test]
    fn test_no_overwrite_versions_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalArtifactStore::new(temp_dir.path().join("artifacts"));
        let source = source_file(&temp_dir, "segment\n");

        for _ in 0..3 {
            store
                .log_file_artifact(LogLevel::Epoch, "rank0.log", &source, false)
                .unwrap();
        }

        let root = store.root().to_path_buf();
        assert!(root.join("rank0.log").exists());
        assert!(root.join("rank0.log.v1").exists());
        assert!(root.join("rank0.log.v2").exists());
    }

    #[test]
    fn test_rejects_escaping_names() {
        let store = LocalArtifactStore::new("/tmp/artifacts");
        assert!(store.artifact_path("../outside.log").is_err());
        assert!(store.artifact_path("/etc/passwd").is_err());
        assert!(store.artifact_path("").is_err());
        assert!(store.artifact_path("run/rank0.log").is_ok());
    }

    #[test]
    fn test_missing_source_fails() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalArtifactStore::new(temp_dir.path());
        let result = store.log_file_artifact(
            LogLevel::Fit,
            "x.log",
            &temp_dir.path().join("missing.log"),
            true,
        );
        assert!(result.is_err());
        assert_eq!(store.notification_count(), 0);
    }
}
