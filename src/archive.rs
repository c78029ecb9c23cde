//! Raw payload snapshots.
//!
//! Each run writes what it fetched, unmodified, to `<dir>/<run timestamp>/`.
//! Files whose modification time is older than `retention_days` are removed
//! when a run finishes. Archive failures are logged and never fail a sync.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::ArchiveConfig;

#[derive(Debug, Clone)]
pub struct Archive {
    root: PathBuf,
    run_dir: PathBuf,
    retention: Duration,
}

impl Archive {
    /// `None` when archiving is not configured.
    pub fn from_config(config: &ArchiveConfig) -> Option<Self> {
        let root = config.dir.clone()?;
        Some(Self::at(root, config.retention_days, Utc::now()))
    }

    pub fn at(root: PathBuf, retention_days: i64, started: DateTime<Utc>) -> Self {
        let run_dir = root.join(started.format("%Y%m%d_%H%M%S").to_string());
        Self {
            root,
            run_dir,
            retention: Duration::days(retention_days),
        }
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Write `doc` as pretty JSON to `<run dir>/<name>.json`.
    pub fn write(&self, name: &str, doc: &Value) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.run_dir)?;
        let path = self.run_dir.join(format!("{}.json", file_stem(name)));
        std::fs::write(&path, serde_json::to_vec_pretty(doc)?)?;
        debug!(path = %path.display(), "archived payload");
        Ok(path)
    }

    /// [`Archive::write`], logging instead of failing.
    pub fn record(&self, name: &str, doc: &Value) {
        if let Err(e) = self.write(name, doc) {
            warn!(name, error = %e, "could not archive payload");
        }
    }

    /// Remove archived files past retention, then any directories left empty.
    /// Returns the number of files removed.
    pub fn cleanup(&self) -> Result<usize> {
        if !self.root.exists() {
            return Ok(0);
        }
        let cutoff = SystemTime::from(Utc::now() - self.retention);
        self.cleanup_before(cutoff)
    }

    fn cleanup_before(&self, cutoff: SystemTime) -> Result<usize> {
        let mut removed = 0;
        let mut dirs = Vec::new();

        for entry in WalkDir::new(&self.root).min_depth(1) {
            let entry = entry?;
            if entry.file_type().is_dir() {
                dirs.push(entry.into_path());
                continue;
            }
            let modified = entry
                .metadata()?
                .modified()
                .unwrap_or(SystemTime::UNIX_EPOCH);
            if modified < cutoff {
                std::fs::remove_file(entry.path())?;
                removed += 1;
            }
        }

        // deepest first so nested empties go too
        dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
        for dir in dirs {
            if dir != self.run_dir && std::fs::read_dir(&dir)?.next().is_none() {
                std::fs::remove_dir(&dir)?;
            }
        }

        Ok(removed)
    }

    /// [`Archive::cleanup`], logging instead of failing.
    pub fn prune(&self) {
        match self.cleanup() {
            Ok(0) => {}
            Ok(removed) => debug!(removed, "pruned archived payloads"),
            Err(e) => warn!(error = %e, "archive cleanup failed"),
        }
    }
}

fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn writes_under_run_directory() {
        let tmp = TempDir::new().unwrap();
        let started = DateTime::parse_from_rfc3339("2024-03-01T12:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let archive = Archive::at(tmp.path().to_path_buf(), 30, started);

        let path = archive
            .write("bill/118/hr/1", &json!({"bill": {"number": "1"}}))
            .unwrap();

        assert_eq!(path, tmp.path().join("20240301_123000").join("bill_118_hr_1.json"));
        let back: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(back["bill"]["number"], "1");
    }

    #[test]
    fn cleanup_removes_only_expired_files() {
        let tmp = TempDir::new().unwrap();
        let old = Archive::at(tmp.path().to_path_buf(), 30, Utc::now() - Duration::days(40));
        old.write("members", &json!([])).unwrap();
        let current = Archive::at(tmp.path().to_path_buf(), 30, Utc::now());
        current.write("members", &json!([])).unwrap();

        // everything written so far is older than a cutoff in the future
        let removed = current
            .cleanup_before(SystemTime::now() + std::time::Duration::from_secs(60))
            .unwrap();
        assert_eq!(removed, 2);
        assert!(!old.run_dir().exists());
        assert!(current.run_dir().exists());

        current.write("bills", &json!([])).unwrap();
        assert_eq!(current.cleanup().unwrap(), 0);
    }
}
