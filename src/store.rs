//! Artifact cache and retention
//!
//! Finished archives live in one directory, named `{task_id}.{display_name}`.
//! Retention is purely age based: before each job starts, every file whose
//! modification time is older than the retention window is deleted.

use crate::error::{Error, Result};
use crate::jobs::JobKey;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Suffix appended to an archive path while it is being written
pub const PARTIAL_SUFFIX: &str = "part";

/// A finished archive, ready to be served
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ArtifactRecord {
    /// Location of the archive on disk
    pub file_path: PathBuf,
    /// File name offered on download (everything after the task id)
    pub display_name: String,
    /// Archive size in bytes
    pub size_bytes: u64,
}

impl ArtifactRecord {
    /// Whether the file backing this record still exists
    pub fn is_present(&self) -> bool {
        self.file_path.is_file()
    }
}

/// Outcome of one retention sweep
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Files deleted
    pub removed: usize,
    /// Files that were due but could not be deleted
    pub failed: usize,
}

/// Directory of finished archives with age-based eviction
#[derive(Clone, Debug)]
pub struct ArtifactStore {
    dir: PathBuf,
    retention: Duration,
}

impl ArtifactStore {
    /// Create a store rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>, retention: Duration) -> Self {
        Self {
            dir: dir.into(),
            retention,
        }
    }

    /// Root directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Retention window
    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Create the root directory if missing
    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Final path of the archive for `key`
    pub fn artifact_path(&self, key: &JobKey, display_name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", key, display_name))
    }

    /// Path an archive is written to before it is complete
    pub fn partial_path(final_path: &Path) -> PathBuf {
        let mut name = final_path.as_os_str().to_owned();
        name.push(".");
        name.push(PARTIAL_SUFFIX);
        PathBuf::from(name)
    }

    /// Move a finished partial archive to its final path
    pub async fn commit(&self, partial: &Path, final_path: &Path) -> Result<ArtifactRecord> {
        tokio::fs::rename(partial, final_path).await?;
        let size_bytes = tokio::fs::metadata(final_path).await?.len();
        let display_name = display_name_of(final_path).unwrap_or_default();

        Ok(ArtifactRecord {
            file_path: final_path.to_path_buf(),
            display_name,
            size_bytes,
        })
    }

    /// Delete every file older than the retention window
    ///
    /// Individual deletion failures are logged and counted, never returned.
    /// Fails only when the directory itself cannot be listed.
    pub async fn evict_expired(&self) -> Result<EvictionReport> {
        let mut report = EvictionReport::default();
        let now = SystemTime::now();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                Ok(_) => continue,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to stat cached file");
                    continue;
                }
            };

            let age = match metadata.modified() {
                // Files with a modification time in the future count as fresh
                Ok(modified) => now.duration_since(modified).unwrap_or_default(),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "no modification time for cached file");
                    continue;
                }
            };
            if age <= self.retention {
                continue;
            }

            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    debug!(path = %path.display(), age_secs = age.as_secs(), "evicted cached file");
                    report.removed += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to evict cached file");
                    report.failed += 1;
                }
            }
        }

        if report.removed > 0 || report.failed > 0 {
            info!(
                removed = report.removed,
                failed = report.failed,
                "retention sweep finished"
            );
        }
        Ok(report)
    }

    /// Find the finished archive for `key`
    ///
    /// Returns [`Error::NotFound`] when no finished archive carries the key,
    /// including when only a partial archive exists.
    pub async fn locate(&self, key: &JobKey) -> Result<ArtifactRecord> {
        let prefix = format!("{}.", key);
        let not_found = || Error::NotFound(format!("artifact for task {}", key));

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with(&prefix) || !name.ends_with(".cbz") {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            return Ok(ArtifactRecord {
                file_path: entry.path(),
                display_name: name[prefix.len()..].to_string(),
                size_bytes: metadata.len(),
            });
        }

        Err(not_found())
    }
}

/// Everything after the first `.` of a file name
fn display_name_of(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    name.split_once('.').map(|(_, rest)| rest.to_string())
}
