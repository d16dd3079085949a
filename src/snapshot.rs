//! Timestamped JSON snapshots of pipeline stages.

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Writes `<dir>/<stage>_<YYYYMMDD_HHMMSS>.json` files.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    dir: PathBuf,
    stamp: String,
}

impl SnapshotWriter {
    /// All snapshots from one writer share the timestamp of `started`.
    pub fn new(dir: impl Into<PathBuf>, started: DateTime<Utc>) -> Self {
        Self {
            dir: dir.into(),
            stamp: started.format("%Y%m%d_%H%M%S").to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, stage: &str) -> PathBuf {
        self.dir.join(format!("{stage}_{}.json", self.stamp))
    }

    pub async fn write<T: Serialize + ?Sized>(&self, stage: &str, value: &T) -> anyhow::Result<PathBuf> {
        let path = self.path_for(stage);
        let json = serde_json::to_vec_pretty(value)?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;

        tracing::info!(name: "snapshot.written", stage, path = %path.display(), "Snapshot written");
        Ok(path)
    }
}
