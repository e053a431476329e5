//! Persistence: dated snapshots, the summary book, the sector cache and the
//! tabular signal files.

pub mod files;
pub mod lock;
pub mod postgres;
pub mod sector_cache;
pub mod summaries;
pub mod tables;

use crate::domain::recommendation::Snapshot;
use crate::error::PipelineError;
use anyhow::Context;
use chrono::NaiveDate;
use serde::Serialize;
use std::fs;
use std::path::Path;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

/// Dated history plus a "current" pointer.
///
/// `save` writes the dated entry and the current pointer; a same-date save
/// replaces the earlier one. Readers see either the old or the new snapshot,
/// never a partial one.
#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save(&self, snapshot: &Snapshot) -> anyhow::Result<()>;

    async fn current(&self) -> anyhow::Result<Option<Snapshot>>;

    async fn load(&self, date: NaiveDate) -> anyhow::Result<Option<Snapshot>>;

    /// Stored dates, ascending.
    async fn dates(&self) -> anyhow::Result<Vec<NaiveDate>>;
}

/// Writes `bytes` to a sibling `.tmp` file and renames it over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PipelineError> {
    let persistence = |detail: String| PipelineError::Persistence {
        path: path.to_path_buf(),
        detail,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| persistence(format!("create dir failed: {e}")))?;
    }

    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    fs::write(&tmp_path, bytes).map_err(|e| persistence(format!("write temp file failed: {e}")))?;
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        persistence(format!("atomic rename failed: {e}"))
    })?;
    Ok(())
}

pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), PipelineError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| PipelineError::Persistence {
        path: path.to_path_buf(),
        detail: format!("serialize failed: {e}"),
    })?;
    write_atomic(path, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_replaces_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.json");

        write_json_atomic(&path, &serde_json::json!({"v": 1})).unwrap();
        write_json_atomic(&path, &serde_json::json!({"v": 2})).unwrap();

        let v: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(v["v"], 2);
        assert!(!dir.path().join("nested").join("out.json.tmp").exists());
    }
}
