use crate::domain::recommendation::Snapshot;
use crate::error::PipelineError;
use crate::storage::{write_json_atomic, SnapshotStore};
use anyhow::Context;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

pub const CURRENT_FILE: &str = "smart_money_current.json";
pub const HISTORY_DIR: &str = "history";

pub fn history_file_name(date: NaiveDate) -> String {
    format!("picks_{}.json", date.format("%Y-%m-%d"))
}

fn parse_history_file_name(name: &str) -> Option<NaiveDate> {
    let stem = name.strip_prefix("picks_")?.strip_suffix(".json")?;
    NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()
}

/// `<root>/smart_money_current.json` plus `<root>/history/picks_YYYY-MM-DD.json`.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    root: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn current_path(&self) -> PathBuf {
        self.root.join(CURRENT_FILE)
    }

    pub fn history_path(&self, date: NaiveDate) -> PathBuf {
        self.root.join(HISTORY_DIR).join(history_file_name(date))
    }

    fn read(path: &Path) -> anyhow::Result<Option<Snapshot>> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()));
            }
        };
        let snapshot = serde_json::from_slice::<Snapshot>(&bytes).map_err(|e| {
            PipelineError::malformed(path.display().to_string(), e.to_string())
        })?;
        Ok(Some(snapshot))
    }
}

#[async_trait::async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn save(&self, snapshot: &Snapshot) -> anyhow::Result<()> {
        // History first: a crash in between leaves current pointing at the previous run.
        let history = self.history_path(snapshot.analysis_date);
        write_json_atomic(&history, snapshot)?;
        write_json_atomic(&self.current_path(), snapshot)?;
        tracing::info!(
            date = %snapshot.analysis_date,
            picks = snapshot.picks.len(),
            path = %history.display(),
            "snapshot saved"
        );
        Ok(())
    }

    async fn current(&self) -> anyhow::Result<Option<Snapshot>> {
        Self::read(&self.current_path())
    }

    async fn load(&self, date: NaiveDate) -> anyhow::Result<Option<Snapshot>> {
        Self::read(&self.history_path(date))
    }

    async fn dates(&self) -> anyhow::Result<Vec<NaiveDate>> {
        let dir = self.root.join(HISTORY_DIR);
        let entries = match std::fs::read_dir(&dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to list {}", dir.display()));
            }
        };

        let mut dates = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| format!("failed to list {}", dir.display()))?;
            if let Some(date) = entry.file_name().to_str().and_then(parse_history_file_name) {
                dates.push(date);
            }
        }
        dates.sort();
        Ok(dates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn snapshot(day: u32) -> Snapshot {
        Snapshot {
            analysis_date: NaiveDate::from_ymd_opt(2026, 1, day).unwrap(),
            analysis_timestamp: Utc.with_ymd_and_hms(2026, 1, day, 21, 0, 0).unwrap(),
            picks: Vec::new(),
        }
    }

    #[test]
    fn history_file_names_round_trip() {
        let d = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        assert_eq!(history_file_name(d), "picks_2026-03-07.json");
        assert_eq!(parse_history_file_name("picks_2026-03-07.json"), Some(d));
        assert_eq!(parse_history_file_name("picks_latest.json"), None);
        assert_eq!(parse_history_file_name("notes.txt"), None);
    }

    #[tokio::test]
    async fn empty_store_has_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        assert!(store.current().await.unwrap().is_none());
        assert!(store.dates().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_updates_history_and_current() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path());

        store.save(&snapshot(28)).await.unwrap();
        store.save(&snapshot(27)).await.unwrap();
        std::fs::write(dir.path().join(HISTORY_DIR).join("readme.txt"), "x").unwrap();

        let dates = store.dates().await.unwrap();
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2026, 1, 27).unwrap(),
                NaiveDate::from_ymd_opt(2026, 1, 28).unwrap(),
            ]
        );
        assert_eq!(store.current().await.unwrap(), Some(snapshot(27)));
        assert_eq!(
            store.load(snapshot(28).analysis_date).await.unwrap(),
            Some(snapshot(28))
        );
    }

    #[tokio::test]
    async fn prices_read_back_bit_for_bit() {
        use crate::domain::recommendation::{Pick, Recommendation};

        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        let mut snap = snapshot(27);
        snap.picks.push(Pick {
            rank: 1,
            ticker: "NVDA".to_string(),
            name: "NVIDIA".to_string(),
            sector: "Tech".to_string(),
            quant_score: 82.5,
            ai_recommendation: Recommendation::StrongBuy,
            ai_summary: String::new(),
            final_score: 86.0,
            price_at_analysis: 10.197657142857143,
            current_price: 10.197657142857143,
            target_upside: Some(0.1 + 0.2),
        });

        store.save(&snap).await.unwrap();
        let back = store.current().await.unwrap().unwrap();
        assert_eq!(back.picks[0].price_at_analysis.to_bits(), 10.197657142857143f64.to_bits());
        assert_eq!(back, snap);
    }

    #[tokio::test]
    async fn unreadable_snapshot_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        std::fs::write(store.current_path(), "{not json").unwrap();

        let err = store.current().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::MalformedInput { .. })
        ));
    }
}
