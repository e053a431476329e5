use crate::domain::contract::SentimentEntry;
use crate::error::PipelineError;
use crate::storage::write_json_atomic;
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::path::Path;

pub const SUMMARIES_FILE: &str = "ai_summaries.json";

/// Per-ticker AI summaries keyed by ticker. Upserts replace by key, so
/// re-running generation never duplicates an entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryBook {
    entries: BTreeMap<String, SentimentEntry>,
}

impl SummaryBook {
    /// Missing file means an empty book. A file that is not a JSON object is
    /// malformed; a single bad entry is skipped with a warning.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
        };
        let raw = serde_json::from_slice::<BTreeMap<String, serde_json::Value>>(&bytes)
            .map_err(|e| PipelineError::malformed(path.display().to_string(), e.to_string()))?;

        let mut entries = BTreeMap::new();
        for (ticker, value) in raw {
            match serde_json::from_value::<SentimentEntry>(value) {
                Ok(entry) => {
                    entries.insert(ticker, entry.with_summary_fallback());
                }
                Err(e) => {
                    tracing::warn!(%ticker, error = %e, "skipping malformed summary entry");
                }
            }
        }
        Ok(Self { entries })
    }

    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        write_json_atomic(path, &self.entries)
    }

    pub fn entries(&self) -> &BTreeMap<String, SentimentEntry> {
        &self.entries
    }

    pub fn get(&self, ticker: &str) -> Option<&SentimentEntry> {
        self.entries.get(ticker)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when the ticker has no entry, or `max_age` is set and the entry is
    /// older than it (an unparseable timestamp counts as stale).
    pub fn needs_summary(&self, ticker: &str, now: DateTime<Utc>, max_age: Option<Duration>) -> bool {
        let Some(entry) = self.entries.get(ticker) else {
            return true;
        };
        match max_age {
            None => false,
            Some(max_age) => entry
                .updated_at()
                .map_or(true, |updated| now - updated > max_age),
        }
    }

    pub fn upsert(&mut self, ticker: impl Into<String>, entry: SentimentEntry) {
        self.entries.insert(ticker.into(), entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, day, 9, 0, 0).unwrap()
    }

    #[test]
    fn upsert_is_keyed_by_ticker() {
        let mut book = SummaryBook::default();
        book.upsert("AAPL", SentimentEntry::new("첫".into(), "first".into(), at(1)));
        book.upsert("AAPL", SentimentEntry::new("둘".into(), "second".into(), at(2)));
        assert_eq!(book.len(), 1);
        assert_eq!(book.get("AAPL").unwrap().summary_en, "second");
    }

    #[test]
    fn refresh_policy() {
        let mut book = SummaryBook::default();
        book.upsert("AAPL", SentimentEntry::new("a".into(), "a".into(), at(1)));

        assert!(book.needs_summary("MSFT", at(2), None));
        assert!(!book.needs_summary("AAPL", at(20), None));
        assert!(!book.needs_summary("AAPL", at(5), Some(Duration::days(7))));
        assert!(book.needs_summary("AAPL", at(20), Some(Duration::days(7))));
    }

    #[test]
    fn load_and_save_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SUMMARIES_FILE);
        assert!(SummaryBook::load(&path).unwrap().is_empty());

        let mut book = SummaryBook::default();
        book.upsert("NVDA", SentimentEntry::new("적극 매수".into(), "Strong Buy".into(), at(3)));
        book.save(&path).unwrap();

        assert_eq!(SummaryBook::load(&path).unwrap(), book);
    }

    #[test]
    fn reads_entries_without_optional_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SUMMARIES_FILE);
        std::fs::write(&path, r#"{"TSLA": {"summary": "Hold for now"}}"#).unwrap();

        let book = SummaryBook::load(&path).unwrap();
        assert_eq!(book.get("TSLA").unwrap().summary, "Hold for now");
        assert!(book.needs_summary("TSLA", at(1), Some(Duration::days(1))));
    }

    #[test]
    fn bad_entries_do_not_sink_the_book() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SUMMARIES_FILE);
        std::fs::write(
            &path,
            r#"{"AAA": {"summary": "Strong Buy"}, "BBB": {"summary_ko": "매수"}, "CCC": 5}"#,
        )
        .unwrap();

        let book = SummaryBook::load(&path).unwrap();
        assert_eq!(book.len(), 2);
        assert_eq!(book.get("AAA").unwrap().summary, "Strong Buy");
        assert_eq!(book.get("BBB").unwrap().summary, "매수");
        assert!(book.get("CCC").is_none());
    }

    #[test]
    fn non_object_file_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SUMMARIES_FILE);
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        let err = SummaryBook::load(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::MalformedInput { .. })
        ));
    }
}
