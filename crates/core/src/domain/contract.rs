//! Shapes of the externally produced inputs and their validation into domain types.

use anyhow::ensure;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of the quant composite table, as read from disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantRow {
    pub ticker: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sector: Option<String>,
    pub composite_score: Option<f64>,
    pub current_price: Option<f64>,
    #[serde(default)]
    pub target_upside: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuantScore {
    pub ticker: String,
    pub name: String,
    pub sector: Option<String>,
    pub composite_score: f64,
    pub current_price: f64,
    pub target_upside: Option<f64>,
}

impl QuantRow {
    pub fn validate_and_into(self) -> anyhow::Result<QuantScore> {
        let ticker = self.ticker.trim().to_string();
        ensure!(!ticker.is_empty(), "ticker must be non-empty");

        let composite_score = self
            .composite_score
            .filter(|s| s.is_finite())
            .ok_or_else(|| anyhow::anyhow!("composite_score missing or non-finite for {ticker}"))?;
        ensure!(
            (0.0..=100.0).contains(&composite_score),
            "composite_score must be within 0..=100 for {ticker} (got {composite_score})"
        );

        let current_price = self.current_price.filter(|p| p.is_finite()).unwrap_or(0.0);
        ensure!(
            current_price >= 0.0,
            "current_price must be >= 0 for {ticker} (got {current_price})"
        );

        let name = self
            .name
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| ticker.clone());

        let sector = self
            .sector
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty() && s != "N/A");

        Ok(QuantScore {
            ticker,
            name,
            sector,
            composite_score,
            current_price,
            target_upside: self.target_upside.filter(|v| v.is_finite()),
        })
    }
}

/// AI summary for one ticker. `summary` is the text sentiment is classified from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentEntry {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub summary_ko: String,
    #[serde(default)]
    pub summary_en: String,
    #[serde(default)]
    pub updated: String,
}

impl SentimentEntry {
    pub fn new(summary_ko: String, summary_en: String, updated: DateTime<Utc>) -> Self {
        Self {
            summary: summary_ko.clone(),
            summary_ko,
            summary_en,
            updated: updated.to_rfc3339(),
        }
    }

    /// Entries written without `summary` classify from the Korean text.
    pub fn with_summary_fallback(mut self) -> Self {
        if self.summary.trim().is_empty() {
            self.summary = self.summary_ko.clone();
        }
        self
    }

    /// Accepts RFC 3339 and zone-less ISO timestamps (read as UTC).
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        let s = self.updated.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(score: Option<f64>) -> QuantRow {
        QuantRow {
            ticker: " AAPL ".to_string(),
            name: None,
            sector: Some("N/A".to_string()),
            composite_score: score,
            current_price: Some(190.0),
            target_upside: None,
        }
    }

    #[test]
    fn validates_quant_row() {
        let q = row(Some(72.5)).validate_and_into().unwrap();
        assert_eq!(q.ticker, "AAPL");
        assert_eq!(q.name, "AAPL");
        assert_eq!(q.sector, None);
        assert_eq!(q.composite_score, 72.5);
    }

    #[test]
    fn rejects_missing_or_out_of_range_score() {
        assert!(row(None).validate_and_into().is_err());
        assert!(row(Some(f64::NAN)).validate_and_into().is_err());
        assert!(row(Some(130.0)).validate_and_into().is_err());
    }

    #[test]
    fn parses_both_timestamp_shapes() {
        let mut e = SentimentEntry::new(
            "a".into(),
            "b".into(),
            Utc.with_ymd_and_hms(2026, 1, 27, 10, 0, 0).unwrap(),
        );
        assert_eq!(
            e.updated_at(),
            Some(Utc.with_ymd_and_hms(2026, 1, 27, 10, 0, 0).unwrap())
        );

        e.updated = "2026-01-27T10:00:00.123456".to_string();
        assert!(e.updated_at().is_some());

        e.updated = "yesterday".to_string();
        assert!(e.updated_at().is_none());
    }
}
