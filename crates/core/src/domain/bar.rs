use crate::error::PipelineError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One trading day for one ticker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

/// Bars for a single ticker with strictly increasing dates.
///
/// Gaps (holidays, halts) are tolerated and never filled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickerSeries {
    ticker: String,
    name: Option<String>,
    bars: Vec<Bar>,
}

impl TickerSeries {
    /// Sorts `bars` by date and rejects duplicate dates or non-finite values.
    pub fn new(
        ticker: impl Into<String>,
        name: Option<String>,
        mut bars: Vec<Bar>,
    ) -> Result<Self, PipelineError> {
        let ticker = ticker.into();
        let ticker = ticker.trim().to_string();
        if ticker.is_empty() {
            return Err(PipelineError::malformed("series", "ticker must be non-empty"));
        }

        bars.sort_by_key(|b| b.date);

        for pair in bars.windows(2) {
            if pair[0].date >= pair[1].date {
                return Err(PipelineError::malformed(
                    format!("series {ticker}"),
                    format!("duplicate bar date {}", pair[1].date),
                ));
            }
        }

        if let Some(bad) = bars.iter().find(|b| {
            ![b.open, b.high, b.low, b.close, b.volume]
                .iter()
                .all(|v| v.is_finite())
        }) {
            return Err(PipelineError::malformed(
                format!("series {ticker}"),
                format!("non-finite value on {}", bad.date),
            ));
        }

        Ok(Self {
            ticker,
            name: name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            bars,
        })
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    /// Display name, falling back to the ticker.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.ticker)
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }
}
