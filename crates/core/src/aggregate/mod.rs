//! Joins quant scores with AI sentiment into a ranked, dated snapshot.

pub mod sentiment;

use crate::config::PipelineOptions;
use crate::domain::contract::{QuantScore, SentimentEntry};
use crate::domain::recommendation::{Pick, Snapshot};
use crate::domain::round_dp;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sentiment::{classify, Classification};
use std::collections::{BTreeMap, HashMap, HashSet};

pub const QUANT_WEIGHT: f64 = 0.8;
pub const FINAL_REPORT_FILE: &str = "final_top10_report.json";
/// Sector shown when neither the quant table nor the sector map knows it.
pub const MISSING_SECTOR: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateOptions {
    pub top_n: usize,
    /// When false, tickers without a summary are kept as Hold with no bonus.
    pub require_sentiment: bool,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            top_n: 10,
            require_sentiment: true,
        }
    }
}

impl From<&PipelineOptions> for AggregateOptions {
    fn from(opts: &PipelineOptions) -> Self {
        Self {
            top_n: opts.top_n,
            require_sentiment: opts.require_sentiment,
        }
    }
}

/// `quant × 0.8 + bonus`, rounded to one decimal.
pub fn final_score(quant_score: f64, bonus: f64) -> f64 {
    round_dp(quant_score * QUANT_WEIGHT + bonus, 1)
}

/// Everything the merge reads. `sectors` fills in sectors the quant table lacks.
#[derive(Debug, Clone, Copy)]
pub struct AggregateInput<'a> {
    pub quants: &'a [QuantScore],
    pub sentiment: &'a BTreeMap<String, SentimentEntry>,
    pub sectors: &'a HashMap<String, String>,
}

/// Deterministic for fixed inputs: the timestamp is supplied by the caller,
/// ties keep quant-table order and duplicate tickers keep their first row.
pub fn aggregate(
    input: AggregateInput<'_>,
    opts: AggregateOptions,
    analysis_date: NaiveDate,
    analysis_timestamp: DateTime<Utc>,
) -> Snapshot {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut unmatched = 0usize;
    let mut candidates: Vec<Pick> = Vec::with_capacity(input.quants.len());

    for q in input.quants {
        if !seen.insert(q.ticker.as_str()) {
            tracing::debug!(ticker = %q.ticker, "duplicate quant row ignored");
            continue;
        }

        let entry = input.sentiment.get(&q.ticker);
        let (summary, class) = match entry {
            Some(e) => (e.summary.clone(), classify(&e.summary)),
            None if opts.require_sentiment => {
                unmatched += 1;
                continue;
            }
            None => (String::new(), Classification::HOLD),
        };

        let sector = q
            .sector
            .clone()
            .or_else(|| input.sectors.get(&q.ticker).cloned())
            .unwrap_or_else(|| MISSING_SECTOR.to_string());

        candidates.push(Pick {
            rank: 0,
            ticker: q.ticker.clone(),
            name: q.name.clone(),
            sector,
            quant_score: q.composite_score,
            ai_recommendation: class.recommendation,
            ai_summary: summary,
            final_score: final_score(q.composite_score, class.bonus),
            price_at_analysis: q.current_price,
            current_price: q.current_price,
            target_upside: q.target_upside,
        });
    }

    // Stable: equal scores keep quant-table order.
    candidates.sort_by(|a, b| b.final_score.total_cmp(&a.final_score));
    candidates.truncate(opts.top_n);
    for (i, pick) in candidates.iter_mut().enumerate() {
        pick.rank = i as i32 + 1;
    }

    tracing::info!(
        %analysis_date,
        quant_rows = input.quants.len(),
        without_summary = unmatched,
        picks = candidates.len(),
        "aggregation finished"
    );

    Snapshot {
        analysis_date,
        analysis_timestamp,
        picks: candidates,
    }
}

/// Shape of `final_top10_report.json`.
#[derive(Debug, Serialize)]
pub struct FinalReport<'a> {
    pub analysis_date: NaiveDate,
    pub analysis_timestamp: DateTime<Utc>,
    pub top_picks: &'a [Pick],
}

impl<'a> From<&'a Snapshot> for FinalReport<'a> {
    fn from(snapshot: &'a Snapshot) -> Self {
        Self {
            analysis_date: snapshot.analysis_date,
            analysis_timestamp: snapshot.analysis_timestamp,
            top_picks: &snapshot.picks,
        }
    }
}
