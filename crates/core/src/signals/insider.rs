//! Recent insider purchases per ticker (`insider_moves.json`).

use crate::ingest::provider::TimeSeriesProvider;
use crate::ingest::types::InsiderTransaction;
use crate::signals::{run_batch, BatchOptions, BatchStats, Outcome};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const INSIDER_FILE: &str = "insider_moves.json";

pub const WINDOW_DAYS: i64 = 180;
/// Purchases above this value add to the activity score.
pub const LARGE_PURCHASE_VALUE: f64 = 100_000.0;
pub const POINTS_PER_LARGE_PURCHASE: u32 = 10;
const LISTED_TRANSACTIONS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsiderMove {
    pub date: NaiveDate,
    pub insider: String,
    pub value: f64,
    pub shares: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsiderActivity {
    pub score: u32,
    pub transactions: Vec<InsiderMove>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsiderReport {
    pub details: BTreeMap<String, InsiderActivity>,
}

fn is_purchase(text: &str) -> bool {
    let t = text.to_lowercase();
    t.contains("purchase") || t.contains("buy")
}

/// Purchases within the window ending at `as_of`, newest first.
pub fn recent_purchases(txns: &[InsiderTransaction], as_of: NaiveDate) -> Vec<InsiderMove> {
    let cutoff = as_of - Duration::days(WINDOW_DAYS);
    let mut out: Vec<InsiderMove> = txns
        .iter()
        .filter(|t| t.date >= cutoff && is_purchase(&t.text))
        .map(|t| InsiderMove {
            date: t.date,
            insider: if t.insider.trim().is_empty() {
                "N/A".to_string()
            } else {
                t.insider.clone()
            },
            value: t.value.filter(|v| v.is_finite()).unwrap_or(0.0),
            shares: t.shares.filter(|v| v.is_finite()).unwrap_or(0.0) as i64,
        })
        .collect();
    out.sort_by(|a, b| b.date.cmp(&a.date));
    out
}

/// `None` when there were no purchases in the window.
pub fn insider_activity(txns: &[InsiderTransaction], as_of: NaiveDate) -> Option<InsiderActivity> {
    let purchases = recent_purchases(txns, as_of);
    if purchases.is_empty() {
        return None;
    }
    let large = purchases
        .iter()
        .filter(|m| m.value > LARGE_PURCHASE_VALUE)
        .count() as u32;
    Some(InsiderActivity {
        score: large * POINTS_PER_LARGE_PURCHASE,
        transactions: purchases.into_iter().take(LISTED_TRANSACTIONS).collect(),
    })
}

pub async fn run(
    provider: &dyn TimeSeriesProvider,
    tickers: &[String],
    as_of: NaiveDate,
    opts: &BatchOptions,
) -> (InsiderReport, BatchStats) {
    let (rows, stats) = run_batch("insider", tickers, opts, |ticker| async move {
        let facts = provider.ownership(&ticker).await?;
        let txns = facts.insider_transactions.unwrap_or_default();
        Ok(match insider_activity(&txns, as_of) {
            Some(a) => Outcome::Produced((ticker, a)),
            None => Outcome::Skipped,
        })
    })
    .await;
    (
        InsiderReport {
            details: rows.into_iter().collect(),
        },
        stats,
    )
}
