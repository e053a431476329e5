//! Re-prices a stored snapshot against current closes.

use crate::domain::recommendation::{
    PerformanceRecord, PerformanceReport, PerformanceSummary, Snapshot,
};
use crate::domain::round_dp;
use crate::ingest::provider::TimeSeriesProvider;
use std::collections::HashMap;
use std::time::Duration;

/// `(current − recorded) / recorded × 100`, rounded to two decimals.
/// A missing or non-finite current price falls back to the recorded one;
/// a recorded price that is not positive yields 0.
pub fn change_since(price_at_rec: f64, current: Option<f64>) -> (f64, f64) {
    let recorded = if price_at_rec.is_finite() { price_at_rec } else { 0.0 };
    let current = current
        .filter(|p| p.is_finite() && *p > 0.0)
        .unwrap_or(recorded);
    let change = if recorded > 0.0 {
        (current / recorded - 1.0) * 100.0
    } else {
        0.0
    };
    (current, round_dp(change, 2))
}

/// Builds the report; the stored snapshot itself is never modified.
pub fn track(snapshot: &Snapshot, prices: &HashMap<String, f64>) -> PerformanceReport {
    let top_picks: Vec<PerformanceRecord> = snapshot
        .picks
        .iter()
        .map(|pick| {
            let (current, change) = change_since(pick.price_at_analysis, prices.get(&pick.ticker).copied());
            let mut live = pick.clone();
            live.current_price = round_dp(current, 2);
            PerformanceRecord {
                pick: live,
                price_at_rec: round_dp(pick.price_at_analysis.max(0.0), 2),
                change_since_rec: change,
            }
        })
        .collect();

    let priced: Vec<f64> = top_picks
        .iter()
        .filter(|r| r.price_at_rec > 0.0)
        .map(|r| r.change_since_rec)
        .collect();
    let avg_performance = if priced.is_empty() {
        0.0
    } else {
        round_dp(priced.iter().sum::<f64>() / priced.len() as f64, 2)
    };
    let avg_score = if top_picks.is_empty() {
        0.0
    } else {
        round_dp(
            top_picks.iter().map(|r| r.pick.final_score).sum::<f64>() / top_picks.len() as f64,
            1,
        )
    };

    PerformanceReport {
        analysis_date: snapshot.analysis_date,
        analysis_timestamp: snapshot.analysis_timestamp,
        summary: PerformanceSummary {
            total: top_picks.len(),
            avg_score,
            avg_performance,
        },
        top_picks,
    }
}

/// Latest close per ticker; tickers whose lookup fails are simply absent.
pub async fn fetch_current_prices(
    provider: &dyn TimeSeriesProvider,
    tickers: &[String],
    delay: Duration,
) -> HashMap<String, f64> {
    let mut out = HashMap::with_capacity(tickers.len());
    for (i, ticker) in tickers.iter().enumerate() {
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match provider.latest_close(ticker).await {
            Ok(Some(price)) => {
                out.insert(ticker.clone(), round_dp(price, 2));
            }
            Ok(None) => tracing::debug!(%ticker, "no recent close"),
            Err(err) => tracing::warn!(%ticker, error = %format!("{err:#}"), "price lookup failed"),
        }
    }
    out
}
