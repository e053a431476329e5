//! Concentration check over a pick list: pairwise return correlation and the
//! annualized volatility of an equal-weight portfolio.

use crate::domain::bar::TickerSeries;
use crate::domain::round_dp;
use crate::indicators::InsufficientData;
use crate::ingest::provider::TimeSeriesProvider;
use crate::signals::{run_batch, BatchOptions, BatchStats, Outcome};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const PORTFOLIO_RISK_FILE: &str = "portfolio_risk.json";

/// Pairs correlated above this are reported.
pub const HIGH_CORRELATION: f64 = 0.8;
/// Calendar days requested from the provider (about six months).
pub const LOOKBACK_DAYS: u32 = 183;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
const MIN_RETURNS: usize = 2;

/// Serialized as `[ticker, ticker, correlation]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelatedPair(pub String, pub String, pub f64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioRisk {
    /// Annualized, in percent.
    pub volatility: f64,
    pub high_correlations: Vec<CorrelatedPair>,
    /// ticker -> ticker -> correlation; `null` when either side never moved.
    pub matrix: BTreeMap<String, BTreeMap<String, Option<f64>>>,
}

/// Close-to-close returns restricted to the dates every ticker has one for.
#[derive(Debug)]
struct AlignedReturns {
    tickers: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl AlignedReturns {
    fn rows(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }
}

fn aligned_returns(series: &[TickerSeries]) -> AlignedReturns {
    let per_ticker: Vec<BTreeMap<NaiveDate, f64>> = series
        .iter()
        .map(|s| {
            s.bars()
                .windows(2)
                .filter(|w| w[0].close > 0.0)
                .map(|w| (w[1].date, w[1].close / w[0].close - 1.0))
                .collect()
        })
        .collect();

    let common: Vec<NaiveDate> = match per_ticker.split_first() {
        Some((first, rest)) => first
            .keys()
            .filter(|d| rest.iter().all(|m| m.contains_key(*d)))
            .copied()
            .collect(),
        None => Vec::new(),
    };

    AlignedReturns {
        tickers: series.iter().map(|s| s.ticker().to_string()).collect(),
        columns: per_ticker
            .iter()
            .map(|m| common.iter().filter_map(|d| m.get(d).copied()).collect())
            .collect(),
    }
}

fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample covariance (n - 1).
fn covariance(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len().min(b.len());
    if n < 2 {
        return None;
    }
    let (a, b) = (&a[..n], &b[..n]);
    let (ma, mb) = (mean(a), mean(b));
    let sum: f64 = a.iter().zip(b).map(|(x, y)| (x - ma) * (y - mb)).sum();
    Some(sum / (n - 1) as f64)
}

/// Pearson correlation; `None` for fewer than two points or a constant side.
pub fn correlation(a: &[f64], b: &[f64]) -> Option<f64> {
    let cov = covariance(a, b)?;
    let var_a = covariance(a, a)?;
    let var_b = covariance(b, b)?;
    if var_a <= 0.0 || var_b <= 0.0 {
        return None;
    }
    Some((cov / (var_a.sqrt() * var_b.sqrt())).clamp(-1.0, 1.0))
}

pub fn portfolio_risk(series: &[TickerSeries]) -> Result<PortfolioRisk, InsufficientData> {
    let returns = aligned_returns(series);
    let rows = returns.rows();
    if series.is_empty() || rows < MIN_RETURNS {
        return Err(InsufficientData {
            bars: rows,
            required: MIN_RETURNS,
        });
    }

    // w' Σ w with equal weights is the variance of the mean daily return.
    let portfolio: Vec<f64> = (0..rows)
        .map(|r| mean(&returns.columns.iter().map(|c| c[r]).collect::<Vec<_>>()))
        .collect();
    let variance = covariance(&portfolio, &portfolio).unwrap_or(0.0).max(0.0);
    let volatility = round_dp((variance * TRADING_DAYS_PER_YEAR).sqrt() * 100.0, 2);

    let mut high_correlations = Vec::new();
    let mut matrix: BTreeMap<String, BTreeMap<String, Option<f64>>> = BTreeMap::new();
    for (i, a) in returns.tickers.iter().enumerate() {
        for (j, b) in returns.tickers.iter().enumerate() {
            let corr = correlation(&returns.columns[i], &returns.columns[j]);
            if j > i {
                if let Some(c) = corr.filter(|c| *c > HIGH_CORRELATION) {
                    high_correlations.push(CorrelatedPair(a.clone(), b.clone(), round_dp(c, 2)));
                }
            }
            matrix
                .entry(a.clone())
                .or_default()
                .insert(b.clone(), corr.map(|c| round_dp(c, 2)));
        }
    }

    Ok(PortfolioRisk {
        volatility,
        high_correlations,
        matrix,
    })
}

/// Fetches bars per ticker, then scores the set. Tickers whose bars fail are
/// left out of the portfolio.
pub async fn run(
    provider: &dyn TimeSeriesProvider,
    tickers: &[String],
    opts: &BatchOptions,
) -> anyhow::Result<(PortfolioRisk, BatchStats)> {
    let (series, stats) = run_batch("risk", tickers, opts, |ticker| async move {
        Ok(Outcome::Produced(provider.daily_bars(&ticker, LOOKBACK_DAYS).await?))
    })
    .await;

    let risk = portfolio_risk(&series).map_err(|short| short.into_error("portfolio"))?;
    tracing::info!(
        tickers = series.len(),
        volatility = risk.volatility,
        high_correlations = risk.high_correlations.len(),
        "portfolio risk computed"
    );
    Ok((risk, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bar::Bar;
    use chrono::Duration;

    fn series_from(ticker: &str, first_day: i64, closes: &[f64]) -> TickerSeries {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap() + Duration::days(first_day);
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar {
                date: start + Duration::days(i as i64),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 1000.0,
            })
            .collect();
        TickerSeries::new(ticker, None, bars).unwrap()
    }

    /// Closes that move by exactly +r, -r, +r, ... from 100.
    fn zigzag(n: usize, first_up: bool) -> Vec<f64> {
        let mut out = vec![100.0];
        for i in 1..n {
            let up = (i % 2 == 1) == first_up;
            let prev = out[i - 1];
            out.push(if up { prev * 1.01 } else { prev * 0.99 });
        }
        out
    }

    #[test]
    fn correlation_edges() {
        assert_eq!(correlation(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]), Some(1.0));
        assert_eq!(correlation(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]), Some(-1.0));
        assert_eq!(correlation(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]), None);
        assert_eq!(correlation(&[1.0], &[1.0]), None);
    }

    #[test]
    fn returns_align_on_shared_dates() {
        let a = series_from("AAA", 0, &[10.0, 11.0, 12.0, 13.0, 14.0]);
        let b = series_from("BBB", 2, &[20.0, 21.0, 22.0]);
        let r = aligned_returns(&[a, b]);
        // BBB has returns on days 3 and 4 only
        assert_eq!(r.rows(), 2);
        assert_eq!(r.columns[0], vec![13.0 / 12.0 - 1.0, 14.0 / 13.0 - 1.0]);
    }

    #[test]
    fn flags_moving_together_and_measures_volatility() {
        let a = series_from("AAA", 0, &zigzag(5, true));
        let b = series_from("BBB", 0, &zigzag(5, true));
        let risk = portfolio_risk(&[a, b]).unwrap();

        assert_eq!(
            risk.high_correlations,
            vec![CorrelatedPair("AAA".into(), "BBB".into(), 1.0)]
        );
        // returns ±1%: sample variance 4e-4 / 3, annualized sqrt(0.0336)
        assert_eq!(risk.volatility, 18.33);
        assert_eq!(risk.matrix["AAA"]["AAA"], Some(1.0));
        assert_eq!(risk.matrix["BBB"]["AAA"], Some(1.0));
    }

    #[test]
    fn offsetting_positions_cancel_out() {
        let a = series_from("AAA", 0, &zigzag(5, true));
        let b = series_from("BBB", 0, &zigzag(5, false));
        let risk = portfolio_risk(&[a, b]).unwrap();

        assert!(risk.high_correlations.is_empty());
        assert_eq!(risk.matrix["AAA"]["BBB"], Some(-1.0));
        assert_eq!(risk.volatility, 0.0);
    }

    #[test]
    fn flat_ticker_has_no_correlation() {
        let a = series_from("AAA", 0, &zigzag(5, true));
        let b = series_from("FLAT", 0, &[50.0; 5]);
        let risk = portfolio_risk(&[a, b]).unwrap();
        assert_eq!(risk.matrix["AAA"]["FLAT"], None);
        assert!(risk.high_correlations.is_empty());
    }

    #[test]
    fn too_little_history_is_insufficient() {
        let a = series_from("AAA", 0, &[10.0, 11.0]);
        let err = portfolio_risk(&[a]).unwrap_err();
        assert_eq!(err.bars, 1);
        assert!(portfolio_risk(&[]).is_err());
    }

    #[test]
    fn pairs_serialize_as_triples() {
        let risk = PortfolioRisk {
            volatility: 21.5,
            high_correlations: vec![CorrelatedPair("NVDA".into(), "AMD".into(), 0.87)],
            matrix: BTreeMap::new(),
        };
        assert_eq!(
            serde_json::to_value(&risk).unwrap(),
            serde_json::json!({
                "volatility": 21.5,
                "high_correlations": [["NVDA", "AMD", 0.87]],
                "matrix": {}
            })
        );
    }
}
