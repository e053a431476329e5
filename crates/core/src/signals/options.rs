//! Put/call ratio, open interest and unusual-volume counts for the nearest expiry.

use crate::domain::round_dp;
use crate::error::PipelineError;
use crate::ingest::provider::TimeSeriesProvider;
use crate::ingest::types::{OptionChain, OptionContract};
use crate::signals::{run_batch, BatchOptions, BatchStats, Outcome};
use serde::{Deserialize, Serialize};

pub const OPTIONS_FILE: &str = "options_flow.json";

/// A contract is unusual when its volume exceeds this multiple of the side's mean.
pub const UNUSUAL_MULTIPLE: f64 = 3.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionsMetrics {
    pub pc_ratio: f64,
    pub call_vol: u64,
    pub put_vol: u64,
    pub call_oi: u64,
    pub put_oi: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnusualCounts {
    pub calls: usize,
    pub puts: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionsSummary {
    pub ticker: String,
    pub metrics: OptionsMetrics,
    pub unusual: UnusualCounts,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionsReport {
    pub options_flow: Vec<OptionsSummary>,
}

fn finite(values: impl Iterator<Item = Option<f64>>) -> Vec<f64> {
    values.flatten().filter(|v| v.is_finite()).collect()
}

fn total(values: &[f64]) -> f64 {
    values.iter().sum()
}

/// Contracts without a reported volume are ignored in the mean and never unusual.
fn unusual_count(contracts: &[OptionContract]) -> usize {
    let volumes = finite(contracts.iter().map(|c| c.volume));
    if volumes.is_empty() {
        return 0;
    }
    let mean = total(&volumes) / volumes.len() as f64;
    volumes.iter().filter(|v| **v > mean * UNUSUAL_MULTIPLE).count()
}

pub fn summarize(chain: &OptionChain) -> Result<OptionsSummary, PipelineError> {
    if chain.calls.is_empty() && chain.puts.is_empty() {
        return Err(PipelineError::unavailable(
            "options",
            format!("no listed options for {}", chain.ticker),
        ));
    }

    let call_vol = total(&finite(chain.calls.iter().map(|c| c.volume)));
    let put_vol = total(&finite(chain.puts.iter().map(|c| c.volume)));
    let call_oi = total(&finite(chain.calls.iter().map(|c| c.open_interest)));
    let put_oi = total(&finite(chain.puts.iter().map(|c| c.open_interest)));
    let pc_ratio = if call_vol > 0.0 { put_vol / call_vol } else { 0.0 };

    Ok(OptionsSummary {
        ticker: chain.ticker.clone(),
        metrics: OptionsMetrics {
            pc_ratio: round_dp(pc_ratio, 2),
            call_vol: call_vol as u64,
            put_vol: put_vol as u64,
            call_oi: call_oi as u64,
            put_oi: put_oi as u64,
        },
        unusual: UnusualCounts {
            calls: unusual_count(&chain.calls),
            puts: unusual_count(&chain.puts),
        },
    })
}

pub async fn run(
    provider: &dyn TimeSeriesProvider,
    tickers: &[String],
    opts: &BatchOptions,
) -> (OptionsReport, BatchStats) {
    let (rows, stats) = run_batch("options", tickers, opts, |ticker| async move {
        let chain = provider.option_chain(&ticker).await?;
        Ok(Outcome::Produced(summarize(&chain)?))
    })
    .await;
    (OptionsReport { options_flow: rows }, stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contract(volume: Option<f64>, oi: f64) -> OptionContract {
        OptionContract {
            strike: 100.0,
            volume,
            open_interest: Some(oi),
        }
    }

    #[test]
    fn summarizes_chain() {
        let mut calls: Vec<OptionContract> = (0..9).map(|_| contract(Some(10.0), 100.0)).collect();
        calls.push(contract(Some(1000.0), 100.0));
        calls.push(contract(None, 50.0));
        let chain = OptionChain {
            ticker: "NVDA".to_string(),
            expiration: None,
            calls,
            puts: vec![contract(Some(545.0), 300.0)],
        };

        let s = summarize(&chain).unwrap();
        assert_eq!(s.metrics.call_vol, 1090);
        assert_eq!(s.metrics.put_vol, 545);
        assert_eq!(s.metrics.pc_ratio, 0.5);
        assert_eq!(s.metrics.call_oi, 1050);
        // mean 109, only the 1000 contract clears 327.
        assert_eq!(s.unusual.calls, 1);
        assert_eq!(s.unusual.puts, 0);
    }

    #[test]
    fn no_calls_volume_gives_zero_ratio() {
        let chain = OptionChain {
            ticker: "X".to_string(),
            expiration: None,
            calls: vec![contract(None, 1.0)],
            puts: vec![contract(Some(5.0), 1.0)],
        };
        assert_eq!(summarize(&chain).unwrap().metrics.pc_ratio, 0.0);
    }

    #[test]
    fn empty_chain_is_unavailable() {
        let chain = OptionChain {
            ticker: "X".to_string(),
            ..Default::default()
        };
        assert!(summarize(&chain).is_err());
    }
}
