//! Per-ticker volume indicators: OBV, A/D line, MFI, volume surges and VWAP.

pub mod series;

use crate::domain::bar::TickerSeries;
use crate::domain::signal::IndicatorResult;
use crate::error::PipelineError;

/// Neutral MFI used when the rolling window is undefined.
pub const NEUTRAL_MFI: f64 = 50.0;

#[derive(Debug, Clone)]
pub struct IndicatorConfig {
    /// Minimum bars for the composite analysis. Raw series have no minimum.
    pub min_bars: usize,
    pub change_window: usize,
    pub mfi_period: usize,
    pub sma_period: usize,
    pub surge_threshold: f64,
    pub short_window: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            min_bars: 30,
            change_window: 20,
            mfi_period: 14,
            sma_period: 20,
            surge_threshold: 2.0,
            short_window: 5,
        }
    }
}

/// Returned instead of a result when a series is too short for the composite analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsufficientData {
    pub bars: usize,
    pub required: usize,
}

impl InsufficientData {
    pub fn into_error(self, ticker: &str) -> PipelineError {
        PipelineError::InsufficientData {
            ticker: ticker.to_string(),
            bars: self.bars,
            required: self.required,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IndicatorEngine {
    config: IndicatorConfig,
}

impl IndicatorEngine {
    pub fn new(config: IndicatorConfig) -> Self {
        Self { config }
    }

    pub fn with_surge_threshold(surge_threshold: f64) -> Self {
        Self::new(IndicatorConfig {
            surge_threshold,
            ..IndicatorConfig::default()
        })
    }

    pub fn config(&self) -> &IndicatorConfig {
        &self.config
    }

    /// Computes every indicator as of the series' last bar.
    pub fn analyze(&self, series: &TickerSeries) -> Result<IndicatorResult, InsufficientData> {
        let cfg = &self.config;
        let bars = series.bars();
        let insufficient = InsufficientData {
            bars: bars.len(),
            required: cfg.min_bars,
        };
        if bars.len() < cfg.min_bars {
            return Err(insufficient);
        }
        let Some(last) = series.last() else {
            return Err(insufficient);
        };

        let obv = series::obv(bars);
        let ad = series::ad_line(bars);
        let mfi = series::mfi(bars, cfg.mfi_period);
        let surges = series::volume_surges(bars, cfg.sma_period, cfg.surge_threshold);
        let vwap = series::vwap(bars);

        let count_tail = |n: usize| surges.iter().rev().take(n).filter(|s| **s).count();

        Ok(IndicatorResult {
            date: last.date,
            obv: obv.last().copied().unwrap_or(0.0),
            obv_change_20d: series::window_change_pct(&obv, cfg.change_window),
            ad_line: ad.last().copied().unwrap_or(0.0),
            ad_change_20d: series::window_change_pct(&ad, cfg.change_window),
            mfi: mfi.last().copied().flatten().unwrap_or(NEUTRAL_MFI),
            vwap: vwap.last().copied().flatten().unwrap_or(last.close),
            vol_ratio_5d_20d: series::volume_ratio(bars, cfg.short_window, cfg.change_window),
            surge_count_5d: count_tail(cfg.short_window),
            surge_count_20d: count_tail(cfg.change_window),
        })
    }
}
