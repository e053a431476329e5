//! Supply/demand score from volume indicators over the loaded price table.

use crate::domain::bar::TickerSeries;
use crate::domain::round_dp;
use crate::domain::signal::{IndicatorResult, ScoreRecord};
use crate::indicators::{IndicatorEngine, InsufficientData};
use crate::scoring::{stage_for, MetricRule, ScoreEngine, StageLabels};
use crate::signals::{stage_distribution, BatchStats};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const VOLUME_STAGE_LABELS: StageLabels = StageLabels([
    "Strong Accumulation",
    "Accumulation",
    "Neutral",
    "Distribution",
    "Strong Distribution",
]);

pub fn volume_score_engine() -> ScoreEngine<IndicatorResult> {
    ScoreEngine::new(VOLUME_STAGE_LABELS)
        .rule(
            MetricRule::new("obv_change_20d", |r: &IndicatorResult| r.obv_change_20d)
                .above(10.0, 15.0)
                .above(5.0, 10.0)
                .below(-10.0, -15.0)
                .below(-5.0, -10.0),
        )
        .rule(
            MetricRule::new("ad_change_20d", |r: &IndicatorResult| r.ad_change_20d)
                .above(10.0, 15.0)
                .above(5.0, 10.0)
                .below(-10.0, -15.0)
                .below(-5.0, -10.0),
        )
        .rule(
            MetricRule::new("vol_ratio_5d_20d", |r: &IndicatorResult| r.vol_ratio_5d_20d)
                .above(1.5, 10.0)
                .above(1.2, 5.0)
                .below(0.7, -5.0),
        )
        .rule(
            MetricRule::new("mfi", |r: &IndicatorResult| r.mfi)
                .above(70.0, 5.0)
                .below(30.0, -5.0),
        )
}

/// One row of `us_volume_analysis.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeSignal {
    pub ticker: String,
    pub name: String,
    pub date: NaiveDate,
    pub obv: f64,
    pub obv_change_20d: f64,
    pub ad_line: f64,
    pub ad_change_20d: f64,
    pub mfi: f64,
    pub vol_ratio_5d_20d: f64,
    pub surge_count_5d: usize,
    pub surge_count_20d: usize,
    pub vwap: f64,
    pub supply_demand_score: f64,
    pub supply_demand_stage: String,
}

impl VolumeSignal {
    pub fn score_record(&self) -> ScoreRecord {
        ScoreRecord {
            ticker: self.ticker.clone(),
            score: self.supply_demand_score,
            stage: stage_for(self.supply_demand_score),
        }
    }
}

pub struct VolumeAnalyzer {
    indicators: IndicatorEngine,
    scorer: ScoreEngine<IndicatorResult>,
}

impl VolumeAnalyzer {
    pub fn new(indicators: IndicatorEngine) -> Self {
        Self {
            indicators,
            scorer: volume_score_engine(),
        }
    }

    pub fn analyze(&self, series: &TickerSeries) -> Result<VolumeSignal, InsufficientData> {
        let r = self.indicators.analyze(series)?;
        // Scored on unrounded values; rounding applies to the emitted row only.
        let scored = self.scorer.score(&r);
        Ok(VolumeSignal {
            ticker: series.ticker().to_string(),
            name: series.name().to_string(),
            date: r.date,
            obv: r.obv,
            obv_change_20d: round_dp(r.obv_change_20d, 2),
            ad_line: r.ad_line,
            ad_change_20d: round_dp(r.ad_change_20d, 2),
            mfi: round_dp(r.mfi, 1),
            vol_ratio_5d_20d: round_dp(r.vol_ratio_5d_20d, 2),
            surge_count_5d: r.surge_count_5d,
            surge_count_20d: r.surge_count_20d,
            vwap: round_dp(r.vwap, 2),
            supply_demand_score: scored.score,
            supply_demand_stage: scored.label.to_string(),
        })
    }

    /// Analyzes every series; short series are skipped, never fatal.
    pub fn run(&self, universe: &[TickerSeries], progress_every: usize) -> (Vec<VolumeSignal>, BatchStats) {
        let mut out = Vec::with_capacity(universe.len());
        let mut stats = BatchStats::default();

        for (i, series) in universe.iter().enumerate() {
            stats.attempted += 1;
            match self.analyze(series) {
                Ok(signal) => {
                    stats.produced += 1;
                    out.push(signal);
                }
                Err(short) => {
                    stats.skipped += 1;
                    tracing::debug!(error = %short.into_error(series.ticker()), "skipping ticker");
                }
            }
            if progress_every > 0 && (i + 1) % progress_every == 0 {
                tracing::info!(done = i + 1, total = universe.len(), "volume analysis progress");
            }
        }

        let dist = stage_distribution(out.iter().map(|s| s.score_record().stage));
        for (label, count) in VOLUME_STAGE_LABELS.0.iter().zip(dist) {
            tracing::info!(stage = label, count, "volume stage distribution");
        }
        tracing::info!(%stats, "volume analysis finished");
        (out, stats)
    }
}

impl Default for VolumeAnalyzer {
    fn default() -> Self {
        Self::new(IndicatorEngine::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bar::Bar;
    use crate::domain::signal::Stage;
    use chrono::Duration;

    fn result(obv: f64, ad: f64, ratio: f64, mfi: f64) -> IndicatorResult {
        IndicatorResult {
            date: NaiveDate::from_ymd_opt(2026, 1, 27).unwrap(),
            obv: 0.0,
            obv_change_20d: obv,
            ad_line: 0.0,
            ad_change_20d: ad,
            mfi,
            vwap: 0.0,
            vol_ratio_5d_20d: ratio,
            surge_count_5d: 0,
            surge_count_20d: 0,
        }
    }

    #[test]
    fn strong_accumulation_case() {
        let s = volume_score_engine().score(&result(12.0, 8.0, 1.6, 75.0));
        // 50 + 15 + 10 + 10 + 5
        assert_eq!(s.score, 90.0);
        assert_eq!(s.label, "Strong Accumulation");
    }

    #[test]
    fn neutral_inputs_stay_at_base() {
        let s = volume_score_engine().score(&result(0.0, 0.0, 1.0, 50.0));
        assert_eq!(s.score, 50.0);
        assert_eq!(s.stage, Stage::Neutral);
    }

    #[test]
    fn strong_distribution_case() {
        let s = volume_score_engine().score(&result(-12.0, -12.0, 0.5, 20.0));
        // 50 - 15 - 15 - 5 - 5
        assert_eq!(s.score, 10.0);
        assert_eq!(s.label, "Strong Distribution");
    }

    #[test]
    fn thresholds_are_strict() {
        let s = volume_score_engine().score(&result(10.0, 5.0, 1.5, 70.0));
        // 10 → +10, 5 → 0, 1.5 → +5, 70 → 0
        assert_eq!(s.score, 65.0);
        assert_eq!(s.label, "Accumulation");
    }

    fn series(ticker: &str, n: usize) -> TickerSeries {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let bars = (0..n)
            .map(|i| {
                let c = 100.0 + i as f64;
                Bar {
                    date: start + Duration::days(i as i64),
                    open: c,
                    high: c + 1.0,
                    low: c - 1.0,
                    close: c + 0.5,
                    volume: 1000.0,
                }
            })
            .collect();
        TickerSeries::new(ticker, None, bars).unwrap()
    }

    #[test]
    fn run_skips_short_series() {
        let universe = vec![series("LONG", 40), series("SHORT", 25)];
        let (out, stats) = VolumeAnalyzer::default().run(&universe, 0);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].ticker, "LONG");
        assert_eq!(stats.skipped, 1);
        assert!(out[0].supply_demand_score >= 0.0 && out[0].supply_demand_score <= 100.0);
    }

    #[test]
    fn emitted_row_is_rounded() {
        let signal = VolumeAnalyzer::default().analyze(&series("X", 40)).unwrap();
        assert_eq!(signal.mfi, round_dp(signal.mfi, 1));
        assert_eq!(signal.vol_ratio_5d_20d, round_dp(signal.vol_ratio_5d_20d, 2));
        assert_eq!(signal.date, NaiveDate::from_ymd_opt(2026, 2, 9).unwrap());
    }
}
