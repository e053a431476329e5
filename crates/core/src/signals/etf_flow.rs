//! Capital-flow proxy for a fixed set of ETFs, plus a digest with AI commentary.

use crate::domain::bar::TickerSeries;
use crate::domain::round_dp;
use crate::domain::signal::ScoreRecord;
use crate::indicators::{series, InsufficientData};
use crate::ingest::provider::TimeSeriesProvider;
use crate::llm::TextGenerator;
use crate::scoring::{stage_for, MetricRule, ScoreEngine, StageLabels};
use crate::signals::{run_batch, BatchOptions, BatchStats, Outcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

pub const FLOW_DIGEST_FILE: &str = "etf_flow_analysis.json";
pub const AI_ANALYSIS_FALLBACK: &str = "AI 분석 생성 실패";

pub const FLOW_STAGE_LABELS: StageLabels = StageLabels([
    "Strong Inflow",
    "Inflow",
    "Neutral",
    "Outflow",
    "Strong Outflow",
]);

const MIN_BARS: usize = 30;
/// Calendar days requested from the provider (about three months).
pub const LOOKBACK_DAYS: u32 = 92;
const DIGEST_TOP: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EtfCategory {
    #[serde(rename = "Broad Market")]
    BroadMarket,
    Sector,
    Thematic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedEtf {
    pub ticker: &'static str,
    pub name: &'static str,
    pub category: EtfCategory,
}

const fn etf(ticker: &'static str, name: &'static str, category: EtfCategory) -> TrackedEtf {
    TrackedEtf {
        ticker,
        name,
        category,
    }
}

pub const TRACKED_ETFS: [TrackedEtf; 24] = [
    etf("SPY", "S&P 500", EtfCategory::BroadMarket),
    etf("QQQ", "NASDAQ 100", EtfCategory::BroadMarket),
    etf("IWM", "Russell 2000", EtfCategory::BroadMarket),
    etf("DIA", "Dow Jones", EtfCategory::BroadMarket),
    etf("XLK", "Technology", EtfCategory::Sector),
    etf("XLF", "Financials", EtfCategory::Sector),
    etf("XLV", "Healthcare", EtfCategory::Sector),
    etf("XLE", "Energy", EtfCategory::Sector),
    etf("XLY", "Consumer Discretionary", EtfCategory::Sector),
    etf("XLP", "Consumer Staples", EtfCategory::Sector),
    etf("XLI", "Industrials", EtfCategory::Sector),
    etf("XLB", "Materials", EtfCategory::Sector),
    etf("XLU", "Utilities", EtfCategory::Sector),
    etf("XLRE", "Real Estate", EtfCategory::Sector),
    etf("XLC", "Communication Services", EtfCategory::Sector),
    etf("VTI", "Total Market", EtfCategory::BroadMarket),
    etf("VOO", "S&P 500 (Vanguard)", EtfCategory::BroadMarket),
    etf("GLD", "Gold", EtfCategory::Thematic),
    etf("SLV", "Silver", EtfCategory::Thematic),
    etf("USO", "Oil", EtfCategory::Thematic),
    etf("TLT", "Long-Term Treasury", EtfCategory::Thematic),
    etf("IEF", "Mid-Term Treasury", EtfCategory::Thematic),
    etf("HYG", "High Yield Bonds", EtfCategory::Thematic),
    etf("LQD", "Investment Grade Bonds", EtfCategory::Thematic),
];

pub fn tracked(ticker: &str) -> Option<&'static TrackedEtf> {
    TRACKED_ETFS.iter().find(|e| e.ticker == ticker)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowMetrics {
    pub vol_ratio: f64,
    pub price_5d: f64,
    pub price_20d: f64,
    pub obv_trend: f64,
}

pub fn flow_metrics(series: &TickerSeries) -> Result<FlowMetrics, InsufficientData> {
    let bars = series.bars();
    if bars.len() < MIN_BARS {
        return Err(InsufficientData {
            bars: bars.len(),
            required: MIN_BARS,
        });
    }
    Ok(FlowMetrics {
        vol_ratio: series::volume_ratio(bars, 5, 20),
        price_5d: series::momentum_pct(bars, 5),
        price_20d: series::momentum_pct(bars, 20),
        obv_trend: series::window_change_pct(&series::obv(bars), 20),
    })
}

pub fn flow_score_engine() -> ScoreEngine<FlowMetrics> {
    ScoreEngine::new(FLOW_STAGE_LABELS)
        .rule(
            MetricRule::new("vol_ratio", |m: &FlowMetrics| m.vol_ratio)
                .above(1.5, 20.0)
                .above(1.2, 10.0)
                .below(0.8, -10.0),
        )
        .rule(
            MetricRule::new("price_5d", |m: &FlowMetrics| m.price_5d)
                .above(3.0, 15.0)
                .above(1.0, 8.0)
                .below(-3.0, -15.0)
                .below(-1.0, -8.0),
        )
        .rule(
            MetricRule::new("obv_trend", |m: &FlowMetrics| m.obv_trend)
                .above(10.0, 15.0)
                .above(0.0, 5.0)
                .below(-10.0, -15.0),
        )
}

/// One row of `us_etf_flows.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtfFlowSignal {
    pub ticker: String,
    pub name: String,
    pub category: EtfCategory,
    pub current_price: f64,
    pub vol_ratio: f64,
    pub price_5d: f64,
    pub price_20d: f64,
    pub obv_trend: f64,
    pub flow_score: f64,
    pub flow_direction: String,
}

impl EtfFlowSignal {
    pub fn score_record(&self) -> ScoreRecord {
        ScoreRecord {
            ticker: self.ticker.clone(),
            score: self.flow_score,
            stage: stage_for(self.flow_score),
        }
    }
}

pub fn etf_flow_signal(
    engine: &ScoreEngine<FlowMetrics>,
    etf: &TrackedEtf,
    series: &TickerSeries,
) -> Result<EtfFlowSignal, InsufficientData> {
    let m = flow_metrics(series)?;
    let scored = engine.score(&m);
    let current_price = series.last().map(|b| b.close).unwrap_or(0.0);
    Ok(EtfFlowSignal {
        ticker: etf.ticker.to_string(),
        name: etf.name.to_string(),
        category: etf.category,
        current_price: round_dp(current_price, 2),
        vol_ratio: round_dp(m.vol_ratio, 2),
        price_5d: round_dp(m.price_5d, 2),
        price_20d: round_dp(m.price_20d, 2),
        obv_trend: round_dp(m.obv_trend, 2),
        flow_score: round_dp(scored.score, 1),
        flow_direction: scored.label.to_string(),
    })
}

pub async fn run(provider: &dyn TimeSeriesProvider, opts: &BatchOptions) -> (Vec<EtfFlowSignal>, BatchStats) {
    let engine = flow_score_engine();
    let tickers: Vec<String> = TRACKED_ETFS.iter().map(|e| e.ticker.to_string()).collect();
    run_batch("etf_flows", &tickers, opts, |ticker| {
        let engine = &engine;
        async move {
            let Some(etf) = tracked(&ticker) else {
                return Ok(Outcome::Skipped);
            };
            let series = provider.daily_bars(&ticker, LOOKBACK_DAYS).await?;
            match etf_flow_signal(engine, etf, &series) {
                Ok(signal) => Ok(Outcome::Produced(signal)),
                Err(short) => {
                    tracing::debug!(error = %short.into_error(&ticker), "skipping ETF");
                    Ok(Outcome::Skipped)
                }
            }
        }
    })
    .await
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDigestSummary {
    pub total_etfs: usize,
    pub inflows: usize,
    pub outflows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEtf {
    pub name: String,
    pub flow_score: f64,
}

/// Contents of `etf_flow_analysis.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDigest {
    pub timestamp: DateTime<Utc>,
    pub summary: FlowDigestSummary,
    pub top_inflows: Vec<RankedEtf>,
    pub top_outflows: Vec<RankedEtf>,
    pub ai_analysis: String,
}

fn ranked(signals: &[&EtfFlowSignal]) -> Vec<RankedEtf> {
    signals
        .iter()
        .map(|s| RankedEtf {
            name: s.name.clone(),
            flow_score: s.flow_score,
        })
        .collect()
}

pub fn digest_prompt(inflow_names: &[&str], outflow_names: &[&str], top: &[RankedEtf], bottom: &[RankedEtf]) -> String {
    let mut p = String::from("ETF 자금 흐름을 분석해 주세요.\n\n");
    let _ = writeln!(p, "유입 섹터: {}", inflow_names.iter().take(DIGEST_TOP).copied().collect::<Vec<_>>().join(", "));
    let _ = writeln!(p, "유출 섹터: {}", outflow_names.iter().take(DIGEST_TOP).copied().collect::<Vec<_>>().join(", "));
    p.push_str("\n상위 유입:\n");
    for r in top {
        let _ = writeln!(p, "- {}: {}", r.name, r.flow_score);
    }
    p.push_str("\n상위 유출:\n");
    for r in bottom {
        let _ = writeln!(p, "- {}: {}", r.name, r.flow_score);
    }
    p.push_str(
        "\n요청:\n1. 현재 자금 흐름 패턴 요약\n2. 유입 섹터의 투자 기회\n3. 유출 섹터의 리스크\n4. 구체적인 전략 제안\n\n한국어 4-5문장으로 작성하세요.",
    );
    p
}

/// Builds the digest. Commentary falls back to [`AI_ANALYSIS_FALLBACK`] when
/// no generator is configured or generation fails.
pub async fn build_digest(
    signals: &[EtfFlowSignal],
    generator: Option<&dyn TextGenerator>,
    timestamp: DateTime<Utc>,
) -> FlowDigest {
    let inflows: Vec<&str> = signals
        .iter()
        .filter(|s| s.flow_direction.contains("Inflow"))
        .map(|s| s.name.as_str())
        .collect();
    let outflows: Vec<&str> = signals
        .iter()
        .filter(|s| s.flow_direction.contains("Outflow"))
        .map(|s| s.name.as_str())
        .collect();

    let mut by_score: Vec<&EtfFlowSignal> = signals.iter().collect();
    by_score.sort_by(|a, b| b.flow_score.total_cmp(&a.flow_score));
    let top = ranked(&by_score[..by_score.len().min(DIGEST_TOP)]);
    by_score.sort_by(|a, b| a.flow_score.total_cmp(&b.flow_score));
    let bottom = ranked(&by_score[..by_score.len().min(DIGEST_TOP)]);

    let ai_analysis = match generator {
        Some(g) => {
            let prompt = digest_prompt(&inflows, &outflows, &top, &bottom);
            match g.generate(&prompt).await {
                Ok(text) => text,
                Err(err) => {
                    tracing::warn!(error = %format!("{err:#}"), "ETF flow commentary failed");
                    AI_ANALYSIS_FALLBACK.to_string()
                }
            }
        }
        None => {
            tracing::warn!("no text generator configured; skipping ETF flow commentary");
            AI_ANALYSIS_FALLBACK.to_string()
        }
    };

    FlowDigest {
        timestamp,
        summary: FlowDigestSummary {
            total_etfs: signals.len(),
            inflows: inflows.len(),
            outflows: outflows.len(),
        },
        top_inflows: top,
        top_outflows: bottom,
        ai_analysis,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bar::Bar;
    use crate::llm::Provider;
    use chrono::{Duration, NaiveDate, TimeZone};

    fn series(closes: &[f64], volumes: &[f64]) -> TickerSeries {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let bars = closes
            .iter()
            .zip(volumes)
            .enumerate()
            .map(|(i, (&c, &v))| Bar {
                date: start + Duration::days(i as i64),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: v,
            })
            .collect();
        TickerSeries::new("SPY", None, bars).unwrap()
    }

    fn signal(name: &str, score: f64) -> EtfFlowSignal {
        EtfFlowSignal {
            ticker: name.to_string(),
            name: name.to_string(),
            category: EtfCategory::Sector,
            current_price: 1.0,
            vol_ratio: 1.0,
            price_5d: 0.0,
            price_20d: 0.0,
            obv_trend: 0.0,
            flow_score: score,
            flow_direction: FLOW_STAGE_LABELS.label(stage_for(score)).to_string(),
        }
    }

    #[test]
    fn table_has_24_unique_tickers() {
        let mut t: Vec<&str> = TRACKED_ETFS.iter().map(|e| e.ticker).collect();
        t.sort();
        t.dedup();
        assert_eq!(t.len(), 24);
        assert_eq!(tracked("XLRE").unwrap().category, EtfCategory::Sector);
        assert_eq!(tracked("GLD").unwrap().category, EtfCategory::Thematic);
    }

    #[test]
    fn requires_thirty_bars() {
        let s = series(&[100.0; 29], &[1.0; 29]);
        assert!(flow_metrics(&s).is_err());
    }

    #[test]
    fn obv_trend_is_measured_at_the_minimum_history() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let m = flow_metrics(&series(&closes, &[1000.0; 30])).unwrap();
        // OBV runs 0, 1000, .., 29000; the 20-bar window starts at 10000
        assert_eq!(m.obv_trend, 190.0);
    }

    #[test]
    fn rally_on_rising_volume_is_strong_inflow() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let mut volumes = vec![1000.0; 40];
        for v in volumes.iter_mut().skip(35) {
            *v = 3000.0;
        }
        let s = series(&closes, &volumes);
        let sig = etf_flow_signal(&flow_score_engine(), tracked("SPY").unwrap(), &s).unwrap();
        // vol ratio 3000/1500 = 2 (+20), 5d ≈ +3.7% (+15), OBV rising (+15)
        assert_eq!(sig.flow_score, 100.0);
        assert_eq!(sig.flow_direction, "Strong Inflow");
        assert_eq!(sig.current_price, 139.0);
    }

    #[test]
    fn flat_market_is_neutral() {
        let s = series(&[100.0; 40], &[1000.0; 40]);
        let sig = etf_flow_signal(&flow_score_engine(), tracked("TLT").unwrap(), &s).unwrap();
        assert_eq!(sig.flow_score, 50.0);
        assert_eq!(sig.flow_direction, "Neutral");
    }

    struct Failing;

    #[async_trait::async_trait]
    impl TextGenerator for Failing {
        fn provider(&self) -> Provider {
            Provider::Anthropic
        }
        async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
            anyhow::bail!("quota exhausted")
        }
    }

    #[tokio::test]
    async fn digest_counts_and_falls_back() {
        let signals = vec![
            signal("Gold", 80.0),
            signal("Oil", 20.0),
            signal("Tech", 60.0),
            signal("Bonds", 50.0),
        ];
        let ts = Utc.with_ymd_and_hms(2026, 1, 27, 21, 0, 0).unwrap();
        let d = build_digest(&signals, Some(&Failing as &dyn TextGenerator), ts).await;

        assert_eq!(
            d.summary,
            FlowDigestSummary {
                total_etfs: 4,
                inflows: 2,
                outflows: 1
            }
        );
        assert_eq!(d.top_inflows[0].name, "Gold");
        assert_eq!(d.top_outflows[0].name, "Oil");
        assert_eq!(d.ai_analysis, AI_ANALYSIS_FALLBACK);

        let d = build_digest(&signals, None, ts).await;
        assert_eq!(d.ai_analysis, AI_ANALYSIS_FALLBACK);
    }

    #[test]
    fn prompt_lists_sectors() {
        let top = vec![RankedEtf {
            name: "Gold".into(),
            flow_score: 80.0,
        }];
        let p = digest_prompt(&["Gold"], &["Oil"], &top, &[]);
        assert!(p.contains("유입 섹터: Gold"));
        assert!(p.contains("유출 섹터: Oil"));
        assert!(p.contains("- Gold: 80"));
    }
}
