//! Institutional support score from ownership, insider activity and short interest.

use crate::domain::round_dp;
use crate::domain::signal::ScoreRecord;
use crate::ingest::provider::TimeSeriesProvider;
use crate::ingest::types::{InsiderTransaction, OwnershipFacts};
use crate::scoring::{stage_for, MetricRule, ScoreEngine, StageLabels};
use crate::signals::{run_batch, BatchOptions, BatchStats, Outcome};
use serde::{Deserialize, Serialize};

pub const INSTITUTIONAL_STAGE_LABELS: StageLabels = StageLabels([
    "Strong Institutional Support",
    "Institutional Support",
    "Neutral",
    "Institutional Concern",
    "Strong Institutional Selling",
]);

/// Only the most recent transactions count toward the insider balance.
pub const RECENT_INSIDER_TRANSACTIONS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InsiderSentiment {
    Buying,
    Selling,
    Neutral,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsiderBalance {
    pub buys: u32,
    pub sells: u32,
    pub sentiment: InsiderSentiment,
}

impl InsiderBalance {
    pub const UNKNOWN: Self = Self {
        buys: 0,
        sells: 0,
        sentiment: InsiderSentiment::Unknown,
    };

    pub fn net(&self) -> i64 {
        i64::from(self.buys) - i64::from(self.sells)
    }
}

/// Counts buys ("Buy" in the text) and sells ("Sale") over the latest
/// transactions. `None` means insider activity is unavailable.
pub fn insider_balance(transactions: Option<&[InsiderTransaction]>) -> InsiderBalance {
    let Some(txns) = transactions else {
        return InsiderBalance::UNKNOWN;
    };
    if txns.is_empty() {
        return InsiderBalance::UNKNOWN;
    }

    let mut recent: Vec<&InsiderTransaction> = txns.iter().collect();
    recent.sort_by(|a, b| b.date.cmp(&a.date));

    let mut buys = 0;
    let mut sells = 0;
    for t in recent.into_iter().take(RECENT_INSIDER_TRANSACTIONS) {
        if t.text.contains("Buy") {
            buys += 1;
        }
        if t.text.contains("Sale") {
            sells += 1;
        }
    }

    let sentiment = match buys.cmp(&sells) {
        std::cmp::Ordering::Greater => InsiderSentiment::Buying,
        std::cmp::Ordering::Less => InsiderSentiment::Selling,
        std::cmp::Ordering::Equal => InsiderSentiment::Neutral,
    };
    InsiderBalance {
        buys,
        sells,
        sentiment,
    }
}

/// Scoring inputs. Percentages are fractions; a missing fact reads as 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstitutionalMetrics {
    pub institutional_pct: f64,
    pub insider_net: f64,
    pub short_pct: f64,
}

impl InstitutionalMetrics {
    pub fn from_facts(facts: &OwnershipFacts, balance: &InsiderBalance) -> Self {
        Self {
            institutional_pct: facts.institutional_pct.unwrap_or(0.0),
            insider_net: balance.net() as f64,
            short_pct: facts.short_pct.unwrap_or(0.0),
        }
    }
}

pub fn institutional_score_engine() -> ScoreEngine<InstitutionalMetrics> {
    ScoreEngine::new(INSTITUTIONAL_STAGE_LABELS)
        .rule(
            MetricRule::new("institutional_pct", |m: &InstitutionalMetrics| m.institutional_pct)
                .above(0.8, 15.0)
                .above(0.6, 10.0)
                .below(0.3, -10.0),
        )
        .rule(
            MetricRule::new("insider_net", |m: &InstitutionalMetrics| m.insider_net)
                .above(0.0, 15.0)
                .below(0.0, -10.0),
        )
        .rule(
            MetricRule::new("short_pct", |m: &InstitutionalMetrics| m.short_pct)
                .above(0.2, -20.0)
                .above(0.1, -10.0)
                .below(0.03, 5.0),
        )
}

/// One row of `us_13f_holdings.csv`. Percentages are emitted as 0–100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstitutionalSignal {
    pub ticker: String,
    pub institutional_pct: f64,
    pub insider_pct: f64,
    pub short_pct: f64,
    pub float_shares_m: f64,
    pub num_inst_holders: u32,
    pub insider_buys: u32,
    pub insider_sells: u32,
    pub insider_sentiment: InsiderSentiment,
    pub institutional_score: f64,
    pub institutional_stage: String,
}

impl InstitutionalSignal {
    pub fn score_record(&self) -> ScoreRecord {
        ScoreRecord {
            ticker: self.ticker.clone(),
            score: self.institutional_score,
            stage: stage_for(self.institutional_score),
        }
    }
}

pub fn institutional_signal(
    engine: &ScoreEngine<InstitutionalMetrics>,
    facts: &OwnershipFacts,
) -> InstitutionalSignal {
    let balance = insider_balance(facts.insider_transactions.as_deref());
    let scored = engine.score(&InstitutionalMetrics::from_facts(facts, &balance));
    let pct = |v: Option<f64>| round_dp(v.unwrap_or(0.0) * 100.0, 2);

    InstitutionalSignal {
        ticker: facts.ticker.clone(),
        institutional_pct: pct(facts.institutional_pct),
        insider_pct: pct(facts.insider_pct),
        short_pct: pct(facts.short_pct),
        float_shares_m: round_dp(facts.float_shares.unwrap_or(0.0) / 1e6, 2),
        num_inst_holders: facts.num_institutional_holders.unwrap_or(0),
        insider_buys: balance.buys,
        insider_sells: balance.sells,
        insider_sentiment: balance.sentiment,
        institutional_score: scored.score,
        institutional_stage: scored.label.to_string(),
    }
}

/// Fetches ownership facts per ticker; failed lookups drop the ticker.
pub async fn run(
    provider: &dyn TimeSeriesProvider,
    tickers: &[String],
    opts: &BatchOptions,
) -> (Vec<InstitutionalSignal>, BatchStats) {
    let engine = institutional_score_engine();
    run_batch("institutional", tickers, opts, |ticker| {
        let engine = &engine;
        async move {
            let facts = provider.ownership(&ticker).await?;
            Ok(Outcome::Produced(institutional_signal(engine, &facts)))
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn txn(day: u32, text: &str) -> InsiderTransaction {
        InsiderTransaction {
            date: NaiveDate::from_ymd_opt(2026, 1, day).unwrap(),
            insider: "CEO".to_string(),
            text: text.to_string(),
            shares: None,
            value: None,
        }
    }

    fn facts(inst: f64, short: f64, txns: Option<Vec<InsiderTransaction>>) -> OwnershipFacts {
        OwnershipFacts {
            ticker: "AAPL".to_string(),
            institutional_pct: Some(inst),
            insider_pct: Some(0.01),
            short_pct: Some(short),
            float_shares: Some(15_000_000_000.0),
            shares_outstanding: Some(15_500_000_000.0),
            num_institutional_holders: Some(4000),
            insider_transactions: txns,
        }
    }

    #[test]
    fn balance_counts_recent_transactions_only() {
        let mut txns: Vec<InsiderTransaction> = (1..=10).map(|d| txn(d + 10, "Sale at price 10")).collect();
        // Older than the ten most recent: ignored.
        txns.push(txn(1, "Buy at price 9"));
        txns.push(txn(2, "Buy at price 9"));

        let b = insider_balance(Some(&txns));
        assert_eq!(b.buys, 0);
        assert_eq!(b.sells, 10);
        assert_eq!(b.sentiment, InsiderSentiment::Selling);
    }

    #[test]
    fn missing_activity_is_unknown() {
        assert_eq!(insider_balance(None), InsiderBalance::UNKNOWN);
        assert_eq!(insider_balance(Some(&[])), InsiderBalance::UNKNOWN);
    }

    #[test]
    fn strong_support_case() {
        let f = facts(0.85, 0.02, Some(vec![txn(5, "Buy"), txn(6, "Stock Award")]));
        let s = institutional_signal(&institutional_score_engine(), &f);
        // 50 + 15 + 15 + 5
        assert_eq!(s.institutional_score, 85.0);
        assert_eq!(s.institutional_stage, "Strong Institutional Support");
        assert_eq!(s.institutional_pct, 85.0);
        assert_eq!(s.float_shares_m, 15_000.0);
        assert_eq!(s.insider_sentiment, InsiderSentiment::Buying);
    }

    #[test]
    fn heavy_short_interest_takes_the_larger_penalty() {
        let f = facts(0.5, 0.25, None);
        let s = institutional_signal(&institutional_score_engine(), &f);
        // 50 - 20
        assert_eq!(s.institutional_score, 30.0);
        assert_eq!(s.institutional_stage, "Institutional Concern");

        let f = facts(0.5, 0.15, None);
        let s = institutional_signal(&institutional_score_engine(), &f);
        assert_eq!(s.institutional_score, 40.0);
    }

    #[test]
    fn missing_facts_score_as_zero_ownership() {
        let f = OwnershipFacts {
            ticker: "X".to_string(),
            ..Default::default()
        };
        let s = institutional_signal(&institutional_score_engine(), &f);
        // no institutions (-10), no short interest (+5), no insider activity
        assert_eq!(s.institutional_score, 45.0);
        assert_eq!(s.institutional_pct, 0.0);
        assert_eq!(s.insider_sentiment, InsiderSentiment::Unknown);
    }
}
