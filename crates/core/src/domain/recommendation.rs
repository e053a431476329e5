use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Recommendation {
    #[serde(rename = "Strong Buy")]
    StrongBuy,
    #[serde(rename = "Buy")]
    Buy,
    #[serde(rename = "Hold")]
    Hold,
}

impl Recommendation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StrongBuy => "Strong Buy",
            Self::Buy => "Buy",
            Self::Hold => "Hold",
        }
    }
}

impl std::str::FromStr for Recommendation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Strong Buy" => Ok(Self::StrongBuy),
            "Buy" => Ok(Self::Buy),
            "Hold" => Ok(Self::Hold),
            other => Err(format!("unknown recommendation: {other}")),
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dated, ranked pick list. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub analysis_date: NaiveDate,
    pub analysis_timestamp: DateTime<Utc>,
    pub picks: Vec<Pick>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pick {
    pub rank: i32,
    pub ticker: String,
    pub name: String,
    pub sector: String,
    pub quant_score: f64,
    pub ai_recommendation: Recommendation,
    #[serde(default)]
    pub ai_summary: String,
    pub final_score: f64,
    pub price_at_analysis: f64,
    pub current_price: f64,
    #[serde(default)]
    pub target_upside: Option<f64>,
}

/// A pick re-priced at read time. `pick.current_price` holds the live price.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceRecord {
    #[serde(flatten)]
    pub pick: Pick,
    pub price_at_rec: f64,
    pub change_since_rec: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub total: usize,
    pub avg_score: f64,
    pub avg_performance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub analysis_date: NaiveDate,
    pub analysis_timestamp: DateTime<Utc>,
    pub top_picks: Vec<PerformanceRecord>,
    pub summary: PerformanceSummary,
}
