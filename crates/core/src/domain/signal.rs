use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Indicator values for one ticker as of its last bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorResult {
    pub date: NaiveDate,
    pub obv: f64,
    pub obv_change_20d: f64,
    pub ad_line: f64,
    pub ad_change_20d: f64,
    /// 50 when the 14-bar window is undefined.
    pub mfi: f64,
    pub vwap: f64,
    pub vol_ratio_5d_20d: f64,
    pub surge_count_5d: usize,
    pub surge_count_20d: usize,
}

/// Score bucket, ordered from most to least desirable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    StrongPositive,
    Positive,
    Neutral,
    Negative,
    StrongNegative,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::StrongPositive,
        Stage::Positive,
        Stage::Neutral,
        Stage::Negative,
        Stage::StrongNegative,
    ];

    /// 0 for the strongest-positive bucket, 4 for the strongest-negative.
    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub ticker: String,
    pub score: f64,
    pub stage: Stage,
}
