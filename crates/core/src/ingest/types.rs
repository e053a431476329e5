//! Wire shapes returned by the market-data provider.

use crate::domain::bar::Bar;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarsResponse {
    pub ticker: String,
    #[serde(default)]
    pub name: Option<String>,
    pub bars: Vec<Bar>,
}

/// Ownership facts for one ticker. Percentages are fractions (0.65 = 65%).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OwnershipFacts {
    pub ticker: String,
    #[serde(default)]
    pub institutional_pct: Option<f64>,
    #[serde(default)]
    pub insider_pct: Option<f64>,
    /// Short interest as a fraction of float.
    #[serde(default)]
    pub short_pct: Option<f64>,
    #[serde(default)]
    pub float_shares: Option<f64>,
    #[serde(default)]
    pub shares_outstanding: Option<f64>,
    #[serde(default)]
    pub num_institutional_holders: Option<u32>,
    /// `None` when the provider could not report insider activity at all.
    #[serde(default)]
    pub insider_transactions: Option<Vec<InsiderTransaction>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsiderTransaction {
    pub date: NaiveDate,
    #[serde(default)]
    pub insider: String,
    /// Free-text description, e.g. "Purchase at price 182.10" or "Sale".
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub shares: Option<f64>,
    #[serde(default)]
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionChain {
    pub ticker: String,
    #[serde(default)]
    pub expiration: Option<NaiveDate>,
    #[serde(default)]
    pub calls: Vec<OptionContract>,
    #[serde(default)]
    pub puts: Vec<OptionContract>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    pub strike: f64,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub open_interest: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub ticker: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sector: Option<String>,
}
