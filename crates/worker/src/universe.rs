use anyhow::Context;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

pub const STOCK_LIST_FILE: &str = "us_stocks_list.csv";

/// Used when `us_stocks_list.csv` is absent.
const DEFAULT_UNIVERSE: [&str; 50] = [
    "AAPL", "MSFT", "GOOGL", "AMZN", "NVDA", "META", "TSLA", "BRK-B", "UNH", "JNJ", "JPM", "V",
    "XOM", "PG", "MA", "HD", "CVX", "MRK", "ABBV", "LLY", "PEP", "KO", "COST", "AVGO", "WMT",
    "MCD", "TMO", "CSCO", "ABT", "CRM", "ACN", "DHR", "ORCL", "NKE", "TXN", "PM", "NEE", "INTC",
    "AMD", "QCOM", "IBM", "GS", "CAT", "BA", "DIS", "NFLX", "PYPL", "ADBE", "NOW", "INTU",
];

/// Insider and options scans run on a short watchlist.
const DEFAULT_WATCHLIST: [&str; 10] = [
    "AAPL", "NVDA", "TSLA", "MSFT", "AMZN", "META", "GOOGL", "SPY", "QQQ", "AMD",
];

#[derive(Debug, Deserialize)]
struct StockListRow {
    ticker: String,
}

/// Tickers from the stock list, deduplicated in file order.
pub fn load_universe(data_dir: &Path) -> anyhow::Result<Vec<String>> {
    let path = data_dir.join(STOCK_LIST_FILE);
    if !path.exists() {
        tracing::warn!(path = %path.display(), "stock list not found; using default universe");
        return Ok(dedupe(DEFAULT_UNIVERSE.iter().copied()));
    }

    let mut reader = csv::Reader::from_path(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut tickers = Vec::new();
    let mut skipped = 0usize;
    for row in reader.deserialize::<StockListRow>() {
        match row {
            Ok(r) => tickers.push(r.ticker),
            Err(_) => skipped += 1,
        }
    }
    if skipped > 0 {
        tracing::warn!(skipped, path = %path.display(), "skipped malformed stock list rows");
    }

    let out = dedupe(tickers.iter().map(String::as_str));
    anyhow::ensure!(!out.is_empty(), "stock list {} has no tickers", path.display());
    Ok(out)
}

/// `--tickers` wins; otherwise the default watchlist.
pub fn watchlist(explicit: &[String]) -> Vec<String> {
    if explicit.is_empty() {
        dedupe(DEFAULT_WATCHLIST.iter().copied())
    } else {
        dedupe(explicit.iter().map(String::as_str))
    }
}

fn dedupe<'a>(tickers: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    tickers
        .map(|t| t.trim().to_ascii_uppercase())
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}
