//! Loads the daily price table (`us_daily_prices.csv`) into per-ticker series.

use crate::domain::bar::{Bar, TickerSeries};
use crate::error::PipelineError;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

pub const PRICES_FILE: &str = "us_daily_prices.csv";

#[derive(Debug, Clone, Deserialize)]
struct PriceRow {
    ticker: String,
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    #[serde(alias = "close")]
    current_price: f64,
    volume: f64,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Default)]
pub struct LoadedPrices {
    /// One series per ticker, in first-seen order.
    pub series: Vec<TickerSeries>,
    pub rejected: Vec<PipelineError>,
    pub skipped_rows: usize,
}

/// Reads the price table. A missing or unreadable file fails the run; bad rows
/// and bad tickers are skipped and reported.
pub fn load_price_file(path: &Path) -> anyhow::Result<LoadedPrices> {
    if !path.exists() {
        anyhow::bail!("price table not found: {}", path.display());
    }
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| PipelineError::malformed(path.display().to_string(), e.to_string()))?;
    load_from_reader(&mut reader)
}

pub fn load_from_reader<R: std::io::Read>(reader: &mut csv::Reader<R>) -> anyhow::Result<LoadedPrices> {
    let mut order: Vec<String> = Vec::new();
    let mut grouped: HashMap<String, (Option<String>, Vec<Bar>)> = HashMap::new();
    let mut skipped_rows = 0usize;

    for (line, row) in reader.deserialize::<PriceRow>().enumerate() {
        let row = match row {
            Ok(r) => r,
            Err(e) => {
                skipped_rows += 1;
                if skipped_rows <= 10 {
                    tracing::warn!(line = line + 2, error = %e, "skipping malformed price row");
                }
                continue;
            }
        };

        let ticker = row.ticker.trim().to_string();
        if ticker.is_empty() {
            skipped_rows += 1;
            continue;
        }

        let entry = grouped.entry(ticker.clone()).or_insert_with(|| {
            order.push(ticker.clone());
            (None, Vec::new())
        });
        if entry.0.is_none() {
            entry.0 = row.name.filter(|n| !n.trim().is_empty());
        }
        entry.1.push(Bar {
            date: row.date,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.current_price,
            volume: row.volume,
        });
    }

    let mut out = LoadedPrices {
        skipped_rows,
        ..Default::default()
    };
    for ticker in order {
        let Some((name, bars)) = grouped.remove(&ticker) else {
            continue;
        };
        match TickerSeries::new(ticker, name, bars) {
            Ok(series) => out.series.push(series),
            Err(err) => {
                tracing::warn!(error = %err, "rejecting ticker series");
                out.rejected.push(err);
            }
        }
    }

    tracing::info!(
        tickers = out.series.len(),
        rejected = out.rejected.len(),
        skipped_rows = out.skipped_rows,
        "price table loaded"
    );
    Ok(out)
}
