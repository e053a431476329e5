//! CSV tables exchanged between pipeline stages.

use crate::domain::contract::{QuantRow, QuantScore};
use crate::error::PipelineError;
use crate::storage::write_atomic;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

pub const VOLUME_FILE: &str = "us_volume_analysis.csv";
pub const INSTITUTIONAL_FILE: &str = "us_13f_holdings.csv";
pub const ETF_FLOWS_FILE: &str = "us_etf_flows.csv";
pub const QUANT_FILE: &str = "smart_money_picks_v2.csv";

pub fn write_csv_atomic<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), PipelineError> {
    let persistence = |detail: String| PipelineError::Persistence {
        path: path.to_path_buf(),
        detail,
    };

    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| persistence(format!("csv serialize failed: {e}")))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| persistence(format!("csv flush failed: {e}")))?;
    write_atomic(path, &bytes)
}

/// Rows that fail to decode are skipped and counted.
pub fn read_csv<T: DeserializeOwned>(path: &Path) -> anyhow::Result<(Vec<T>, usize)> {
    if !path.exists() {
        anyhow::bail!("table not found: {}", path.display());
    }
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| PipelineError::malformed(path.display().to_string(), e.to_string()))?;

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for row in reader.deserialize::<T>() {
        match row {
            Ok(r) => rows.push(r),
            Err(e) => {
                skipped += 1;
                if skipped <= 10 {
                    tracing::warn!(path = %path.display(), error = %e, "skipping malformed row");
                }
            }
        }
    }
    Ok((rows, skipped))
}

/// Quant composite scores; invalid rows are dropped with a warning.
pub fn load_quant_scores(path: &Path) -> anyhow::Result<Vec<QuantScore>> {
    let (rows, skipped) = read_csv::<QuantRow>(path)?;
    let mut out = Vec::with_capacity(rows.len());
    let mut invalid = 0usize;
    for row in rows {
        match row.validate_and_into() {
            Ok(q) => out.push(q),
            Err(e) => {
                invalid += 1;
                tracing::warn!(error = %e, "dropping invalid quant row");
            }
        }
    }
    tracing::info!(loaded = out.len(), skipped, invalid, "quant scores loaded");
    Ok(out)
}
