use crate::aggregate::MISSING_SECTOR;
use crate::domain::recommendation::Pick;
use crate::error::PipelineError;
use crate::ingest::provider::TimeSeriesProvider;
use crate::storage::write_json_atomic;
use anyhow::Context;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

pub const SECTOR_CACHE_FILE: &str = "sector_cache.json";

/// Placeholder cached when a lookup fails, so it is not retried every run.
pub const UNKNOWN_SECTOR: &str = "-";

/// Compact display form of a sector name.
pub fn short_sector(sector: &str) -> String {
    let short = match sector.trim() {
        "Technology" | "Information Technology" => "Tech",
        "Healthcare" | "Health Care" => "Health",
        "Financials" | "Financial Services" => "Fin",
        "Consumer Discretionary" | "Consumer Cyclical" => "Cons",
        "Consumer Staples" | "Consumer Defensive" => "Staple",
        "Energy" => "Energy",
        "Industrials" => "Indust",
        "Materials" | "Basic Materials" => "Mater",
        "Utilities" => "Util",
        "Real Estate" => "REIT",
        "Communication Services" => "Comm",
        "" => UNKNOWN_SECTOR,
        other => return other.chars().take(5).collect(),
    };
    short.to_string()
}

/// Where the cache lives between runs.
pub trait SectorPersistence: Send + Sync {
    fn load(&self) -> anyhow::Result<BTreeMap<String, String>>;

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<(), PipelineError>;
}

/// `sector_cache.json`; a missing file is an empty cache.
#[derive(Debug, Clone)]
pub struct JsonSectorFile {
    path: PathBuf,
}

impl JsonSectorFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SectorPersistence for JsonSectorFile {
    fn load(&self) -> anyhow::Result<BTreeMap<String, String>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", self.path.display()));
            }
        };
        serde_json::from_slice(&bytes)
            .map_err(|e| PipelineError::malformed(self.path.display().to_string(), e.to_string()).into())
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<(), PipelineError> {
        write_json_atomic(&self.path, entries)
    }
}

/// Ticker → short sector over an injected [`SectorPersistence`].
pub struct SectorCache {
    store: Box<dyn SectorPersistence>,
    entries: BTreeMap<String, String>,
    dirty: bool,
}

impl SectorCache {
    /// An unreadable cache starts empty.
    pub fn open(store: Box<dyn SectorPersistence>) -> Self {
        let entries = store.load().unwrap_or_else(|e| {
            tracing::warn!(error = %format!("{e:#}"), "sector cache unreadable; starting empty");
            BTreeMap::new()
        });
        Self {
            store,
            entries,
            dirty: false,
        }
    }

    pub fn load(path: impl Into<PathBuf>) -> Self {
        Self::open(Box::new(JsonSectorFile::new(path)))
    }

    pub fn get(&self, ticker: &str) -> Option<&str> {
        self.entries.get(ticker).map(String::as_str)
    }

    pub fn put(&mut self, ticker: impl Into<String>, sector: impl Into<String>) {
        self.entries.insert(ticker.into(), sector.into());
        self.dirty = true;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached value, else a provider profile lookup. Failures cache [`UNKNOWN_SECTOR`].
    pub async fn resolve(&mut self, ticker: &str, provider: &dyn TimeSeriesProvider) -> String {
        if let Some(hit) = self.get(ticker) {
            return hit.to_string();
        }
        let sector = match provider.profile(ticker).await {
            Ok(profile) => profile
                .sector
                .as_deref()
                .map(short_sector)
                .unwrap_or_else(|| UNKNOWN_SECTOR.to_string()),
            Err(err) => {
                tracing::debug!(ticker, error = %err, "sector lookup failed");
                UNKNOWN_SECTOR.to_string()
            }
        };
        self.put(ticker, sector.clone());
        sector
    }

    /// Cached sectors for `tickers` without touching the provider.
    pub fn lookup_all<'a>(&self, tickers: impl IntoIterator<Item = &'a str>) -> HashMap<String, String> {
        tickers
            .into_iter()
            .filter_map(|t| self.get(t).map(|s| (t.to_string(), s.to_string())))
            .collect()
    }

    /// Display sectors for a stored pick list: a cached entry wins, then the
    /// recorded sector shortened, then a provider lookup for picks recorded
    /// without one. Without a provider those keep [`MISSING_SECTOR`].
    pub async fn label_picks(&mut self, picks: &mut [Pick], provider: Option<&dyn TimeSeriesProvider>) {
        for pick in picks.iter_mut() {
            pick.sector = match (self.get(&pick.ticker), provider) {
                (Some(cached), _) => cached.to_string(),
                (None, _) if pick.sector != MISSING_SECTOR => short_sector(&pick.sector),
                (None, Some(provider)) => self.resolve(&pick.ticker, provider).await,
                (None, None) => continue,
            };
        }
    }

    pub fn save_if_dirty(&mut self) -> Result<(), PipelineError> {
        if !self.dirty {
            return Ok(());
        }
        self.store.save(&self.entries)?;
        self.dirty = false;
        Ok(())
    }
}
