pub mod aggregate;
pub mod domain;
pub mod error;
pub mod indicators;
pub mod ingest;
pub mod llm;
pub mod performance;
pub mod retry;
pub mod scoring;
pub mod signals;
pub mod storage;
pub mod time;

pub mod config {
    use anyhow::Context;
    use std::path::PathBuf;
    use std::time::Duration;

    const DEFAULT_DATA_DIR: &str = ".";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub data_dir: PathBuf,
        pub database_url: Option<String>,
        pub anthropic_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
        pub data_provider_base_url: Option<String>,
        pub data_provider_api_key: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                data_dir: std::env::var("DATA_DIR")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
                database_url: std::env::var("DATABASE_URL").ok(),
                anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                data_provider_base_url: std::env::var("DATA_PROVIDER_BASE_URL").ok(),
                data_provider_api_key: std::env::var("DATA_PROVIDER_API_KEY").ok(),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_anthropic_api_key(&self) -> anyhow::Result<&str> {
            self.anthropic_api_key
                .as_deref()
                .context("ANTHROPIC_API_KEY is required")
        }

        pub fn require_data_provider_base_url(&self) -> anyhow::Result<&str> {
            self.data_provider_base_url
                .as_deref()
                .context("DATA_PROVIDER_BASE_URL is required")
        }
    }

    /// Tunables for a pipeline run. Every field has a default; env vars override.
    #[derive(Debug, Clone)]
    pub struct PipelineOptions {
        pub top_n: usize,
        pub surge_threshold: f64,
        pub request_delay: Duration,
        pub request_timeout: Duration,
        pub retry_base: Duration,
        pub retry_max_attempts: u32,
        pub summary_top_n: usize,
        /// `None` means an existing summary is never regenerated.
        pub summary_max_age_days: Option<i64>,
        pub require_sentiment: bool,
        pub market_utc_offset_hours: i32,
        pub progress_every: usize,
    }

    impl Default for PipelineOptions {
        fn default() -> Self {
            Self {
                top_n: 10,
                surge_threshold: 2.0,
                request_delay: Duration::from_millis(100),
                request_timeout: Duration::from_secs(30),
                retry_base: Duration::from_millis(1000),
                retry_max_attempts: 3,
                summary_top_n: 20,
                summary_max_age_days: None,
                require_sentiment: true,
                market_utc_offset_hours: -5,
                progress_every: 50,
            }
        }
    }

    impl PipelineOptions {
        pub fn from_env() -> Self {
            let mut out = Self::default();

            if let Some(n) = env_parse::<usize>("PICKS_TOP_N") {
                out.top_n = n;
            }
            if let Some(x) = env_parse::<f64>("VOLUME_SURGE_THRESHOLD") {
                out.surge_threshold = x;
            }
            if let Some(ms) = env_parse::<u64>("PROVIDER_REQ_DELAY_MS") {
                out.request_delay = Duration::from_millis(ms);
            }
            if let Some(secs) = env_parse::<u64>("PROVIDER_TIMEOUT_SECS") {
                out.request_timeout = Duration::from_secs(secs);
            }
            if let Some(ms) = env_parse::<u64>("RETRY_BASE_MS") {
                out.retry_base = Duration::from_millis(ms);
            }
            if let Some(n) = env_parse::<u32>("RETRY_MAX_ATTEMPTS") {
                out.retry_max_attempts = n;
            }
            if let Some(n) = env_parse::<usize>("SUMMARY_TOP_N") {
                out.summary_top_n = n;
            }
            if let Some(days) = env_parse::<i64>("SUMMARY_MAX_AGE_DAYS") {
                out.summary_max_age_days = Some(days);
            }
            if let Some(b) = env_parse::<bool>("REQUIRE_SENTIMENT") {
                out.require_sentiment = b;
            }
            if let Some(h) = env_parse::<i32>("MARKET_UTC_OFFSET_HOURS") {
                out.market_utc_offset_hours = h;
            }
            if let Some(n) = env_parse::<usize>("PROGRESS_EVERY") {
                out.progress_every = n;
            }

            out
        }

        pub fn validate(&self) -> anyhow::Result<()> {
            anyhow::ensure!(self.top_n >= 1, "PICKS_TOP_N must be >= 1");
            anyhow::ensure!(
                self.surge_threshold > 0.0,
                "VOLUME_SURGE_THRESHOLD must be > 0 (got {})",
                self.surge_threshold
            );
            anyhow::ensure!(
                self.retry_max_attempts >= 1,
                "RETRY_MAX_ATTEMPTS must be >= 1"
            );
            anyhow::ensure!(
                (-12..=14).contains(&self.market_utc_offset_hours),
                "MARKET_UTC_OFFSET_HOURS out of range: {}",
                self.market_utc_offset_hours
            );
            Ok(())
        }
    }

    fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
        std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn defaults_are_valid() {
            let opts = PipelineOptions::default();
            opts.validate().unwrap();
            assert_eq!(opts.top_n, 10);
            assert_eq!(opts.retry_max_attempts, 3);
            assert!(opts.summary_max_age_days.is_none());
        }

        #[test]
        fn rejects_zero_top_n() {
            let opts = PipelineOptions {
                top_n: 0,
                ..Default::default()
            };
            assert!(opts.validate().is_err());
        }
    }
}
