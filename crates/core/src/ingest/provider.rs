use crate::config::{PipelineOptions, Settings};
use crate::domain::bar::TickerSeries;
use crate::error::PipelineError;
use crate::ingest::types::{BarsResponse, CompanyProfile, OptionChain, OwnershipFacts};
use crate::retry::{call_with_retry, BackoffPolicy};
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;

const SOURCE: &str = "market_data";

/// Per-ticker market data. Every call may fail softly; callers drop the ticker
/// or fall back to a neutral value.
#[async_trait::async_trait]
pub trait TimeSeriesProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Daily bars covering roughly the last `lookback_days` calendar days.
    async fn daily_bars(&self, ticker: &str, lookback_days: u32) -> Result<TickerSeries>;

    async fn ownership(&self, ticker: &str) -> Result<OwnershipFacts>;

    async fn option_chain(&self, ticker: &str) -> Result<OptionChain>;

    async fn profile(&self, ticker: &str) -> Result<CompanyProfile>;

    /// Last finite close within the past few sessions.
    async fn latest_close(&self, ticker: &str) -> Result<Option<f64>> {
        let series = self.daily_bars(ticker, 7).await?;
        Ok(series.last().map(|b| b.close).filter(|c| c.is_finite()))
    }
}

#[derive(Debug, Clone)]
pub struct HttpJsonProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    backoff: BackoffPolicy,
}

impl HttpJsonProvider {
    pub fn from_settings(settings: &Settings, opts: &PipelineOptions) -> Result<Self> {
        let base_url = settings.require_data_provider_base_url()?.to_string();
        let api_key = settings.data_provider_api_key.clone();

        let http = reqwest::Client::builder()
            .timeout(opts.request_timeout)
            .build()
            .context("failed to build data provider http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            timeout: opts.request_timeout,
            backoff: BackoffPolicy::linear(opts.retry_base, opts.retry_max_attempts),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            headers.insert("x-api-key", HeaderValue::from_str(api_key)?);
        }
        Ok(headers)
    }

    async fn fetch_once<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let res = self
            .http
            .get(self.url(path))
            .headers(self.headers()?)
            .query(query)
            .send()
            .await
            .map_err(|e| PipelineError::unavailable(SOURCE, format!("{path}: {e}")))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|e| PipelineError::unavailable(SOURCE, format!("{path}: read body: {e}")))?;

        if let Some(err) = classify_status(status, path, &text) {
            return Err(err.into());
        }

        serde_json::from_str::<T>(&text)
            .map_err(|e| PipelineError::malformed(format!("{SOURCE} {path}"), e.to_string()).into())
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str, ticker: &str, extra: &[(&str, String)]) -> Result<T> {
        let mut query = vec![("ticker", ticker.to_string())];
        query.extend(extra.iter().cloned());
        call_with_retry(&self.backoff, self.timeout, path, || self.fetch_once::<T>(path, &query))
            .await
            .with_context(|| format!("{path} failed for {ticker}"))
    }
}

/// 429 and 5xx are retryable; other non-success statuses are not.
fn classify_status(status: StatusCode, path: &str, body: &str) -> Option<PipelineError> {
    if status.is_success() {
        return None;
    }
    let detail = format!("{path}: HTTP {status}: {}", body.chars().take(200).collect::<String>());
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Some(PipelineError::rate_limited(SOURCE, detail))
    } else {
        Some(PipelineError::unavailable(SOURCE, detail))
    }
}

fn validate_ticker(expected: &str, got: &str, path: &str) -> Result<()> {
    if !got.trim().eq_ignore_ascii_case(expected.trim()) {
        return Err(PipelineError::malformed(
            format!("{SOURCE} {path}"),
            format!("ticker mismatch: expected {expected}, got {got}"),
        )
        .into());
    }
    Ok(())
}

#[async_trait::async_trait]
impl TimeSeriesProvider for HttpJsonProvider {
    fn provider_name(&self) -> &'static str {
        "external_http_json"
    }

    async fn daily_bars(&self, ticker: &str, lookback_days: u32) -> Result<TickerSeries> {
        let resp: BarsResponse = self
            .fetch("/v1/bars", ticker, &[("days", lookback_days.to_string())])
            .await?;
        validate_ticker(ticker, &resp.ticker, "/v1/bars")?;
        Ok(TickerSeries::new(resp.ticker, resp.name, resp.bars)?)
    }

    async fn ownership(&self, ticker: &str) -> Result<OwnershipFacts> {
        let facts: OwnershipFacts = self.fetch("/v1/ownership", ticker, &[]).await?;
        validate_ticker(ticker, &facts.ticker, "/v1/ownership")?;
        Ok(facts)
    }

    async fn option_chain(&self, ticker: &str) -> Result<OptionChain> {
        let chain: OptionChain = self.fetch("/v1/options", ticker, &[]).await?;
        validate_ticker(ticker, &chain.ticker, "/v1/options")?;
        Ok(chain)
    }

    async fn profile(&self, ticker: &str) -> Result<CompanyProfile> {
        let profile: CompanyProfile = self.fetch("/v1/profile", ticker, &[]).await?;
        validate_ticker(ticker, &profile.ticker, "/v1/profile")?;
        Ok(profile)
    }
}
