//! Signal producers. Each turns per-ticker inputs into a clamped 0–100 score
//! and a stage label, isolating per-ticker failures.

pub mod etf_flow;
pub mod insider;
pub mod institutional;
pub mod options;
pub mod risk;
pub mod volume;

use crate::domain::signal::Stage;
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Failures logged individually per batch; the rest are only counted.
const MAX_LOGGED_FAILURES: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub attempted: usize,
    pub produced: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl fmt::Display for BatchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attempted={} produced={} skipped={} failed={}",
            self.attempted, self.produced, self.skipped, self.failed
        )
    }
}

/// Outcome of one ticker within a batch.
pub enum Outcome<T> {
    Produced(T),
    /// Not enough history or data; dropped quietly.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub delay: Duration,
    pub progress_every: usize,
}

/// Runs `f` over `tickers` sequentially, sleeping `delay` between external
/// calls. A failing ticker never aborts the batch.
pub async fn run_batch<T, F, Fut>(
    source: &'static str,
    tickers: &[String],
    opts: &BatchOptions,
    mut f: F,
) -> (Vec<T>, BatchStats)
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = anyhow::Result<Outcome<T>>>,
{
    let mut out = Vec::with_capacity(tickers.len());
    let mut stats = BatchStats::default();

    for (i, ticker) in tickers.iter().enumerate() {
        if i > 0 && !opts.delay.is_zero() {
            tokio::time::sleep(opts.delay).await;
        }
        stats.attempted += 1;

        match f(ticker.clone()).await {
            Ok(Outcome::Produced(v)) => {
                stats.produced += 1;
                out.push(v);
            }
            Ok(Outcome::Skipped) => stats.skipped += 1,
            Err(err) => {
                stats.failed += 1;
                if stats.failed <= MAX_LOGGED_FAILURES {
                    tracing::warn!(source, %ticker, error = %format!("{err:#}"), "ticker failed");
                }
            }
        }

        if opts.progress_every > 0 && (i + 1) % opts.progress_every == 0 {
            tracing::info!(source, done = i + 1, total = tickers.len(), "progress");
        }
    }

    if stats.failed > MAX_LOGGED_FAILURES {
        tracing::warn!(
            source,
            suppressed = stats.failed - MAX_LOGGED_FAILURES,
            "further ticker failures not logged"
        );
    }
    tracing::info!(source, %stats, "batch finished");
    (out, stats)
}

/// Count of records per stage, strongest-positive first.
pub fn stage_distribution(stages: impl IntoIterator<Item = Stage>) -> [usize; 5] {
    let mut counts = [0usize; 5];
    for s in stages {
        counts[s.index()] += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failures_are_isolated() {
        let tickers: Vec<String> = ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect();
        let opts = BatchOptions {
            delay: Duration::ZERO,
            progress_every: 2,
        };

        let (out, stats) = run_batch("test", &tickers, &opts, |t| async move {
            match t.as_str() {
                "B" => anyhow::bail!("boom"),
                "C" => Ok(Outcome::Skipped),
                _ => Ok(Outcome::Produced(t)),
            }
        })
        .await;

        assert_eq!(out, vec!["A".to_string(), "D".to_string()]);
        assert_eq!(
            stats,
            BatchStats {
                attempted: 4,
                produced: 2,
                skipped: 1,
                failed: 1
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_between_calls() {
        let tickers: Vec<String> = vec!["A".into(), "B".into(), "C".into()];
        let opts = BatchOptions {
            delay: Duration::from_millis(100),
            progress_every: 0,
        };
        let started = tokio::time::Instant::now();
        let (out, _) = run_batch("test", &tickers, &opts, |t| async move {
            Ok(Outcome::Produced(t))
        })
        .await;
        assert_eq!(out.len(), 3);
        assert_eq!(started.elapsed(), Duration::from_millis(200));
    }

    #[test]
    fn distribution_counts_each_stage() {
        let d = stage_distribution([Stage::Neutral, Stage::Neutral, Stage::StrongPositive]);
        assert_eq!(d, [1, 0, 2, 0, 0]);
    }
}
