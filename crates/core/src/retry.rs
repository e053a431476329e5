//! Linear backoff for external calls.

use crate::error::PipelineError;
use crate::llm::error::LlmDiagnosticsError;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub base: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_secs(1),
        }
    }
}

impl BackoffPolicy {
    pub fn linear(base: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base,
        }
    }

    /// Wait after the `attempt`-th failure (1-based): `base × attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base.saturating_mul(attempt)
    }
}

/// Whether `err` carries a rate-limit style signal worth retrying.
pub fn is_retryable(err: &anyhow::Error) -> bool {
    if let Some(e) = err.downcast_ref::<PipelineError>() {
        return e.is_retryable();
    }
    if let Some(e) = err.downcast_ref::<LlmDiagnosticsError>() {
        return e.is_rate_limited();
    }
    false
}

/// Runs `op` under a per-attempt wall-clock budget, retrying retryable
/// failures with linear backoff. A timeout is a soft failure and is not retried.
pub async fn call_with_retry<T, F, Fut>(
    policy: &BackoffPolicy,
    timeout: Duration,
    label: &str,
    mut op: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let res = match tokio::time::timeout(timeout, op()).await {
            Ok(res) => res,
            Err(_) => Err(PipelineError::unavailable(
                "timeout",
                format!("{label} exceeded {timeout:?}"),
            )
            .into()),
        };

        match res {
            Ok(v) => return Ok(v),
            Err(err) => {
                if attempt >= policy.max_attempts || !is_retryable(&err) {
                    return Err(err);
                }
                let wait = policy.delay_for(attempt);
                tracing::warn!(attempt, ?wait, label, error = %err, "external call failed; retrying");
                tokio::time::sleep(wait).await;
            }
        }
    }
}
