use crate::llm::Provider;
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone)]
pub struct LlmDiagnosticsError {
    pub provider: Provider,
    pub stage: &'static str,
    pub status: Option<u16>,
    pub detail: String,
    pub raw_output: Option<String>,
    pub raw_response_json: Option<Value>,
}

impl LlmDiagnosticsError {
    /// 429, the overloaded status (529) and other 5xx responses are worth another attempt.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self.status, Some(429) | Some(500..=599))
    }
}

impl fmt::Display for LlmDiagnosticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LLM error (provider={}, stage={}): {}",
            self.provider.as_str(),
            self.stage,
            self.detail
        )
    }
}

impl std::error::Error for LlmDiagnosticsError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn err(status: Option<u16>) -> LlmDiagnosticsError {
        LlmDiagnosticsError {
            provider: Provider::Anthropic,
            stage: "http",
            status,
            detail: "x".to_string(),
            raw_output: None,
            raw_response_json: None,
        }
    }

    #[test]
    fn classifies_rate_limits() {
        assert!(err(Some(429)).is_rate_limited());
        assert!(err(Some(529)).is_rate_limited());
        assert!(!err(Some(400)).is_rate_limited());
        assert!(!err(None).is_rate_limited());
    }
}
