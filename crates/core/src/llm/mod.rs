pub mod anthropic;
pub mod error;
pub mod summaries;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
        }
    }
}

/// Free-text generation used for per-ticker summaries and the ETF flow commentary.
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    fn provider(&self) -> Provider;

    async fn generate(&self, prompt: &str) -> anyhow::Result<String>;
}
