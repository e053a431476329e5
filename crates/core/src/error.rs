use std::fmt;
use std::path::PathBuf;

/// Failure classes the pipeline branches on.
///
/// Everything per-ticker is absorbed by the producing source (the ticker is
/// dropped or a neutral default is used); only `Persistence` and total input
/// absence surface to the caller as a run-level failure.
#[derive(Debug, Clone)]
pub enum PipelineError {
    InsufficientData {
        ticker: String,
        bars: usize,
        required: usize,
    },
    ExternalUnavailable {
        source: &'static str,
        detail: String,
        retryable: bool,
    },
    MalformedInput {
        context: String,
        detail: String,
    },
    Persistence {
        path: PathBuf,
        detail: String,
    },
}

impl PipelineError {
    pub fn unavailable(source: &'static str, detail: impl Into<String>) -> Self {
        Self::ExternalUnavailable {
            source,
            detail: detail.into(),
            retryable: false,
        }
    }

    pub fn rate_limited(source: &'static str, detail: impl Into<String>) -> Self {
        Self::ExternalUnavailable {
            source,
            detail: detail.into(),
            retryable: true,
        }
    }

    pub fn malformed(context: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::MalformedInput {
            context: context.into(),
            detail: detail.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ExternalUnavailable {
                retryable: true,
                ..
            }
        )
    }

    /// Fatal for the run, as opposed to a per-ticker soft failure.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Persistence { .. })
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientData {
                ticker,
                bars,
                required,
            } => write!(
                f,
                "insufficient data for {ticker}: {bars} bars (need {required})"
            ),
            Self::ExternalUnavailable {
                source,
                detail,
                retryable,
            } => write!(
                f,
                "external source unavailable (source={source}, retryable={retryable}): {detail}"
            ),
            Self::MalformedInput { context, detail } => {
                write!(f, "malformed input ({context}): {detail}")
            }
            Self::Persistence { path, detail } => {
                write!(f, "persistence failure ({}): {detail}", path.display())
            }
        }
    }
}

impl std::error::Error for PipelineError {}
