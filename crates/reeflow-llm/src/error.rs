use thiserror::Error;

/// Failure modes for a single `LlmClient::call`.
///
/// `RetryableUpstream` and `Permanent` mirror the distinction the
/// orchestrator needs: only the former is worth retrying.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("retryable upstream error: {0}")]
    RetryableUpstream(String),

    #[error("permanent upstream error: {0}")]
    Permanent(String),

    #[error("operation canceled")]
    Canceled,
}

impl LlmError {
    /// True when the orchestrator's retry loop should try again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::RetryableUpstream(_))
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;
