use thiserror::Error;

/// Crate-level error type, used for everything that isn't handled as a
/// `TurnOutcome` branch inside the orchestrator.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("history store error: {0}")]
    Storage(#[from] reeflow_history::HistoryError),

    #[error("session store error: {0}")]
    Session(#[from] reeflow_sessions::SessionError),

    #[error("llm error: {0}")]
    Llm(#[from] reeflow_llm::LlmError),

    #[error("expert error: {0}")]
    Expert(#[from] reeflow_expert::ExpertError),

    #[error("frame sink closed: {0}")]
    SinkClosed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Short error code string for outbound `error` frames.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Storage(_) | PipelineError::Session(_) => "STORAGE_ERROR",
            PipelineError::Llm(_) => "UPSTREAM_ERROR",
            PipelineError::Expert(_) => "UPSTREAM_ERROR",
            PipelineError::SinkClosed(_) => "INTERNAL_ERROR",
            PipelineError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
