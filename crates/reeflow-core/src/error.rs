use thiserror::Error;

/// Shared error type for cross-cutting concerns (config, identifiers).
/// Crate-specific errors (history, sessions, llm, expert, pipeline, gateway)
/// live in their own crates and wrap this where needed.
#[derive(Debug, Error)]
pub enum ReeflowError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ReeflowError {
    /// Short error code string sent to clients in outbound `error` frames.
    pub fn code(&self) -> &'static str {
        match self {
            ReeflowError::Config(_) => "CONFIG_ERROR",
            ReeflowError::InvalidId(_) => "VALIDATION_ERROR",
            ReeflowError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, ReeflowError>;
