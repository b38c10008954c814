use thiserror::Error;

/// Failure modes for `ExpertClient::consult`.
#[derive(Debug, Error)]
pub enum ExpertError {
    #[error("expert upstream error: {0}")]
    Upstream(String),

    #[error("expert call timed out")]
    Timeout,

    #[error("operation canceled")]
    Canceled,

    #[error("transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, ExpertError>;
