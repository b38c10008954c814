use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("history error: {0}")]
    History(#[from] reeflow_history::HistoryError),
}

pub type Result<T> = std::result::Result<T, SessionError>;
