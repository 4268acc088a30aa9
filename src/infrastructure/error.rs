use crate::domain::models::SlotError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Invalid slot record #{index}: {reason}")]
    InvalidRecord { index: usize, reason: String },
    #[error("Slot API error: {0}")]
    Http(String),
    #[error(transparent)]
    Slot(#[from] SlotError),
}
