use thiserror::Error;
use trader_models::ValidationErrors;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid strategy: {0}")]
    Invalid(#[from] ValidationErrors),

    #[error("Strategy not found: {0}")]
    NotFound(String),

    #[error("Strategy already exists: {0}")]
    Conflict(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Store not available: {0}")]
    Unavailable(String),
}
