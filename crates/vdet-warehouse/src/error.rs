//! Warehouse error types.

use thiserror::Error;

pub type WarehouseResult<T> = Result<T, WarehouseError>;

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("Warehouse configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Insert rejected with HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Row insert errors: {0}")]
    InsertErrors(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WarehouseError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }
}
