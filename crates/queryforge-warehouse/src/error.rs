//! Warehouse error types.

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, WarehouseError>;

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("API error [{status}]: {message}")]
    Api { status: u16, message: String },

    /// The statement reached a terminal state other than `SUCCEEDED`.
    #[error("Statement {state}: {message}")]
    Statement { state: String, message: String },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unexpected result shape: {0}")]
    Shape(String),
}
