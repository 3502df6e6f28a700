//! Error types shared across Coinflow crates

use thiserror::Error;

/// Result type alias for Coinflow operations
pub type Result<T> = std::result::Result<T, CoinflowError>;

/// Errors that are not specific to a single pipeline stage
#[derive(Error, Debug)]
pub enum CoinflowError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid pagination: {0}")]
    Pagination(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl CoinflowError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn not_found(what: &str, identifier: &str) -> Self {
        Self::NotFound(format!("{} '{}' not found", what, identifier))
    }
}
