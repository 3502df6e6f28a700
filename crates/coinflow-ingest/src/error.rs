//! Error types for the ingestion pipeline

use thiserror::Error;

use crate::sources::SourceKind;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Errors raised while extracting, transforming or loading market data
///
/// Per-record [`IngestError::Validation`] failures are recovered inside the
/// transformer. Every other variant aborts the run that produced it.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Network or file access failed
    #[error("{kind} unavailable: {reason}")]
    SourceUnavailable { kind: SourceKind, reason: String },

    /// Payload could not be turned into rows
    #[error("{kind} returned malformed data: {reason}")]
    SourceFormat { kind: SourceKind, reason: String },

    /// Upstream kept answering 429 after every retry
    #[error("{kind} rate limited after {attempts} attempts")]
    RateLimited { kind: SourceKind, attempts: u32 },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Common(#[from] coinflow_common::CoinflowError),
}

impl IngestError {
    pub fn unavailable(kind: SourceKind, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            kind,
            reason: reason.into(),
        }
    }

    pub fn format(kind: SourceKind, reason: impl Into<String>) -> Self {
        Self::SourceFormat {
            kind,
            reason: reason.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_source() {
        let err = IngestError::unavailable(SourceKind::CoinGecko, "HTTP 500");
        assert_eq!(err.to_string(), "coingecko unavailable: HTTP 500");

        let err = IngestError::RateLimited {
            kind: SourceKind::CoinPaprika,
            attempts: 2,
        };
        assert_eq!(err.to_string(), "coinpaprika rate limited after 2 attempts");
    }
}
