//! Error types for Agora

use thiserror::Error;

/// Crate-wide error type
#[derive(Debug, Error)]
pub enum AgoraError {
    /// Document or relational store failure
    #[error("Database error: {0}")]
    Database(String),

    /// HTTP boundary failure (bad body, oversized payload, etc.)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Request failed validation, no side effects performed
    #[error("Validation error: {0}")]
    Validation(String),

    /// Requested object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Federation engine rejected or could not store the submission
    #[error("Upstream submission failed: {0}")]
    Upstream(String),

    /// Invalid configuration at startup
    #[error("Configuration error: {0}")]
    Config(String),

    /// Socket-level failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<sqlx::Error> for AgoraError {
    fn from(e: sqlx::Error) -> Self {
        AgoraError::Database(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AgoraError>;
