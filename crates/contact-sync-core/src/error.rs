//! Error types for the contact sync core.

use thiserror::Error;

/// Errors raised while decoding or validating core data.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("decoding error: {0}")]
    Decoding(#[from] serde_json::Error),

    #[error("unknown operation type: {0}")]
    UnknownOperation(String),

    #[error("unknown channel type: {0}")]
    UnknownChannelType(String),

    #[error("unknown scope: {0}")]
    UnknownScope(String),

    #[error("malformed record: {0}")]
    Malformed(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
