//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("invalid id: {0}")]
    InvalidId(String),

    #[error("{0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Shorthand for a user-correctable validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
