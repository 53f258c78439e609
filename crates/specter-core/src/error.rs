//! Unified error types for Specter

use thiserror::Error;

/// Unified error type for all Specter operations
#[derive(Error, Debug)]
pub enum SpecterError {
    // Discovery errors
    #[error("cannot resolve test path '{0}': {1}")]
    Resolution(String, #[source] std::io::Error),

    #[error("invalid test glob '{0}': {1}")]
    Pattern(String, String),

    // Server errors
    #[error("failed to bind {0}: {1}")]
    Bind(String, #[source] std::io::Error),

    #[error("file watcher error: {0}")]
    Watcher(String),

    // Browser errors
    #[error("browser connection failed: {0}")]
    Connection(String),

    #[error("browser session failed: {0}")]
    Session(String),

    // Coverage errors
    #[error("malformed coverage payload: {0}")]
    CoverageParse(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using SpecterError
pub type Result<T> = std::result::Result<T, SpecterError>;
