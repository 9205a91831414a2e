//! Error handling for the DroneDeck console core

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Validation error (rejected before any request is issued)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Backend API reported failure or returned an unexpected payload
    #[error("API error: {0}")]
    Api(String),

    /// Parse error (malformed wire payload)
    #[error("Parse error: {0}")]
    Parse(String),

    /// A command of the same kind is already in flight
    #[error("Busy: {0}")]
    Busy(String),

    /// A response arrived after a newer command superseded it
    #[error("Superseded: {0}")]
    Superseded(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Event socket transport error
    #[error("Socket error: {0}")]
    Socket(String),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
