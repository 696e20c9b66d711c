use thiserror::Error;

/// Errors surfaced by the bridge.
///
/// Parse and per-record errors never appear here; they are contained inside
/// the stream reader, which recovers by reconnecting.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Path not allowed: {0}")]
    PathNotAllowed(String),

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, BridgeError>;
