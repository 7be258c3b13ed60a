//! Error types for the Federation Bridge

use fedtrust_core::FetchError;
use thiserror::Error;

/// Result type for Federation Bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that can occur while fetching remote key sets and statements
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The remote has nothing at this location
    #[error("Not found: {0}")]
    NotFound(String),

    /// The remote answered with an unexpected status
    #[error("Unexpected status {status} from {url}")]
    UnexpectedStatus { url: String, status: u16 },

    /// The response body could not be decoded
    #[error("Invalid response from {url}: {reason}")]
    InvalidBody { url: String, reason: String },

    /// Invalid fetcher configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// HTTP error
    #[error("HTTP error: {0}")]
    HttpError(String),
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        BridgeError::HttpError(err.to_string())
    }
}

impl From<BridgeError> for FetchError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::NotFound(what) => FetchError::NotFound(what),
            BridgeError::UnexpectedStatus { url, status } => FetchError::Status { url, status },
            BridgeError::InvalidBody { url, reason } => FetchError::InvalidBody { url, reason },
            other => FetchError::Transport(other.to_string()),
        }
    }
}
