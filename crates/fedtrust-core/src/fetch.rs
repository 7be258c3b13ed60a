//! Remote retrieval of key sets and statements
//!
//! The core never speaks HTTP itself. Verifiers are handed a
//! [`RemoteFetcher`] that resolves an operator identifier to its published
//! key set and a statement URI to its compact token. Timeouts and retries
//! belong to the implementation; any failure surfaces to the unpacker as an
//! unresolvable signer or branch.

use async_trait::async_trait;
use std::fmt::Debug;
use thiserror::Error;

use crate::crypto::KeySet;

/// Reasons a remote fetch can fail
#[derive(Error, Debug)]
pub enum FetchError {
    /// Nothing is published for this identifier or URI
    #[error("Not found: {0}")]
    NotFound(String),

    /// The remote answered with a non-success status
    #[error("Unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    /// The response body could not be decoded
    #[error("Invalid response body from {url}: {reason}")]
    InvalidBody { url: String, reason: String },

    /// The request itself failed
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Source of key sets and statements that are not available locally
#[async_trait]
pub trait RemoteFetcher: Send + Sync + Debug {
    /// Fetch the public key set published by an operator
    async fn fetch_key_set(&self, issuer: &str) -> Result<KeySet, FetchError>;

    /// Fetch the compact token published at a URI
    async fn fetch_statement(&self, uri: &str) -> Result<String, FetchError>;
}

/// A fetcher for deployments where everything is provisioned locally
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFetcher;

#[async_trait]
impl RemoteFetcher for NoFetcher {
    async fn fetch_key_set(&self, issuer: &str) -> Result<KeySet, FetchError> {
        Err(FetchError::NotFound(issuer.to_string()))
    }

    async fn fetch_statement(&self, uri: &str) -> Result<String, FetchError> {
        Err(FetchError::NotFound(uri.to_string()))
    }
}
