//! Storage abstraction for key bundles and signed statements
//!
//! Verifiers look up a federation operator's public keys in a
//! [`KeyBundleStore`]. Statements published by reference live in a
//! [`StatementStore`]. Both are keyed by identifiers that may contain `/`,
//! `:` and other reserved characters; backends that map names onto a
//! filesystem or URL path run them through a [`NameCodec`](crate::codec::NameCodec).
//!
//! Two backends are provided:
//! - [`MemoryStore`]: process-local hashmaps, data is lost on restart
//! - [`FsBundleStore`] / [`FsStatementStore`]: one file per entry in a directory

pub mod fs;
pub mod memory;

pub use fs::{FsBundleStore, FsStatementStore};
pub use memory::MemoryStore;

use async_trait::async_trait;
use std::fmt::Debug;

use crate::crypto::KeySet;

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Public key sets of federation operators, keyed by operator identifier
///
/// Implementations must be thread-safe and support concurrent access.
#[async_trait]
pub trait KeyBundleStore: Send + Sync + Debug {
    /// Get the key set published by an operator
    async fn get_bundle(&self, issuer: &str) -> Result<Option<KeySet>, StorageError>;

    /// Store (or replace) the key set of an operator
    async fn put_bundle(&self, issuer: &str, keys: &KeySet) -> Result<(), StorageError>;

    /// Remove an operator's key set
    async fn remove_bundle(&self, issuer: &str) -> Result<bool, StorageError>;

    /// List every operator identifier with a stored key set, sorted
    async fn list_issuers(&self) -> Result<Vec<String>, StorageError>;
}

/// Signed statements published by reference, keyed by name
#[async_trait]
pub trait StatementStore: Send + Sync + Debug {
    /// Get a stored compact token
    async fn get_statement(&self, name: &str) -> Result<Option<String>, StorageError>;

    /// Store (or replace) a compact token under a name
    async fn put_statement(&self, name: &str, token: &str) -> Result<(), StorageError>;

    /// List every stored statement name, sorted
    async fn list_statements(&self) -> Result<Vec<String>, StorageError>;
}
