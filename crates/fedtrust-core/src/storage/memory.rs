//! In-memory storage backend
//!
//! Default storage implementation using in-memory hashmaps.
//! Suitable for tests and single-instance deployments.
//! Data is lost on restart.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::info;

use super::{KeyBundleStore, StatementStore, StorageError};
use crate::crypto::KeySet;

/// In-memory bundle and statement store
#[derive(Debug, Default)]
pub struct MemoryStore {
    bundles: RwLock<HashMap<String, KeySet>>,
    statements: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with operator key sets
    pub fn with_bundles(bundles: impl IntoIterator<Item = (String, KeySet)>) -> Self {
        Self {
            bundles: RwLock::new(bundles.into_iter().collect()),
            statements: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl KeyBundleStore for MemoryStore {
    async fn get_bundle(&self, issuer: &str) -> Result<Option<KeySet>, StorageError> {
        Ok(self.bundles.read().get(issuer).cloned())
    }

    async fn put_bundle(&self, issuer: &str, keys: &KeySet) -> Result<(), StorageError> {
        info!(issuer = %issuer, keys = keys.len(), "Storing key bundle");
        self.bundles.write().insert(issuer.to_string(), keys.clone());
        Ok(())
    }

    async fn remove_bundle(&self, issuer: &str) -> Result<bool, StorageError> {
        let removed = self.bundles.write().remove(issuer).is_some();
        if removed {
            info!(issuer = %issuer, "Removed key bundle");
        }
        Ok(removed)
    }

    async fn list_issuers(&self) -> Result<Vec<String>, StorageError> {
        let mut issuers: Vec<String> = self.bundles.read().keys().cloned().collect();
        issuers.sort();
        Ok(issuers)
    }
}

#[async_trait]
impl StatementStore for MemoryStore {
    async fn get_statement(&self, name: &str) -> Result<Option<String>, StorageError> {
        Ok(self.statements.read().get(name).cloned())
    }

    async fn put_statement(&self, name: &str, token: &str) -> Result<(), StorageError> {
        info!(name = %name, "Storing signed statement");
        self.statements
            .write()
            .insert(name.to_string(), token.to_string());
        Ok(())
    }

    async fn list_statements(&self) -> Result<Vec<String>, StorageError> {
        let mut names: Vec<String> = self.statements.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
