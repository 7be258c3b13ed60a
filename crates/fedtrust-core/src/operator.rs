//! Operators: verifying entities and federation operators
//!
//! An [`Operator`] unpacks and evaluates statements it receives, and can
//! self-sign statements when it owns keys. A [`FederationOperator`] is an
//! operator whose keys rotate on a schedule and whose public key set is
//! published to key bundle stores so verifiers can find it.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

use crate::crypto::KeySet;
use crate::error::{FederationError, Result};
use crate::evaluate::{ChainEvaluator, TrustPathResult};
use crate::fetch::RemoteFetcher;
use crate::keystore::{KeyDefinition, KeyStore};
use crate::signer::sign_as;
use crate::statement::MetadataStatement;
use crate::storage::KeyBundleStore;
use crate::unpack::{StatementUnpacker, UnpackResult, VerifiedStatementNode};

/// An entity that verifies statements and optionally signs its own
#[derive(Debug, Clone)]
pub struct Operator {
    issuer: Option<String>,
    keys: Option<Arc<KeyStore>>,
    unpacker: StatementUnpacker,
    trust_anchors: Option<BTreeSet<String>>,
}

impl Operator {
    /// A verifier resolving keys from `bundles`, then `fetcher`
    pub fn new(bundles: Arc<dyn KeyBundleStore>, fetcher: Arc<dyn RemoteFetcher>) -> Self {
        Self {
            issuer: None,
            keys: None,
            unpacker: StatementUnpacker::new(bundles, fetcher),
            trust_anchors: None,
        }
    }

    /// Sign as the owner of `keys`
    pub fn with_keys(mut self, keys: Arc<KeyStore>) -> Self {
        self.issuer = Some(keys.issuer().to_string());
        self.keys = Some(keys);
        self
    }

    /// Trust exactly these anchors instead of every operator in the bundle store
    pub fn with_trust_anchors(mut self, anchors: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.trust_anchors = Some(anchors.into_iter().map(Into::into).collect());
        self
    }

    /// Replace the unpacker (for example to change the depth limit)
    pub fn with_unpacker(mut self, unpacker: StatementUnpacker) -> Self {
        self.unpacker = unpacker;
        self
    }

    /// The identity this operator signs as, if it owns keys
    pub fn issuer(&self) -> Option<&str> {
        self.issuer.as_deref()
    }

    /// The operator's own key store
    pub fn keys(&self) -> Option<&Arc<KeyStore>> {
        self.keys.as_ref()
    }

    /// Public key set of the operator's currently valid keys
    pub fn public_key_set(&self) -> Option<KeySet> {
        self.keys.as_ref().map(|keys| keys.public_key_set())
    }

    /// Self-sign a statement
    pub fn pack_metadata_statement(&self, statement: MetadataStatement) -> Result<String> {
        let keys = self
            .keys
            .as_ref()
            .ok_or_else(|| FederationError::Configuration("operator has no signing keys".into()))?;
        sign_as(keys, statement)
    }

    /// Verify and decode a signed statement tree
    pub async fn unpack_metadata_statement(&self, token: &str) -> Result<UnpackResult> {
        self.unpacker.unpack_metadata_statement(token).await
    }

    /// Trust paths of a verified tree
    pub async fn evaluate_metadata_statement(&self, root: &VerifiedStatementNode) -> Result<Vec<TrustPathResult>> {
        self.evaluator().await?.evaluate_metadata_statement(root)
    }

    /// Trust paths of a verified tree valid for `usage`
    pub async fn evaluate_for_usage(&self, root: &VerifiedStatementNode, usage: &str) -> Result<Vec<TrustPathResult>> {
        self.evaluator().await?.evaluate_for_usage(root, usage)
    }

    /// The evaluator for the configured anchors, or the bundle store's issuers
    pub async fn evaluator(&self) -> Result<ChainEvaluator> {
        match &self.trust_anchors {
            Some(anchors) => Ok(ChainEvaluator::new(anchors.iter().cloned())),
            None => Ok(ChainEvaluator::new(self.unpacker.bundles().list_issuers().await?)),
        }
    }
}

/// An operator owning scheduled key rotation
#[derive(Debug, Clone)]
pub struct FederationOperator {
    keys: Arc<KeyStore>,
    operator: Operator,
}

impl FederationOperator {
    /// Create an operator with fresh keys for `key_defs`
    pub fn new(
        issuer: impl Into<String>,
        key_defs: Vec<KeyDefinition>,
        remove_after: Duration,
        bundles: Arc<dyn KeyBundleStore>,
        fetcher: Arc<dyn RemoteFetcher>,
    ) -> Result<Self> {
        let keys = Arc::new(KeyStore::new(issuer, key_defs, remove_after)?);
        Ok(Self::from_key_store(keys, bundles, fetcher))
    }

    /// Create an operator around an existing key store
    pub fn from_key_store(
        keys: Arc<KeyStore>,
        bundles: Arc<dyn KeyBundleStore>,
        fetcher: Arc<dyn RemoteFetcher>,
    ) -> Self {
        let operator = Operator::new(bundles, fetcher).with_keys(keys.clone());
        Self { keys, operator }
    }

    /// The operator identity
    pub fn issuer(&self) -> &str {
        self.keys.issuer()
    }

    /// The rotating key store
    pub fn key_store(&self) -> &Arc<KeyStore> {
        &self.keys
    }

    /// The verifying and self-signing side of this operator
    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    /// Rotate keys now
    pub fn rotate_keys(&self) -> Result<()> {
        self.rotate_keys_at(Utc::now())
    }

    /// Rotate keys as of `now`
    pub fn rotate_keys_at(&self, now: DateTime<Utc>) -> Result<()> {
        self.keys.rotate(now)
    }

    /// Public key set of every key valid now
    pub fn public_key_set(&self) -> KeySet {
        self.keys.public_key_set()
    }

    /// Publish the currently valid key set to a bundle store
    pub async fn publish_keys(&self, bundles: &dyn KeyBundleStore) -> Result<()> {
        let keys = self.public_key_set();
        bundles.put_bundle(self.issuer(), &keys).await?;
        info!(issuer = %self.issuer(), keys = keys.len(), "Published key bundle");
        Ok(())
    }

    /// Rotate keys and publish the resulting key set
    pub async fn rotate_and_publish(&self, bundles: &dyn KeyBundleStore) -> Result<()> {
        self.rotate_keys()?;
        self.publish_keys(bundles).await
    }
}
