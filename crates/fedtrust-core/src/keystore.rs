//! Per-issuer key store with rotation
//!
//! A key store holds the active key set of one issuer plus the keys retired
//! by earlier rotations. Retired keys stay valid for verification until
//! `remove_after` has elapsed since the rotation that retired them:
//!
//! ```text
//! active ──rotate──▶ retired(expires_at) ──now >= expires_at──▶ purged
//! ```
//!
//! Purging is lazy: expiry is evaluated at query time by comparing
//! timestamps, so no background sweep is needed. Each rotation swaps in a
//! complete new snapshot, so readers never see an empty or half-rotated
//! store.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::crypto::{KeyPair, KeySet};
use crate::error::{FederationError, Result};

/// Key type named by a key definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    #[serde(rename = "OKP")]
    Okp,
    #[serde(rename = "EC")]
    Ec,
    #[serde(rename = "RSA")]
    Rsa,
}

/// Configuration for one key the store keeps active
///
/// Serialized as `{"type": "OKP", "crv": "Ed25519", "use": ["sig"]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDefinition {
    #[serde(rename = "type")]
    pub key_type: KeyType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(rename = "use", default)]
    pub key_use: Vec<String>,
}

impl KeyDefinition {
    /// An Ed25519 signing key definition
    pub fn ed25519() -> Self {
        Self {
            key_type: KeyType::Okp,
            crv: Some("Ed25519".into()),
            key_use: vec!["sig".into()],
        }
    }

    /// Generate a fresh key pair for this definition
    pub fn materialize(&self) -> Result<KeyPair> {
        match (self.key_type, self.crv.as_deref()) {
            (KeyType::Okp, None | Some("Ed25519")) => Ok(KeyPair::generate_random_kid()),
            (key_type, crv) => Err(FederationError::KeyGeneration(format!(
                "unsupported key definition: type={:?} crv={:?}",
                key_type, crv
            ))),
        }
    }
}

/// A key retired by a rotation
#[derive(Debug, Clone)]
pub struct RetiredKey {
    pub key: KeyPair,
    pub expires_at: DateTime<Utc>,
}

impl RetiredKey {
    /// Expiry is exclusive: a key expiring exactly at `now` is already gone
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug)]
struct KeySnapshot {
    active: Vec<KeyPair>,
    retired: Vec<RetiredKey>,
}

/// Key material owned by exactly one issuer
#[derive(Debug)]
pub struct KeyStore {
    issuer: String,
    key_defs: Vec<KeyDefinition>,
    remove_after: Duration,
    snapshot: RwLock<Arc<KeySnapshot>>,
}

impl KeyStore {
    /// Create a key store and materialise one key per definition
    pub fn new(
        issuer: impl Into<String>,
        key_defs: Vec<KeyDefinition>,
        remove_after: Duration,
    ) -> Result<Self> {
        let issuer = issuer.into();
        let active = materialize_all(&key_defs)?;

        info!(issuer = %issuer, keys = active.len(), "Key store initialized");

        Ok(Self {
            issuer,
            key_defs,
            remove_after,
            snapshot: RwLock::new(Arc::new(KeySnapshot {
                active,
                retired: Vec::new(),
            })),
        })
    }

    /// Create a key store from existing key pairs
    pub fn from_keys(
        issuer: impl Into<String>,
        key_defs: Vec<KeyDefinition>,
        keys: Vec<KeyPair>,
        remove_after: Duration,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            key_defs,
            remove_after,
            snapshot: RwLock::new(Arc::new(KeySnapshot {
                active: keys,
                retired: Vec::new(),
            })),
        }
    }

    /// The issuer owning these keys
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Configured key definitions
    pub fn key_definitions(&self) -> &[KeyDefinition] {
        &self.key_defs
    }

    /// Grace period during which retired keys still verify
    pub fn remove_after(&self) -> Duration {
        self.remove_after
    }

    /// Replace the active key set with freshly generated keys.
    ///
    /// The previous active keys are retired with `expires_at = now +
    /// remove_after`. Retired keys already expired at `now` are dropped.
    /// Nothing changes if any definition fails to materialise.
    ///
    /// The visible count is only steady when rotations are at least
    /// `remove_after` apart: `n` rotations inside one grace period leave
    /// `k * (n + 1)` keys visible for `k` definitions.
    pub fn rotate(&self, now: DateTime<Utc>) -> Result<()> {
        let fresh = materialize_all(&self.key_defs)?;
        let expires_at = now + self.remove_after;

        let mut guard = self.snapshot.write();
        let mut retired: Vec<RetiredKey> = guard
            .retired
            .iter()
            .filter(|r| !r.is_expired(now))
            .cloned()
            .collect();
        let purged = guard.retired.len() - retired.len();
        retired.extend(guard.active.iter().cloned().map(|key| RetiredKey { key, expires_at }));

        *guard = Arc::new(KeySnapshot {
            active: fresh,
            retired,
        });

        info!(
            issuer = %self.issuer,
            active = guard.active.len(),
            retired = guard.retired.len(),
            purged = purged,
            expires_at = %expires_at,
            "Rotated keys"
        );
        Ok(())
    }

    /// Currently active keys
    pub fn active_keys(&self) -> Vec<KeyPair> {
        self.snapshot.read().active.clone()
    }

    /// Retired keys that have not expired at `now`
    pub fn retired_keys(&self, now: DateTime<Utc>) -> Vec<RetiredKey> {
        self.snapshot
            .read()
            .retired
            .iter()
            .filter(|r| !r.is_expired(now))
            .cloned()
            .collect()
    }

    /// Active keys plus retired keys that have not expired at `now`
    pub fn active_and_unexpired_keys(&self, now: DateTime<Utc>) -> Vec<KeyPair> {
        let snapshot = self.snapshot.read().clone();
        snapshot
            .active
            .iter()
            .cloned()
            .chain(
                snapshot
                    .retired
                    .iter()
                    .filter(|r| !r.is_expired(now))
                    .map(|r| r.key.clone()),
            )
            .collect()
    }

    /// The key used for new signatures
    pub fn signing_key(&self) -> Result<KeyPair> {
        self.snapshot
            .read()
            .active
            .first()
            .cloned()
            .ok_or_else(|| FederationError::UnknownSigner(self.issuer.clone()))
    }

    /// Find a key by key ID among the keys valid at `now`
    pub fn lookup_at(&self, kid: &str, now: DateTime<Utc>) -> Result<KeyPair> {
        self.active_and_unexpired_keys(now)
            .into_iter()
            .find(|k| k.kid() == kid)
            .ok_or_else(|| FederationError::UnknownKey(kid.to_string()))
    }

    /// Find a key by key ID among the keys valid now
    pub fn lookup(&self, kid: &str) -> Result<KeyPair> {
        self.lookup_at(kid, Utc::now())
    }

    /// Public key set of every key valid at `now`
    pub fn public_key_set_at(&self, now: DateTime<Utc>) -> KeySet {
        KeySet::from_key_pairs(&self.active_and_unexpired_keys(now))
    }

    /// Public key set of every key valid now
    pub fn public_key_set(&self) -> KeySet {
        self.public_key_set_at(Utc::now())
    }
}

fn materialize_all(key_defs: &[KeyDefinition]) -> Result<Vec<KeyPair>> {
    key_defs.iter().map(KeyDefinition::materialize).collect()
}
