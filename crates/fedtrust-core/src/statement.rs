//! Metadata statements
//!
//! A metadata statement is an ordered mapping of claim names to JSON values
//! describing an entity's configuration. A few claim names are reserved by
//! the federation protocol itself:
//!
//! - `iss`: the identity that signed the statement
//! - `metadata_statements`: FO identifier -> nested signed statement
//! - `metadata_statement_uris`: FO identifier -> URI of a nested signed statement
//! - `signing_keys`: the key set of the entity the statement vouches for
//! - `federation_usage`: the protocol context the statement is valid for
//!
//! Statements are immutable: every operation that changes claims returns a
//! new statement.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::crypto::KeySet;
use crate::error::{FederationError, Result};

/// Signer identity claim
pub const ISS: &str = "iss";
/// Entity identifier claim
pub const ISSUER: &str = "issuer";
/// Nested statements keyed by federation operator
pub const METADATA_STATEMENTS: &str = "metadata_statements";
/// Nested statement URIs keyed by federation operator
pub const METADATA_STATEMENT_URIS: &str = "metadata_statement_uris";
/// Key set of the entity being vouched for
pub const SIGNING_KEYS: &str = "signing_keys";
/// Protocol context marker
pub const FEDERATION_USAGE: &str = "federation_usage";

/// Claims that describe the signature envelope rather than the entity.
/// They never take part in merging along a trust path.
pub const PROTOCOL_CLAIMS: &[&str] = &[
    ISS,
    "iat",
    "exp",
    "jti",
    "kid",
    SIGNING_KEYS,
    METADATA_STATEMENTS,
    METADATA_STATEMENT_URIS,
];

/// An ordered claims mapping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataStatement(Map<String, Value>);

impl MetadataStatement {
    /// Create an empty statement
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Create a statement for an entity identifier
    pub fn for_issuer(issuer: impl Into<String>) -> Self {
        Self::new().with(ISSUER, Value::String(issuer.into()))
    }

    /// Return a copy with one claim set (builder pattern)
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    /// Return a copy without the named claim
    pub fn without(mut self, name: &str) -> Self {
        self.0.remove(name);
        self
    }

    /// Get a claim by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Check if a claim exists
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Number of claims
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over claims
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Borrow the raw claims map
    pub fn claims(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume into the raw claims map
    pub fn into_claims(self) -> Map<String, Value> {
        self.0
    }

    /// The `iss` claim (signer identity)
    pub fn iss(&self) -> Option<&str> {
        self.0.get(ISS).and_then(Value::as_str)
    }

    /// The `issuer` claim (entity identifier)
    pub fn issuer(&self) -> Option<&str> {
        self.0.get(ISSUER).and_then(Value::as_str)
    }

    /// The `federation_usage` claim
    pub fn federation_usage(&self) -> Option<&str> {
        self.0.get(FEDERATION_USAGE).and_then(Value::as_str)
    }

    /// Inline nested statements, keyed by federation operator
    pub fn metadata_statements(&self) -> Result<BTreeMap<String, String>> {
        self.string_map(METADATA_STATEMENTS)
    }

    /// Nested statement URIs, keyed by federation operator
    pub fn metadata_statement_uris(&self) -> Result<BTreeMap<String, String>> {
        self.string_map(METADATA_STATEMENT_URIS)
    }

    /// The key set this statement vouches for, if any
    pub fn signing_keys(&self) -> Result<Option<KeySet>> {
        match self.0.get(SIGNING_KEYS) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| FederationError::Malformed(format!("signing_keys: {}", e))),
        }
    }

    /// Merge claims into a copy of this statement, last writer wins
    pub fn merged_with(mut self, claims: &Map<String, Value>) -> Self {
        for (name, value) in claims {
            self.0.insert(name.clone(), value.clone());
        }
        self
    }

    /// Merge a descendant statement along a trust path.
    ///
    /// The descendant's value wins for every claim both define. Protocol
    /// claims (see [`PROTOCOL_CLAIMS`]) are skipped.
    pub fn overridden_by(mut self, descendant: &MetadataStatement) -> Self {
        for (name, value) in descendant.iter() {
            if PROTOCOL_CLAIMS.contains(&name.as_str()) {
                continue;
            }
            self.0.insert(name.clone(), value.clone());
        }
        self
    }

    /// Return a copy with only the profile claims (protocol claims removed)
    pub fn profile_claims(&self) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(name, _)| !PROTOCOL_CLAIMS.contains(&name.as_str()))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        )
    }

    fn string_map(&self, name: &str) -> Result<BTreeMap<String, String>> {
        let Some(value) = self.0.get(name) else {
            return Ok(BTreeMap::new());
        };
        let object = value
            .as_object()
            .ok_or_else(|| FederationError::Malformed(format!("{} is not an object", name)))?;

        object
            .iter()
            .map(|(fo, entry)| {
                entry
                    .as_str()
                    .map(|s| (fo.clone(), s.to_string()))
                    .ok_or_else(|| {
                        FederationError::Malformed(format!("{}[{}] is not a string", name, fo))
                    })
            })
            .collect()
    }
}

impl From<Map<String, Value>> for MetadataStatement {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for MetadataStatement {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
