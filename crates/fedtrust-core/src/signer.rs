//! Creating countersigned metadata statements
//!
//! A [`SigningPolicy`] records, per requesting entity and protocol usage,
//! which federation operators vouch for the entity and through which
//! intermediate signers. Each [`SigningChain`] lists its steps anchor
//! first:
//!
//! ```text
//! step 1: edugain signs {signing_keys: swamid}                     -> t1
//! step 2: swamid  signs {signing_keys: sunet, metadata_statements: {edugain: t1}} -> t2
//! root:   sunet   signs {<statement>, metadata_statements: {edugain: t2}}
//! ```
//!
//! Chains marked `by_reference` are not embedded. The finished chain token
//! is written to a [`StatementStore`] and the root links to it from
//! `metadata_statement_uris`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

use crate::codec::{NameCodec, PercentCodec};
use crate::error::{FederationError, Result};
use crate::keystore::KeyStore;
use crate::statement::{MetadataStatement, ISS, METADATA_STATEMENTS, METADATA_STATEMENT_URIS, SIGNING_KEYS};
use crate::storage::StatementStore;

/// One signature in a signing chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SigningStep {
    /// Identity whose key signs this layer
    pub signer: String,
    /// Identity the layer vouches for; its public keys become `signing_keys`
    pub requester: String,
    /// Base claims of the layer
    #[serde(default)]
    pub request: Map<String, Value>,
    /// Claims the signer adds on top of the request
    #[serde(default)]
    pub signer_add: Map<String, Value>,
}

impl SigningStep {
    /// A step with empty request and no added claims
    pub fn new(signer: impl Into<String>, requester: impl Into<String>) -> Self {
        Self {
            signer: signer.into(),
            requester: requester.into(),
            request: Map::new(),
            signer_add: Map::new(),
        }
    }

    /// Add a claim the signer merges into the layer
    pub fn add(mut self, name: impl Into<String>, value: Value) -> Self {
        self.signer_add.insert(name.into(), value);
        self
    }

    /// Set a base request claim
    pub fn request(mut self, name: impl Into<String>, value: Value) -> Self {
        self.request.insert(name.into(), value);
        self
    }
}

/// Ordered signing steps leading from a trust anchor to the requester
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SigningChain {
    pub steps: Vec<SigningStep>,
    /// Publish the chain token in a statement store instead of embedding it
    #[serde(default)]
    pub by_reference: bool,
}

impl SigningChain {
    /// A chain embedded inline under `metadata_statements`
    pub fn inline(steps: Vec<SigningStep>) -> Self {
        Self {
            steps,
            by_reference: false,
        }
    }

    /// A chain published by reference under `metadata_statement_uris`
    pub fn by_reference(steps: Vec<SigningStep>) -> Self {
        Self {
            steps,
            by_reference: true,
        }
    }
}

/// Signing relationships: requester -> usage -> anchor FO -> chain
///
/// Serialized as nested JSON objects, for example:
///
/// ```json
/// {"https://sunet.se": {"discovery": {"https://swamid.sunet.se": {
///     "steps": [{"signer": "https://swamid.sunet.se", "requester": "https://sunet.se",
///                "signer_add": {"federation_usage": "discovery"}}]}}}}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SigningPolicy(BTreeMap<String, BTreeMap<String, BTreeMap<String, SigningChain>>>);

impl SigningPolicy {
    /// Create an empty policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a policy from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(FederationError::from)
    }

    /// Register a chain (builder pattern)
    pub fn with_chain(
        mut self,
        requester: impl Into<String>,
        usage: impl Into<String>,
        fo: impl Into<String>,
        chain: SigningChain,
    ) -> Self {
        self.0
            .entry(requester.into())
            .or_default()
            .entry(usage.into())
            .or_default()
            .insert(fo.into(), chain);
        self
    }

    /// Chains registered for a requester and usage, ordered by anchor FO
    pub fn chains(&self, requester: &str, usage: &str) -> Vec<(&str, &SigningChain)> {
        self.0
            .get(requester)
            .and_then(|usages| usages.get(usage))
            .map(|chains| chains.iter().map(|(fo, chain)| (fo.as_str(), chain)).collect())
            .unwrap_or_default()
    }

    /// Usages configured for a requester
    pub fn usages(&self, requester: &str) -> Vec<&str> {
        self.0
            .get(requester)
            .map(|usages| usages.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

/// Sign a statement with an issuer's current signing key.
///
/// Sets `iss` to the key store's issuer and `iat` to the current time.
pub fn sign_as(keys: &KeyStore, statement: MetadataStatement) -> Result<String> {
    let claims = statement
        .with(ISS, Value::String(keys.issuer().to_string()))
        .with("iat", Value::from(Utc::now().timestamp()))
        .into_claims();
    keys.signing_key()?.sign_claims(&claims)
}

#[derive(Debug, Clone)]
struct ReferenceTarget {
    store: Arc<dyn StatementStore>,
    base_url: String,
    codec: Arc<dyn NameCodec>,
}

/// Produces statements signed by an entity and countersigned by the
/// federation operators configured in its signing policy
#[derive(Debug, Clone)]
pub struct StatementSigner {
    keys: Arc<KeyStore>,
    policy: SigningPolicy,
    signers: HashMap<String, Arc<KeyStore>>,
    references: Option<ReferenceTarget>,
}

impl StatementSigner {
    /// Create a signer for the entity owning `keys`
    pub fn new(keys: Arc<KeyStore>, policy: SigningPolicy) -> Self {
        Self {
            keys,
            policy,
            signers: HashMap::new(),
            references: None,
        }
    }

    /// Make another identity's keys available to signing steps
    pub fn with_signer(mut self, keys: Arc<KeyStore>) -> Self {
        self.signers.insert(keys.issuer().to_string(), keys);
        self
    }

    /// Publish by-reference chains in `store`, linked as `{base_url}/{encoded name}`
    pub fn with_statement_store(mut self, store: Arc<dyn StatementStore>, base_url: impl Into<String>) -> Self {
        self.references = Some(ReferenceTarget {
            store,
            base_url: base_url.into(),
            codec: Arc::new(PercentCodec),
        });
        self
    }

    /// The entity this signer acts for
    pub fn issuer(&self) -> &str {
        self.keys.issuer()
    }

    /// The configured signing policy
    pub fn policy(&self) -> &SigningPolicy {
        &self.policy
    }

    /// Sign `statement` for `usage`, countersigned along every configured chain.
    ///
    /// Returns the outermost (self-signed) token.
    pub async fn create_signed_metadata_statement(
        &self,
        statement: &MetadataStatement,
        usage: &str,
    ) -> Result<String> {
        let chains = self.policy.chains(self.issuer(), usage);
        if chains.is_empty() {
            return Err(FederationError::NoSigningPath {
                requester: self.issuer().to_string(),
                usage: usage.to_string(),
            });
        }

        let mut inline = Map::new();
        let mut uris = Map::new();
        for (fo, chain) in &chains {
            let token = self.sign_chain(fo, chain)?;
            if chain.by_reference {
                let uri = self.publish(fo, usage, &token).await?;
                uris.insert(fo.to_string(), Value::String(uri));
            } else {
                inline.insert(fo.to_string(), Value::String(token));
            }
        }

        let mut root = statement.clone();
        if !inline.is_empty() {
            root = root.with(METADATA_STATEMENTS, Value::Object(inline));
        }
        if !uris.is_empty() {
            root = root.with(METADATA_STATEMENT_URIS, Value::Object(uris));
        }

        info!(
            issuer = %self.issuer(),
            usage = %usage,
            chains = chains.len(),
            "Created signed metadata statement"
        );
        sign_as(&self.keys, root)
    }

    fn sign_chain(&self, fo: &str, chain: &SigningChain) -> Result<String> {
        let mut nested: Option<(&str, String)> = None;

        for step in &chain.steps {
            let signer = self.key_store(&step.signer)?;
            let requester = self.key_store(&step.requester)?;

            let mut layer = MetadataStatement::from(step.request.clone())
                .with(SIGNING_KEYS, requester.public_key_set().to_value()?);
            if let Some((previous, token)) = nested.take() {
                let mut statements = Map::new();
                statements.insert(previous.to_string(), Value::String(token));
                layer = layer.with(METADATA_STATEMENTS, Value::Object(statements));
            }
            let layer = layer.merged_with(&step.signer_add);

            debug!(fo = %fo, signer = %step.signer, requester = %step.requester, "Signing chain step");
            nested = Some((step.signer.as_str(), sign_as(signer, layer)?));
        }

        nested
            .map(|(_, token)| token)
            .ok_or_else(|| FederationError::Configuration(format!("signing chain for '{}' has no steps", fo)))
    }

    async fn publish(&self, fo: &str, usage: &str, token: &str) -> Result<String> {
        let target = self.references.as_ref().ok_or_else(|| {
            FederationError::Configuration(format!(
                "chain for '{}' is by reference but no statement store is configured",
                fo
            ))
        })?;

        let name = format!("{}/{}/{}", self.issuer(), usage, fo);
        target.store.put_statement(&name, token).await?;
        Ok(format!(
            "{}/{}",
            target.base_url.trim_end_matches('/'),
            target.codec.encode(&name)
        ))
    }

    fn key_store(&self, issuer: &str) -> Result<&KeyStore> {
        if issuer == self.keys.issuer() {
            return Ok(self.keys.as_ref());
        }
        self.signers
            .get(issuer)
            .map(Arc::as_ref)
            .ok_or_else(|| FederationError::UnknownSigner(issuer.to_string()))
    }
}
