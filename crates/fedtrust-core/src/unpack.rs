//! Verifying and decoding nested signed statements
//!
//! Unpacking walks a token layer by layer. A layer without nested
//! statements is signed by a federation operator and verified against that
//! operator's key set from the bundle store. A layer with nested statements
//! is verified once per branch, against the `signing_keys` the verified
//! branch vouches for:
//!
//! ```text
//! root (sunet)  ── verified with signing_keys from ──▶ swamid layer
//!                                                      (verified with swamid bundle)
//! ```
//!
//! Key resolution and signature failures are contained in the branch where
//! they occur and reported in [`UnpackResult::failures`]. A layer whose
//! branches all fail is itself a failure.

use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::crypto::{KeySet, UnverifiedStatement};
use crate::error::{FederationError, Result};
use crate::fetch::RemoteFetcher;
use crate::statement::MetadataStatement;
use crate::storage::KeyBundleStore;

/// Maximum number of nested layers below the root
pub const DEFAULT_MAX_DEPTH: usize = 16;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One verified signature layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifiedStatementNode {
    /// Verified signer identity (`iss`)
    pub signer: String,
    /// Decoded claims of this layer
    pub statement: MetadataStatement,
    /// Verified nested layers, keyed by federation operator
    pub children: BTreeMap<String, VerifiedStatementNode>,
}

impl VerifiedStatementNode {
    /// Whether this layer has no nested statements
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// A branch that could not be verified
#[derive(Debug)]
pub struct BranchFailure {
    /// Federation operator key of the failed branch
    pub fo: String,
    pub error: FederationError,
}

/// Outcome of unpacking a signed statement
#[derive(Debug)]
pub struct UnpackResult {
    /// The verified tree, rooted at the self-signed statement
    pub result: VerifiedStatementNode,
    /// Number of root branches that verified (1 for a root without branches)
    pub parsed_statement: usize,
    /// Branches that failed, in traversal order
    pub failures: Vec<BranchFailure>,
}

enum BranchSource<'a> {
    Inline(&'a str),
    Uri(&'a str),
}

struct Layer {
    node: VerifiedStatementNode,
    failures: Vec<BranchFailure>,
}

/// Verifies nested signed statements
#[derive(Debug, Clone)]
pub struct StatementUnpacker {
    bundles: Arc<dyn KeyBundleStore>,
    fetcher: Arc<dyn RemoteFetcher>,
    max_depth: usize,
}

impl StatementUnpacker {
    /// Create an unpacker resolving keys from `bundles`, then `fetcher`
    pub fn new(bundles: Arc<dyn KeyBundleStore>, fetcher: Arc<dyn RemoteFetcher>) -> Self {
        Self {
            bundles,
            fetcher,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Limit the nesting depth
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// The bundle store keys are resolved from
    pub fn bundles(&self) -> &Arc<dyn KeyBundleStore> {
        &self.bundles
    }

    /// Verify and decode a signed statement and every statement nested in it
    pub async fn unpack_metadata_statement(&self, token: &str) -> Result<UnpackResult> {
        let layer = self.unpack_layer(token.to_string(), 0).await?;
        let parsed_statement = if layer.node.is_leaf() {
            1
        } else {
            layer.node.children.len()
        };

        debug!(
            signer = %layer.node.signer,
            parsed = parsed_statement,
            failed = layer.failures.len(),
            "Unpacked metadata statement"
        );

        Ok(UnpackResult {
            result: layer.node,
            parsed_statement,
            failures: layer.failures,
        })
    }

    fn unpack_layer(&self, token: String, depth: usize) -> BoxFuture<'_, Result<Layer>> {
        Box::pin(async move {
            if depth > self.max_depth {
                return Err(FederationError::Malformed(format!(
                    "statements nested deeper than {} layers",
                    self.max_depth
                )));
            }

            let unverified = UnverifiedStatement::parse(&token)?;
            let signer = unverified.signer()?.to_string();
            let inline = unverified.claims().metadata_statements()?;
            let uris = unverified.claims().metadata_statement_uris()?;

            if inline.is_empty() && uris.is_empty() {
                let statement = self.verify_leaf(&unverified, &signer).await?;
                debug!(signer = %signer, depth = depth, "Verified leaf statement");
                return Ok(Layer {
                    node: VerifiedStatementNode {
                        signer,
                        statement,
                        children: BTreeMap::new(),
                    },
                    failures: Vec::new(),
                });
            }

            let branches = inline
                .iter()
                .map(|(fo, token)| (fo, BranchSource::Inline(token.as_str())))
                .chain(
                    uris.iter()
                        .filter(|(fo, _)| !inline.contains_key(*fo))
                        .map(|(fo, uri)| (fo, BranchSource::Uri(uri.as_str()))),
                );

            let mut verified = None;
            let mut children = BTreeMap::new();
            let mut failures = Vec::new();
            for (fo, source) in branches {
                match self.unpack_branch(&unverified, fo, source, depth).await {
                    Ok((statement, child)) => {
                        verified.get_or_insert(statement);
                        failures.extend(child.failures);
                        children.insert(fo.clone(), child.node);
                    }
                    Err(error) if error.is_branch_local() => {
                        warn!(signer = %signer, fo = %fo, error = %error, "Branch failed verification");
                        failures.push(BranchFailure {
                            fo: fo.clone(),
                            error,
                        });
                    }
                    Err(error) => return Err(error),
                }
            }

            let Some(statement) = verified else {
                return Err(failures
                    .into_iter()
                    .next()
                    .map(|f| f.error)
                    .unwrap_or(FederationError::UnknownSigner(signer)));
            };

            debug!(signer = %signer, depth = depth, branches = children.len(), "Verified statement layer");
            Ok(Layer {
                node: VerifiedStatementNode {
                    signer,
                    statement,
                    children,
                },
                failures,
            })
        })
    }

    /// Unpack one nested branch, then verify the enclosing layer with the
    /// keys that branch vouches for
    async fn unpack_branch(
        &self,
        enclosing: &UnverifiedStatement,
        fo: &str,
        source: BranchSource<'_>,
        depth: usize,
    ) -> Result<(MetadataStatement, Layer)> {
        let token = match source {
            BranchSource::Inline(token) => token.to_string(),
            BranchSource::Uri(uri) => self.fetcher.fetch_statement(uri).await.map_err(|e| {
                warn!(fo = %fo, uri = %uri, error = %e, "Failed to fetch nested statement");
                FederationError::UnknownSigner(fo.to_string())
            })?,
        };

        let child = self.unpack_layer(token, depth + 1).await?;
        let signer = enclosing.signer()?;
        let keys = child
            .node
            .statement
            .signing_keys()?
            .ok_or_else(|| FederationError::UnknownSigner(signer.to_string()))?;

        let statement = enclosing.verify(&keys)?;
        Ok((statement, child))
    }

    /// Verify a leaf against its operator's key set.
    ///
    /// A stored key set that lacks the token's key ID is refetched once, so
    /// keys published by a rotation after the set was cached are picked up.
    async fn verify_leaf(&self, unverified: &UnverifiedStatement, signer: &str) -> Result<MetadataStatement> {
        let (keys, fetched) = self.resolve_key_set(signer).await?;
        match unverified.verify(&keys) {
            Err(FederationError::UnknownKey(kid)) if !fetched => {
                let keys = self.refresh_key_set(signer, &kid).await?;
                unverified.verify(&keys)
            }
            result => result,
        }
    }

    /// Key set of an operator from the bundle store, fetched and cached on a
    /// miss. The flag tells whether the set was just fetched.
    async fn resolve_key_set(&self, issuer: &str) -> Result<(KeySet, bool)> {
        if let Some(keys) = self.bundles.get_bundle(issuer).await? {
            return Ok((keys, false));
        }

        match self.fetcher.fetch_key_set(issuer).await {
            Ok(keys) => {
                debug!(issuer = %issuer, keys = keys.len(), "Fetched remote key set");
                self.bundles.put_bundle(issuer, &keys).await?;
                Ok((keys, true))
            }
            Err(e) => {
                warn!(issuer = %issuer, error = %e, "Could not resolve signer keys");
                Err(FederationError::UnknownSigner(issuer.to_string()))
            }
        }
    }

    /// Refetch a stored key set that does not know `kid`
    async fn refresh_key_set(&self, issuer: &str, kid: &str) -> Result<KeySet> {
        match self.fetcher.fetch_key_set(issuer).await {
            Ok(keys) if keys.find(kid).is_some() => {
                debug!(issuer = %issuer, kid = %kid, keys = keys.len(), "Refreshed stale key set");
                self.bundles.put_bundle(issuer, &keys).await?;
                Ok(keys)
            }
            Ok(_) => Err(FederationError::UnknownKey(kid.to_string())),
            Err(e) => {
                debug!(issuer = %issuer, kid = %kid, error = %e, "Key set refresh failed");
                Err(FederationError::UnknownKey(kid.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::fetch::{FetchError, NoFetcher};
    use crate::statement::{ISS, METADATA_STATEMENTS, METADATA_STATEMENT_URIS, SIGNING_KEYS};
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{json, Map, Value};
    use std::collections::HashMap;

    const SUNET: &str = "https://sunet.se";
    const SWAMID: &str = "https://swamid.sunet.se";
    const FEIDE: &str = "https://www.feide.no";

    #[derive(Debug, Default)]
    struct MapFetcher {
        key_sets: HashMap<String, KeySet>,
        statements: HashMap<String, String>,
        key_set_calls: Mutex<usize>,
    }

    #[async_trait]
    impl RemoteFetcher for MapFetcher {
        async fn fetch_key_set(&self, issuer: &str) -> std::result::Result<KeySet, FetchError> {
            *self.key_set_calls.lock() += 1;
            self.key_sets
                .get(issuer)
                .cloned()
                .ok_or_else(|| FetchError::NotFound(issuer.to_string()))
        }

        async fn fetch_statement(&self, uri: &str) -> std::result::Result<String, FetchError> {
            self.statements
                .get(uri)
                .cloned()
                .ok_or_else(|| FetchError::NotFound(uri.to_string()))
        }
    }

    fn sign(kp: &KeyPair, iss: &str, claims: Value) -> String {
        let mut map: Map<String, Value> = serde_json::from_value(claims).unwrap();
        map.insert(ISS.into(), json!(iss));
        kp.sign_claims(&map).unwrap()
    }

    fn keys_json(kp: &KeyPair) -> Value {
        KeySet::from_key_pairs([kp]).to_value().unwrap()
    }

    struct Fixture {
        sunet: KeyPair,
        swamid: KeyPair,
        feide: KeyPair,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                sunet: KeyPair::generate("sunet-1"),
                swamid: KeyPair::generate("swamid-1"),
                feide: KeyPair::generate("feide-1"),
            }
        }

        fn fo_layer(&self, fo: &KeyPair, iss: &str) -> String {
            sign(fo, iss, json!({SIGNING_KEYS: keys_json(&self.sunet), "federation_usage": "discovery"}))
        }

        fn store(&self) -> Arc<MemoryStore> {
            Arc::new(MemoryStore::with_bundles([
                (SWAMID.to_string(), KeySet::from_key_pairs([&self.swamid])),
                (FEIDE.to_string(), KeySet::from_key_pairs([&self.feide])),
            ]))
        }
    }

    fn unpacker(store: Arc<MemoryStore>) -> StatementUnpacker {
        StatementUnpacker::new(store, Arc::new(NoFetcher))
    }

    #[tokio::test]
    async fn test_unpack_two_inline_branches() {
        let f = Fixture::new();
        let root = sign(
            &f.sunet,
            SUNET,
            json!({
                "issuer": "https://example.org/op",
                METADATA_STATEMENTS: {SWAMID: f.fo_layer(&f.swamid, SWAMID), FEIDE: f.fo_layer(&f.feide, FEIDE)}
            }),
        );

        let res = unpacker(f.store()).unpack_metadata_statement(&root).await.unwrap();
        assert_eq!(res.parsed_statement, 2);
        assert!(res.failures.is_empty());
        assert_eq!(res.result.signer, SUNET);
        assert_eq!(res.result.statement.issuer(), Some("https://example.org/op"));
        assert_eq!(res.result.children[SWAMID].signer, SWAMID);
        assert!(res.result.children[FEIDE].is_leaf());
    }

    #[tokio::test]
    async fn test_bad_branch_does_not_abort_siblings() {
        let f = Fixture::new();
        let imposter = KeyPair::generate("swamid-1");
        let root = sign(
            &f.sunet,
            SUNET,
            json!({METADATA_STATEMENTS: {SWAMID: f.fo_layer(&imposter, SWAMID), FEIDE: f.fo_layer(&f.feide, FEIDE)}}),
        );

        let res = unpacker(f.store()).unpack_metadata_statement(&root).await.unwrap();
        assert_eq!(res.parsed_statement, 1);
        assert!(res.result.children.contains_key(FEIDE));
        assert_eq!(res.failures.len(), 1);
        assert_eq!(res.failures[0].fo, SWAMID);
        assert!(matches!(
            res.failures[0].error,
            FederationError::SignatureVerification { .. }
        ));
    }

    #[tokio::test]
    async fn test_all_branches_failing_raises_first_error() {
        let f = Fixture::new();
        let root = sign(
            &f.sunet,
            SUNET,
            json!({METADATA_STATEMENTS: {"https://unknown.example": f.fo_layer(&f.feide, "https://unknown.example")}}),
        );

        match unpacker(f.store()).unpack_metadata_statement(&root).await {
            Err(FederationError::UnknownSigner(who)) => assert_eq!(who, "https://unknown.example"),
            other => panic!("expected UnknownSigner, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_root_signed_with_unvouched_key() {
        let f = Fixture::new();
        let other = KeyPair::generate("sunet-1");
        let root = sign(&other, SUNET, json!({METADATA_STATEMENTS: {SWAMID: f.fo_layer(&f.swamid, SWAMID)}}));

        assert!(matches!(
            unpacker(f.store()).unpack_metadata_statement(&root).await,
            Err(FederationError::SignatureVerification { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_kid_in_leaf() {
        let f = Fixture::new();
        let rotated = KeyPair::generate("swamid-2");
        let root = sign(&f.sunet, SUNET, json!({METADATA_STATEMENTS: {SWAMID: f.fo_layer(&rotated, SWAMID)}}));

        assert!(matches!(
            unpacker(f.store()).unpack_metadata_statement(&root).await,
            Err(FederationError::UnknownKey(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_keys_fetched_and_cached() {
        let f = Fixture::new();
        let store = Arc::new(MemoryStore::new());
        let fetcher = Arc::new(MapFetcher {
            key_sets: HashMap::from([(SWAMID.to_string(), KeySet::from_key_pairs([&f.swamid]))]),
            ..Default::default()
        });
        let unpacker = StatementUnpacker::new(store.clone(), fetcher.clone());
        let root = sign(&f.sunet, SUNET, json!({METADATA_STATEMENTS: {SWAMID: f.fo_layer(&f.swamid, SWAMID)}}));

        unpacker.unpack_metadata_statement(&root).await.unwrap();
        unpacker.unpack_metadata_statement(&root).await.unwrap();

        assert_eq!(*fetcher.key_set_calls.lock(), 1);
        assert!(store.get_bundle(SWAMID).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_stale_key_set_refreshed_after_rotation() {
        let f = Fixture::new();
        let rotated = KeyPair::generate("swamid-2");
        let store = f.store();
        let fetcher = Arc::new(MapFetcher {
            key_sets: HashMap::from([(SWAMID.to_string(), KeySet::from_key_pairs([&f.swamid, &rotated]))]),
            ..Default::default()
        });
        let unpacker = StatementUnpacker::new(store.clone(), fetcher.clone());

        let before = sign(&f.sunet, SUNET, json!({METADATA_STATEMENTS: {SWAMID: f.fo_layer(&f.swamid, SWAMID)}}));
        unpacker.unpack_metadata_statement(&before).await.unwrap();
        assert_eq!(*fetcher.key_set_calls.lock(), 0);

        let after = sign(&f.sunet, SUNET, json!({METADATA_STATEMENTS: {SWAMID: f.fo_layer(&rotated, SWAMID)}}));
        let res = unpacker.unpack_metadata_statement(&after).await.unwrap();
        assert_eq!(res.parsed_statement, 1);
        assert_eq!(*fetcher.key_set_calls.lock(), 1);

        let cached = store.get_bundle(SWAMID).await.unwrap().unwrap();
        assert!(cached.find("swamid-2").is_some());

        // The refreshed set is reused
        unpacker.unpack_metadata_statement(&after).await.unwrap();
        assert_eq!(*fetcher.key_set_calls.lock(), 1);
    }

    #[tokio::test]
    async fn test_refresh_without_the_key_stays_unknown() {
        let f = Fixture::new();
        let fetcher = Arc::new(MapFetcher {
            key_sets: HashMap::from([(SWAMID.to_string(), KeySet::from_key_pairs([&f.swamid]))]),
            ..Default::default()
        });
        let store = f.store();
        let rotated = KeyPair::generate("swamid-2");
        let root = sign(&f.sunet, SUNET, json!({METADATA_STATEMENTS: {SWAMID: f.fo_layer(&rotated, SWAMID)}}));

        let result = StatementUnpacker::new(store.clone(), fetcher.clone())
            .unpack_metadata_statement(&root)
            .await;
        assert!(matches!(result, Err(FederationError::UnknownKey(kid)) if kid == "swamid-2"));
        assert_eq!(*fetcher.key_set_calls.lock(), 1);
        assert!(store.get_bundle(SWAMID).await.unwrap().unwrap().find("swamid-2").is_none());
    }

    #[tokio::test]
    async fn test_by_reference_branch() {
        let f = Fixture::new();
        let uri = "https://localhost/v1/statements/feide";
        let fetcher = Arc::new(MapFetcher {
            statements: HashMap::from([(uri.to_string(), f.fo_layer(&f.feide, FEIDE))]),
            ..Default::default()
        });
        let root = sign(
            &f.sunet,
            SUNET,
            json!({
                METADATA_STATEMENTS: {SWAMID: f.fo_layer(&f.swamid, SWAMID)},
                METADATA_STATEMENT_URIS: {FEIDE: uri, "https://edugain.com": "https://localhost/missing"}
            }),
        );

        let res = StatementUnpacker::new(f.store(), fetcher)
            .unpack_metadata_statement(&root)
            .await
            .unwrap();
        assert_eq!(res.parsed_statement, 2);
        assert_eq!(res.result.children[FEIDE].signer, FEIDE);
        assert_eq!(res.failures.len(), 1);
        assert_eq!(res.failures[0].fo, "https://edugain.com");
    }

    #[tokio::test]
    async fn test_leaf_root_counts_once() {
        let f = Fixture::new();
        let token = sign(&f.swamid, SWAMID, json!({"issuer": SWAMID}));
        let res = unpacker(f.store()).unpack_metadata_statement(&token).await.unwrap();
        assert_eq!(res.parsed_statement, 1);
        assert!(res.result.is_leaf());
    }

    #[tokio::test]
    async fn test_nesting_depth_limit() {
        let f = Fixture::new();
        let inner = f.fo_layer(&f.swamid, SWAMID);
        let middle = sign(&f.sunet, SUNET, json!({METADATA_STATEMENTS: {SWAMID: inner}, SIGNING_KEYS: keys_json(&f.sunet)}));
        let root = sign(&f.sunet, SUNET, json!({METADATA_STATEMENTS: {SWAMID: middle}}));

        let result = unpacker(f.store()).with_max_depth(1).unpack_metadata_statement(&root).await;
        assert!(matches!(result, Err(FederationError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_malformed_branch_aborts_unpacking() {
        let f = Fixture::new();
        let root = sign(
            &f.sunet,
            SUNET,
            json!({METADATA_STATEMENTS: {SWAMID: f.fo_layer(&f.swamid, SWAMID), FEIDE: "garbage"}}),
        );

        assert!(matches!(
            unpacker(f.store()).unpack_metadata_statement(&root).await,
            Err(FederationError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_depth_limit_aborts_despite_valid_sibling() {
        let f = Fixture::new();
        let middle = sign(
            &f.sunet,
            SUNET,
            json!({METADATA_STATEMENTS: {SWAMID: f.fo_layer(&f.swamid, SWAMID)}, SIGNING_KEYS: keys_json(&f.sunet)}),
        );
        let root = sign(
            &f.sunet,
            SUNET,
            json!({METADATA_STATEMENTS: {SWAMID: middle, FEIDE: f.fo_layer(&f.feide, FEIDE)}}),
        );

        let result = unpacker(f.store()).with_max_depth(1).unpack_metadata_statement(&root).await;
        assert!(matches!(result, Err(FederationError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_garbage_token_propagates() {
        let f = Fixture::new();
        assert!(matches!(
            unpacker(f.store()).unpack_metadata_statement("garbage").await,
            Err(FederationError::Malformed(_))
        ));
    }
}
