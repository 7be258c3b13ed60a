//! Federation Scenario Tests
//!
//! A small research-and-education federation: the organisation sunet.se is
//! vouched for by three federation operators.
//!
//! - swamid signs sunet directly, embedded inline
//! - feide signs sunet directly, published by reference
//! - edugain signs swamid, which signs sunet, published by reference

use async_trait::async_trait;
use chrono::Duration;
use fedtrust_core::{
    FederationError, FederationOperator, FetchError, FsBundleStore, FsStatementStore, KeyBundleStore,
    KeyDefinition, KeySet, KeyStore, MemoryStore, MetadataStatement, NameCodec, Operator, PercentCodec,
    RemoteFetcher, SigningChain, SigningPolicy, SigningStep, StatementSigner, StatementStore,
};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;

const SWAMID: &str = "https://swamid.sunet.se";
const FEIDE: &str = "https://www.feide.no";
const EDUGAIN: &str = "https://edugain.com";
const SUNET: &str = "https://sunet.se";
const BASE_URL: &str = "https://localhost/v1/statements";

// =============================================================================
// Test Helpers
// =============================================================================

fn key_defs() -> Vec<KeyDefinition> {
    vec![KeyDefinition::ed25519(), KeyDefinition::ed25519()]
}

fn usage(u: &str) -> serde_json::Value {
    json!(u)
}

/// Signing relationships of sunet.se, per usage
fn sunet_policy() -> SigningPolicy {
    let mut policy = SigningPolicy::new();
    for (u, edugain_usage) in [("discovery", "discovery"), ("registration", "response")] {
        policy = policy
            .with_chain(
                SUNET,
                u,
                SWAMID,
                SigningChain::inline(vec![SigningStep::new(SWAMID, SUNET).add("federation_usage", usage(u))]),
            )
            .with_chain(
                SUNET,
                u,
                FEIDE,
                SigningChain::by_reference(vec![SigningStep::new(FEIDE, SUNET).add("federation_usage", usage(u))]),
            )
            .with_chain(
                SUNET,
                u,
                EDUGAIN,
                SigningChain::by_reference(vec![
                    SigningStep::new(EDUGAIN, SWAMID).add("federation_usage", usage(edugain_usage)),
                    SigningStep::new(SWAMID, SUNET),
                ]),
            );
    }
    policy
}

/// Serves statements out of a statement store by the last URI path segment
#[derive(Debug)]
struct StoreFetcher {
    statements: Arc<dyn StatementStore>,
}

#[async_trait]
impl RemoteFetcher for StoreFetcher {
    async fn fetch_key_set(&self, issuer: &str) -> Result<KeySet, FetchError> {
        Err(FetchError::NotFound(issuer.to_string()))
    }

    async fn fetch_statement(&self, uri: &str) -> Result<String, FetchError> {
        let segment = uri.rsplit('/').next().unwrap_or_default();
        let name = PercentCodec
            .decode(segment)
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        self.statements
            .get_statement(&name)
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?
            .ok_or_else(|| FetchError::NotFound(uri.to_string()))
    }
}

struct Federation {
    fos: Vec<FederationOperator>,
    signer: StatementSigner,
    verifier: Operator,
}

async fn federation(bundles: Arc<dyn KeyBundleStore>, statements: Arc<dyn StatementStore>) -> Federation {
    let fetcher: Arc<dyn RemoteFetcher> = Arc::new(StoreFetcher {
        statements: statements.clone(),
    });

    let mut fos = Vec::new();
    for fo in [SWAMID, FEIDE, EDUGAIN] {
        let op = FederationOperator::new(fo, key_defs(), Duration::seconds(1), bundles.clone(), fetcher.clone())
            .expect("Failed to create federation operator");
        op.publish_keys(bundles.as_ref()).await.expect("Failed to publish keys");
        fos.push(op);
    }

    let sunet = Arc::new(KeyStore::new(SUNET, key_defs(), Duration::hours(1)).unwrap());
    let mut signer = StatementSigner::new(sunet, sunet_policy()).with_statement_store(statements, BASE_URL);
    for op in &fos {
        signer = signer.with_signer(op.key_store().clone());
    }

    Federation {
        fos,
        signer,
        verifier: Operator::new(bundles, fetcher),
    }
}

async fn memory_federation() -> Federation {
    federation(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new())).await
}

fn request() -> MetadataStatement {
    MetadataStatement::for_issuer("https://example.org/op")
}

fn fos_of(paths: &[fedtrust_core::TrustPathResult]) -> BTreeSet<&str> {
    paths.iter().map(|p| p.fo.as_str()).collect()
}

// =============================================================================
// Unpack and Evaluate
// =============================================================================

#[tokio::test]
async fn test_unpack_metadata_statement() {
    let fed = memory_federation().await;
    let ms = fed.signer.create_signed_metadata_statement(&request(), "discovery").await.unwrap();

    let res = fed.verifier.unpack_metadata_statement(&ms).await.unwrap();
    assert_eq!(res.parsed_statement, 3);
    assert!(res.failures.is_empty());

    let loel = fed.verifier.evaluate_metadata_statement(&res.result).await.unwrap();
    assert_eq!(loel.len(), 3);
    assert_eq!(fos_of(&loel), BTreeSet::from([SWAMID, FEIDE, EDUGAIN]));
}

#[tokio::test]
async fn test_paths_and_merged_claims() {
    let fed = memory_federation().await;
    let ms = fed.signer.create_signed_metadata_statement(&request(), "discovery").await.unwrap();
    let res = fed.verifier.unpack_metadata_statement(&ms).await.unwrap();

    // Root claims come back unchanged apart from the envelope
    assert_eq!(res.result.statement.profile_claims(), request());

    let loel = fed.verifier.evaluate_metadata_statement(&res.result).await.unwrap();
    for path in &loel {
        assert_eq!(path.merged.issuer(), Some("https://example.org/op"));
        assert_eq!(path.merged.federation_usage(), Some("discovery"));
        assert!(path.merged.get("signing_keys").is_none());
    }

    let edugain = loel.iter().find(|p| p.fo == EDUGAIN).unwrap();
    assert_eq!(edugain.path, vec![SUNET, SWAMID, EDUGAIN]);
    let feide = loel.iter().find(|p| p.fo == FEIDE).unwrap();
    assert_eq!(feide.path, vec![SUNET, FEIDE]);
}

#[tokio::test]
async fn test_evaluate_for_usage_drops_mismatched_layers() {
    let fed = memory_federation().await;
    let ms = fed.signer.create_signed_metadata_statement(&request(), "registration").await.unwrap();
    let res = fed.verifier.unpack_metadata_statement(&ms).await.unwrap();
    assert_eq!(res.parsed_statement, 3);

    // edugain signed its layer for "response", not "registration"
    let paths = fed.verifier.evaluate_for_usage(&res.result, "registration").await.unwrap();
    assert_eq!(fos_of(&paths), BTreeSet::from([SWAMID, FEIDE]));

    let all = fed.verifier.evaluate_metadata_statement(&res.result).await.unwrap();
    assert_eq!(all.len(), 3);
}

#[tokio::test]
async fn test_unknown_usage_has_no_signing_path() {
    let fed = memory_federation().await;
    assert!(matches!(
        fed.signer.create_signed_metadata_statement(&request(), "response").await,
        Err(FederationError::NoSigningPath { .. })
    ));
}

#[tokio::test]
async fn test_restricted_trust_anchors() {
    let fed = memory_federation().await;
    let ms = fed.signer.create_signed_metadata_statement(&request(), "discovery").await.unwrap();
    let res = fed.verifier.unpack_metadata_statement(&ms).await.unwrap();

    let verifier = fed.verifier.clone().with_trust_anchors([FEIDE]);
    let paths = verifier.evaluate_metadata_statement(&res.result).await.unwrap();
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].fo, FEIDE);
}

// =============================================================================
// Key Rotation
// =============================================================================

#[tokio::test]
async fn test_key_rotation() {
    let fo = FederationOperator::new(
        "https://example.com/op",
        key_defs(),
        Duration::seconds(1),
        Arc::new(MemoryStore::new()),
        Arc::new(fedtrust_core::NoFetcher),
    )
    .unwrap();

    fo.rotate_keys().unwrap();
    assert_eq!(fo.public_key_set().len(), 4);
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
    fo.rotate_keys().unwrap();
    assert_eq!(fo.public_key_set().len(), 4);
}

#[tokio::test]
async fn test_rotation_within_grace_keeps_statements_valid() {
    let bundles: Arc<dyn KeyBundleStore> = Arc::new(MemoryStore::new());
    let fed = federation(bundles.clone(), Arc::new(MemoryStore::new())).await;
    let ms = fed.signer.create_signed_metadata_statement(&request(), "discovery").await.unwrap();

    let swamid = &fed.fos[0];
    swamid.rotate_and_publish(bundles.as_ref()).await.unwrap();

    let res = fed.verifier.unpack_metadata_statement(&ms).await.unwrap();
    assert_eq!(res.parsed_statement, 3);
}

#[tokio::test]
async fn test_rotation_past_grace_invalidates_branches() {
    let bundles: Arc<dyn KeyBundleStore> = Arc::new(MemoryStore::new());
    let fed = federation(bundles.clone(), Arc::new(MemoryStore::new())).await;
    let ms = fed.signer.create_signed_metadata_statement(&request(), "discovery").await.unwrap();

    // Two rotations more than remove_after apart leave no key of the
    // generation that signed the statement
    let swamid = fed.fos[0].key_store();
    let start = chrono::Utc::now();
    let later = start + Duration::seconds(2);
    swamid.rotate(start).unwrap();
    swamid.rotate(later).unwrap();
    bundles.put_bundle(SWAMID, &swamid.public_key_set_at(later)).await.unwrap();

    // swamid's own leaf is checked against the published bundle. The swamid
    // layer of the edugain chain is checked against keys edugain vouched for.
    let res = fed.verifier.unpack_metadata_statement(&ms).await.unwrap();
    assert_eq!(res.parsed_statement, 2);
    assert_eq!(res.failures.len(), 1);
    assert_eq!(res.failures[0].fo, SWAMID);
    assert!(matches!(res.failures[0].error, FederationError::UnknownKey(_)));
}

// =============================================================================
// Filesystem Stores
// =============================================================================

#[tokio::test]
async fn test_scenario_with_filesystem_stores() {
    let dir = tempfile::tempdir().unwrap();
    let bundles = Arc::new(FsBundleStore::new(dir.path().join("fo_jwks")));
    let statements = Arc::new(FsStatementStore::new(dir.path().join("mds")));
    let fed = federation(bundles.clone(), statements.clone()).await;

    let ms = fed.signer.create_signed_metadata_statement(&request(), "discovery").await.unwrap();
    assert_eq!(statements.list_statements().await.unwrap().len(), 2);
    assert_eq!(bundles.list_issuers().await.unwrap(), vec![EDUGAIN, SWAMID, FEIDE]);

    let res = fed.verifier.unpack_metadata_statement(&ms).await.unwrap();
    assert_eq!(res.parsed_statement, 3);
    let loel = fed.verifier.evaluate_metadata_statement(&res.result).await.unwrap();
    assert_eq!(fos_of(&loel), BTreeSet::from([SWAMID, FEIDE, EDUGAIN]));
}
