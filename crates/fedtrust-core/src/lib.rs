//! # Fedtrust Core
//!
//! Signed metadata statements for federated identity: federation operators
//! countersign statements about member entities, and verifiers recover every
//! trust path from a statement to a trust anchor.
//!
//! ## Flow
//!
//! ```text
//! StatementSigner ──token──▶ StatementUnpacker ──tree──▶ ChainEvaluator
//!      │                            │                          │
//!   KeyStore                 KeyBundleStore              trust anchors
//!  (rotation)               (+ RemoteFetcher)
//! ```
//!
//! - [`KeyStore`]: an issuer's active keys plus retired keys kept for a grace period
//! - [`KeyBundleStore`]: operator identifier -> published key set
//! - [`StatementSigner`]: builds self-signed statements with countersigned chains
//! - [`StatementUnpacker`]: verifies nested statements layer by layer
//! - [`ChainEvaluator`]: merges claims along each path ending at a trust anchor
//! - [`FederationOperator`]: an operator with scheduled key rotation

pub mod codec;
pub mod crypto;
pub mod error;
pub mod evaluate;
pub mod fetch;
pub mod keystore;
pub mod operator;
pub mod signer;
pub mod statement;
pub mod storage;
pub mod unpack;

pub use codec::{NameCodec, PercentCodec};
pub use crypto::{Jwk, KeyPair, KeySet, UnverifiedStatement};
pub use error::{FederationError, Result};
pub use evaluate::{ChainEvaluator, TrustPathResult};
pub use fetch::{FetchError, NoFetcher, RemoteFetcher};
pub use keystore::{KeyDefinition, KeyStore, KeyType, RetiredKey};
pub use operator::{FederationOperator, Operator};
pub use signer::{SigningChain, SigningPolicy, SigningStep, StatementSigner};
pub use statement::MetadataStatement;
pub use storage::{FsBundleStore, FsStatementStore, KeyBundleStore, MemoryStore, StatementStore, StorageError};
pub use unpack::{BranchFailure, StatementUnpacker, UnpackResult, VerifiedStatementNode};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the library version
pub fn version() -> &'static str {
    VERSION
}
