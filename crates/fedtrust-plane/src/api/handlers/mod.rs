//! API request handlers

pub mod bundles;
pub mod operator;
pub mod statements;

use fedtrust_core::{FederationOperator, KeyBundleStore, Operator, RemoteFetcher, StatementStore};
use std::sync::Arc;

use crate::config::PlaneConfig;

pub use bundles::{get_bundle, list_bundles, put_bundle, ListBundlesResponse, PutBundleResponse};
pub use operator::{get_operator_info, OperatorInfo};
pub use statements::{
    get_statement, list_statements, verify_statement, FailureEntry, ListStatementsResponse, VerifyStatementRequest,
    VerifyStatementResponse,
};

/// Shared application state
pub struct AppState {
    /// Operator id -> published key set
    pub bundles: Arc<dyn KeyBundleStore>,
    /// Published by-reference statements
    pub statements: Arc<dyn StatementStore>,
    /// Verifies submitted statements
    pub verifier: Operator,
    /// Federation operator hosted by this plane, if any
    pub operator: Option<FederationOperator>,
    pub config: PlaneConfig,
}

impl AppState {
    /// Build state around the given stores.
    ///
    /// The verifier trusts `config.trust_anchors`, or every operator with a
    /// stored bundle when none are configured.
    pub fn new(
        config: PlaneConfig,
        bundles: Arc<dyn KeyBundleStore>,
        statements: Arc<dyn StatementStore>,
        fetcher: Arc<dyn RemoteFetcher>,
    ) -> Self {
        let mut verifier = Operator::new(bundles.clone(), fetcher);
        if !config.trust_anchors.is_empty() {
            verifier = verifier.with_trust_anchors(config.trust_anchors.iter().cloned());
        }

        Self {
            bundles,
            statements,
            verifier,
            operator: None,
            config,
        }
    }

    /// Host a federation operator
    pub fn with_operator(mut self, operator: FederationOperator) -> Self {
        self.operator = Some(operator);
        self
    }
}
