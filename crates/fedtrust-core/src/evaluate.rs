//! Trust path enumeration over a verified statement tree

use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

use crate::error::{FederationError, Result};
use crate::statement::MetadataStatement;
use crate::unpack::VerifiedStatementNode;

/// One root-to-anchor path with its merged claims
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrustPathResult {
    /// Trust anchor terminating the path
    pub fo: String,
    /// Claims merged from root to leaf, descendants winning
    pub merged: MetadataStatement,
    /// Signer identities from root to leaf
    pub path: Vec<String>,
}

/// Enumerates trust paths ending at configured trust anchors
#[derive(Debug, Clone, Default)]
pub struct ChainEvaluator {
    trust_anchors: BTreeSet<String>,
}

impl ChainEvaluator {
    /// Create an evaluator trusting the given anchors
    pub fn new(trust_anchors: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            trust_anchors: trust_anchors.into_iter().map(Into::into).collect(),
        }
    }

    /// Configured trust anchors
    pub fn trust_anchors(&self) -> &BTreeSet<String> {
        &self.trust_anchors
    }

    /// Whether `fo` is a configured trust anchor
    pub fn is_trust_anchor(&self, fo: &str) -> bool {
        self.trust_anchors.contains(fo)
    }

    /// Every path from the root to a leaf signed by a trust anchor.
    ///
    /// Paths are produced depth-first, children in key order. Fails with
    /// `NoTrustPath` only when no path reaches an anchor.
    pub fn evaluate_metadata_statement(&self, root: &VerifiedStatementNode) -> Result<Vec<TrustPathResult>> {
        self.evaluate(root, None)
    }

    /// Like [`evaluate_metadata_statement`](Self::evaluate_metadata_statement),
    /// dropping paths with a layer whose `federation_usage` differs from `usage`
    pub fn evaluate_for_usage(&self, root: &VerifiedStatementNode, usage: &str) -> Result<Vec<TrustPathResult>> {
        self.evaluate(root, Some(usage))
    }

    fn evaluate(&self, root: &VerifiedStatementNode, usage: Option<&str>) -> Result<Vec<TrustPathResult>> {
        let mut results = Vec::new();
        let mut path = Vec::new();
        self.walk(root, MetadataStatement::new(), &mut path, usage, &mut results);

        if results.is_empty() {
            return Err(FederationError::NoTrustPath);
        }
        debug!(paths = results.len(), "Evaluated trust paths");
        Ok(results)
    }

    fn walk(
        &self,
        node: &VerifiedStatementNode,
        merged: MetadataStatement,
        path: &mut Vec<String>,
        usage: Option<&str>,
        results: &mut Vec<TrustPathResult>,
    ) {
        if let (Some(wanted), Some(declared)) = (usage, node.statement.federation_usage()) {
            if wanted != declared {
                return;
            }
        }

        let merged = merged.overridden_by(&node.statement);
        path.push(node.signer.clone());

        if node.is_leaf() {
            if self.is_trust_anchor(&node.signer) {
                results.push(TrustPathResult {
                    fo: node.signer.clone(),
                    merged,
                    path: path.clone(),
                });
            }
        } else {
            for child in node.children.values() {
                self.walk(child, merged.clone(), path, usage, results);
            }
        }

        path.pop();
    }
}
