//! Key bundle handlers
//!
//! Operator key sets are addressed by operator id, percent-encoded into a
//! single path segment.

use axum::{
    extract::{Path, State},
    Json,
};
use fedtrust_core::KeySet;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::api::error::ApiError;
use crate::api::handlers::AppState;

/// Operators with a published key set
#[derive(Debug, Serialize)]
pub struct ListBundlesResponse {
    pub issuers: Vec<String>,
    pub count: usize,
}

/// Response from storing a key set
#[derive(Debug, Serialize)]
pub struct PutBundleResponse {
    pub issuer: String,
    pub keys: usize,
}

/// List operators with a stored key set
///
/// GET /v1/bundles
pub async fn list_bundles(State(state): State<Arc<AppState>>) -> Result<Json<ListBundlesResponse>, ApiError> {
    let issuers = state.bundles.list_issuers().await?;
    Ok(Json(ListBundlesResponse {
        count: issuers.len(),
        issuers,
    }))
}

/// Get an operator's key set
///
/// GET /v1/bundles/{name}
pub async fn get_bundle(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<KeySet>, ApiError> {
    state
        .bundles
        .get_bundle(&name)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No key set for '{}'", name)))
}

/// Store an operator's key set
///
/// PUT /v1/bundles/{name}
///
/// The hosted operator's own key set is managed by its rotation schedule and
/// cannot be replaced.
pub async fn put_bundle(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(keys): Json<KeySet>,
) -> Result<Json<PutBundleResponse>, ApiError> {
    if name.trim().is_empty() {
        return Err(ApiError::BadRequest("Operator id cannot be empty".into()));
    }
    if keys.is_empty() {
        return Err(ApiError::BadRequest("Key set cannot be empty".into()));
    }
    if state.operator.as_ref().is_some_and(|op| op.issuer() == name) {
        return Err(ApiError::Forbidden(format!(
            "Key set of hosted operator '{}' is managed by key rotation",
            name
        )));
    }

    state.bundles.put_bundle(&name, &keys).await?;
    info!(issuer = %name, keys = keys.len(), "Stored key bundle");

    Ok(Json(PutBundleResponse {
        issuer: name,
        keys: keys.len(),
    }))
}
