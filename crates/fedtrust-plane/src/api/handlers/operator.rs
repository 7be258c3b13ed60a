//! Hosted federation operator info

use axum::{extract::State, Json};
use fedtrust_core::{KeySet, NameCodec, PercentCodec};
use serde::Serialize;
use std::sync::Arc;

use crate::api::error::ApiError;
use crate::api::handlers::AppState;

/// Discovery info for the hosted operator
#[derive(Debug, Serialize)]
pub struct OperatorInfo {
    pub issuer: String,
    /// Where verifiers fetch the operator's key set
    pub key_set_url: String,
    /// Currently valid public keys, retired ones included
    pub keys: KeySet,
}

/// Get the hosted operator's identity and keys
///
/// GET /v1/operator
pub async fn get_operator_info(State(state): State<Arc<AppState>>) -> Result<Json<OperatorInfo>, ApiError> {
    let operator = state
        .operator
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("This plane hosts no federation operator".into()))?;

    Ok(Json(OperatorInfo {
        issuer: operator.issuer().to_string(),
        key_set_url: format!("{}/{}", state.config.bundle_base_url(), PercentCodec.encode(operator.issuer())),
        keys: operator.public_key_set(),
    }))
}
