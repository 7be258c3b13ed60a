//! Statement publication and verification handlers

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use fedtrust_core::TrustPathResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::error::ApiError;
use crate::api::handlers::AppState;

/// Media type of a compact signed statement
pub const JWT_CONTENT_TYPE: &str = "application/jwt";

/// Published statement names
#[derive(Debug, Serialize)]
pub struct ListStatementsResponse {
    pub statements: Vec<String>,
    pub count: usize,
}

/// Request to verify a signed statement
#[derive(Debug, Deserialize)]
pub struct VerifyStatementRequest {
    /// Compact signed statement
    pub statement: String,

    /// Only accept paths signed for this usage
    #[serde(default)]
    pub usage: Option<String>,
}

/// A branch that failed verification
#[derive(Debug, Serialize)]
pub struct FailureEntry {
    pub fo: String,
    pub error: String,
}

/// Verification outcome
#[derive(Debug, Serialize)]
pub struct VerifyStatementResponse {
    /// Identity that self-signed the statement
    pub issuer: String,
    /// Number of root branches that verified
    pub parsed_statement: usize,
    /// Trust paths ending at a trust anchor
    pub paths: Vec<TrustPathResult>,
    /// Branches that failed verification
    pub failures: Vec<FailureEntry>,
}

/// List published statement names
///
/// GET /v1/statements
pub async fn list_statements(State(state): State<Arc<AppState>>) -> Result<Json<ListStatementsResponse>, ApiError> {
    let statements = state.statements.list_statements().await?;
    Ok(Json(ListStatementsResponse {
        count: statements.len(),
        statements,
    }))
}

/// Get a published statement as a compact token
///
/// GET /v1/statements/{name}
pub async fn get_statement(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let token = state
        .statements
        .get_statement(&name)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No statement named '{}'", name)))?;

    Ok(([(header::CONTENT_TYPE, JWT_CONTENT_TYPE)], token))
}

/// Verify a signed statement and report its trust paths
///
/// POST /v1/statements/verify
pub async fn verify_statement(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VerifyStatementRequest>,
) -> Result<Json<VerifyStatementResponse>, ApiError> {
    let statement = request.statement.trim();
    if statement.is_empty() {
        return Err(ApiError::BadRequest("Statement cannot be empty".into()));
    }

    let unpacked = state.verifier.unpack_metadata_statement(statement).await?;
    let failures: Vec<FailureEntry> = unpacked
        .failures
        .iter()
        .map(|f| FailureEntry {
            fo: f.fo.clone(),
            error: f.error.to_string(),
        })
        .collect();
    for failure in &failures {
        warn!(fo = %failure.fo, error = %failure.error, "Statement branch failed verification");
    }

    let paths = match &request.usage {
        Some(usage) => state.verifier.evaluate_for_usage(&unpacked.result, usage).await?,
        None => state.verifier.evaluate_metadata_statement(&unpacked.result).await?,
    };

    info!(
        issuer = %unpacked.result.signer,
        paths = paths.len(),
        failed = failures.len(),
        "Verified metadata statement"
    );

    Ok(Json(VerifyStatementResponse {
        issuer: unpacked.result.signer.clone(),
        parsed_statement: unpacked.parsed_statement,
        paths,
        failures,
    }))
}

