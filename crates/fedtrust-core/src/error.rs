//! Error types for metadata statement signing and verification

use thiserror::Error;

use crate::storage::StorageError;

/// Result type alias using FederationError
pub type Result<T> = std::result::Result<T, FederationError>;

/// Errors that can occur while signing, unpacking or evaluating statements
#[derive(Error, Debug)]
pub enum FederationError {
    /// A configured key definition could not be turned into key material
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// No key with this key ID is known to the key store or key set
    #[error("Unknown key: {0}")]
    UnknownKey(String),

    /// The signer of a statement could not be resolved to any key set
    #[error("Unknown signer: {0}")]
    UnknownSigner(String),

    /// A signature did not validate against the resolved key
    #[error("Signature verification failed for '{issuer}': {reason}")]
    SignatureVerification { issuer: String, reason: String },

    /// No signing relationship is configured for this requester and usage
    #[error("No signing path for '{requester}' with usage '{usage}'")]
    NoSigningPath { requester: String, usage: String },

    /// A signing relationship or collaborator is configured inconsistently
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No path in the verified tree terminates at a trust anchor
    #[error("No trust path to any configured trust anchor")]
    NoTrustPath,

    /// The token is not a well-formed signed statement
    #[error("Malformed statement: {0}")]
    Malformed(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Key bundle or statement storage failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl FederationError {
    /// Whether this failure stays inside the tree branch where it occurred.
    ///
    /// Signature and key resolution failures are recorded per branch while
    /// unpacking; everything else, malformed tokens included, aborts the
    /// whole call.
    pub fn is_branch_local(&self) -> bool {
        matches!(
            self,
            FederationError::UnknownKey(_)
                | FederationError::UnknownSigner(_)
                | FederationError::SignatureVerification { .. }
        )
    }
}

impl From<serde_json::Error> for FederationError {
    fn from(err: serde_json::Error) -> Self {
        FederationError::Serialization(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for FederationError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                FederationError::SignatureVerification {
                    issuer: String::new(),
                    reason: err.to_string(),
                }
            }
            ErrorKind::InvalidEcdsaKey | ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidKeyFormat => {
                FederationError::KeyGeneration(err.to_string())
            }
            _ => FederationError::Malformed(err.to_string()),
        }
    }
}
