//! Key material and the signed statement encoding
//!
//! Statements are signed as JWS compact tokens with Ed25519 keys. Key sets
//! are exchanged as JWKS documents.
//!
//! Key types:
//! - `KeyPair`: Ed25519 key pair with a key ID and creation time
//! - `Jwk`: public key as a JSON Web Key
//! - `KeySet`: a JWKS document (`{"keys": [...]}`)
//! - `UnverifiedStatement`: a decoded token whose signature is not yet checked

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use ed25519_dalek::pkcs8::{EncodePrivateKey, KeypairBytes};
use ed25519_dalek::{SigningKey, VerifyingKey};
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{FederationError, Result};
use crate::statement::MetadataStatement;

/// JWS algorithm used for every statement this crate signs
pub const SIGNING_ALG: Algorithm = Algorithm::EdDSA;

/// Ed25519 key pair for signing statements
#[derive(Clone)]
pub struct KeyPair {
    /// Key identifier
    kid: String,
    /// Ed25519 signing key (private)
    signing_key: SigningKey,
    /// Ed25519 verifying key (public)
    verifying_key: VerifyingKey,
    /// When this key was generated
    created_at: DateTime<Utc>,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("kid", &self.kid)
            .field("created_at", &self.created_at)
            .field("signing_key", &"[redacted]")
            .finish()
    }
}

impl KeyPair {
    /// Generate a new random key pair with the given key ID
    pub fn generate(kid: impl Into<String>) -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self::from_signing_key(kid, signing_key)
    }

    /// Generate a new random key pair with a random key ID
    pub fn generate_random_kid() -> Self {
        Self::generate(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Create a key pair from an existing signing key
    pub fn from_signing_key(kid: impl Into<String>, signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        Self {
            kid: kid.into(),
            signing_key,
            verifying_key,
            created_at: Utc::now(),
        }
    }

    /// Create a key pair from raw secret key bytes
    pub fn from_bytes(kid: impl Into<String>, bytes: &[u8; 32]) -> Self {
        Self::from_signing_key(kid, SigningKey::from_bytes(bytes))
    }

    /// Get the key identifier
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// When this key was generated
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Get the raw verifying key bytes
    pub fn verifying_key_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Export the public half as a JWK
    pub fn public_jwk(&self) -> Jwk {
        Jwk {
            kty: "OKP".into(),
            kid: Some(self.kid.clone()),
            alg: Some("EdDSA".into()),
            key_use: Some("sig".into()),
            crv: Some("Ed25519".into()),
            x: Some(URL_SAFE_NO_PAD.encode(self.verifying_key.to_bytes())),
            y: None,
            n: None,
            e: None,
        }
    }

    /// Sign a claims mapping as a JWS compact token
    pub fn sign_claims(&self, claims: &Map<String, Value>) -> Result<String> {
        let mut header = Header::new(SIGNING_ALG);
        header.kid = Some(self.kid.clone());

        let der = KeypairBytes {
            secret_key: self.signing_key.to_bytes(),
            public_key: None,
        }
        .to_pkcs8_der()
        .map_err(|e| FederationError::KeyGeneration(e.to_string()))?;
        let key = EncodingKey::from_ed_der(der.as_bytes());

        encode(&header, claims, &key).map_err(FederationError::from)
    }
}

/// Public key as a JSON Web Key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type (OKP, EC, RSA)
    pub kty: String,
    /// Key ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    /// Algorithm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    /// Use (sig for signing)
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    /// Curve (OKP and EC keys)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    /// Public key (OKP) or x coordinate (EC)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    /// EC y coordinate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    /// RSA modulus
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    /// RSA exponent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
}

impl Jwk {
    /// Build a decoding key and the algorithms this key may verify
    pub fn decoding_key(&self) -> Result<(DecodingKey, Vec<Algorithm>)> {
        match self.kty.as_str() {
            "OKP" => {
                if self.crv.as_deref().unwrap_or("Ed25519") != "Ed25519" {
                    return Err(FederationError::Malformed(format!(
                        "Unsupported OKP curve: {:?}",
                        self.crv
                    )));
                }
                let x = self.required(&self.x, "OKP public key")?;
                let key = DecodingKey::from_ed_components(x)?;
                Ok((key, vec![Algorithm::EdDSA]))
            }
            "EC" => {
                let x = self.required(&self.x, "EC x coordinate")?;
                let y = self.required(&self.y, "EC y coordinate")?;
                let alg = match self.crv.as_deref() {
                    Some("P-384") => Algorithm::ES384,
                    _ => Algorithm::ES256,
                };
                let key = DecodingKey::from_ec_components(x, y)?;
                Ok((key, vec![alg]))
            }
            "RSA" => {
                let n = self.required(&self.n, "RSA modulus")?;
                let e = self.required(&self.e, "RSA exponent")?;
                let key = DecodingKey::from_rsa_components(n, e)?;
                Ok((
                    key,
                    vec![
                        Algorithm::RS256,
                        Algorithm::RS384,
                        Algorithm::RS512,
                        Algorithm::PS256,
                        Algorithm::PS384,
                        Algorithm::PS512,
                    ],
                ))
            }
            kty => Err(FederationError::Malformed(format!("Unsupported key type: {}", kty))),
        }
    }

    fn required<'a>(&self, field: &'a Option<String>, what: &str) -> Result<&'a str> {
        field
            .as_deref()
            .ok_or_else(|| FederationError::Malformed(format!("JWK missing {}", what)))
    }
}

/// A JWKS document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySet {
    pub keys: Vec<Jwk>,
}

impl KeySet {
    /// Create a key set from public keys
    pub fn new(keys: Vec<Jwk>) -> Self {
        Self { keys }
    }

    /// Build the public key set of a list of key pairs
    pub fn from_key_pairs<'a>(pairs: impl IntoIterator<Item = &'a KeyPair>) -> Self {
        Self {
            keys: pairs.into_iter().map(KeyPair::public_jwk).collect(),
        }
    }

    /// Find a key by key ID
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid.as_deref() == Some(kid))
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Serialize as a JSON value (for embedding as `signing_keys`)
    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(FederationError::from)
    }
}

/// A decoded signed statement whose signature has not been checked yet
#[derive(Debug, Clone)]
pub struct UnverifiedStatement {
    token: String,
    kid: Option<String>,
    alg: Algorithm,
    claims: MetadataStatement,
}

impl UnverifiedStatement {
    /// Decode header and claims of a compact token without verifying it
    pub fn parse(token: &str) -> Result<Self> {
        let header = decode_header(token)?;

        let mut validation = Validation::new(header.alg);
        validation.insecure_disable_signature_validation();
        relax_claim_checks(&mut validation);

        let data = decode::<Map<String, Value>>(token, &DecodingKey::from_secret(&[]), &validation)?;

        Ok(Self {
            token: token.to_string(),
            kid: header.kid,
            alg: header.alg,
            claims: MetadataStatement::from(data.claims),
        })
    }

    /// The raw compact token
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Key ID from the protected header
    pub fn kid(&self) -> Option<&str> {
        self.kid.as_deref()
    }

    /// Claims as decoded (not yet trusted)
    pub fn claims(&self) -> &MetadataStatement {
        &self.claims
    }

    /// The signer identity (`iss`)
    pub fn signer(&self) -> Result<&str> {
        self.claims
            .iss()
            .ok_or_else(|| FederationError::Malformed("statement has no iss claim".into()))
    }

    /// Verify the signature against a key set and return the trusted claims
    ///
    /// The key is selected by the header's key ID. Tokens without a key ID
    /// are tried against every key in the set.
    pub fn verify(&self, keys: &KeySet) -> Result<MetadataStatement> {
        let signer = self.signer()?.to_string();

        let candidates: Vec<&Jwk> = match self.kid() {
            Some(kid) => vec![keys
                .find(kid)
                .ok_or_else(|| FederationError::UnknownKey(kid.to_string()))?],
            None => keys.keys.iter().collect(),
        };

        let mut last_error = None;
        for jwk in candidates {
            match self.verify_with(jwk) {
                Ok(claims) => return Ok(claims),
                Err(e) => last_error = Some(e),
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "empty key set".to_string());
        Err(FederationError::SignatureVerification {
            issuer: signer,
            reason,
        })
    }

    fn verify_with(&self, jwk: &Jwk) -> Result<MetadataStatement> {
        let (key, algorithms) = jwk.decoding_key()?;
        if !algorithms.contains(&self.alg) {
            return Err(FederationError::SignatureVerification {
                issuer: self.claims.iss().unwrap_or_default().to_string(),
                reason: format!("algorithm {:?} does not match key type {}", self.alg, jwk.kty),
            });
        }

        let mut validation = Validation::new(self.alg);
        relax_claim_checks(&mut validation);

        let data = decode::<Map<String, Value>>(&self.token, &key, &validation)?;
        Ok(MetadataStatement::from(data.claims))
    }
}

/// Statements carry no expiry or audience of their own
fn relax_claim_checks(validation: &mut Validation) {
    validation.required_spec_claims.clear();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
}
