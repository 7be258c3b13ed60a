//! Plane configuration from environment variables
//!
//! | variable | default |
//! |---|---|
//! | `FEDTRUST_PORT` | `8080` |
//! | `FEDTRUST_LOG_LEVEL` | `info` |
//! | `FEDTRUST_BUNDLE_DIR` | unset: in-memory bundles |
//! | `FEDTRUST_STATEMENT_DIR` | unset: in-memory statements |
//! | `FEDTRUST_TRUST_ANCHORS` | unset: every operator with a stored bundle |
//! | `FEDTRUST_PUBLIC_URL` | unset |
//! | `FEDTRUST_FETCH_BASE_URL` | unset: no remote key fetching |
//! | `FEDTRUST_OPERATOR_ISSUER` | unset: no hosted operator |
//! | `FEDTRUST_ROTATE_SECS` | `86400` |
//! | `FEDTRUST_REMOVE_AFTER_SECS` | `3600` |
//! | `FEDTRUST_KEY_DEFS` | `[{"type": "OKP", "crv": "Ed25519", "use": ["sig"]}]` |

use fedtrust_core::KeyDefinition;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{name} has an invalid value '{value}'")]
    InvalidValue { name: &'static str, value: String },
}

/// A federation operator hosted by this plane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostedOperatorConfig {
    /// Operator identity
    pub issuer: String,
    /// Seconds between key rotations
    pub rotate_secs: u64,
    /// Seconds retired keys stay valid
    pub remove_after_secs: u64,
    /// Keys the operator keeps active, one per definition
    pub key_defs: Vec<KeyDefinition>,
}

/// Plane server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaneConfig {
    pub port: u16,
    pub log_level: String,
    pub bundle_dir: Option<PathBuf>,
    pub statement_dir: Option<PathBuf>,
    pub trust_anchors: Vec<String>,
    pub public_url: Option<String>,
    pub fetch_base_url: Option<String>,
    pub operator: Option<HostedOperatorConfig>,
}

impl Default for PlaneConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            log_level: "info".into(),
            bundle_dir: None,
            statement_dir: None,
            trust_anchors: Vec::new(),
            public_url: None,
            fetch_base_url: None,
            operator: None,
        }
    }
}

impl PlaneConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from any variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let operator = match var("FEDTRUST_OPERATOR_ISSUER") {
            Some(issuer) => Some(HostedOperatorConfig {
                issuer,
                rotate_secs: match parse_or(var("FEDTRUST_ROTATE_SECS"), "FEDTRUST_ROTATE_SECS", 86_400)? {
                    0 => {
                        return Err(ConfigError::InvalidValue {
                            name: "FEDTRUST_ROTATE_SECS",
                            value: "0".into(),
                        })
                    }
                    secs => secs,
                },
                remove_after_secs: parse_or(
                    var("FEDTRUST_REMOVE_AFTER_SECS"),
                    "FEDTRUST_REMOVE_AFTER_SECS",
                    3_600,
                )?,
                key_defs: parse_key_defs(var("FEDTRUST_KEY_DEFS"))?,
            }),
            None => None,
        };

        Ok(Self {
            port: parse_or(var("FEDTRUST_PORT"), "FEDTRUST_PORT", defaults.port)?,
            log_level: var("FEDTRUST_LOG_LEVEL").unwrap_or(defaults.log_level),
            bundle_dir: var("FEDTRUST_BUNDLE_DIR").map(PathBuf::from),
            statement_dir: var("FEDTRUST_STATEMENT_DIR").map(PathBuf::from),
            trust_anchors: var("FEDTRUST_TRUST_ANCHORS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            public_url: var("FEDTRUST_PUBLIC_URL"),
            fetch_base_url: var("FEDTRUST_FETCH_BASE_URL"),
            operator,
        })
    }

    /// Base URL statements published by this plane are linked under
    pub fn statement_base_url(&self) -> String {
        format!("{}/v1/statements", self.public_base())
    }

    /// Base URL key sets are served under
    pub fn bundle_base_url(&self) -> String {
        format!("{}/v1/bundles", self.public_base())
    }

    fn public_base(&self) -> String {
        let public = self
            .public_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", self.port));
        public.trim_end_matches('/').to_string()
    }
}

fn parse_or<T: FromStr>(value: Option<String>, name: &'static str, default: T) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value: v }),
    }
}

fn parse_key_defs(value: Option<String>) -> Result<Vec<KeyDefinition>, ConfigError> {
    let Some(json) = value else {
        return Ok(vec![KeyDefinition::ed25519()]);
    };
    match serde_json::from_str::<Vec<KeyDefinition>>(&json) {
        Ok(defs) if !defs.is_empty() => Ok(defs),
        _ => Err(ConfigError::InvalidValue {
            name: "FEDTRUST_KEY_DEFS",
            value: json,
        }),
    }
}
