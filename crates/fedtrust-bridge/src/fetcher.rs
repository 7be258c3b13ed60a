//! HTTP fetcher for key sets and by-reference statements

use async_trait::async_trait;
use fedtrust_core::{FetchError, KeySet, NameCodec, PercentCodec, RemoteFetcher};
use moka::future::Cache;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::{BridgeError, Result};

/// Configuration for an [`HttpFetcher`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpFetcherConfig {
    /// Base URL key sets are published under
    pub base_url: String,

    /// How long a fetched key set is reused (seconds)
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Maximum number of cached key sets
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,

    /// Request timeout (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_cache_capacity() -> u64 {
    100
}

fn default_timeout_secs() -> u64 {
    10
}

impl HttpFetcherConfig {
    /// Create a configuration with default cache and timeout settings
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_capacity: default_cache_capacity(),
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Set the key set cache TTL
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl_secs = ttl.as_secs();
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }
}

/// Fetches operator key sets and published statements over HTTP
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    config: HttpFetcherConfig,
    /// Key set cache (operator id -> JWKS)
    key_sets: Cache<String, Arc<KeySet>>,
    http_client: reqwest::Client,
    codec: Arc<dyn NameCodec>,
}

impl HttpFetcher {
    /// Create a fetcher with percent-encoded operator path segments
    pub fn new(config: HttpFetcherConfig) -> Result<Self> {
        Self::with_codec(config, Arc::new(PercentCodec))
    }

    /// Create a fetcher with a custom name codec
    pub fn with_codec(config: HttpFetcherConfig, codec: Arc<dyn NameCodec>) -> Result<Self> {
        if config.base_url.is_empty() {
            return Err(BridgeError::InvalidConfig("base_url must not be empty".into()));
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let key_sets = Cache::builder()
            .time_to_live(Duration::from_secs(config.cache_ttl_secs))
            .max_capacity(config.cache_capacity)
            .build();

        Ok(Self {
            config,
            key_sets,
            http_client,
            codec,
        })
    }

    /// The fetcher configuration
    pub fn config(&self) -> &HttpFetcherConfig {
        &self.config
    }

    /// URL a key set is published at
    pub fn key_set_url(&self, issuer: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.codec.encode(issuer)
        )
    }

    /// Fetch an operator's key set (with caching)
    pub async fn get_key_set(&self, issuer: &str) -> Result<Arc<KeySet>> {
        if let Some(cached) = self.key_sets.get(issuer).await {
            debug!(issuer = %issuer, "Using cached key set");
            return Ok(cached);
        }

        let url = self.key_set_url(issuer);
        debug!(issuer = %issuer, url = %url, "Fetching key set");
        let body = self.get_text(&url).await?;

        let keys: KeySet = serde_json::from_str(&body).map_err(|e| BridgeError::InvalidBody {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        let keys = Arc::new(keys);

        self.key_sets.insert(issuer.to_string(), keys.clone()).await;
        Ok(keys)
    }

    /// Fetch a published compact token
    pub async fn get_statement(&self, uri: &str) -> Result<String> {
        debug!(uri = %uri, "Fetching statement");
        let body = self.get_text(uri).await?;
        let token = body.trim();
        if token.is_empty() || token.split('.').count() != 3 {
            return Err(BridgeError::InvalidBody {
                url: uri.to_string(),
                reason: "not a compact token".into(),
            });
        }
        Ok(token.to_string())
    }

    /// Drop a cached key set, forcing the next lookup to refetch
    pub async fn invalidate(&self, issuer: &str) {
        self.key_sets.invalidate(issuer).await;
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.http_client.get(url).send().await?;
        match response.status() {
            StatusCode::OK => Ok(response.text().await?),
            StatusCode::NOT_FOUND => Err(BridgeError::NotFound(url.to_string())),
            status => Err(BridgeError::UnexpectedStatus {
                url: url.to_string(),
                status: status.as_u16(),
            }),
        }
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch_key_set(&self, issuer: &str) -> std::result::Result<KeySet, FetchError> {
        Ok(self.get_key_set(issuer).await?.as_ref().clone())
    }

    async fn fetch_statement(&self, uri: &str) -> std::result::Result<String, FetchError> {
        Ok(self.get_statement(uri).await?)
    }
}
