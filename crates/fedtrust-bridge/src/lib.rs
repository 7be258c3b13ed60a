//! Federation Bridge
//!
//! The HTTP side of key and statement resolution. Verifiers that meet a
//! signer whose key set is not in their bundle store, or a statement
//! published by reference, resolve it through an [`HttpFetcher`].
//!
//! ## Key fetch protocol
//!
//! ```text
//! GET {base_url}/{percent-encoded operator id}   -> 200, JWKS document
//! GET {statement uri}                            -> 200, compact token
//! ```
//!
//! Any other status, or a body that does not decode, is a fetch failure.
//!
//! ## Usage
//!
//! ```ignore
//! use fedtrust_bridge::{HttpFetcher, HttpFetcherConfig};
//!
//! let fetcher = HttpFetcher::new(HttpFetcherConfig::new("https://mds.example.org/v1/bundles"))?;
//! let operator = Operator::new(bundles, Arc::new(fetcher));
//! ```

pub mod error;
pub mod fetcher;

pub use error::{BridgeError, Result};
pub use fetcher::{HttpFetcher, HttpFetcherConfig};
