//! Name-safe encoding of operator identifiers
//!
//! Operator identifiers are URIs (`https://swamid.sunet.se`) and contain
//! characters that are not safe as a file name or URL path segment. Stores
//! and the HTTP fetch protocol use a reversible encoding so that the
//! original identifier can always be recovered exactly.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::fmt::Debug;

use crate::storage::StorageError;

/// Unreserved characters stay as they are, everything else is escaped
const NAME_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Bidirectional string encoding for store keys and path segments
pub trait NameCodec: Send + Sync + Debug {
    /// Encode an identifier into a name-safe string
    fn encode(&self, name: &str) -> String;

    /// Recover the identifier from its encoded form
    fn decode(&self, encoded: &str) -> Result<String, StorageError>;
}

/// Percent-encoding of every byte outside `[A-Za-z0-9-_.~]`
#[derive(Debug, Clone, Copy, Default)]
pub struct PercentCodec;

impl NameCodec for PercentCodec {
    fn encode(&self, name: &str) -> String {
        utf8_percent_encode(name, NAME_SAFE).to_string()
    }

    fn decode(&self, encoded: &str) -> Result<String, StorageError> {
        percent_decode_str(encoded)
            .decode_utf8()
            .map(|s| s.into_owned())
            .map_err(|e| StorageError::InvalidName(format!("{}: {}", encoded, e)))
    }
}
