//! Filesystem storage backend
//!
//! One file per entry, named by the codec-encoded identifier:
//!
//! ```text
//! <dir>/https%3A%2F%2Fswamid.sunet.se.jwks     key bundle (JWKS JSON)
//! <dir>/<encoded statement name>.jws           compact token
//! ```
//!
//! Writes go to a temporary file first and are renamed into place, so a
//! reader never sees a partially written entry.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::{KeyBundleStore, StatementStore, StorageError};
use crate::codec::{NameCodec, PercentCodec};
use crate::crypto::KeySet;

const BUNDLE_EXT: &str = "jwks";
const STATEMENT_EXT: &str = "jws";

/// A directory of codec-named files with a fixed extension
#[derive(Debug, Clone)]
struct NamedFiles {
    dir: PathBuf,
    ext: &'static str,
    codec: Arc<dyn NameCodec>,
}

impl NamedFiles {
    fn path_for(&self, name: &str) -> Result<PathBuf, StorageError> {
        let encoded = self.codec.encode(name);
        if encoded.is_empty() || encoded == "." || encoded == ".." {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        Ok(self.dir.join(format!("{}.{}", encoded, self.ext)))
    }

    async fn read(&self, name: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(name)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, name: &str, contents: &str) -> Result<(), StorageError> {
        let path = self.path_for(name)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let tmp = path.with_extension(format!("{}.tmp", self.ext));
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(path = %path.display(), "Wrote entry");
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<bool, StorageError> {
        let path = self.path_for(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<String>, StorageError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let suffix = format!(".{}", self.ext);
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some(encoded) = file_name.strip_suffix(&suffix) {
                names.push(self.codec.decode(encoded)?);
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Key bundles stored as JWKS files in a directory
#[derive(Debug, Clone)]
pub struct FsBundleStore {
    files: NamedFiles,
}

impl FsBundleStore {
    /// Store bundles under `dir` with percent-encoded file names
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_codec(dir, Arc::new(PercentCodec))
    }

    /// Store bundles under `dir` with a custom name codec
    pub fn with_codec(dir: impl Into<PathBuf>, codec: Arc<dyn NameCodec>) -> Self {
        Self {
            files: NamedFiles {
                dir: dir.into(),
                ext: BUNDLE_EXT,
                codec,
            },
        }
    }

    /// Directory holding the bundle files
    pub fn dir(&self) -> &Path {
        &self.files.dir
    }
}

#[async_trait]
impl KeyBundleStore for FsBundleStore {
    async fn get_bundle(&self, issuer: &str) -> Result<Option<KeySet>, StorageError> {
        match self.files.read(issuer).await? {
            Some(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            None => Ok(None),
        }
    }

    async fn put_bundle(&self, issuer: &str, keys: &KeySet) -> Result<(), StorageError> {
        let contents = serde_json::to_string_pretty(keys)?;
        self.files.write(issuer, &contents).await?;
        info!(issuer = %issuer, keys = keys.len(), "Stored key bundle");
        Ok(())
    }

    async fn remove_bundle(&self, issuer: &str) -> Result<bool, StorageError> {
        let removed = self.files.remove(issuer).await?;
        if removed {
            info!(issuer = %issuer, "Removed key bundle");
        }
        Ok(removed)
    }

    async fn list_issuers(&self) -> Result<Vec<String>, StorageError> {
        self.files.list().await
    }
}

/// Signed statements stored as compact-token files in a directory
#[derive(Debug, Clone)]
pub struct FsStatementStore {
    files: NamedFiles,
}

impl FsStatementStore {
    /// Store statements under `dir` with percent-encoded file names
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_codec(dir, Arc::new(PercentCodec))
    }

    /// Store statements under `dir` with a custom name codec
    pub fn with_codec(dir: impl Into<PathBuf>, codec: Arc<dyn NameCodec>) -> Self {
        Self {
            files: NamedFiles {
                dir: dir.into(),
                ext: STATEMENT_EXT,
                codec,
            },
        }
    }
}

#[async_trait]
impl StatementStore for FsStatementStore {
    async fn get_statement(&self, name: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .files
            .read(name)
            .await?
            .map(|token| token.trim().to_string()))
    }

    async fn put_statement(&self, name: &str, token: &str) -> Result<(), StorageError> {
        self.files.write(name, token).await?;
        info!(name = %name, "Stored signed statement");
        Ok(())
    }

    async fn list_statements(&self) -> Result<Vec<String>, StorageError> {
        self.files.list().await
    }
}
