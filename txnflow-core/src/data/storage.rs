//! Blob store trait and structured storage errors.
//!
//! The BlobStore trait abstracts over object storage backends so the jobs can
//! run against a local directory, an in-memory map in tests, or a hosted
//! service. Names are `/`-separated paths relative to a container.

use super::fs_store::FsBlobStore;
use super::memory_store::MemoryBlobStore;
use thiserror::Error;

/// Structured error types for storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("container not found: {container}")]
    ContainerNotFound { container: String },

    #[error("blob not found: {container}/{name}")]
    BlobNotFound { container: String, name: String },

    #[error("invalid blob name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("storage I/O error on {target}: {source}")]
    Io {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported storage connection string: {0}")]
    UnsupportedConnection(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::BlobNotFound { .. })
    }
}

/// A listed blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobInfo {
    pub name: String,
    pub size: u64,
}

/// Trait for blob storage backends.
///
/// Container creation is idempotent. `put` overwrites. `copy` works within a
/// single container. None of these operations are transactional with respect
/// to each other.
pub trait BlobStore: Send + Sync {
    /// Human-readable description of the backend, for logs.
    fn describe(&self) -> String;

    /// Create the container if it doesn't exist. "Already exists" is success.
    fn ensure_container(&self, container: &str) -> Result<(), StorageError>;

    /// List blobs whose names start with `prefix`, sorted by name.
    fn list(&self, container: &str, prefix: &str) -> Result<Vec<BlobInfo>, StorageError>;

    fn get(&self, container: &str, name: &str) -> Result<Vec<u8>, StorageError>;

    /// Write a blob, replacing any existing one. Readers never observe a
    /// partially written blob.
    fn put(&self, container: &str, name: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Write a blob only if no blob with that name exists.
    ///
    /// Returns `false` without touching the existing blob when the name is
    /// taken. This is the store's only compare-and-swap primitive.
    fn put_if_absent(&self, container: &str, name: &str, data: &[u8])
        -> Result<bool, StorageError>;

    /// Copy `source` to `dest` inside one container, overwriting `dest`.
    fn copy(&self, container: &str, source: &str, dest: &str) -> Result<(), StorageError>;

    fn delete(&self, container: &str, name: &str) -> Result<(), StorageError>;

    fn exists(&self, container: &str, name: &str) -> Result<bool, StorageError>;
}

/// Open a store from a connection string.
///
/// - `file:///var/lib/txnflow` or a bare path → [`FsBlobStore`]
/// - `memory://` → [`MemoryBlobStore`] (state lives only as long as the process)
pub fn open_store(connection: &str) -> Result<Box<dyn BlobStore>, StorageError> {
    let connection = connection.trim();
    if connection.is_empty() {
        return Err(StorageError::UnsupportedConnection("empty".into()));
    }
    if let Some(path) = connection.strip_prefix("file://") {
        return Ok(Box::new(FsBlobStore::new(path)));
    }
    if connection == "memory://" {
        return Ok(Box::new(MemoryBlobStore::new()));
    }
    if connection.contains("://") || connection.contains('=') {
        let scheme = connection
            .split("://")
            .next()
            .filter(|s| !s.contains('='))
            .unwrap_or("key=value");
        return Err(StorageError::UnsupportedConnection(format!(
            "scheme '{scheme}' (expected file:// or memory://)"
        )));
    }
    Ok(Box::new(FsBlobStore::new(connection)))
}

/// Reject names that would escape the container or can't be mapped to a path.
pub(crate) fn validate_name(name: &str) -> Result<(), StorageError> {
    let invalid = |reason: &str| StorageError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    if name.is_empty() {
        return Err(invalid("empty"));
    }
    if name.starts_with('/') || name.contains('\\') {
        return Err(invalid("must be a relative '/'-separated path"));
    }
    if name
        .split('/')
        .any(|seg| seg.is_empty() || seg == "." || seg == "..")
    {
        return Err(invalid("empty, '.' or '..' path segment"));
    }
    Ok(())
}
