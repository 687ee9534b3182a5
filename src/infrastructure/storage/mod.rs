pub mod local;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

pub use local::LocalStorage;
pub use memory::MemoryStorage;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("invalid storage key: {0}")]
    InvalidKey(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("storage io error: {0}")]
    Io(String),
}

/// Opaque object store for job results.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` under a key derived from `key_hint` and return the key.
    async fn put(&self, bytes: Vec<u8>, key_hint: &str) -> Result<String, StorageError>;
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;
}

/// Reject keys that could escape the storage root.
pub(crate) fn validate_key(key: &str) -> Result<(), StorageError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|part| part.is_empty() || part == "." || part == "..");
    if bad {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}
