use crate::infrastructure::storage::{ObjectStorage, StorageError, validate_key};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;

/// Stores objects as files under a root directory.
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    async fn put(&self, bytes: Vec<u8>, key_hint: &str) -> Result<String, StorageError> {
        validate_key(key_hint)?;
        let path = self.root.join(key_hint);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Io(e.to_string()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| StorageError::Io(e.to_string()))?;
        Ok(key_hint.to_string())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        validate_key(key)?;
        tokio::fs::read(self.root.join(key))
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => StorageError::NotFound(key.to_string()),
                _ => StorageError::Io(e.to_string()),
            })
    }
}
