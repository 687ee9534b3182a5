use crate::infrastructure::storage::{ObjectStorage, StorageError, validate_key};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Keeps objects in process memory.
#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn put(&self, bytes: Vec<u8>, key_hint: &str) -> Result<String, StorageError> {
        validate_key(key_hint)?;
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| StorageError::Io("memory storage poisoned".to_string()))?;
        objects.insert(key_hint.to_string(), bytes);
        Ok(key_hint.to_string())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let objects = self
            .objects
            .lock()
            .map_err(|_| StorageError::Io("memory storage poisoned".to_string()))?;
        objects
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}
