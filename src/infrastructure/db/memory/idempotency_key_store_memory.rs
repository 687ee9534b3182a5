use crate::infrastructure::db::dto::{IdempotencyKeyRow, JobRow};
use crate::infrastructure::db::memory::MemoryDatabase;
use crate::infrastructure::db::stores::idempotency_key_store::{
    IdempotencyKeyRepositoryError, IdempotencyKeyStore, KeyBinding,
};
use async_trait::async_trait;
use std::sync::Arc;
use time::OffsetDateTime;

#[derive(Clone)]
pub struct IdempotencyKeyStoreMemory {
    db: Arc<MemoryDatabase>,
}

impl IdempotencyKeyStoreMemory {
    /// Build an in-memory idempotency key store sharing tables with the job store.
    pub fn new(db: Arc<MemoryDatabase>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl IdempotencyKeyStore for IdempotencyKeyStoreMemory {
    async fn get_active(
        &self,
        idempotency_key: &str,
        now: OffsetDateTime,
    ) -> Result<Option<IdempotencyKeyRow>, IdempotencyKeyRepositoryError> {
        let tables = self.db.lock()?;
        Ok(tables
            .idempotency_keys
            .get(idempotency_key)
            .filter(|row| row.is_active(now))
            .cloned())
    }

    async fn bind_new_job(
        &self,
        key: &IdempotencyKeyRow,
        job: &JobRow,
    ) -> Result<KeyBinding, IdempotencyKeyRepositoryError> {
        // Step 1: Hold both tables for the whole check-and-insert.
        let mut tables = self.db.lock()?;

        // Step 2: An active binding wins.
        if let Some(existing) = tables.idempotency_keys.get(&key.idempotency_key)
            && existing.is_active(key.created_at)
        {
            return Ok(KeyBinding::Existing(existing.job_id));
        }
        if tables.jobs.contains_key(&job.id) {
            return Err(IdempotencyKeyRepositoryError::Conflict);
        }

        // Step 3: Insert the job and (re)bind the key.
        tables.jobs.insert(job.id, job.clone());
        tables
            .idempotency_keys
            .insert(key.idempotency_key.clone(), key.clone());

        Ok(KeyBinding::Created(job.clone()))
    }

    async fn purge_expired(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<u64, IdempotencyKeyRepositoryError> {
        let mut tables = self.db.lock()?;
        let expired: Vec<String> = tables
            .idempotency_keys
            .values()
            .filter(|row| !row.is_active(now))
            .take(limit as usize)
            .map(|row| row.idempotency_key.clone())
            .collect();
        for key in &expired {
            tables.idempotency_keys.remove(key);
        }
        Ok(expired.len() as u64)
    }
}
