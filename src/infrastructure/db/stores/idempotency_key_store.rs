use crate::infrastructure::db::database::DatabaseError;
use crate::infrastructure::db::dto::{IdempotencyKeyRow, JobRow};
use async_trait::async_trait;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdempotencyKeyRepositoryError {
    NotFound,
    Conflict,
    InvalidInput,
    StorageUnavailable,
}

impl From<DatabaseError> for IdempotencyKeyRepositoryError {
    fn from(_: DatabaseError) -> Self {
        IdempotencyKeyRepositoryError::StorageUnavailable
    }
}

/// Result of binding a key to a freshly built job.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyBinding {
    /// The job was created and the key now points at it.
    Created(JobRow),
    /// An active entry already binds the key; nothing was written.
    Existing(uuid::Uuid),
}

#[async_trait]
pub trait IdempotencyKeyStore: Send + Sync {
    /// Fetch the active entry for `key`. Expired entries are ignored.
    async fn get_active(
        &self,
        idempotency_key: &str,
        now: OffsetDateTime,
    ) -> Result<Option<IdempotencyKeyRow>, IdempotencyKeyRepositoryError>;
    /// Create `job` and bind `key` to it as one indivisible step.
    ///
    /// If an active entry exists for the key, the job is not created and the
    /// bound job id is returned. An expired entry is replaced.
    async fn bind_new_job(
        &self,
        key: &IdempotencyKeyRow,
        job: &JobRow,
    ) -> Result<KeyBinding, IdempotencyKeyRepositoryError>;
    /// Delete entries that expired at or before `now`; returns how many.
    async fn purge_expired(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<u64, IdempotencyKeyRepositoryError>;
}
