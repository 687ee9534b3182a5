use crate::infrastructure::db::database::DatabaseError;
use crate::infrastructure::db::dto::JobRow;
use async_trait::async_trait;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobRepositoryError {
    NotFound,
    /// The row changed since it was read (version mismatch).
    Conflict,
    InvalidInput,
    StorageUnavailable,
}

impl From<DatabaseError> for JobRepositoryError {
    fn from(_: DatabaseError) -> Self {
        JobRepositoryError::StorageUnavailable
    }
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Fetch a job by its ID. Returns `None` if it doesn't exist.
    async fn get(&self, job_id: uuid::Uuid) -> Result<Option<JobRow>, JobRepositoryError>;
    /// Write `row` if the stored version still equals `row.version`.
    ///
    /// Returns the stored row with its version bumped, `Conflict` when another
    /// writer got there first, or `NotFound`.
    async fn update(&self, row: &JobRow) -> Result<JobRow, JobRepositoryError>;
    /// List jobs in `state`, oldest first.
    async fn list_by_state(
        &self,
        state: &str,
        limit: u32,
    ) -> Result<Vec<JobRow>, JobRepositoryError>;
    /// List `retrying` jobs whose backoff has elapsed.
    async fn list_due_retries(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<JobRow>, JobRepositoryError>;
    /// List `running` jobs whose lease expired.
    async fn list_expired_leases(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<JobRow>, JobRepositoryError>;
}
