use crate::domain::entities::job::{Job, JobState};
use crate::domain::value_objects::ids::JobId;
use crate::domain::value_objects::timestamps::Timestamp;
use crate::infrastructure::db::dto::JobRow;
use crate::infrastructure::db::stores::job_store::{JobRepositoryError, JobStore};
use std::sync::Arc;

pub struct JobRepository {
    store: Arc<dyn JobStore>,
}

impl JobRepository {
    /// Build a repository that uses the given store implementation.
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Fetch a job by its ID. Returns `None` if it doesn't exist.
    pub async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobRepositoryError> {
        let row = self.store.get(job_id.0).await?;
        Ok(row.map(JobRow::into_job))
    }

    /// Persist `job` if it is still at the version it was read at.
    ///
    /// The returned job carries the new version.
    pub async fn update(&self, job: &Job) -> Result<Job, JobRepositoryError> {
        let stored = self.store.update(&JobRow::from_job(job)).await?;
        Ok(stored.into_job())
    }

    pub async fn list_by_state(
        &self,
        state: JobState,
        limit: u32,
    ) -> Result<Vec<Job>, JobRepositoryError> {
        let rows = self.store.list_by_state(state.as_str(), limit).await?;
        Ok(rows.into_iter().map(JobRow::into_job).collect())
    }

    /// Retrying jobs whose backoff elapsed at `now`.
    pub async fn list_due_retries(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<Job>, JobRepositoryError> {
        let rows = self.store.list_due_retries(now.as_inner(), limit).await?;
        Ok(rows.into_iter().map(JobRow::into_job).collect())
    }

    /// Running jobs whose lease expired at `now`.
    pub async fn list_expired_leases(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<Job>, JobRepositoryError> {
        let rows = self.store.list_expired_leases(now.as_inner(), limit).await?;
        Ok(rows.into_iter().map(JobRow::into_job).collect())
    }
}
