use crate::infrastructure::db::dto::JobRow;
use crate::infrastructure::db::memory::MemoryDatabase;
use crate::infrastructure::db::stores::job_store::{JobRepositoryError, JobStore};
use async_trait::async_trait;
use std::sync::Arc;
use time::OffsetDateTime;

#[derive(Clone)]
pub struct JobStoreMemory {
    db: Arc<MemoryDatabase>,
}

impl JobStoreMemory {
    /// Build an in-memory job store.
    pub fn new(db: Arc<MemoryDatabase>) -> Self {
        Self { db }
    }

    fn select<F>(&self, limit: u32, filter: F) -> Result<Vec<JobRow>, JobRepositoryError>
    where
        F: Fn(&JobRow) -> bool,
    {
        let tables = self.db.lock()?;
        let mut rows: Vec<JobRow> = tables.jobs.values().filter(|r| filter(r)).cloned().collect();
        rows.sort_by_key(|r| (r.created_at, r.id));
        rows.truncate(limit as usize);
        Ok(rows)
    }
}

#[async_trait]
impl JobStore for JobStoreMemory {
    async fn get(&self, job_id: uuid::Uuid) -> Result<Option<JobRow>, JobRepositoryError> {
        let tables = self.db.lock()?;
        Ok(tables.jobs.get(&job_id).cloned())
    }

    async fn update(&self, row: &JobRow) -> Result<JobRow, JobRepositoryError> {
        let mut tables = self.db.lock()?;
        let Some(current) = tables.jobs.get_mut(&row.id) else {
            return Err(JobRepositoryError::NotFound);
        };
        if current.version != row.version {
            return Err(JobRepositoryError::Conflict);
        }

        let mut stored = row.clone();
        stored.version += 1;
        *current = stored.clone();
        Ok(stored)
    }

    async fn list_by_state(
        &self,
        state: &str,
        limit: u32,
    ) -> Result<Vec<JobRow>, JobRepositoryError> {
        self.select(limit, |r| r.state == state)
    }

    async fn list_due_retries(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<JobRow>, JobRepositoryError> {
        self.select(limit, |r| {
            r.state == "retrying" && r.retry_at.is_some_and(|at| at <= now)
        })
    }

    async fn list_expired_leases(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<JobRow>, JobRepositoryError> {
        self.select(limit, |r| {
            r.state == "running" && r.lease_expires_at.is_none_or(|at| at <= now)
        })
    }
}
