use crate::infrastructure::db::dto::JobRow;
use crate::infrastructure::db::postgres::PostgresDatabase;
use crate::infrastructure::db::stores::job_store::{JobRepositoryError, JobStore};
use async_trait::async_trait;
use sqlx::PgConnection;
use time::OffsetDateTime;

pub(crate) const JOB_COLUMNS: &str = "id,
    job_type,
    payload,
    priority,
    dedup_key,
    notify_target,
    fingerprint,
    state,
    attempt,
    timings,
    result_key,
    result_metadata,
    failure_kind,
    failure_reason,
    last_error_kind,
    last_error_reason,
    lease_owner,
    lease_expires_at,
    heartbeat_at,
    retry_at,
    cancel_requested,
    version,
    created_at,
    updated_at";

#[derive(Clone)]
pub struct JobStorePostgres {
    db: std::sync::Arc<PostgresDatabase>,
}

impl JobStorePostgres {
    /// Build a Postgres-backed job store.
    pub fn new(db: std::sync::Arc<PostgresDatabase>) -> Self {
        Self { db }
    }

    async fn get_impl_conn(
        conn: &mut PgConnection,
        job_id: uuid::Uuid,
    ) -> Result<Option<JobRow>, JobRepositoryError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"
        ))
        .bind(job_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|_| JobRepositoryError::StorageUnavailable)?;

        Ok(row)
    }

    /// Insert a new row. Used inside the admission transaction.
    pub(crate) async fn insert_impl_conn(
        conn: &mut PgConnection,
        row: &JobRow,
    ) -> Result<JobRow, JobRepositoryError> {
        let stored = sqlx::query_as::<_, JobRow>(&format!(
            "INSERT INTO jobs ({JOB_COLUMNS})
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21,$22,$23,$24)
            RETURNING {JOB_COLUMNS}"
        ))
        .bind(row.id)
        .bind(&row.job_type)
        .bind(&row.payload)
        .bind(&row.priority)
        .bind(&row.dedup_key)
        .bind(&row.notify_target)
        .bind(&row.fingerprint)
        .bind(&row.state)
        .bind(row.attempt)
        .bind(&row.timings)
        .bind(&row.result_key)
        .bind(&row.result_metadata)
        .bind(&row.failure_kind)
        .bind(&row.failure_reason)
        .bind(&row.last_error_kind)
        .bind(&row.last_error_reason)
        .bind(&row.lease_owner)
        .bind(row.lease_expires_at)
        .bind(row.heartbeat_at)
        .bind(row.retry_at)
        .bind(row.cancel_requested)
        .bind(row.version)
        .bind(row.created_at)
        .bind(row.updated_at)
        .fetch_one(&mut *conn)
        .await
        .map_err(|_| JobRepositoryError::StorageUnavailable)?;

        Ok(stored)
    }

    async fn update_impl_conn(
        conn: &mut PgConnection,
        row: &JobRow,
    ) -> Result<JobRow, JobRepositoryError> {
        // Step 1: Write only if nobody else wrote since the row was read.
        let stored = sqlx::query_as::<_, JobRow>(&format!(
            "UPDATE jobs SET
                state = $3,
                attempt = $4,
                timings = $5,
                result_key = $6,
                result_metadata = $7,
                failure_kind = $8,
                failure_reason = $9,
                last_error_kind = $10,
                last_error_reason = $11,
                lease_owner = $12,
                lease_expires_at = $13,
                heartbeat_at = $14,
                retry_at = $15,
                cancel_requested = $16,
                updated_at = $17,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING {JOB_COLUMNS}"
        ))
        .bind(row.id)
        .bind(row.version)
        .bind(&row.state)
        .bind(row.attempt)
        .bind(&row.timings)
        .bind(&row.result_key)
        .bind(&row.result_metadata)
        .bind(&row.failure_kind)
        .bind(&row.failure_reason)
        .bind(&row.last_error_kind)
        .bind(&row.last_error_reason)
        .bind(&row.lease_owner)
        .bind(row.lease_expires_at)
        .bind(row.heartbeat_at)
        .bind(row.retry_at)
        .bind(row.cancel_requested)
        .bind(row.updated_at)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|_| JobRepositoryError::StorageUnavailable)?;

        if let Some(row) = stored {
            return Ok(row);
        }

        // Step 2: Tell a lost race apart from a missing row.
        match Self::get_impl_conn(conn, row.id).await? {
            Some(_) => Err(JobRepositoryError::Conflict),
            None => Err(JobRepositoryError::NotFound),
        }
    }

    async fn list_by_state_impl_conn(
        conn: &mut PgConnection,
        state: &str,
        limit: u32,
    ) -> Result<Vec<JobRow>, JobRepositoryError> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS}
            FROM jobs
            WHERE state = $1
            ORDER BY created_at ASC, id ASC
            LIMIT $2"
        ))
        .bind(state)
        .bind(limit as i64)
        .fetch_all(&mut *conn)
        .await
        .map_err(|_| JobRepositoryError::StorageUnavailable)?;

        Ok(rows)
    }

    async fn list_due_retries_impl_conn(
        conn: &mut PgConnection,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<JobRow>, JobRepositoryError> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS}
            FROM jobs
            WHERE state = 'retrying'
              AND retry_at IS NOT NULL
              AND retry_at <= $1
            ORDER BY retry_at ASC
            LIMIT $2"
        ))
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&mut *conn)
        .await
        .map_err(|_| JobRepositoryError::StorageUnavailable)?;

        Ok(rows)
    }

    async fn list_expired_leases_impl_conn(
        conn: &mut PgConnection,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<JobRow>, JobRepositoryError> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS}
            FROM jobs
            WHERE state = 'running'
              AND (lease_expires_at IS NULL OR lease_expires_at <= $1)
            ORDER BY lease_expires_at ASC NULLS FIRST
            LIMIT $2"
        ))
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&mut *conn)
        .await
        .map_err(|_| JobRepositoryError::StorageUnavailable)?;

        Ok(rows)
    }
}

#[async_trait]
impl JobStore for JobStorePostgres {
    async fn get(&self, job_id: uuid::Uuid) -> Result<Option<JobRow>, JobRepositoryError> {
        self.db
            .with_conn(move |conn| Box::pin(Self::get_impl_conn(conn, job_id)))
            .await
    }

    async fn update(&self, row: &JobRow) -> Result<JobRow, JobRepositoryError> {
        let row = row.clone();
        self.db
            .with_conn(move |conn| Box::pin(async move { Self::update_impl_conn(conn, &row).await }))
            .await
    }

    async fn list_by_state(
        &self,
        state: &str,
        limit: u32,
    ) -> Result<Vec<JobRow>, JobRepositoryError> {
        let state = state.to_string();
        self.db
            .with_conn(move |conn| {
                Box::pin(async move { Self::list_by_state_impl_conn(conn, &state, limit).await })
            })
            .await
    }

    async fn list_due_retries(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<JobRow>, JobRepositoryError> {
        self.db
            .with_conn(move |conn| Box::pin(Self::list_due_retries_impl_conn(conn, now, limit)))
            .await
    }

    async fn list_expired_leases(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<JobRow>, JobRepositoryError> {
        self.db
            .with_conn(move |conn| Box::pin(Self::list_expired_leases_impl_conn(conn, now, limit)))
            .await
    }
}
