use crate::infrastructure::db::dto::{IdempotencyKeyRow, JobRow};
use crate::infrastructure::db::postgres::PostgresDatabase;
use crate::infrastructure::db::postgres::job_store_postgres::JobStorePostgres;
use crate::infrastructure::db::stores::idempotency_key_store::{
    IdempotencyKeyRepositoryError, IdempotencyKeyStore, KeyBinding,
};
use async_trait::async_trait;
use sqlx::PgConnection;
use time::OffsetDateTime;

#[derive(Clone)]
pub struct IdempotencyKeyStorePostgres {
    db: std::sync::Arc<PostgresDatabase>,
}

impl IdempotencyKeyStorePostgres {
    /// Build a Postgres-backed idempotency key store.
    pub fn new(db: std::sync::Arc<PostgresDatabase>) -> Self {
        Self { db }
    }

    async fn get_active_impl_conn(
        conn: &mut PgConnection,
        idempotency_key: &str,
        now: OffsetDateTime,
    ) -> Result<Option<IdempotencyKeyRow>, IdempotencyKeyRepositoryError> {
        let row = sqlx::query_as::<_, IdempotencyKeyRow>(
            "SELECT
                idempotency_key,
                job_id,
                created_at,
                expires_at
            FROM idempotency_keys
            WHERE idempotency_key = $1 AND expires_at > $2",
        )
        .bind(idempotency_key)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|_| IdempotencyKeyRepositoryError::StorageUnavailable)?;

        Ok(row)
    }

    async fn bind_new_job_impl_conn(
        conn: &mut PgConnection,
        key: &IdempotencyKeyRow,
        job: &JobRow,
    ) -> Result<KeyBinding, IdempotencyKeyRepositoryError> {
        // Step 1: Claim the key; an expired binding is taken over, an active one is kept.
        let claimed = sqlx::query_scalar::<_, uuid::Uuid>(
            "INSERT INTO idempotency_keys (
                idempotency_key,
                job_id,
                created_at,
                expires_at
            )
            VALUES ($1,$2,$3,$4)
            ON CONFLICT (idempotency_key) DO UPDATE SET
                job_id = EXCLUDED.job_id,
                created_at = EXCLUDED.created_at,
                expires_at = EXCLUDED.expires_at
            WHERE idempotency_keys.expires_at <= EXCLUDED.created_at
            RETURNING job_id",
        )
        .bind(&key.idempotency_key)
        .bind(key.job_id)
        .bind(key.created_at)
        .bind(key.expires_at)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|_| IdempotencyKeyRepositoryError::StorageUnavailable)?;

        // Step 2: Someone else holds the key; report their job.
        if claimed.is_none() {
            let existing = sqlx::query_scalar::<_, uuid::Uuid>(
                "SELECT job_id FROM idempotency_keys WHERE idempotency_key = $1",
            )
            .bind(&key.idempotency_key)
            .fetch_one(&mut *conn)
            .await
            .map_err(|_| IdempotencyKeyRepositoryError::StorageUnavailable)?;
            return Ok(KeyBinding::Existing(existing));
        }

        // Step 3: Create the job in the same transaction.
        let stored = JobStorePostgres::insert_impl_conn(conn, job)
            .await
            .map_err(|_| IdempotencyKeyRepositoryError::StorageUnavailable)?;

        Ok(KeyBinding::Created(stored))
    }

    async fn purge_expired_impl_conn(
        conn: &mut PgConnection,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<u64, IdempotencyKeyRepositoryError> {
        let result = sqlx::query(
            "DELETE FROM idempotency_keys
            WHERE idempotency_key IN (
                SELECT idempotency_key
                FROM idempotency_keys
                WHERE expires_at <= $1
                LIMIT $2
            )",
        )
        .bind(now)
        .bind(limit as i64)
        .execute(&mut *conn)
        .await
        .map_err(|_| IdempotencyKeyRepositoryError::StorageUnavailable)?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl IdempotencyKeyStore for IdempotencyKeyStorePostgres {
    async fn get_active(
        &self,
        idempotency_key: &str,
        now: OffsetDateTime,
    ) -> Result<Option<IdempotencyKeyRow>, IdempotencyKeyRepositoryError> {
        let key = idempotency_key.to_string();
        self.db
            .with_conn(move |conn| {
                Box::pin(async move { Self::get_active_impl_conn(conn, &key, now).await })
            })
            .await
    }

    async fn bind_new_job(
        &self,
        key: &IdempotencyKeyRow,
        job: &JobRow,
    ) -> Result<KeyBinding, IdempotencyKeyRepositoryError> {
        let key = key.clone();
        let job = job.clone();
        self.db
            .with_tx(move |tx| {
                Box::pin(async move { Self::bind_new_job_impl_conn(&mut **tx, &key, &job).await })
            })
            .await
    }

    async fn purge_expired(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<u64, IdempotencyKeyRepositoryError> {
        self.db
            .with_conn(move |conn| Box::pin(Self::purge_expired_impl_conn(conn, now, limit)))
            .await
    }
}
