use crate::domain::entities::job::Job;
use crate::domain::value_objects::fingerprint::IdempotencyKey;
use crate::domain::value_objects::ids::JobId;
use crate::domain::value_objects::timestamps::Timestamp;
use crate::infrastructure::db::dto::{IdempotencyKeyRow, JobRow};
use crate::infrastructure::db::stores::idempotency_key_store::{
    IdempotencyKeyRepositoryError, IdempotencyKeyStore, KeyBinding,
};
use std::sync::Arc;
use time::Duration;

/// Outcome of an atomic create-and-bind.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundJob {
    Created(Job),
    Existing(JobId),
}

pub struct IdempotencyKeyRepository {
    store: Arc<dyn IdempotencyKeyStore>,
}

impl IdempotencyKeyRepository {
    /// Build a repository that uses the given store implementation.
    pub fn new(store: Arc<dyn IdempotencyKeyStore>) -> Self {
        Self { store }
    }

    /// Job currently bound to `key`, if the binding has not expired.
    pub async fn resolve(
        &self,
        key: &IdempotencyKey,
        now: Timestamp,
    ) -> Result<Option<JobId>, IdempotencyKeyRepositoryError> {
        let row = self
            .store
            .get_active(&key.as_storage_key(), now.as_inner())
            .await?;
        Ok(row.map(|r| JobId(r.job_id)))
    }

    /// Create `job` and bind `key` to it for `ttl`, unless the key is taken.
    pub async fn bind_new_job(
        &self,
        key: &IdempotencyKey,
        job: &Job,
        ttl: Duration,
    ) -> Result<BoundJob, IdempotencyKeyRepositoryError> {
        let row = IdempotencyKeyRow {
            idempotency_key: key.as_storage_key(),
            job_id: job.id.0,
            created_at: job.created_at.as_inner(),
            expires_at: job.created_at.plus(ttl).as_inner(),
        };

        match self.store.bind_new_job(&row, &JobRow::from_job(job)).await? {
            KeyBinding::Created(stored) => Ok(BoundJob::Created(stored.into_job())),
            KeyBinding::Existing(job_id) => Ok(BoundJob::Existing(JobId(job_id))),
        }
    }

    pub async fn purge_expired(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<u64, IdempotencyKeyRepositoryError> {
        self.store.purge_expired(now.as_inner(), limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::{BoundJob, IdempotencyKeyRepository};
    use crate::domain::entities::job::{Job, JobSpec};
    use crate::domain::value_objects::fingerprint::IdempotencyKey;
    use crate::domain::value_objects::ids::JobId;
    use crate::domain::value_objects::timestamps::Timestamp;
    use crate::infrastructure::db::dto::{IdempotencyKeyRow, JobRow};
    use crate::infrastructure::db::stores::idempotency_key_store::{
        IdempotencyKeyRepositoryError, IdempotencyKeyStore, KeyBinding,
    };
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use time::{Duration, OffsetDateTime};

    struct DummyStore {
        bound: Mutex<Option<IdempotencyKeyRow>>,
        existing: Mutex<Option<uuid::Uuid>>,
    }

    #[async_trait]
    impl IdempotencyKeyStore for DummyStore {
        async fn get_active(
            &self,
            _idempotency_key: &str,
            _now: OffsetDateTime,
        ) -> Result<Option<IdempotencyKeyRow>, IdempotencyKeyRepositoryError> {
            Ok(self.bound.lock().unwrap().clone())
        }

        async fn bind_new_job(
            &self,
            key: &IdempotencyKeyRow,
            job: &JobRow,
        ) -> Result<KeyBinding, IdempotencyKeyRepositoryError> {
            if let Some(existing) = *self.existing.lock().unwrap() {
                return Ok(KeyBinding::Existing(existing));
            }
            *self.bound.lock().unwrap() = Some(key.clone());
            Ok(KeyBinding::Created(job.clone()))
        }

        async fn purge_expired(
            &self,
            _now: OffsetDateTime,
            _limit: u32,
        ) -> Result<u64, IdempotencyKeyRepositoryError> {
            Err(IdempotencyKeyRepositoryError::StorageUnavailable)
        }
    }

    fn store() -> Arc<DummyStore> {
        Arc::new(DummyStore {
            bound: Mutex::new(None),
            existing: Mutex::new(None),
        })
    }

    fn job() -> Job {
        Job::admit(
            JobId::new(),
            JobSpec::new("t", json!({})).with_dedup_key("k1"),
            Timestamp::now_utc(),
        )
    }

    #[tokio::test]
    async fn given_free_key_when_bind_should_store_prefixed_key_with_ttl() {
        let store = store();
        let repo = IdempotencyKeyRepository::new(store.clone());
        let job = job();
        let key = IdempotencyKey::Explicit("k1".to_string());

        let bound = repo
            .bind_new_job(&key, &job, Duration::seconds(3600))
            .await
            .unwrap();

        assert_eq!(bound, BoundJob::Created(job.clone()));
        let row = store.bound.lock().unwrap().clone().unwrap();
        assert_eq!(row.idempotency_key, "key:k1");
        assert_eq!(row.expires_at - row.created_at, Duration::seconds(3600));
        assert_eq!(
            repo.resolve(&key, Timestamp::now_utc()).await.unwrap(),
            Some(job.id)
        );
    }

    #[tokio::test]
    async fn given_taken_key_when_bind_should_return_existing_id() {
        let store = store();
        let existing = uuid::Uuid::new_v4();
        *store.existing.lock().unwrap() = Some(existing);
        let repo = IdempotencyKeyRepository::new(store);

        let bound = repo
            .bind_new_job(
                &IdempotencyKey::Fingerprint("abc".to_string()),
                &job(),
                Duration::seconds(10),
            )
            .await
            .unwrap();

        assert_eq!(bound, BoundJob::Existing(JobId(existing)));
    }
}
