use std::sync::Arc;

use crate::infrastructure::db::database::Database;
use crate::infrastructure::db::memory::MemoryDatabase;
use crate::infrastructure::db::memory::idempotency_key_store_memory::IdempotencyKeyStoreMemory;
use crate::infrastructure::db::memory::job_store_memory::JobStoreMemory;
use crate::infrastructure::db::postgres::PostgresDatabase;
use crate::infrastructure::db::postgres::idempotency_key_store_postgres::IdempotencyKeyStorePostgres;
use crate::infrastructure::db::postgres::job_store_postgres::JobStorePostgres;
use crate::infrastructure::db::repositories::idempotency_key_repository::IdempotencyKeyRepository;
use crate::infrastructure::db::repositories::job_repository::JobRepository;

#[derive(Clone)]
pub struct Repositories {
    pub db: Arc<dyn Database>,
    pub job: Arc<JobRepository>,
    pub idempotency: Arc<IdempotencyKeyRepository>,
}

impl Repositories {
    /// Build all repositories backed by Postgres stores.
    pub fn postgres(db: Arc<PostgresDatabase>) -> Self {
        let job_store = Arc::new(JobStorePostgres::new(db.clone()));
        let id_store = Arc::new(IdempotencyKeyStorePostgres::new(db.clone()));

        Self {
            db,
            job: Arc::new(JobRepository::new(job_store)),
            idempotency: Arc::new(IdempotencyKeyRepository::new(id_store)),
        }
    }

    /// Build all repositories over one shared in-process database.
    pub fn memory() -> Self {
        let db = Arc::new(MemoryDatabase::new());
        let job_store = Arc::new(JobStoreMemory::new(db.clone()));
        let id_store = Arc::new(IdempotencyKeyStoreMemory::new(db.clone()));

        Self {
            db,
            job: Arc::new(JobRepository::new(job_store)),
            idempotency: Arc::new(IdempotencyKeyRepository::new(id_store)),
        }
    }
}
