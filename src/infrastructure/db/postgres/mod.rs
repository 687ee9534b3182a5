mod database;
pub mod idempotency_key_store_postgres;
pub mod job_store_postgres;

pub use database::PostgresDatabase;
