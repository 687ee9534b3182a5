mod database;
pub mod idempotency_key_store_memory;
pub mod job_store_memory;

pub use database::MemoryDatabase;
