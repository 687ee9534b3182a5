pub mod factory;
pub mod idempotency_key_repository;
pub mod job_repository;

pub use factory::Repositories;
