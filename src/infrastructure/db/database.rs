use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("migration error: {0}")]
    Migration(String),
}

/// Backend-level operations that are not tied to one table.
#[async_trait]
pub trait Database: Send + Sync {
    /// Cheap round trip used by the health endpoint.
    async fn ping(&self) -> Result<(), DatabaseError>;
    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;
}
