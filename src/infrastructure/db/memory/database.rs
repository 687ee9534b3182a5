use crate::infrastructure::db::database::DatabaseError;
use crate::infrastructure::db::dto::{IdempotencyKeyRow, JobRow};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
pub(crate) struct MemoryTables {
    pub jobs: HashMap<uuid::Uuid, JobRow>,
    pub idempotency_keys: HashMap<String, IdempotencyKeyRow>,
}

/// Process-local stand-in for the Postgres database.
///
/// Both tables sit behind one lock so a job insert and its key binding are
/// observed together.
#[derive(Default)]
pub struct MemoryDatabase {
    tables: Mutex<MemoryTables>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, MemoryTables>, DatabaseError> {
        self.tables
            .lock()
            .map_err(|_| DatabaseError::Connection("memory_tables_poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl crate::infrastructure::db::database::Database for MemoryDatabase {
    async fn ping(&self) -> Result<(), DatabaseError> {
        self.lock().map(|_| ())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
