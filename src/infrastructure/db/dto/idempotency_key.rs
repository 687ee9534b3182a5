use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct IdempotencyKeyRow {
    pub idempotency_key: String,
    pub job_id: uuid::Uuid,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

impl IdempotencyKeyRow {
    /// Whether the entry still binds its key at `now`.
    pub fn is_active(&self, now: OffsetDateTime) -> bool {
        self.expires_at > now
    }
}
