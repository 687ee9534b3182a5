use crate::domain::entities::job::{
    Failure, FailureKind, Job, JobState, Priority, ResultRef, StageTimings,
};
use crate::domain::value_objects::ids::JobId;
use crate::domain::value_objects::timestamps::Timestamp;
use serde_json::Value;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct JobRow {
    pub id: uuid::Uuid,
    pub job_type: String,
    pub payload: Value,
    pub priority: String,
    pub dedup_key: Option<String>,
    pub notify_target: Option<String>,
    pub fingerprint: String,
    pub state: String,
    pub attempt: i32,
    pub timings: Value,
    pub result_key: Option<String>,
    pub result_metadata: Option<Value>,
    pub failure_kind: Option<String>,
    pub failure_reason: Option<String>,
    pub last_error_kind: Option<String>,
    pub last_error_reason: Option<String>,
    pub lease_owner: Option<String>,
    pub lease_expires_at: Option<OffsetDateTime>,
    pub heartbeat_at: Option<OffsetDateTime>,
    pub retry_at: Option<OffsetDateTime>,
    pub cancel_requested: bool,
    pub version: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

fn split_failure(failure: &Option<Failure>) -> (Option<String>, Option<String>) {
    match failure {
        Some(f) => (Some(f.kind.as_str().to_string()), Some(f.reason.clone())),
        None => (None, None),
    }
}

fn join_failure(kind: Option<String>, reason: Option<String>) -> Option<Failure> {
    let kind = FailureKind::parse(kind.as_deref()?)?;
    Some(Failure::new(kind, reason.unwrap_or_default()))
}

impl JobRow {
    pub fn from_job(job: &Job) -> Self {
        let (failure_kind, failure_reason) = split_failure(&job.failure);
        let (last_error_kind, last_error_reason) = split_failure(&job.last_error);
        Self {
            id: job.id.0,
            job_type: job.job_type.clone(),
            payload: job.payload.clone(),
            priority: job.priority.as_str().to_string(),
            dedup_key: job.dedup_key.clone(),
            notify_target: job.notify_target.clone(),
            fingerprint: job.fingerprint.clone(),
            state: job.state.as_str().to_string(),
            attempt: i32::try_from(job.attempt).unwrap_or(i32::MAX),
            timings: serde_json::to_value(&job.timings).unwrap_or(Value::Null),
            result_key: job.result.as_ref().map(|r| r.storage_key.clone()),
            result_metadata: job.result.as_ref().map(|r| r.metadata.clone()),
            failure_kind,
            failure_reason,
            last_error_kind,
            last_error_reason,
            lease_owner: job.lease_owner.clone(),
            lease_expires_at: job.lease_expires_at.map(|t| t.as_inner()),
            heartbeat_at: job.heartbeat_at.map(|t| t.as_inner()),
            retry_at: job.retry_at.map(|t| t.as_inner()),
            cancel_requested: job.cancel_requested,
            version: job.version,
            created_at: job.created_at.as_inner(),
            updated_at: job.updated_at.as_inner(),
        }
    }

    pub fn into_job(self) -> Job {
        let timings: StageTimings = serde_json::from_value(self.timings).unwrap_or_default();
        let result = self.result_key.map(|storage_key| ResultRef {
            storage_key,
            metadata: self.result_metadata.unwrap_or(Value::Null),
        });
        Job {
            id: JobId(self.id),
            job_type: self.job_type,
            payload: self.payload,
            priority: Priority::parse(&self.priority).unwrap_or_default(),
            dedup_key: self.dedup_key,
            notify_target: self.notify_target,
            fingerprint: self.fingerprint,
            state: JobState::parse(&self.state).unwrap_or(JobState::Failed),
            attempt: u32::try_from(self.attempt).unwrap_or(0),
            timings,
            result,
            failure: join_failure(self.failure_kind, self.failure_reason),
            last_error: join_failure(self.last_error_kind, self.last_error_reason),
            lease_owner: self.lease_owner,
            lease_expires_at: self.lease_expires_at.map(Timestamp::from),
            heartbeat_at: self.heartbeat_at.map(Timestamp::from),
            retry_at: self.retry_at.map(Timestamp::from),
            cancel_requested: self.cancel_requested,
            version: self.version,
            created_at: Timestamp::from(self.created_at),
            updated_at: Timestamp::from(self.updated_at),
        }
    }
}
