use crate::domain::value_objects::fingerprint::{IdempotencyKey, fingerprint};
use crate::domain::value_objects::ids::JobId;
use crate::domain::value_objects::timestamps::Timestamp;
use crate::domain::workflows::retry_policy::RetryDecision;
use crate::domain::workflows::state_machine::{JobStateMachine, TransitionError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const MAX_JOB_TYPE_LEN: usize = 128;
pub const MAX_DEDUP_KEY_LEN: usize = 256;

/// Stage name → elapsed milliseconds.
pub type StageTimings = BTreeMap<String, f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Priority {
    /// Lanes in service order.
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Normal, Priority::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "high" => Some(Priority::High),
            "normal" => Some(Priority::Normal),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }

    /// Lane index, 0 being the most urgent.
    pub fn lane(&self) -> usize {
        match self {
            Priority::High => 0,
            Priority::Normal => 1,
            Priority::Low => 2,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Retrying,
    Succeeded,
    Failed,
    Canceled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Retrying => "retrying",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Canceled => "canceled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(JobState::Pending),
            "running" => Some(JobState::Running),
            "retrying" => Some(JobState::Retrying),
            "succeeded" => Some(JobState::Succeeded),
            "failed" => Some(JobState::Failed),
            "canceled" => Some(JobState::Canceled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Canceled
        )
    }
}

/// Declared classification of a failure. Retry decisions are made from the
/// kind alone, never from the error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Storage or other transient resource error.
    Infrastructure,
    /// Deterministically bad input.
    InvalidInput,
    /// No runner is registered for the job type.
    UnknownJobType,
    /// The claiming worker stopped heartbeating.
    LostWorker,
    /// Retryable failures kept recurring up to the attempt cap.
    ExhaustedRetries,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Infrastructure => "infrastructure",
            FailureKind::InvalidInput => "invalid_input",
            FailureKind::UnknownJobType => "unknown_job_type",
            FailureKind::LostWorker => "lost_worker",
            FailureKind::ExhaustedRetries => "exhausted_retries",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "infrastructure" => Some(FailureKind::Infrastructure),
            "invalid_input" => Some(FailureKind::InvalidInput),
            "unknown_job_type" => Some(FailureKind::UnknownJobType),
            "lost_worker" => Some(FailureKind::LostWorker),
            "exhausted_retries" => Some(FailureKind::ExhaustedRetries),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::Infrastructure | FailureKind::LostWorker)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub reason: String,
}

impl Failure {
    pub fn new(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

/// Where the result of a succeeded job lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRef {
    pub storage_key: String,
    pub metadata: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobValidationError {
    EmptyJobType,
    InvalidJobType,
    InvalidDedupKey,
    PayloadTooLarge { size: usize, limit: usize },
}

impl JobValidationError {
    pub fn message(&self) -> String {
        match self {
            JobValidationError::EmptyJobType => "job_type is required".to_string(),
            JobValidationError::InvalidJobType => format!(
                "job_type must be at most {MAX_JOB_TYPE_LEN} characters of [A-Za-z0-9._-]"
            ),
            JobValidationError::InvalidDedupKey => {
                format!("dedup_key must be 1..={MAX_DEDUP_KEY_LEN} characters")
            }
            JobValidationError::PayloadTooLarge { size, limit } => {
                format!("payload is {size} bytes, limit is {limit}")
            }
        }
    }
}

/// A submission as received from the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    pub job_type: String,
    pub payload: Value,
    pub priority: Priority,
    pub dedup_key: Option<String>,
    pub notify_target: Option<String>,
}

impl JobSpec {
    pub fn new(job_type: impl Into<String>, payload: Value) -> Self {
        Self {
            job_type: job_type.into(),
            payload,
            priority: Priority::Normal,
            dedup_key: None,
            notify_target: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dedup_key(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = Some(key.into());
        self
    }

    pub fn with_notify_target(mut self, target: impl Into<String>) -> Self {
        self.notify_target = Some(target.into());
        self
    }

    /// Check the shape of the submission. Does not consult the registry.
    pub fn validate(&self, max_payload_bytes: usize) -> Result<(), JobValidationError> {
        // Step 1: Job type must be a non-empty identifier.
        if self.job_type.is_empty() {
            return Err(JobValidationError::EmptyJobType);
        }
        let valid_chars = self
            .job_type
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if self.job_type.len() > MAX_JOB_TYPE_LEN || !valid_chars {
            return Err(JobValidationError::InvalidJobType);
        }

        // Step 2: A dedup key, when given, must be usable as an index key.
        if let Some(key) = &self.dedup_key
            && (key.is_empty() || key.len() > MAX_DEDUP_KEY_LEN)
        {
            return Err(JobValidationError::InvalidDedupKey);
        }

        // Step 3: Bound the payload size.
        let size = serde_json::to_vec(&self.payload)
            .map(|bytes| bytes.len())
            .unwrap_or(usize::MAX);
        if size > max_payload_bytes {
            return Err(JobValidationError::PayloadTooLarge {
                size,
                limit: max_payload_bytes,
            });
        }

        Ok(())
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(&self.job_type, &self.payload, self.dedup_key.as_deref())
    }

    /// The key this submission is deduplicated under.
    pub fn idempotency_key(&self) -> IdempotencyKey {
        match &self.dedup_key {
            Some(key) => IdempotencyKey::Explicit(key.clone()),
            None => IdempotencyKey::Fingerprint(self.fingerprint()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub job_type: String,
    pub payload: Value,
    pub priority: Priority,
    pub dedup_key: Option<String>,
    pub notify_target: Option<String>,
    pub fingerprint: String,
    pub state: JobState,
    pub attempt: u32,
    pub timings: StageTimings,
    pub result: Option<ResultRef>,
    pub failure: Option<Failure>,
    /// Most recent retryable failure; kept internal.
    pub last_error: Option<Failure>,
    pub lease_owner: Option<String>,
    pub lease_expires_at: Option<Timestamp>,
    pub heartbeat_at: Option<Timestamp>,
    pub retry_at: Option<Timestamp>,
    pub cancel_requested: bool,
    /// Optimistic concurrency token; the store bumps it on every write.
    pub version: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Job {
    /// Build a freshly admitted job in `Pending`.
    pub fn admit(id: JobId, spec: JobSpec, now: Timestamp) -> Self {
        let fingerprint = spec.fingerprint();
        Self {
            id,
            job_type: spec.job_type,
            payload: spec.payload,
            priority: spec.priority,
            dedup_key: spec.dedup_key,
            notify_target: spec.notify_target,
            fingerprint,
            state: JobState::Pending,
            attempt: 0,
            timings: StageTimings::new(),
            result: None,
            failure: None,
            last_error: None,
            lease_owner: None,
            lease_expires_at: None,
            heartbeat_at: None,
            retry_at: None,
            cancel_requested: false,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn move_to(&mut self, next: JobState, now: Timestamp) -> Result<(), TransitionError> {
        self.state = JobStateMachine::transition(self.state, next)?;
        self.updated_at = now;
        Ok(())
    }

    fn clear_lease(&mut self) {
        self.lease_owner = None;
        self.lease_expires_at = None;
        self.heartbeat_at = None;
    }

    /// Whether `worker_id` still holds a live claim on this job.
    pub fn is_claimed_by(&self, worker_id: &str) -> bool {
        self.state == JobState::Running && self.lease_owner.as_deref() == Some(worker_id)
    }

    pub fn lease_expired(&self, now: Timestamp) -> bool {
        self.state == JobState::Running
            && self.lease_expires_at.is_none_or(|expires| expires <= now)
    }

    /// `Pending → Running` under a lease owned by `worker_id`.
    pub fn claim(
        &mut self,
        worker_id: &str,
        lease_expires_at: Timestamp,
        now: Timestamp,
    ) -> Result<(), TransitionError> {
        self.move_to(JobState::Running, now)?;
        self.lease_owner = Some(worker_id.to_string());
        self.lease_expires_at = Some(lease_expires_at);
        self.heartbeat_at = Some(now);
        Ok(())
    }

    pub fn heartbeat(&mut self, lease_expires_at: Timestamp, now: Timestamp) {
        self.heartbeat_at = Some(now);
        self.lease_expires_at = Some(lease_expires_at);
    }

    /// `Running → Succeeded` with the full timing map and result reference.
    pub fn succeed(
        &mut self,
        timings: StageTimings,
        result: ResultRef,
        now: Timestamp,
    ) -> Result<(), TransitionError> {
        self.move_to(JobState::Succeeded, now)?;
        self.clear_lease();
        self.timings = timings;
        self.result = Some(result);
        self.last_error = None;
        Ok(())
    }

    /// `Running → Retrying | Failed` according to the retry decision.
    ///
    /// The attempt count is bumped in both cases.
    pub fn record_failure(
        &mut self,
        failure: Failure,
        decision: RetryDecision,
        now: Timestamp,
    ) -> Result<(), TransitionError> {
        match decision {
            RetryDecision::RequeueAfter(delay) => {
                self.move_to(JobState::Retrying, now)?;
                self.retry_at = Some(now.plus(delay));
                self.last_error = Some(failure);
            }
            RetryDecision::Terminal(kind) => {
                self.move_to(JobState::Failed, now)?;
                self.failure = Some(Failure::new(kind, failure.reason));
                self.retry_at = None;
            }
        }
        self.attempt = self.attempt.saturating_add(1);
        self.clear_lease();
        Ok(())
    }

    /// `Pending → Failed` without consuming an attempt.
    pub fn reject(&mut self, failure: Failure, now: Timestamp) -> Result<(), TransitionError> {
        self.move_to(JobState::Failed, now)?;
        self.failure = Some(failure);
        Ok(())
    }

    /// `Retrying → Pending` once the backoff has elapsed.
    pub fn promote(&mut self, now: Timestamp) -> Result<(), TransitionError> {
        self.move_to(JobState::Pending, now)?;
        self.retry_at = None;
        Ok(())
    }

    pub fn cancel(&mut self, now: Timestamp) -> Result<(), TransitionError> {
        self.move_to(JobState::Canceled, now)?;
        self.clear_lease();
        self.retry_at = None;
        Ok(())
    }
}
