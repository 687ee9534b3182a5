use crate::domain::entities::job::{Job, JobSpec, Priority};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitJobRequest {
    pub job_type: String,
    #[serde(default)]
    pub payload: Value,
    pub priority: Option<String>,
    pub dedup_key: Option<String>,
    pub notify_target: Option<String>,
}

impl SubmitJobRequest {
    /// Build the domain spec; fails on an unknown priority name.
    pub fn into_spec(self) -> Result<JobSpec, String> {
        let priority = match self.priority.as_deref() {
            None => Priority::default(),
            Some(raw) => Priority::parse(&raw.to_ascii_lowercase())
                .ok_or_else(|| format!("unknown priority `{raw}` (expected high, normal or low)"))?,
        };

        let mut spec = JobSpec::new(self.job_type, self.payload).with_priority(priority);
        if let Some(key) = self.dedup_key {
            spec = spec.with_dedup_key(key);
        }
        if let Some(target) = self.notify_target {
            spec = spec.with_notify_target(target);
        }
        Ok(spec)
    }
}

#[derive(Debug, Serialize)]
pub struct SubmitJobResponse {
    pub job_id: String,
    pub state: String,
    pub priority: String,
    /// `true` when the submission resolved to an existing job.
    pub deduplicated: bool,
    pub created_at: String,
}

impl SubmitJobResponse {
    pub fn new(job: &Job, deduplicated: bool) -> Self {
        Self {
            job_id: job.id.to_string(),
            state: job.state.as_str().to_string(),
            priority: job.priority.as_str().to_string(),
            deduplicated,
            created_at: job.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobStateResponse {
    pub job_id: String,
    pub state: String,
    pub cancel_requested: bool,
    pub updated_at: String,
}

impl JobStateResponse {
    pub fn new(job: &Job) -> Self {
        Self {
            job_id: job.id.to_string(),
            state: job.state.as_str().to_string(),
            cancel_requested: job.cancel_requested,
            updated_at: job.updated_at.to_rfc3339(),
        }
    }
}
