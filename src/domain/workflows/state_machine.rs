use crate::domain::entities::job::JobState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    Forbidden { from: JobState, to: JobState },
}

pub struct JobStateMachine;

impl JobStateMachine {
    pub fn can_transition(from: JobState, to: JobState) -> bool {
        matches!(
            (from, to),
            (JobState::Pending, JobState::Running)
                | (JobState::Pending, JobState::Canceled)
                | (JobState::Pending, JobState::Failed)
                | (JobState::Running, JobState::Succeeded)
                | (JobState::Running, JobState::Retrying)
                | (JobState::Running, JobState::Failed)
                | (JobState::Running, JobState::Canceled)
                | (JobState::Retrying, JobState::Pending)
                | (JobState::Retrying, JobState::Canceled)
        )
    }

    pub fn transition(from: JobState, to: JobState) -> Result<JobState, TransitionError> {
        if Self::can_transition(from, to) {
            return Ok(to);
        }

        Err(TransitionError::Forbidden { from, to })
    }
}
