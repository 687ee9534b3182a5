use crate::domain::entities::job::FailureKind;
use time::Duration;

/// Outcome of a retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Put the job back in its lane once `delay` has elapsed.
    RequeueAfter(Duration),
    /// Stop retrying; the job fails with the given kind.
    Terminal(FailureKind),
}

/// Retry policy for jobs that can be re-queued after failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,
}

impl RetryPolicy {
    /// Decide what happens after a failed attempt.
    ///
    /// `attempt` is the attempt count including the one that just failed
    /// (1 after the first failure). The decision depends only on the inputs.
    pub fn decide(&self, attempt: u32, kind: FailureKind, jitter_seed: u64) -> RetryDecision {
        // Step 1: Deterministic bad input never gets another slot.
        if !kind.is_retryable() {
            return RetryDecision::Terminal(kind);
        }

        // Step 2: Enforce the attempt cap regardless of kind.
        if attempt >= self.max_attempts {
            return RetryDecision::Terminal(FailureKind::ExhaustedRetries);
        }

        // Step 3: Back off before the next attempt.
        RetryDecision::RequeueAfter(self.next_delay(attempt, jitter_seed))
    }

    /// Return the backoff delay for a given retry attempt.
    ///
    /// `attempt` is the retry number starting at 1 for the first retry.
    pub fn next_delay(&self, attempt: u32, jitter_seed: u64) -> Duration {
        // Step 1: Compute the exponential delay (2^(attempt-1)).
        let attempt = attempt.max(1);
        let raw = self
            .base_delay_ms
            .saturating_mul(2_u64.saturating_pow(attempt - 1));

        // Step 2: Cap at the max delay to avoid unbounded backoff.
        let capped = raw.min(self.max_delay_ms);

        // Step 3: Optionally add a bounded jitter to spread retries.
        if self.jitter_ms == 0 {
            return Duration::milliseconds(capped as i64);
        }

        let jitter = jitter_seed % self.jitter_ms;
        Duration::milliseconds(capped.saturating_add(jitter) as i64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 300_000,
            jitter_ms: 1_000,
        }
    }
}
