use reqwest_retry::{self, RetryDecision, RetryPolicy};
use std::time::{Duration, SystemTime};

/// Waits the same amount of time before every retry.
///
/// for a max_n_retries of 2 and a wait_time of 5s
///
/// attempts are: attempt, 5s, attempt, 5s, attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct FixedIntervalRetry {
    /// Maximum number of allowed retries, not counting the first attempt.
    pub max_n_retries: u32,
    /// Fixed wait time between retries.
    pub wait_time: Duration,
}

impl FixedIntervalRetry {
    /// Policy allowing `max_attempts` attempts in total.
    pub fn for_attempts(max_attempts: u32, wait_time: Duration) -> Self {
        Self {
            max_n_retries: max_attempts.saturating_sub(1),
            wait_time,
        }
    }

    fn too_many_attempts(&self, n_past_retries: u32) -> bool {
        n_past_retries >= self.max_n_retries
    }
}

impl RetryPolicy for FixedIntervalRetry {
    fn should_retry(
        &self,
        _request_start_time: SystemTime,
        n_past_retries: u32,
    ) -> reqwest_retry::RetryDecision {
        if self.too_many_attempts(n_past_retries) {
            RetryDecision::DoNotRetry
        } else {
            let execute_after = SystemTime::now() + self.wait_time;
            RetryDecision::Retry { execute_after }
        }
    }
}
