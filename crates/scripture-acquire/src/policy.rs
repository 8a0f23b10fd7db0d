use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/127.0.6533.120 Safari/537.36";

/// Retry, pacing, and concurrency knobs for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPolicy {
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Total attempts for a chapter hitting transient failures.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for each further attempt.
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Extra fetches allowed for a chapter whose response looks malformed.
    pub malformed_retries: u32,
    /// Chapters in flight at once.
    pub workers: usize,
    /// Minimum spacing between any two requests in the run.
    pub min_interval: Duration,
    /// Consecutive failed/absent chapters that trigger a session check.
    pub session_failure_threshold: usize,
    pub user_agent: String,
}

impl FetchPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(15),
            max_attempts: 5,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            malformed_retries: 1,
            workers: 4,
            min_interval: Duration::from_millis(800),
            session_failure_threshold: 8,
            user_agent: USER_AGENT.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = FetchPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(4), Duration::from_secs(8));
        assert_eq!(policy.backoff(6), Duration::from_secs(30));
        assert_eq!(policy.backoff(40), Duration::from_secs(30));
    }
}
