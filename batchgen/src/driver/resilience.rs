//! Retry policy for individual driver steps.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::DriverError;

/// Configuration for retrying a single driver step (open, submit).
///
/// This is distinct from the job attempt budget: a step that still fails after
/// its retries fails the job attempt as a whole.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionRetryConfig {
    /// Maximum tries per step, including the first.
    pub max_attempts: u32,
    /// Delay between tries in milliseconds.
    pub delay_ms: u64,
}

impl Default for ActionRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 2000,
        }
    }
}

/// What to do after a step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after the delay.
    Retry(Duration),
    /// Block on reachability, then try again without consuming a try.
    WaitForNetwork,
    /// Stop and surface the error.
    GiveUp,
}

impl ActionRetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Check if another try should be made after `attempt` tries (1-based).
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Decide how to continue after the `attempt`-th try failed with `error`.
    pub fn decide(&self, attempt: u32, error: &DriverError) -> RetryDecision {
        if error.is_session_fatal() {
            RetryDecision::GiveUp
        } else if error.is_connectivity() {
            RetryDecision::WaitForNetwork
        } else if self.should_retry(attempt) {
            RetryDecision::Retry(self.delay())
        } else {
            RetryDecision::GiveUp
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_until_budget() {
        let config = ActionRetryConfig {
            max_attempts: 3,
            delay_ms: 10,
        };
        let err = DriverError::setup("button missing");

        assert_eq!(
            config.decide(1, &err),
            RetryDecision::Retry(Duration::from_millis(10))
        );
        assert_eq!(
            config.decide(2, &err),
            RetryDecision::Retry(Duration::from_millis(10))
        );
        assert_eq!(config.decide(3, &err), RetryDecision::GiveUp);
    }

    #[test]
    fn test_session_fatal_gives_up_immediately() {
        let config = ActionRetryConfig::default();
        let err = DriverError::SessionLost("browser exited".into());
        assert_eq!(config.decide(1, &err), RetryDecision::GiveUp);
    }

    #[test]
    fn test_connectivity_waits_for_network() {
        let config = ActionRetryConfig::default();
        let err = DriverError::Connectivity("offline".into());
        assert_eq!(config.decide(99, &err), RetryDecision::WaitForNetwork);
    }
}
