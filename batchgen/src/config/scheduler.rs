//! Scheduler tuning.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::driver::{ActionRetryConfig, ConnectivityConfig};
use crate::pipeline::{GenerationMode, LifecycleConfig};

/// Configuration consumed by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Outer pool cap. `0` runs one session per identity.
    pub max_concurrent_sessions: usize,
    /// Concurrent slots (tabs) per session.
    pub max_slots_per_session: usize,
    /// Attempt budget per job, including the first.
    pub max_attempts: u32,
    /// Base of the progress timeout in seconds.
    pub base_timeout_secs: u64,
    /// Status poll interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Regenerate jobs whose artifact already exists.
    pub overwrite_existing: bool,
    /// Batch-wide generation mode.
    pub generation_mode: GenerationMode,
    pub connectivity: ConnectivityConfig,
    pub action_retry: ActionRetryConfig,
    /// Pause of a slot after a job failed during setup, in milliseconds.
    pub setup_failure_delay_ms: u64,
    /// Delay between starting the slots of one session, in milliseconds.
    pub slot_start_stagger_ms: u64,
    /// Interval of the periodic progress log in seconds (`0` disables it).
    pub status_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: 0,
            max_slots_per_session: 2,
            max_attempts: 3,
            base_timeout_secs: 300,
            poll_interval_ms: 1000,
            overwrite_existing: true,
            generation_mode: GenerationMode::TextToVideo,
            connectivity: ConnectivityConfig::default(),
            action_retry: ActionRetryConfig::default(),
            setup_failure_delay_ms: 2000,
            slot_start_stagger_ms: 2000,
            status_interval_secs: 30,
        }
    }
}

impl SchedulerConfig {
    pub fn base_timeout(&self) -> Duration {
        Duration::from_secs(self.base_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn connectivity_retry_delay(&self) -> Duration {
        Duration::from_millis(self.connectivity.retry_delay_ms)
    }

    pub fn setup_failure_delay(&self) -> Duration {
        Duration::from_millis(self.setup_failure_delay_ms)
    }

    pub fn slot_start_stagger(&self) -> Duration {
        Duration::from_millis(self.slot_start_stagger_ms)
    }

    pub fn status_interval(&self) -> Option<Duration> {
        (self.status_interval_secs > 0).then(|| Duration::from_secs(self.status_interval_secs))
    }

    /// Number of session workers for `identity_count` identities.
    ///
    /// Fewer identities than the cap silently lowers concurrency.
    pub fn effective_sessions(&self, identity_count: usize) -> usize {
        if self.max_concurrent_sessions == 0 {
            identity_count
        } else {
            self.max_concurrent_sessions.min(identity_count)
        }
    }

    pub fn lifecycle(&self) -> LifecycleConfig {
        LifecycleConfig {
            base_timeout: self.base_timeout(),
            poll_interval: self.poll_interval(),
            action_retry: self.action_retry.clone(),
        }
    }
}
