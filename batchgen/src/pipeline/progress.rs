//! Progress-aware job timeout.
//!
//! The deadline is measured from the last observed forward progress rather than
//! from job start. Before rendering starts the base timeout applies; once the
//! job has reached `Generating` the threshold doubles and stays doubled.

use std::time::Duration;
use tokio::time::Instant;

use crate::driver::PollStatus;

#[derive(Debug, Clone)]
pub struct ProgressTimeout {
    base: Duration,
    started_at: Instant,
    last_progress_at: Instant,
    reached_generating: bool,
    last_percent: Option<u8>,
    completed: bool,
}

impl ProgressTimeout {
    pub fn new(base: Duration, now: Instant) -> Self {
        Self {
            base,
            started_at: now,
            last_progress_at: now,
            reached_generating: false,
            last_percent: None,
            completed: false,
        }
    }

    /// Feed one poll result. Returns `true` if it counted as progress.
    ///
    /// Progress is the first `Generating`, a higher percentage than seen
    /// before, or `Complete`. Repeated identical `Generating` polls are not
    /// progress, so a render stuck at the same percentage still times out.
    pub fn observe(&mut self, status: PollStatus, now: Instant) -> bool {
        let progressed = match status {
            PollStatus::Generating { progress } => {
                if !self.reached_generating {
                    self.reached_generating = true;
                    self.last_percent = progress;
                    true
                } else if progress > self.last_percent {
                    self.last_percent = progress;
                    true
                } else {
                    false
                }
            }
            PollStatus::Complete => {
                self.completed = true;
                true
            }
            PollStatus::Pending | PollStatus::Failed | PollStatus::Unknown => false,
        };

        if progressed {
            self.last_progress_at = now;
        }
        progressed
    }

    /// Threshold currently in force.
    pub fn threshold(&self) -> Duration {
        if self.reached_generating {
            self.base * 2
        } else {
            self.base
        }
    }

    /// Exclude `duration` from the idle clock, for time the job could not be
    /// observed at all.
    pub fn pause_for(&mut self, duration: Duration) {
        self.last_progress_at += duration;
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_progress_at)
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    pub fn reached_generating(&self) -> bool {
        self.reached_generating
    }

    /// Whether the job should be forced to `Failed`.
    pub fn is_expired(&self, now: Instant) -> bool {
        !self.completed && self.idle_for(now) > self.threshold()
    }
}
