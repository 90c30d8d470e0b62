//! Run counters and the end-of-run summary.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use crate::pipeline::BatchCounters;

/// Counters updated by session and slot workers.
#[derive(Debug)]
pub struct RunStats {
    started: Instant,
    sessions_launched: AtomicU64,
    sessions_lost: AtomicU64,
    launch_failures: AtomicU64,
    stranded: AtomicU64,
}

impl Default for RunStats {
    fn default() -> Self {
        Self {
            started: Instant::now(),
            sessions_launched: AtomicU64::new(0),
            sessions_lost: AtomicU64::new(0),
            launch_failures: AtomicU64::new(0),
            stranded: AtomicU64::new(0),
        }
    }
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn session_launched(&self) {
        self.sessions_launched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_lost(&self) {
        self.sessions_lost.fetch_add(1, Ordering::Relaxed);
    }

    pub fn launch_failed(&self) {
        self.launch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_stranded(&self) {
        self.stranded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sessions_launched(&self) -> u64 {
        self.sessions_launched.load(Ordering::Relaxed)
    }

    pub fn sessions_lost(&self) -> u64 {
        self.sessions_lost.load(Ordering::Relaxed)
    }

    pub fn launch_failures(&self) -> u64 {
        self.launch_failures.load(Ordering::Relaxed)
    }

    pub fn stranded(&self) -> u64 {
        self.stranded.load(Ordering::Relaxed)
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub totals: BatchCounters,
    pub requeued: u64,
    pub sessions_launched: u64,
    pub sessions_lost: u64,
    pub launch_failures: u64,
    /// Jobs failed at the end because no identity could still run them.
    pub stranded: u64,
    /// Batches that did not reach their finished state.
    pub unfinished_batches: Vec<String>,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn all_completed(&self) -> bool {
        self.totals.completed + self.totals.skipped == self.totals.total
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run finished in {}", format_elapsed(self.elapsed))?;
        writeln!(
            f,
            "  jobs: {} total, {} completed, {} failed, {} skipped",
            self.totals.total, self.totals.completed, self.totals.failed, self.totals.skipped
        )?;
        writeln!(
            f,
            "  retries: {} requeued, {} stranded",
            self.requeued, self.stranded
        )?;
        write!(
            f,
            "  sessions: {} launched, {} lost, {} failed to launch",
            self.sessions_launched, self.sessions_lost, self.launch_failures
        )?;
        if !self.unfinished_batches.is_empty() {
            write!(f, "\n  unfinished batches: {}", self.unfinished_batches.join(", "))?;
        }
        Ok(())
    }
}

/// Format a duration as `1h 2m 3s`, `2m 3s` or `3s`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
