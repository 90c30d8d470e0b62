//! In-memory job queue shared by every slot worker.
//!
//! Ordering is FIFO-with-skip: `try_acquire` scans from the front and hands out
//! the first job the caller is allowed to run. Requeued jobs go to the back so
//! untried jobs are served before retries.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::coordination::{BatchOutcome, BatchTracker};
use super::job::{GenerationMode, JobDescriptor};
use crate::Result;

/// Why a job was removed from the queue without being run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The artifact is already present and overwriting is disabled.
    ArtifactExists(PathBuf),
    /// A required auxiliary asset could not be found.
    MissingAsset(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::ArtifactExists(path) => write!(f, "artifact exists at {}", path.display()),
            SkipReason::MissingAsset(name) => write!(f, "asset missing: {}", name),
        }
    }
}

/// Result of a precondition check on a queued job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Run the job with the resolved data attached.
    Ready {
        resolved_assets: Vec<PathBuf>,
        effective_mode: GenerationMode,
    },
    /// Drop the job permanently.
    Skip(SkipReason),
}

/// External precondition check evaluated while the queue is locked.
///
/// Implementations must not block on anything slower than a filesystem stat.
pub trait Preconditions: Send + Sync {
    fn check(&self, job: &JobDescriptor) -> Result<Readiness>;
}

/// Preconditions that accept every job as-is.
pub struct AcceptAll;

impl Preconditions for AcceptAll {
    fn check(&self, job: &JobDescriptor) -> Result<Readiness> {
        Ok(Readiness::Ready {
            resolved_assets: job.payload.resolved_assets.clone(),
            effective_mode: job.payload.effective_mode,
        })
    }
}

/// What `release` did with a failed job.
#[derive(Debug)]
pub enum Release {
    /// The job went back to the end of the queue.
    Requeued { attempt_count: u32 },
    /// The attempt budget is spent; the caller records the permanent failure.
    Exhausted(JobDescriptor),
}

/// Result of [`JobQueue::acquire`].
#[derive(Debug)]
pub enum Acquire {
    Job(JobDescriptor),
    /// Nothing eligible now, but jobs are in flight and may be requeued.
    Wait,
    /// Nothing eligible and nothing in flight.
    Drained,
}

/// Configuration for the job queue.
#[derive(Debug, Clone)]
pub struct JobQueueConfig {
    /// Maximum attempts per job, including the first.
    pub max_attempts: u32,
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<JobDescriptor>,
    /// Jobs handed out and not yet completed or released.
    in_flight: usize,
}

/// The job queue service.
pub struct JobQueue {
    config: JobQueueConfig,
    state: Mutex<QueueState>,
    /// Notified whenever a job is requeued or an in-flight job terminates.
    notify: Notify,
    tracker: Arc<BatchTracker>,
    preconditions: Arc<dyn Preconditions>,
    requeued: AtomicU64,
}

impl JobQueue {
    pub fn new(
        config: JobQueueConfig,
        tracker: Arc<BatchTracker>,
        preconditions: Arc<dyn Preconditions>,
    ) -> Self {
        Self {
            config,
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            tracker,
            preconditions,
            requeued: AtomicU64::new(0),
        }
    }

    /// Append jobs to the back of the queue.
    pub fn seed(&self, jobs: impl IntoIterator<Item = JobDescriptor>) {
        let mut state = self.state.lock();
        let before = state.pending.len();
        state.pending.extend(jobs);
        let added = state.pending.len() - before;
        drop(state);

        info!(added, "Seeded job queue");
        self.notify.notify_waiters();
    }

    /// Take the first job `identity` is eligible to run.
    ///
    /// Jobs that ban `identity` stay queued. Jobs failing their precondition are
    /// removed for good and counted as skipped. Returns `None` when nothing is
    /// eligible for this identity, even if the queue is not empty.
    pub fn try_acquire(&self, identity: &str) -> Option<JobDescriptor> {
        self.scan(identity).0
    }

    /// Like [`try_acquire`](Self::try_acquire), but tells an empty-handed
    /// caller whether a requeue could still make a job eligible for it.
    ///
    /// The in-flight count is read under the same lock as the scan.
    pub fn acquire(&self, identity: &str) -> Acquire {
        match self.scan(identity) {
            (Some(job), _) => Acquire::Job(job),
            (None, 0) => Acquire::Drained,
            (None, _) => Acquire::Wait,
        }
    }

    fn scan(&self, identity: &str) -> (Option<JobDescriptor>, usize) {
        let mut skipped: Vec<(JobDescriptor, SkipReason)> = Vec::new();

        let (acquired, in_flight) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let mut index = 0;
            let mut found = None;

            while index < state.pending.len() {
                let candidate = &state.pending[index];
                if candidate.is_excluded(identity) {
                    index += 1;
                    continue;
                }

                match self.preconditions.check(candidate) {
                    Ok(Readiness::Skip(reason)) => {
                        if let Some(job) = state.pending.remove(index) {
                            skipped.push((job, reason));
                        }
                    }
                    Ok(Readiness::Ready {
                        resolved_assets,
                        effective_mode,
                    }) => {
                        if let Some(mut job) = state.pending.remove(index) {
                            job.payload.resolved_assets = resolved_assets;
                            job.payload.effective_mode = effective_mode;
                            state.in_flight += 1;
                            found = Some(job);
                        }
                        break;
                    }
                    Err(e) => {
                        warn!(
                            job = %candidate.key(),
                            error = %e,
                            "Precondition check failed; leaving job queued"
                        );
                        index += 1;
                    }
                }
            }

            (found, state.in_flight)
        };

        for (job, reason) in skipped {
            info!(job = %job.key(), reason = %reason, "Skipped job");
            self.tracker.record_outcome(&job.batch_id, BatchOutcome::Skipped);
        }

        if let Some(job) = &acquired {
            debug!(
                job = %job.key(),
                identity = %identity,
                attempt = job.attempt_count + 1,
                "Dequeued job"
            );
        }

        (acquired, in_flight)
    }

    /// Mark an in-flight job as done successfully.
    pub fn complete(&self, job: &JobDescriptor) {
        self.finish_in_flight();
        debug!(job = %job.key(), "Job left the queue after success");
    }

    /// Hand a failed job back.
    ///
    /// Records the failed attempt and bans `identity` from the job. The job is
    /// requeued at the back while its attempt count stays below the budget;
    /// otherwise it is returned to the caller as exhausted.
    pub fn release(&self, mut job: JobDescriptor, identity: &str, reason: &str) -> Release {
        job.record_failure(identity, reason);
        let attempt_count = job.attempt_count;

        let result = {
            let mut state = self.state.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
            if attempt_count < self.config.max_attempts {
                state.pending.push_back(job);
                None
            } else {
                Some(job)
            }
        };
        self.notify.notify_waiters();

        match result {
            None => {
                self.requeued.fetch_add(1, Ordering::SeqCst);
                Release::Requeued { attempt_count }
            }
            Some(job) => Release::Exhausted(job),
        }
    }

    /// Remove every job still queued.
    pub fn drain_pending(&self) -> Vec<JobDescriptor> {
        let mut state = self.state.lock();
        state.pending.drain(..).collect()
    }

    /// Wait until the queue changes or `timeout` elapses.
    pub async fn wait_for_change(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.notify.notified()).await;
    }

    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }

    /// No job queued and none running.
    pub fn is_idle(&self) -> bool {
        let state = self.state.lock();
        state.pending.is_empty() && state.in_flight == 0
    }

    /// Number of requeues performed so far.
    pub fn requeued_count(&self) -> u64 {
        self.requeued.load(Ordering::SeqCst)
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    fn finish_in_flight(&self) {
        {
            let mut state = self.state.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        self.notify.notify_waiters();
    }
}
