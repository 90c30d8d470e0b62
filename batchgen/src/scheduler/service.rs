//! Scheduler service: seeds the queue, runs the two-level worker pool and
//! settles whatever is left when the workers are done.

use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::session::{IdentityPool, run_outer_worker};
use super::stats::{RunStats, RunSummary, format_elapsed};
use crate::config::SchedulerConfig;
use crate::driver::{AutomationDriver, ConnectivityGate, Identity};
use crate::pipeline::{
    BatchOutcome, BatchTracker, JobDescriptor, JobQueue, JobQueueConfig, JobRunner, Preconditions,
};
use crate::storage::{ArtifactLayout, FailureSink};

/// Reason recorded for jobs left queued once every worker has stopped.
const STRANDED_REASON: &str = "no remaining identity is eligible to run this job";

/// State shared by every worker of a run.
pub(crate) struct RunContext<D: AutomationDriver> {
    pub(crate) driver: Arc<D>,
    pub(crate) config: SchedulerConfig,
    pub(crate) queue: Arc<JobQueue>,
    pub(crate) tracker: Arc<BatchTracker>,
    pub(crate) layout: ArtifactLayout,
    pub(crate) runner: JobRunner<D>,
    pub(crate) gate: Arc<ConnectivityGate>,
    pub(crate) failure_sink: Arc<dyn FailureSink>,
    pub(crate) stats: RunStats,
}

/// Multiplexes queued jobs over identities (sessions) and slots.
pub struct Scheduler<D: AutomationDriver> {
    ctx: Arc<RunContext<D>>,
}

impl<D: AutomationDriver> Scheduler<D> {
    pub fn new(
        driver: Arc<D>,
        config: SchedulerConfig,
        layout: ArtifactLayout,
        tracker: Arc<BatchTracker>,
        preconditions: Arc<dyn Preconditions>,
        failure_sink: Arc<dyn FailureSink>,
    ) -> Self {
        let queue = Arc::new(JobQueue::new(
            JobQueueConfig {
                max_attempts: config.max_attempts,
            },
            tracker.clone(),
            preconditions,
        ));
        let gate = Arc::new(ConnectivityGate::new(config.connectivity_retry_delay()));
        let runner = JobRunner::new(driver.clone(), gate.clone(), config.lifecycle());

        Self {
            ctx: Arc::new(RunContext {
                driver,
                config,
                queue,
                tracker,
                layout,
                runner,
                gate,
                failure_sink,
                stats: RunStats::new(),
            }),
        }
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.ctx.queue
    }

    pub fn tracker(&self) -> &Arc<BatchTracker> {
        &self.ctx.tracker
    }

    /// Register each batch's job count and enqueue the jobs in order.
    pub fn seed(&self, jobs: Vec<JobDescriptor>) {
        let mut totals: BTreeMap<&str, u32> = BTreeMap::new();
        for job in &jobs {
            *totals.entry(job.batch_id.as_str()).or_default() += 1;
        }
        for (batch_id, total) in &totals {
            self.ctx.tracker.register(batch_id, *total);
        }
        info!(batches = totals.len(), jobs = jobs.len(), "Registered batches");
        self.ctx.queue.seed(jobs);
    }

    /// Run until every seeded job has reached a terminal outcome.
    pub async fn run(&self, identities: Vec<Identity>) -> RunSummary {
        let sessions = self.ctx.config.effective_sessions(identities.len());
        info!(
            identities = identities.len(),
            sessions,
            slots_per_session = self.ctx.config.max_slots_per_session,
            queued = self.ctx.queue.len(),
            "Starting run"
        );
        if sessions == 0 {
            warn!("No identities available; nothing can run");
        }

        let pool: IdentityPool = Arc::new(Mutex::new(VecDeque::from(identities)));
        let cancel = CancellationToken::new();
        let status_task = self.spawn_status_reporter(cancel.clone());

        let mut workers = JoinSet::new();
        for index in 0..sessions {
            workers.spawn(run_outer_worker(
                self.ctx.clone(),
                pool.clone(),
                index,
                cancel.clone(),
            ));
        }
        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Session worker panicked");
            }
        }

        cancel.cancel();
        if let Some(handle) = status_task {
            let _ = handle.await;
        }

        self.drain_stranded().await;
        let summary = self.summary();
        info!(
            elapsed = %format_elapsed(summary.elapsed),
            completed = summary.totals.completed,
            failed = summary.totals.failed,
            skipped = summary.totals.skipped,
            "Run finished"
        );
        summary
    }

    /// Fail every job still queued so its batch can finish.
    async fn drain_stranded(&self) {
        let stranded = self.ctx.queue.drain_pending();
        if stranded.is_empty() {
            return;
        }
        warn!(count = stranded.len(), "Jobs left without an eligible identity");

        for job in stranded {
            warn!(
                job = %job.key(),
                attempts = job.attempt_count,
                excluded = ?job.excluded_workers,
                "Job stranded"
            );
            if let Err(e) = self.ctx.failure_sink.record(&job, STRANDED_REASON).await {
                warn!(job = %job.key(), error = %e, "Failed to write failure record");
            }
            self.ctx.stats.job_stranded();
            self.ctx
                .tracker
                .record_outcome(&job.batch_id, BatchOutcome::Failed);
        }
    }

    fn spawn_status_reporter(
        &self,
        cancel: CancellationToken,
    ) -> Option<tokio::task::JoinHandle<()>> {
        let period = self.ctx.config.status_interval()?;
        let ctx = self.ctx.clone();

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let totals = ctx.tracker.totals();
                        info!(
                            elapsed = %format_elapsed(ctx.stats.elapsed()),
                            queued = ctx.queue.len(),
                            in_flight = ctx.queue.in_flight(),
                            completed = totals.completed,
                            failed = totals.failed,
                            skipped = totals.skipped,
                            total = totals.total,
                            online = ctx.gate.is_online(),
                            "Progress"
                        );
                    }
                }
            }
        }))
    }

    pub fn summary(&self) -> RunSummary {
        let mut unfinished = self.ctx.tracker.unfinished();
        unfinished.sort();
        RunSummary {
            totals: self.ctx.tracker.totals(),
            requeued: self.ctx.queue.requeued_count(),
            sessions_launched: self.ctx.stats.sessions_launched(),
            sessions_lost: self.ctx.stats.sessions_lost(),
            launch_failures: self.ctx.stats.launch_failures(),
            stranded: self.ctx.stats.stranded(),
            unfinished_batches: unfinished,
            elapsed: self.ctx.stats.elapsed(),
        }
    }
}
