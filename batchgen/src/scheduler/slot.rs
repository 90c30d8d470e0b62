//! Slot worker: pulls jobs for one identity and drives them to completion.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::service::RunContext;
use crate::driver::AutomationDriver;
use crate::pipeline::{Acquire, BatchOutcome, FailureKind, JobDescriptor, JobOutcome, Release};

/// Why a slot worker stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotExit {
    /// Nothing eligible for this identity and nothing in flight.
    Drained,
    /// The session context became unusable.
    SessionLost,
    /// The owning session cancelled its slots.
    Cancelled,
}

pub(crate) struct SlotWorker<D: AutomationDriver> {
    ctx: Arc<RunContext<D>>,
    context: Arc<D::Context>,
    identity: String,
    label: String,
    cancel: CancellationToken,
}

impl<D: AutomationDriver> SlotWorker<D> {
    pub(crate) fn new(
        ctx: Arc<RunContext<D>>,
        context: Arc<D::Context>,
        identity: String,
        index: usize,
        cancel: CancellationToken,
    ) -> Self {
        let label = format!("{}/{}", identity, index);
        Self {
            ctx,
            context,
            identity,
            label,
            cancel,
        }
    }

    pub(crate) async fn run(self) -> SlotExit {
        debug!(slot = %self.label, "Slot started");

        loop {
            if self.cancel.is_cancelled() {
                return SlotExit::Cancelled;
            }

            let job = match self.ctx.queue.acquire(&self.identity) {
                Acquire::Job(job) => job,
                // A failing in-flight job may come back eligible for us.
                Acquire::Wait => {
                    tokio::select! {
                        _ = self.cancel.cancelled() => return SlotExit::Cancelled,
                        _ = self.ctx.queue.wait_for_change(self.ctx.config.poll_interval()) => {}
                    }
                    continue;
                }
                Acquire::Drained => {
                    debug!(slot = %self.label, "No eligible jobs left; slot exiting");
                    return SlotExit::Drained;
                }
            };

            info!(
                slot = %self.label,
                job = %job.key(),
                attempt = job.attempt_count + 1,
                mode = %job.payload.effective_mode,
                "Starting job"
            );

            if let Err(e) = self.ctx.layout.ensure_batch_dir(&job.batch_id).await {
                warn!(batch_id = %job.batch_id, error = %e, "Failed to create output directory");
            }
            let destination = self
                .ctx
                .layout
                .artifact_path(&job.batch_id, job.sequence_number);

            let outcome = self
                .ctx
                .runner
                .run(&self.context, &job, &destination, &self.label, &self.cancel)
                .await;

            match outcome {
                JobOutcome::Completed => {
                    self.ctx.queue.complete(&job);
                    self.ctx
                        .tracker
                        .record_outcome(&job.batch_id, BatchOutcome::Completed);
                }
                JobOutcome::Failed { kind, .. } => {
                    let reason = outcome.reason();
                    self.settle_failure(job, &reason).await;
                    if matches!(kind, FailureKind::Setup | FailureKind::Submit) {
                        let delay = self.ctx.config.setup_failure_delay();
                        tokio::select! {
                            _ = self.cancel.cancelled() => return SlotExit::Cancelled,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
                JobOutcome::SessionLost { .. } => {
                    let reason = outcome.reason();
                    self.settle_failure(job, &reason).await;
                    return SlotExit::SessionLost;
                }
                JobOutcome::Interrupted => {
                    let reason = outcome.reason();
                    self.settle_failure(job, &reason).await;
                    return SlotExit::Cancelled;
                }
            }
        }
    }

    /// Hand a failed job back to the queue, or record it as permanently failed.
    async fn settle_failure(&self, job: JobDescriptor, reason: &str) {
        let key = job.key();
        match self.ctx.queue.release(job, &self.identity, reason) {
            Release::Requeued { attempt_count } => {
                info!(
                    slot = %self.label,
                    job = %key,
                    attempts = attempt_count,
                    max_attempts = self.ctx.queue.max_attempts(),
                    reason = %reason,
                    "Job requeued"
                );
            }
            Release::Exhausted(job) => {
                error!(
                    slot = %self.label,
                    job = %job.key(),
                    attempts = job.attempt_count,
                    reason = %reason,
                    "Job failed permanently"
                );
                if let Err(e) = self.ctx.failure_sink.record(&job, reason).await {
                    warn!(job = %job.key(), error = %e, "Failed to write failure record");
                }
                self.ctx
                    .tracker
                    .record_outcome(&job.batch_id, BatchOutcome::Failed);
            }
        }
    }
}
