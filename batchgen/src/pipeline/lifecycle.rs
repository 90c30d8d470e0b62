//! Per-job lifecycle: setup, monitoring with a progress-aware timeout, and
//! artifact retrieval.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::job::JobDescriptor;
use super::progress::ProgressTimeout;
use crate::driver::{
    ActionRetryConfig, AutomationDriver, ConnectivityGate, DriverError, PollStatus, RetryDecision,
};

/// Lifecycle state of the job bound to a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    /// Dequeued, not generating yet.
    Pending,
    Generating,
    Complete,
    Failed,
    /// The driver raised a non-connectivity error.
    Error,
}

impl SlotStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Error)
    }

    fn can_transition_to(&self, next: SlotStatus) -> bool {
        match self {
            Self::Pending => next != Self::Pending,
            Self::Generating => next.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Generating => "generating",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Why a job attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Setup,
    Submit,
    Poll,
    Timeout,
    GenerationFailed,
    Download,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Setup => "setup",
            Self::Submit => "submit",
            Self::Poll => "poll",
            Self::Timeout => "timeout",
            Self::GenerationFailed => "generation failed",
            Self::Download => "download",
        };
        f.write_str(s)
    }
}

/// Result of driving one job to a terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Artifact saved at its destination.
    Completed,
    /// The attempt failed; eligible for retry.
    Failed { kind: FailureKind, reason: String },
    /// The session context is unusable; siblings must stop too.
    SessionLost { reason: String },
    /// Cancelled because the owning session stopped.
    Interrupted,
}

impl JobOutcome {
    fn from_driver_error(error: DriverError, kind: FailureKind) -> Self {
        if error.is_session_fatal() {
            Self::SessionLost {
                reason: error.to_string(),
            }
        } else {
            Self::Failed {
                kind,
                reason: error.to_string(),
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Human-readable failure reason.
    pub fn reason(&self) -> String {
        match self {
            Self::Completed => "completed".to_string(),
            Self::Failed { kind, reason } => format!("{}: {}", kind, reason),
            Self::SessionLost { reason } => format!("session lost: {}", reason),
            Self::Interrupted => "interrupted by session shutdown".to_string(),
        }
    }
}

/// Status and timing of the job currently bound to a slot.
#[derive(Debug)]
pub struct SlotState {
    slot: String,
    job: String,
    status: SlotStatus,
    timeout: ProgressTimeout,
}

impl SlotState {
    pub fn new(slot: impl Into<String>, job: &JobDescriptor, base_timeout: Duration) -> Self {
        Self {
            slot: slot.into(),
            job: job.key().to_string(),
            status: SlotStatus::Pending,
            timeout: ProgressTimeout::new(base_timeout, Instant::now()),
        }
    }

    pub fn status(&self) -> SlotStatus {
        self.status
    }

    pub fn timeout(&self) -> &ProgressTimeout {
        &self.timeout
    }

    /// Stop the idle clock for `duration` spent waiting on connectivity.
    pub fn pause_timeout(&mut self, duration: Duration) {
        if !duration.is_zero() {
            debug!(
                slot = %self.slot,
                job = %self.job,
                offline_secs = duration.as_secs(),
                "Excluding offline time from progress timeout"
            );
            self.timeout.pause_for(duration);
        }
    }

    /// Move to `next` if the transition is legal. Terminal states are final.
    pub fn transition(&mut self, next: SlotStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        debug!(
            slot = %self.slot,
            job = %self.job,
            from = %self.status,
            to = %next,
            "Slot state transition"
        );
        self.status = next;
        true
    }

    /// Feed a poll result into the timeout and the state machine.
    pub fn observe(&mut self, status: PollStatus, now: Instant) {
        self.timeout.observe(status, now);
        if let PollStatus::Generating { .. } = status {
            if self.status == SlotStatus::Pending {
                self.transition(SlotStatus::Generating);
            }
        }
    }
}

/// Timing knobs for the lifecycle.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub base_timeout: Duration,
    pub poll_interval: Duration,
    pub action_retry: ActionRetryConfig,
}

/// Drives single jobs through a driver.
pub struct JobRunner<D: AutomationDriver> {
    driver: Arc<D>,
    gate: Arc<ConnectivityGate>,
    config: LifecycleConfig,
}

impl<D: AutomationDriver> JobRunner<D> {
    pub fn new(driver: Arc<D>, gate: Arc<ConnectivityGate>, config: LifecycleConfig) -> Self {
        Self {
            driver,
            gate,
            config,
        }
    }

    /// Run `job` to a terminal state inside `context`.
    ///
    /// The session opened for the job is always closed before returning.
    pub async fn run(
        &self,
        context: &D::Context,
        job: &JobDescriptor,
        destination: &Path,
        slot: &str,
        cancel: &CancellationToken,
    ) -> JobOutcome {
        let mut state = SlotState::new(slot, job, self.config.base_timeout);

        let mut session = match self.setup(context, job, slot, cancel).await {
            Ok(session) => session,
            Err(outcome) => {
                state.transition(SlotStatus::Error);
                return outcome;
            }
        };

        let outcome = self
            .monitor(&mut session, &mut state, destination, cancel)
            .await;
        self.driver.close_session(&mut session).await;

        match &outcome {
            JobOutcome::Completed => info!(
                slot = %slot,
                job = %job.key(),
                elapsed_secs = state.timeout().elapsed(Instant::now()).as_secs(),
                "Job completed"
            ),
            other => warn!(
                slot = %slot,
                job = %job.key(),
                status = %state.status(),
                reason = %other.reason(),
                "Job did not complete"
            ),
        }
        outcome
    }

    /// Open a session and submit the job, retrying each failed step.
    ///
    /// A session whose submit failed is closed before the next try.
    async fn setup(
        &self,
        context: &D::Context,
        job: &JobDescriptor,
        slot: &str,
        cancel: &CancellationToken,
    ) -> Result<D::Session, JobOutcome> {
        let mut tries = 0u32;

        loop {
            if !self
                .gate
                .wait_until_reachable(self.driver.as_ref(), cancel)
                .await
            {
                return Err(JobOutcome::Interrupted);
            }

            let (error, kind) = match self.driver.open_session(context).await {
                Ok(mut session) => match self.driver.submit_job(&mut session, job).await {
                    Ok(()) => {
                        debug!(slot = %slot, job = %job.key(), "Job submitted");
                        return Ok(session);
                    }
                    Err(e) => {
                        self.driver.close_session(&mut session).await;
                        (e, FailureKind::Submit)
                    }
                },
                Err(e) => (e, FailureKind::Setup),
            };

            if error.counts_as_attempt() {
                tries += 1;
            }

            let delay = match self.config.action_retry.decide(tries, &error) {
                RetryDecision::Retry(delay) => {
                    warn!(
                        slot = %slot,
                        job = %job.key(),
                        step = %kind,
                        try_number = tries,
                        error = %error,
                        "Setup step failed, retrying"
                    );
                    delay
                }
                RetryDecision::WaitForNetwork => {
                    debug!(slot = %slot, error = %error, "Setup hit a connectivity error");
                    self.config.action_retry.delay()
                }
                RetryDecision::GiveUp => return Err(JobOutcome::from_driver_error(error, kind)),
            };

            if !sleep_or_cancel(delay, cancel).await {
                return Err(JobOutcome::Interrupted);
            }
        }
    }

    async fn monitor(
        &self,
        session: &mut D::Session,
        state: &mut SlotState,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> JobOutcome {
        loop {
            if !sleep_or_cancel(self.config.poll_interval, cancel).await {
                return JobOutcome::Interrupted;
            }
            match self.gate.wait_offline(self.driver.as_ref(), cancel).await {
                Some(offline) => state.pause_timeout(offline),
                None => return JobOutcome::Interrupted,
            }

            match self.driver.poll_status(session).await {
                Ok(status) => {
                    state.observe(status, Instant::now());
                    match status {
                        PollStatus::Complete => {
                            state.transition(SlotStatus::Complete);
                            return self.download(session, destination, cancel).await;
                        }
                        PollStatus::Failed => {
                            state.transition(SlotStatus::Failed);
                            return JobOutcome::Failed {
                                kind: FailureKind::GenerationFailed,
                                reason: "remote generation reported failure".to_string(),
                            };
                        }
                        PollStatus::Pending
                        | PollStatus::Generating { .. }
                        | PollStatus::Unknown => {}
                    }
                }
                Err(e) if e.is_connectivity() => {
                    debug!(error = %e, "Poll hit a connectivity error");
                }
                Err(e) => {
                    state.transition(SlotStatus::Error);
                    return JobOutcome::from_driver_error(e, FailureKind::Poll);
                }
            }

            let now = Instant::now();
            if state.timeout().is_expired(now) {
                let idle = state.timeout().idle_for(now);
                let threshold = state.timeout().threshold();
                state.transition(SlotStatus::Failed);
                return JobOutcome::Failed {
                    kind: FailureKind::Timeout,
                    reason: format!(
                        "no progress for {}s (limit {}s)",
                        idle.as_secs(),
                        threshold.as_secs()
                    ),
                };
            }
        }
    }

    /// Fetch the finished artifact. Connectivity errors wait for the network
    /// and fetch again.
    async fn download(
        &self,
        session: &mut D::Session,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> JobOutcome {
        loop {
            match self.driver.fetch_artifact(session, destination).await {
                Ok(true) => return JobOutcome::Completed,
                Ok(false) => {
                    return JobOutcome::Failed {
                        kind: FailureKind::Download,
                        reason: format!("artifact missing at {}", destination.display()),
                    };
                }
                Err(e) if e.is_connectivity() => {
                    debug!(error = %e, "Download hit a connectivity error");
                    if !sleep_or_cancel(self.config.action_retry.delay(), cancel).await
                        || !self
                            .gate
                            .wait_until_reachable(self.driver.as_ref(), cancel)
                            .await
                    {
                        return JobOutcome::Interrupted;
                    }
                }
                Err(e) => return JobOutcome::from_driver_error(e, FailureKind::Download),
            }
        }
    }
}

/// Sleep for `duration`. Returns `false` if cancelled first.
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
