//! Shared fixtures for scheduler integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use batchgen::config::SchedulerConfig;
use batchgen::driver::{ActionRetryConfig, AutomationDriver, DriverError, Identity, PollStatus};
use batchgen::pipeline::{
    AcceptAll, BatchCounters, BatchFinalizer, BatchTracker, GenerationMode, JobDescriptor,
    Preconditions,
};
use batchgen::scheduler::Scheduler;
use batchgen::storage::{ArtifactLayout, FailureSink};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// What the scripted remote does with one submission of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Generates for one poll, then completes and downloads.
    Succeed,
    /// Reports a remote generation failure.
    FailGeneration,
    /// Rejects the submission.
    FailSubmit,
    /// Reports the same progress forever.
    Stall,
    /// Completes but the artifact never shows up.
    DownloadMissing,
    /// The whole session dies on the first poll.
    CrashSession,
}

pub struct ScriptedContext {
    identity: String,
}

pub struct ScriptedSession {
    identity: String,
    step: Step,
    polls: u32,
}

/// Driver whose behavior is scripted per job key.
///
/// Each submission of a job pops the next step from that job's script;
/// an empty script succeeds.
#[derive(Default)]
pub struct ScriptedDriver {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    /// `(job key, identity)` of every submission, in order.
    submissions: Mutex<Vec<(String, String)>>,
    pub launches: AtomicUsize,
    pub shutdowns: AtomicUsize,
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, job_key: &str, steps: &[Step]) -> Self {
        self.scripts
            .lock()
            .insert(job_key.to_string(), steps.iter().copied().collect());
        self
    }

    pub fn submissions(&self) -> Vec<(String, String)> {
        self.submissions.lock().clone()
    }

    pub fn submissions_of(&self, job_key: &str) -> Vec<String> {
        self.submissions
            .lock()
            .iter()
            .filter(|(key, _)| key == job_key)
            .map(|(_, identity)| identity.clone())
            .collect()
    }
}

#[async_trait]
impl AutomationDriver for ScriptedDriver {
    type Context = ScriptedContext;
    type Session = ScriptedSession;

    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn launch(&self, identity: &Identity) -> Result<ScriptedContext, DriverError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedContext {
            identity: identity.name.clone(),
        })
    }

    async fn open_session(&self, context: &ScriptedContext) -> Result<ScriptedSession, DriverError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedSession {
            identity: context.identity.clone(),
            step: Step::Succeed,
            polls: 0,
        })
    }

    async fn submit_job(
        &self,
        session: &mut ScriptedSession,
        job: &JobDescriptor,
    ) -> Result<(), DriverError> {
        let key = job.key().to_string();
        self.submissions
            .lock()
            .push((key.clone(), session.identity.clone()));
        let step = self
            .scripts
            .lock()
            .get_mut(&key)
            .and_then(|steps| steps.pop_front())
            .unwrap_or(Step::Succeed);

        if step == Step::FailSubmit {
            return Err(DriverError::submit("prompt box missing"));
        }
        session.step = step;
        Ok(())
    }

    async fn poll_status(&self, session: &mut ScriptedSession) -> Result<PollStatus, DriverError> {
        session.polls += 1;
        match session.step {
            Step::Succeed | Step::DownloadMissing if session.polls > 1 => Ok(PollStatus::Complete),
            Step::Succeed | Step::DownloadMissing => Ok(PollStatus::Generating { progress: Some(50) }),
            Step::FailGeneration => Ok(PollStatus::Failed),
            Step::Stall => Ok(PollStatus::Generating { progress: Some(10) }),
            Step::CrashSession => Err(DriverError::SessionLost("browser closed".to_string())),
            Step::FailSubmit => Err(DriverError::poll("nothing submitted")),
        }
    }

    async fn fetch_artifact(
        &self,
        session: &mut ScriptedSession,
        _destination: &Path,
    ) -> Result<bool, DriverError> {
        Ok(session.step != Step::DownloadMissing)
    }

    async fn close_session(&self, _session: &mut ScriptedSession) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    async fn shutdown(&self, _context: ScriptedContext) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }

    async fn is_reachable(&self) -> bool {
        true
    }
}

/// Finalizer that remembers every call.
#[derive(Default)]
pub struct RecordingFinalizer {
    pub calls: Mutex<Vec<(String, BatchCounters)>>,
}

impl BatchFinalizer for RecordingFinalizer {
    fn finalize(&self, batch_id: &str, counters: &BatchCounters) {
        self.calls.lock().push((batch_id.to_string(), *counters));
    }
}

impl RecordingFinalizer {
    pub fn calls_for(&self, batch_id: &str) -> Vec<BatchCounters> {
        self.calls
            .lock()
            .iter()
            .filter(|(id, _)| id == batch_id)
            .map(|(_, counters)| *counters)
            .collect()
    }
}

/// Failure sink that keeps records in memory.
#[derive(Default)]
pub struct RecordingSink {
    pub records: Mutex<Vec<(String, u32, String)>>,
}

#[async_trait]
impl FailureSink for RecordingSink {
    async fn record(&self, job: &JobDescriptor, reason: &str) -> batchgen::Result<()> {
        self.records
            .lock()
            .push((job.key().to_string(), job.attempt_count, reason.to_string()));
        Ok(())
    }
}

/// Scheduler settings with every delay shrunk for tests.
pub fn fast_config() -> SchedulerConfig {
    let mut config = SchedulerConfig {
        max_concurrent_sessions: 0,
        max_slots_per_session: 1,
        max_attempts: 3,
        base_timeout_secs: 1,
        poll_interval_ms: 5,
        overwrite_existing: true,
        generation_mode: GenerationMode::TextToVideo,
        action_retry: ActionRetryConfig {
            max_attempts: 1,
            delay_ms: 0,
        },
        setup_failure_delay_ms: 0,
        slot_start_stagger_ms: 0,
        status_interval_secs: 0,
        ..Default::default()
    };
    config.connectivity.retry_delay_ms = 10;
    config
}

pub fn identities(names: &[&str]) -> Vec<Identity> {
    names
        .iter()
        .map(|name| Identity::new(*name, format!("{}.json", name)))
        .collect()
}

pub fn jobs(batch_id: &str, count: u32) -> Vec<JobDescriptor> {
    (1..=count)
        .map(|seq| {
            JobDescriptor::new(
                batch_id,
                seq,
                format!("prompt {} of {}", seq, batch_id),
                GenerationMode::TextToVideo,
            )
        })
        .collect()
}

/// Everything a scenario test inspects after a run.
pub struct Harness {
    pub driver: Arc<ScriptedDriver>,
    pub finalizer: Arc<RecordingFinalizer>,
    pub sink: Arc<RecordingSink>,
    pub tracker: Arc<BatchTracker>,
    pub scheduler: Scheduler<ScriptedDriver>,
    _output: tempfile::TempDir,
}

impl Harness {
    pub fn new(driver: ScriptedDriver, config: SchedulerConfig) -> Self {
        Self::with_preconditions(driver, config, Arc::new(AcceptAll))
    }

    pub fn with_preconditions(
        driver: ScriptedDriver,
        config: SchedulerConfig,
        preconditions: Arc<dyn Preconditions>,
    ) -> Self {
        let output = tempfile::tempdir().expect("Failed to create temp dir");
        let layout = ArtifactLayout::new(
            output.path().join("prompts"),
            output.path().join("videos"),
            config.generation_mode,
        );
        Self::build(driver, config, layout, preconditions, output)
    }

    pub fn build(
        driver: ScriptedDriver,
        config: SchedulerConfig,
        layout: ArtifactLayout,
        preconditions: Arc<dyn Preconditions>,
        output: tempfile::TempDir,
    ) -> Self {
        let driver = Arc::new(driver);
        let finalizer = Arc::new(RecordingFinalizer::default());
        let sink = Arc::new(RecordingSink::default());
        let tracker = Arc::new(BatchTracker::new(finalizer.clone()));
        let scheduler = Scheduler::new(
            driver.clone(),
            config,
            layout,
            tracker.clone(),
            preconditions,
            sink.clone(),
        );
        Self {
            driver,
            finalizer,
            sink,
            tracker,
            scheduler,
            _output: output,
        }
    }
}
