//! Offline driver used for rehearsal runs.
//!
//! Each job renders for a few polls and then completes or fails at random.
//! Finished jobs write a small placeholder file to the artifact destination.

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use super::connectivity::HttpProbe;
use super::error::DriverError;
use super::traits::{AutomationDriver, Identity, PollStatus};
use crate::pipeline::JobDescriptor;

/// Settings for the simulated driver.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Probability that a job ends in a failure status.
    pub failure_rate: f64,
    /// RNG seed; `None` seeds from the OS.
    pub seed: Option<u64>,
    /// Upper bound of polls spent rendering a job.
    pub max_render_polls: u32,
    /// Artificial latency of every driver call.
    pub latency: Duration,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            failure_rate: 0.1,
            seed: None,
            max_render_polls: 4,
            latency: Duration::from_millis(50),
        }
    }
}

pub struct SimContext {
    identity: String,
}

pub struct SimSession {
    id: u64,
    identity: String,
    job: Option<String>,
    prompt: String,
    polls_left: u32,
    polls_total: u32,
    will_fail: bool,
    closed: bool,
}

/// Driver that fakes remote generation.
pub struct SimulatedDriver {
    config: SimulationConfig,
    rng: Mutex<StdRng>,
    next_session: AtomicU64,
    reachable: AtomicBool,
    probe: Option<HttpProbe>,
}

impl SimulatedDriver {
    pub fn new(config: SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            config,
            rng: Mutex::new(rng),
            next_session: AtomicU64::new(1),
            reachable: AtomicBool::new(true),
            probe: None,
        }
    }

    /// Use a real HTTP probe for reachability.
    pub fn with_probe(mut self, probe: HttpProbe) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Toggle the simulated network state (ignored when a probe is set).
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    async fn pause(&self) {
        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }
    }
}

#[async_trait]
impl AutomationDriver for SimulatedDriver {
    type Context = SimContext;
    type Session = SimSession;

    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn launch(&self, identity: &Identity) -> Result<SimContext, DriverError> {
        self.pause().await;
        debug!(identity = %identity, "Simulated context launched");
        Ok(SimContext {
            identity: identity.name.clone(),
        })
    }

    async fn open_session(&self, context: &SimContext) -> Result<SimSession, DriverError> {
        self.pause().await;
        Ok(SimSession {
            id: self.next_session.fetch_add(1, Ordering::SeqCst),
            identity: context.identity.clone(),
            job: None,
            prompt: String::new(),
            polls_left: 0,
            polls_total: 0,
            will_fail: false,
            closed: false,
        })
    }

    async fn submit_job(
        &self,
        session: &mut SimSession,
        job: &JobDescriptor,
    ) -> Result<(), DriverError> {
        self.pause().await;
        if session.closed {
            return Err(DriverError::submit("session already closed"));
        }

        let (polls, will_fail) = {
            let mut rng = self.rng.lock();
            let polls = rng.random_range(1..=self.config.max_render_polls.max(1));
            let will_fail = rng.random_bool(self.config.failure_rate.clamp(0.0, 1.0));
            (polls, will_fail)
        };

        session.job = Some(job.key().to_string());
        session.prompt = job.payload.prompt.clone();
        session.polls_left = polls;
        session.polls_total = polls;
        session.will_fail = will_fail;
        debug!(
            session = session.id,
            identity = %session.identity,
            job = %job.key(),
            polls,
            will_fail,
            "Simulated submit"
        );
        Ok(())
    }

    async fn poll_status(&self, session: &mut SimSession) -> Result<PollStatus, DriverError> {
        if session.closed || session.job.is_none() {
            return Err(DriverError::poll("no job submitted"));
        }
        if session.polls_left == 0 {
            return Ok(if session.will_fail {
                PollStatus::Failed
            } else {
                PollStatus::Complete
            });
        }

        session.polls_left -= 1;
        let done = session.polls_total - session.polls_left;
        let progress = (done * 100 / session.polls_total.max(1)).min(99) as u8;
        Ok(PollStatus::Generating {
            progress: Some(progress),
        })
    }

    async fn fetch_artifact(
        &self,
        session: &mut SimSession,
        destination: &Path,
    ) -> Result<bool, DriverError> {
        self.pause().await;
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DriverError::Download(e.to_string()))?;
        }
        let body = format!(
            "simulated artifact\njob: {}\nidentity: {}\nprompt: {}\n",
            session.job.as_deref().unwrap_or_default(),
            session.identity,
            session.prompt
        );
        tokio::fs::write(destination, body)
            .await
            .map_err(|e| DriverError::Download(e.to_string()))?;
        Ok(tokio::fs::try_exists(destination).await.unwrap_or(false))
    }

    async fn close_session(&self, session: &mut SimSession) {
        if !session.closed {
            session.closed = true;
            debug!(session = session.id, "Simulated session closed");
        }
    }

    async fn shutdown(&self, context: SimContext) {
        debug!(identity = %context.identity, "Simulated context shut down");
    }

    async fn is_reachable(&self) -> bool {
        match &self.probe {
            Some(probe) => probe.is_reachable().await,
            None => self.reachable.load(Ordering::SeqCst),
        }
    }
}
