//! Automation driver trait and related types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::error::DriverError;
use crate::pipeline::JobDescriptor;

/// A worker identity able to open its own session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Unique name, used for bans and logging.
    pub name: String,
    /// Credentials or session seed handed to the driver.
    pub seed: PathBuf,
}

impl Identity {
    pub fn new(name: impl Into<String>, seed: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            seed: seed.into(),
        }
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Status observed on a running job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    /// Queued remotely; nothing rendered yet.
    Pending,
    /// Rendering, with a percentage when the application shows one.
    Generating { progress: Option<u8> },
    Complete,
    Failed,
    /// Page state could not be interpreted.
    Unknown,
}

/// The external automation driver.
///
/// A driver launches one context per identity (for a browser driver, the
/// browser process). Each slot opens its own session (tab) inside that
/// context. Calls that touch the same context should be serialized by the
/// driver itself.
#[async_trait]
pub trait AutomationDriver: Send + Sync + 'static {
    /// Per-identity context shared by every slot of a session worker.
    type Context: Send + Sync + 'static;
    /// Per-job session exclusively owned by one slot.
    type Session: Send + 'static;

    /// Driver name for logging.
    fn name(&self) -> &'static str;

    /// Start the context for `identity`.
    async fn launch(&self, identity: &Identity) -> Result<Self::Context, DriverError>;

    /// Open a fresh session inside `context`.
    async fn open_session(&self, context: &Self::Context) -> Result<Self::Session, DriverError>;

    /// Configure the session and start generation for `job`.
    async fn submit_job(
        &self,
        session: &mut Self::Session,
        job: &JobDescriptor,
    ) -> Result<(), DriverError>;

    /// Observe the current status. Cheap; called on a fixed interval.
    async fn poll_status(&self, session: &mut Self::Session) -> Result<PollStatus, DriverError>;

    /// Save the finished artifact. Returns whether it now exists at `destination`.
    async fn fetch_artifact(
        &self,
        session: &mut Self::Session,
        destination: &Path,
    ) -> Result<bool, DriverError>;

    /// Release the session. Safe to call repeatedly and after failures.
    async fn close_session(&self, session: &mut Self::Session);

    /// Tear down the context once every slot has finished.
    async fn shutdown(&self, context: Self::Context);

    /// Network reachability probe.
    async fn is_reachable(&self) -> bool;
}
