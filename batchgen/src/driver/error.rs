//! Driver error taxonomy.

use thiserror::Error;

/// Errors raised by an automation driver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// Network unreachable. Transient; never counted as an attempt.
    #[error("connectivity lost: {0}")]
    Connectivity(String),

    /// Session or job initialization failed.
    #[error("setup failed: {0}")]
    Setup(String),

    /// A setup step failed after partial progress.
    #[error("submit failed: {0}")]
    Submit(String),

    /// Unexpected condition while monitoring.
    #[error("poll failed: {0}")]
    Poll(String),

    /// Generation finished but the artifact could not be retrieved.
    #[error("download failed: {0}")]
    Download(String),

    /// The whole session context is unusable (e.g. the browser exited).
    #[error("session lost: {0}")]
    SessionLost(String),
}

impl DriverError {
    pub fn setup(msg: impl Into<String>) -> Self {
        Self::Setup(msg.into())
    }

    pub fn submit(msg: impl Into<String>) -> Self {
        Self::Submit(msg.into())
    }

    pub fn poll(msg: impl Into<String>) -> Self {
        Self::Poll(msg.into())
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity(_))
    }

    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Self::SessionLost(_))
    }

    /// Whether hitting this error consumes one of the job's attempts.
    pub fn counts_as_attempt(&self) -> bool {
        !self.is_connectivity()
    }
}
