//! Application configuration.
//!
//! Values come from, in increasing priority: built-in defaults, an optional
//! TOML file, and `BATCHGEN_*` environment variables (a `.env` file is read
//! first).

mod scheduler;

pub use scheduler::SchedulerConfig;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

use crate::logging::LoggingOptions;
use crate::{Error, Result};

/// Filesystem locations of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Batch text files and per-batch image folders.
    pub prompts_dir: PathBuf,
    /// Artifacts, one folder per batch.
    pub output_dir: PathBuf,
    /// Identity files (`*.json`).
    pub profiles_dir: PathBuf,
    /// Permanent failure log.
    pub failure_log: PathBuf,
    /// Rotated log files; console only when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            prompts_dir: PathBuf::from("prompts"),
            output_dir: PathBuf::from("videos"),
            profiles_dir: PathBuf::from("profiles"),
            failure_log: PathBuf::from("prompts/prompts_fail.txt"),
            log_dir: None,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub paths: PathsConfig,
    /// Log filter directive overriding `RUST_LOG`.
    pub log_filter: Option<String>,
}

impl AppConfig {
    /// Parse a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Ok(toml::from_str(&raw)?)
    }

    /// Load the optional file, overlay the environment and validate.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        if let Ok(dotenv) = dotenvy::dotenv() {
            debug!(path = %dotenv.display(), "Loaded .env file");
        }

        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay `BATCHGEN_*` variables returned by `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let s = &mut self.scheduler;
        override_parsed(&lookup, "BATCHGEN_MAX_SESSIONS", &mut s.max_concurrent_sessions)?;
        override_parsed(&lookup, "BATCHGEN_SLOTS_PER_SESSION", &mut s.max_slots_per_session)?;
        override_parsed(&lookup, "BATCHGEN_MAX_ATTEMPTS", &mut s.max_attempts)?;
        override_parsed(&lookup, "BATCHGEN_BASE_TIMEOUT_SECS", &mut s.base_timeout_secs)?;
        override_parsed(&lookup, "BATCHGEN_POLL_INTERVAL_MS", &mut s.poll_interval_ms)?;
        override_parsed(&lookup, "BATCHGEN_OVERWRITE", &mut s.overwrite_existing)?;
        override_parsed(&lookup, "BATCHGEN_MODE", &mut s.generation_mode)?;
        override_parsed(&lookup, "BATCHGEN_PROBE_URL", &mut s.connectivity.probe_url)?;

        let p = &mut self.paths;
        override_parsed(&lookup, "BATCHGEN_PROMPTS_DIR", &mut p.prompts_dir)?;
        override_parsed(&lookup, "BATCHGEN_OUTPUT_DIR", &mut p.output_dir)?;
        override_parsed(&lookup, "BATCHGEN_PROFILES_DIR", &mut p.profiles_dir)?;
        override_parsed(&lookup, "BATCHGEN_FAILURE_LOG", &mut p.failure_log)?;
        if let Some(dir) = lookup("BATCHGEN_LOG_DIR") {
            p.log_dir = Some(PathBuf::from(dir));
        }
        if let Some(filter) = lookup("BATCHGEN_LOG_FILTER") {
            self.log_filter = Some(filter);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let s = &self.scheduler;
        if s.max_attempts == 0 {
            return Err(Error::validation("max_attempts must be at least 1"));
        }
        if s.max_slots_per_session == 0 {
            return Err(Error::validation("max_slots_per_session must be at least 1"));
        }
        if s.base_timeout_secs == 0 {
            return Err(Error::validation("base_timeout_secs must be positive"));
        }
        if s.poll_interval_ms == 0 {
            return Err(Error::validation("poll_interval_ms must be positive"));
        }
        if s.action_retry.max_attempts == 0 {
            return Err(Error::validation("action_retry.max_attempts must be at least 1"));
        }
        Ok(())
    }

    pub fn logging(&self) -> LoggingOptions {
        LoggingOptions {
            log_dir: self.paths.log_dir.clone(),
            filter: self.log_filter.clone(),
        }
    }
}

fn override_parsed<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|e| Error::config(format!("Invalid value for {}: {}", key, e)))?;
    }
    Ok(())
}
