//! Permanent failure records.

use async_trait::async_trait;
use chrono::Local;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::Result;
use crate::pipeline::JobDescriptor;

/// Receives jobs that exhausted their attempt budget.
#[async_trait]
pub trait FailureSink: Send + Sync {
    async fn record(&self, job: &JobDescriptor, reason: &str) -> Result<()>;
}

/// Append-only text log of permanently failed jobs.
pub struct FailureLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FailureLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn format_entry(job: &JobDescriptor, reason: &str) -> String {
        format!(
            "[{}] {} #{} (identity: {}, attempts: {})\nreason: {}\n{}\n\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            job.batch_id,
            job.sequence_number,
            job.last_worker.as_deref().unwrap_or("-"),
            job.attempt_count,
            reason,
            job.payload.prompt.trim_end()
        )
    }
}

#[async_trait]
impl FailureSink for FailureLog {
    async fn record(&self, job: &JobDescriptor, reason: &str) -> Result<()> {
        let entry = Self::format_entry(job, reason);
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(entry.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
