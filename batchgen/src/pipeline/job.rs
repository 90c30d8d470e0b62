//! Job descriptors: one unit of generation work derived from a batch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

/// How a job is generated on the remote application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// Prompt text only.
    #[default]
    TextToVideo,
    /// One indexed start frame per job (`<batch>/<seq>.png`).
    FramesToVideo,
    /// Named reference images listed in the prompt's `images:` line.
    IngredientsToVideo,
    /// Still image generation.
    TextToImage,
}

impl GenerationMode {
    /// File extension of the artifact produced in this mode.
    pub fn artifact_extension(&self) -> &'static str {
        match self {
            GenerationMode::TextToImage => "png",
            _ => "mp4",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationMode::TextToVideo => "text_to_video",
            GenerationMode::FramesToVideo => "frames_to_video",
            GenerationMode::IngredientsToVideo => "ingredients_to_video",
            GenerationMode::TextToImage => "text_to_image",
        }
    }
}

impl fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GenerationMode {
    type Err = String;

    /// Accepts snake_case, kebab-case or the spaced UI label ("Frames to Video").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "text_to_video" => Ok(Self::TextToVideo),
            "frames_to_video" => Ok(Self::FramesToVideo),
            "ingredients_to_video" => Ok(Self::IngredientsToVideo),
            "text_to_image" => Ok(Self::TextToImage),
            _ => Err(format!("unknown generation mode: {}", s)),
        }
    }
}

/// Artifact address of a job: `(batch_id, sequence_number)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobKey {
    pub batch_id: String,
    pub sequence_number: u32,
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.batch_id, self.sequence_number)
    }
}

/// Payload handed to the automation driver. Opaque to the scheduling core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPayload {
    /// Prompt text with any asset directive removed.
    pub prompt: String,
    /// Auxiliary asset names as written in the source text, in order.
    pub asset_names: Vec<String>,
    /// Asset paths resolved by the queue's precondition check on dequeue.
    pub resolved_assets: Vec<PathBuf>,
    /// Mode actually used for this job (may differ from the batch-wide mode).
    pub effective_mode: GenerationMode,
}

impl JobPayload {
    pub fn new(prompt: impl Into<String>, mode: GenerationMode) -> Self {
        Self {
            prompt: prompt.into(),
            asset_names: Vec::new(),
            resolved_assets: Vec::new(),
            effective_mode: mode,
        }
    }
}

/// A job waiting in the queue or bound to a worker slot.
///
/// Ownership moves between the queue and a slot; only the queue (on dequeue)
/// and the retry path (on terminal failure) mutate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDescriptor {
    /// Unique job ID, stable across retries.
    pub id: String,
    /// Source batch this job was derived from.
    pub batch_id: String,
    /// 1-based position within the batch.
    pub sequence_number: u32,
    pub payload: JobPayload,
    /// Number of failed attempts so far.
    pub attempt_count: u32,
    /// Identities that already failed this job.
    pub excluded_workers: BTreeSet<String>,
    /// Last failure reason, if any.
    pub last_error: Option<String>,
    /// Identity of the last worker that ran this job.
    pub last_worker: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl JobDescriptor {
    pub fn new(
        batch_id: impl Into<String>,
        sequence_number: u32,
        prompt: impl Into<String>,
        mode: GenerationMode,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            batch_id: batch_id.into(),
            sequence_number,
            payload: JobPayload::new(prompt, mode),
            attempt_count: 0,
            excluded_workers: BTreeSet::new(),
            last_error: None,
            last_worker: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_asset_names(mut self, names: Vec<String>) -> Self {
        self.payload.asset_names = names;
        self
    }

    pub fn key(&self) -> JobKey {
        JobKey {
            batch_id: self.batch_id.clone(),
            sequence_number: self.sequence_number,
        }
    }

    /// Whether `identity` has already failed this job.
    pub fn is_excluded(&self, identity: &str) -> bool {
        self.excluded_workers.contains(identity)
    }

    /// Record a failed attempt by `identity`.
    pub fn record_failure(&mut self, identity: &str, reason: impl Into<String>) {
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.excluded_workers.insert(identity.to_string());
        self.last_worker = Some(identity.to_string());
        self.last_error = Some(reason.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_creation() {
        let job = JobDescriptor::new("story", 3, "a cat on a roof", GenerationMode::TextToVideo);
        assert_eq!(job.attempt_count, 0);
        assert!(job.excluded_workers.is_empty());
        assert_eq!(job.key().to_string(), "story#3");
        assert_eq!(job.payload.effective_mode, GenerationMode::TextToVideo);
    }

    #[test]
    fn test_record_failure_bans_identity() {
        let mut job = JobDescriptor::new("story", 1, "prompt", GenerationMode::TextToVideo);
        job.record_failure("alice", "timed out");
        job.record_failure("alice", "timed out again");

        assert_eq!(job.attempt_count, 2);
        assert_eq!(job.excluded_workers.len(), 1);
        assert!(job.is_excluded("alice"));
        assert!(!job.is_excluded("bob"));
        assert_eq!(job.last_error.as_deref(), Some("timed out again"));
    }

    #[test]
    fn test_artifact_extension() {
        assert_eq!(GenerationMode::TextToVideo.artifact_extension(), "mp4");
        assert_eq!(GenerationMode::IngredientsToVideo.artifact_extension(), "mp4");
        assert_eq!(GenerationMode::TextToImage.artifact_extension(), "png");
    }

    #[test]
    fn test_mode_serde_names() {
        let json = serde_json::to_string(&GenerationMode::FramesToVideo).unwrap();
        assert_eq!(json, "\"frames_to_video\"");
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!(
            "Frames to Video".parse::<GenerationMode>(),
            Ok(GenerationMode::FramesToVideo)
        );
        assert_eq!(
            "text-to-image".parse::<GenerationMode>(),
            Ok(GenerationMode::TextToImage)
        );
        assert!("video".parse::<GenerationMode>().is_err());
    }
}
