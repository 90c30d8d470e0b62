//! Batch archival on completion.

use std::fs;
use tracing::{info, warn};

use super::layout::ArtifactLayout;
use crate::pipeline::{BatchCounters, BatchFinalizer};

/// Moves a finished batch's source text next to its artifacts.
pub struct ArchiveFinalizer {
    layout: ArtifactLayout,
}

impl ArchiveFinalizer {
    pub fn new(layout: ArtifactLayout) -> Self {
        Self { layout }
    }

    fn archive(&self, batch_id: &str) -> std::io::Result<bool> {
        let source = self.layout.source_file(batch_id);
        if !source.try_exists()? {
            return Ok(false);
        }
        let dir = self.layout.batch_dir(batch_id);
        fs::create_dir_all(&dir)?;
        fs::rename(&source, dir.join(format!("{}.txt", batch_id)))?;
        Ok(true)
    }
}

/// Runs synchronously on the calling task: one existence check, one
/// `create_dir_all` and one same-volume `rename` of a small text file, once per
/// batch. The tracker calls it after releasing its lock.
impl BatchFinalizer for ArchiveFinalizer {
    fn finalize(&self, batch_id: &str, counters: &BatchCounters) {
        info!(
            batch_id = %batch_id,
            total = counters.total,
            completed = counters.completed,
            failed = counters.failed,
            skipped = counters.skipped,
            "Batch finished"
        );

        match self.archive(batch_id) {
            Ok(true) => info!(batch_id = %batch_id, "Archived batch source"),
            Ok(false) => warn!(batch_id = %batch_id, "Batch source not found; nothing to archive"),
            Err(e) => warn!(batch_id = %batch_id, error = %e, "Failed to archive batch source"),
        }
    }
}
