//! Batch coordination: per-batch outcome counters and the one-shot finalize trigger.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Terminal outcome of one job, as far as its batch is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchOutcome {
    Completed,
    Failed,
    Skipped,
}

/// Counters for one source batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCounters {
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
    pub skipped: u32,
}

impl BatchCounters {
    pub fn new(total: u32) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    /// Jobs that reached a terminal outcome.
    pub fn processed(&self) -> u32 {
        self.completed + self.failed + self.skipped
    }

    pub fn is_finished(&self) -> bool {
        self.processed() == self.total
    }

    fn bump(&mut self, outcome: BatchOutcome) {
        match outcome {
            BatchOutcome::Completed => self.completed += 1,
            BatchOutcome::Failed => self.failed += 1,
            BatchOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Side effect fired exactly once per batch when every job has terminated.
pub trait BatchFinalizer: Send + Sync {
    fn finalize(&self, batch_id: &str, counters: &BatchCounters);
}

/// Finalizer that only logs.
pub struct LogFinalizer;

impl BatchFinalizer for LogFinalizer {
    fn finalize(&self, batch_id: &str, counters: &BatchCounters) {
        info!(
            batch_id = %batch_id,
            completed = counters.completed,
            failed = counters.failed,
            skipped = counters.skipped,
            "Batch finished"
        );
    }
}

#[derive(Debug)]
struct BatchState {
    counters: BatchCounters,
    finalized: bool,
}

/// Tracks per-batch counters and triggers finalization.
///
/// Each batch entry is updated under the map's shard lock, so the increment,
/// the finished check and the `finalized` flip happen atomically. The finalizer
/// itself runs after the lock is released.
pub struct BatchTracker {
    batches: DashMap<String, BatchState>,
    finalizer: Arc<dyn BatchFinalizer>,
}

impl BatchTracker {
    pub fn new(finalizer: Arc<dyn BatchFinalizer>) -> Self {
        Self {
            batches: DashMap::new(),
            finalizer,
        }
    }

    /// Register a batch with its job count.
    ///
    /// Re-registering an unfinished batch adds to its total.
    pub fn register(&self, batch_id: &str, total: u32) {
        if total == 0 {
            debug!(batch_id = %batch_id, "Ignoring empty batch");
            return;
        }
        self.batches
            .entry(batch_id.to_string())
            .and_modify(|state| {
                if state.finalized {
                    warn!(batch_id = %batch_id, "Batch already finalized; not extending");
                } else {
                    state.counters.total += total;
                }
            })
            .or_insert_with(|| BatchState {
                counters: BatchCounters::new(total),
                finalized: false,
            });
    }

    /// Record a terminal outcome for one job of `batch_id`.
    ///
    /// Returns the final counters if this call finished the batch (and fired
    /// the finalizer), `None` otherwise.
    pub fn record_outcome(&self, batch_id: &str, outcome: BatchOutcome) -> Option<BatchCounters> {
        let finished = {
            let Some(mut state) = self.batches.get_mut(batch_id) else {
                warn!(batch_id = %batch_id, ?outcome, "Outcome for unknown batch ignored");
                return None;
            };

            if state.counters.processed() >= state.counters.total {
                warn!(
                    batch_id = %batch_id,
                    ?outcome,
                    "Outcome beyond batch total ignored"
                );
                return None;
            }

            state.counters.bump(outcome);
            debug!(
                batch_id = %batch_id,
                ?outcome,
                processed = state.counters.processed(),
                total = state.counters.total,
                "Recorded batch outcome"
            );

            if state.counters.is_finished() && !state.finalized {
                state.finalized = true;
                Some(state.counters)
            } else {
                None
            }
        };

        if let Some(counters) = finished {
            self.finalizer.finalize(batch_id, &counters);
        }
        finished
    }

    pub fn counters(&self, batch_id: &str) -> Option<BatchCounters> {
        self.batches.get(batch_id).map(|s| s.counters)
    }

    pub fn is_finalized(&self, batch_id: &str) -> bool {
        self.batches
            .get(batch_id)
            .map(|s| s.finalized)
            .unwrap_or(false)
    }

    /// Sum of all batch counters.
    pub fn totals(&self) -> BatchCounters {
        self.batches
            .iter()
            .fold(BatchCounters::default(), |mut acc, entry| {
                let c = entry.value().counters;
                acc.total += c.total;
                acc.completed += c.completed;
                acc.failed += c.failed;
                acc.skipped += c.skipped;
                acc
            })
    }

    /// Batches that have not finished yet.
    pub fn unfinished(&self) -> Vec<String> {
        self.batches
            .iter()
            .filter(|e| !e.value().finalized)
            .map(|e| e.key().clone())
            .collect()
    }
}
