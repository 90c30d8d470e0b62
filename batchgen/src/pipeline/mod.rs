//! Job pipeline: descriptors, the shared queue, batch bookkeeping and the
//! per-job lifecycle.

pub mod coordination;
pub mod job;
pub mod job_queue;
pub mod lifecycle;
pub mod progress;

pub use coordination::{BatchCounters, BatchFinalizer, BatchOutcome, BatchTracker, LogFinalizer};
pub use job::{GenerationMode, JobDescriptor, JobKey, JobPayload};
pub use job_queue::{
    AcceptAll, Acquire, JobQueue, JobQueueConfig, Preconditions, Readiness, Release, SkipReason,
};
pub use lifecycle::{FailureKind, JobOutcome, JobRunner, LifecycleConfig, SlotState, SlotStatus};
pub use progress::ProgressTimeout;
