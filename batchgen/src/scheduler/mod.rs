//! Scheduling: an outer pool of session workers, one per identity in use,
//! each supervising a pool of slot workers that share the job queue.

mod service;
mod session;
mod slot;
mod stats;

pub use service::Scheduler;
pub use stats::{RunStats, RunSummary, format_elapsed};
