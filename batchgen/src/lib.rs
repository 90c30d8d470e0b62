//! batchgen library crate.
//!
//! Drives bulk generation jobs through many concurrent automation sessions:
//! a shared job queue, two-level worker pools (sessions x slots), a per-job
//! lifecycle with a progress-aware timeout, bounded retry with per-identity
//! bans, and exact per-batch completion bookkeeping.

pub mod config;
pub mod driver;
pub mod error;
pub mod input;
pub mod logging;
pub mod pipeline;
pub mod scheduler;
pub mod storage;

pub use error::{Error, Result};
