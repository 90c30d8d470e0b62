//! Automation driver boundary.
//!
//! The scheduler core only talks to the remote application through the
//! [`AutomationDriver`] trait. This module also holds the error taxonomy,
//! the per-step retry policy, reachability backpressure, and an offline
//! simulated driver.

mod connectivity;
mod error;
mod resilience;
mod simulated;
mod traits;

pub use connectivity::{ConnectivityConfig, ConnectivityGate, HttpProbe};
pub use error::DriverError;
pub use resilience::{ActionRetryConfig, RetryDecision};
pub use simulated::{SimContext, SimSession, SimulatedDriver, SimulationConfig};
pub use traits::{AutomationDriver, Identity, PollStatus};
