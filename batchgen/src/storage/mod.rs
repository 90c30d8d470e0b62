//! Filesystem side of a run: artifact paths, dequeue preconditions, batch
//! archival and the permanent failure log.

mod archive;
mod failure_log;
mod layout;
mod preconditions;

pub use archive::ArchiveFinalizer;
pub use failure_log::{FailureLog, FailureSink};
pub use layout::{ArtifactLayout, IMAGE_EXTENSIONS};
pub use preconditions::FsPreconditions;
