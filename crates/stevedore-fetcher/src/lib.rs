//! Artifact pipeline and orchestrator loop for stevedore.
//!
//! Turns remote CI results into a locally staged, atomically
//! published package tree:
//! - the metadata pass resolves what a completed build produced,
//! - the artifact pass downloads and stages every architecture,
//! - the daemon loop wakes on job-store changes or a timeout and
//!   drives both, tolerating partial failure by retrying on the next
//!   wake.

pub mod error;
pub mod orchestrator;
pub mod signal;
pub mod stage;
pub mod watch;

pub use error::{FetchError, FetchResult};
pub use orchestrator::Orchestrator;
pub use stage::READY_MARKER;
