//! Error types shared across the workspace.

use thiserror::Error;

use crate::job::JobStatus;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("unknown job status: {0:?}")]
    UnknownStatus(String),

    #[error("unknown backend: {0:?}")]
    UnknownBackend(String),

    #[error("arch/artifact lists do not pair up: {arches} arches, {artifacts} artifacts")]
    ArtifactListMismatch { arches: usize, artifacts: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
