//! Fetcher error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Store(#[from] stevedore_db::DbError),

    #[error(transparent)]
    Backend(#[from] stevedore_backend::BackendError),

    #[error(transparent)]
    Domain(#[from] stevedore_core::Error),

    #[error("job {0} is fetching but has no recorded artifacts")]
    MissingArtifacts(i64),

    #[error("job {0} has no backend recorded")]
    MissingBackend(i64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

pub type FetchResult<T> = std::result::Result<T, FetchError>;
