//! Job store error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("job {0} not found")]
    NotFound(i64),

    #[error("invalid operation: {0}")]
    Invalid(String),

    #[error(transparent)]
    Domain(#[from] stevedore_core::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl DbError {
    /// SQLite lock contention; the caller defers the work to the next
    /// orchestrator wake instead of failing the job.
    pub fn is_busy(&self) -> bool {
        match self {
            DbError::Database(sqlx::Error::Database(db)) => {
                db.message().contains("locked") || db.message().contains("busy")
            }
            _ => false,
        }
    }
}

pub type DbResult<T> = std::result::Result<T, DbError>;
