//! Job store for stevedore.
//!
//! A single SQLite table is the source of truth for the job state
//! machine. Rows are never deleted; status advances in place through
//! the transitions the store enforces. Schema evolution is strictly
//! additive so old rows stay readable.

pub mod error;
pub mod migrate;
pub mod store;

pub use error::{DbError, DbResult};
pub use store::{EventOutcome, JobStore, MetadataOutcome};

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;

/// Open (creating if necessary) the job database at `path`.
pub async fn create_pool(path: &Path) -> DbResult<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    Ok(pool)
}
