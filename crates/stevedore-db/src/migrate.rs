//! Additive schema migrations.
//!
//! The jobs table predates several columns; deployments upgrade in
//! place, so every schema change is a column addition probed against
//! the live table. Nothing is ever dropped or rewritten.

use sqlx::SqlitePool;

use crate::error::DbResult;

const CREATE_JOBS: &str = "\
CREATE TABLE IF NOT EXISTS jobs (
    id INTEGER PRIMARY KEY,
    package TEXT NOT NULL,
    revision TEXT NOT NULL,
    reference TEXT NOT NULL,
    maintainer TEXT NOT NULL,
    status TEXT NOT NULL,
    logurl TEXT,
    timestamp INTEGER,
    duration INTEGER,
    arches TEXT,
    artifacts TEXT
)";

/// Columns added after the initial schema, with their definitions.
const ADDED_COLUMNS: &[(&str, &str)] = &[
    ("tokens", "TEXT NOT NULL DEFAULT ''"),
    ("announce", "TEXT"),
    ("backend", "TEXT NOT NULL DEFAULT ''"),
    ("backend_id", "TEXT"),
];

/// Create the jobs table and bring an existing one up to date.
pub async fn run(pool: &SqlitePool) -> DbResult<()> {
    sqlx::query(CREATE_JOBS).execute(pool).await?;

    let existing: Vec<String> =
        sqlx::query_scalar("SELECT name FROM pragma_table_info('jobs')")
            .fetch_all(pool)
            .await?;

    for (name, definition) in ADDED_COLUMNS {
        if !existing.iter().any(|c| c == name) {
            tracing::info!(column = name, "adding jobs column");
            sqlx::query(&format!("ALTER TABLE jobs ADD COLUMN {name} {definition}"))
                .execute(pool)
                .await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run(&pool).await.unwrap();
        run(&pool).await.unwrap();

        let columns: Vec<String> =
            sqlx::query_scalar("SELECT name FROM pragma_table_info('jobs')")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert!(columns.iter().any(|c| c == "tokens"));
        assert!(columns.iter().any(|c| c == "backend_id"));
    }

    #[tokio::test]
    async fn columns_are_added_to_an_old_table() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        // the pre-tokens era schema
        sqlx::query(
            "CREATE TABLE jobs (id INTEGER PRIMARY KEY, package TEXT NOT NULL, \
             revision TEXT NOT NULL, reference TEXT NOT NULL, maintainer TEXT NOT NULL, \
             status TEXT NOT NULL, logurl TEXT, timestamp INTEGER, duration INTEGER, \
             arches TEXT, artifacts TEXT)",
        )
        .execute(&pool)
        .await
        .unwrap();

        run(&pool).await.unwrap();

        let columns: Vec<String> =
            sqlx::query_scalar("SELECT name FROM pragma_table_info('jobs')")
                .fetch_all(&pool)
                .await
                .unwrap();
        for name in ["tokens", "announce", "backend", "backend_id"] {
            assert!(columns.iter().any(|c| c == name), "missing {name}");
        }
    }
}
