//! Transactional job mutations.
//!
//! All writers go through [`JobStore`]; the dispatcher owns row
//! creation and the backend handle, the orchestrator owns everything
//! after that. Each method is one short transaction.

use chrono::Utc;
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::{info, warn};

use stevedore_core::{
    Backend, BuildEvent, DeployPolicy, Error as DomainError, Job, JobStatus, MetadataUpdate,
    TokenSet,
};

use crate::error::{DbError, DbResult};

/// What applying a build event did to the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Event for a job already past `pending`; re-delivery, no-op.
    Ignored,
    /// Build failed; terminal.
    Failed,
    /// Succeeded; metadata artifact still to be fetched.
    AwaitingMetadata,
    /// Succeeded with inline token/artifact data; fetch starts.
    Fetching,
    /// A `nobuild` token was present; terminal.
    NotBuilt,
    /// Succeeded but not eligible for publication; rests at
    /// `build succeeded`.
    Settled,
}

/// What applying fetched metadata did to the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataOutcome {
    Ignored,
    Fetching,
    NotBuilt,
    Settled,
}

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: i64,
    package: String,
    revision: String,
    reference: String,
    maintainer: String,
    status: String,
    backend: String,
    backend_id: Option<String>,
    arches: Option<String>,
    artifacts: Option<String>,
    tokens: Option<String>,
    timestamp: Option<i64>,
    duration: Option<i64>,
    logurl: Option<String>,
    announce: Option<String>,
}

impl TryFrom<JobRow> for Job {
    type Error = DomainError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let backend = match row.backend.as_str() {
            "" => None,
            s => Some(Backend::from_str(s)?),
        };
        Ok(Job {
            id: row.id,
            package: row.package,
            revision: row.revision,
            reference: row.reference,
            maintainer: row.maintainer,
            status: JobStatus::from_str(&row.status)?,
            backend,
            backend_id: row.backend_id,
            arches: row.arches,
            artifacts: row.artifacts,
            tokens: TokenSet::parse(row.tokens.as_deref().unwrap_or("")),
            timestamp: row.timestamp,
            duration: row.duration,
            logurl: row.logurl,
            announce: row.announce,
        })
    }
}

const SELECT_JOB: &str = "SELECT id, package, revision, reference, maintainer, status, \
     backend, backend_id, arches, artifacts, tokens, timestamp, duration, logurl, announce \
     FROM jobs";

/// The persisted job table.
#[derive(Clone)]
pub struct JobStore {
    pool: SqlitePool,
}

impl JobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: i64) -> DbResult<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(&format!("{SELECT_JOB} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Job::try_from).transpose().map_err(DbError::from)
    }

    pub async fn jobs_with_status(&self, status: JobStatus) -> DbResult<Vec<Job>> {
        let rows =
            sqlx::query_as::<_, JobRow>(&format!("{SELECT_JOB} WHERE status = ? ORDER BY id"))
                .bind(status.to_string())
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter()
            .map(|r| Job::try_from(r).map_err(DbError::from))
            .collect()
    }

    /// Record a new build request; returns the assigned build number.
    pub async fn create_requested(
        &self,
        package: &str,
        revision: &str,
        reference: &str,
        maintainer: &str,
        tokens: &TokenSet,
    ) -> DbResult<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO jobs (package, revision, reference, maintainer, status, timestamp, tokens) \
             VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(package)
        .bind(revision)
        .bind(reference)
        .bind(maintainer)
        .bind(JobStatus::Requested.to_string())
        .bind(Utc::now().timestamp())
        .bind(tokens.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Record a successful dispatch. Only a `requested` row can become
    /// `pending`, and never without a backend handle.
    pub async fn mark_pending(
        &self,
        id: i64,
        backend: Backend,
        backend_id: &str,
        logurl: Option<&str>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE jobs SET status = ?, backend = ?, backend_id = ?, logurl = ? \
             WHERE id = ? AND status = ?",
        )
        .bind(JobStatus::Pending.to_string())
        .bind(backend.to_string())
        .bind(backend_id)
        .bind(logurl)
        .bind(id)
        .bind(JobStatus::Requested.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(id));
        }
        Ok(())
    }

    /// Apply an inbound build-completion notification.
    ///
    /// Keyed by job id and idempotent: an event for a row already past
    /// `pending` is logged and dropped, so webhook re-delivery cannot
    /// corrupt duration or double-trigger the metadata fetch.
    pub async fn apply_build_event(
        &self,
        event: &BuildEvent,
        policy: &DeployPolicy,
    ) -> DbResult<EventOutcome> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<(String, String)> =
            sqlx::query_as("SELECT status, tokens FROM jobs WHERE id = ?")
                .bind(event.id)
                .fetch_optional(&mut *tx)
                .await?;

        let prior_tokens = match existing {
            Some((status, tokens)) => {
                let status = JobStatus::from_str(&status)?;
                if status != JobStatus::Pending {
                    if status == JobStatus::Requested {
                        warn!(
                            job_id = event.id,
                            "build event for a job still awaiting dispatch; ignored"
                        );
                    } else {
                        info!(job_id = event.id, %status, "build event re-delivery ignored");
                    }
                    return Ok(EventOutcome::Ignored);
                }
                TokenSet::parse(&tokens)
            }
            None => {
                // A backend can report a build the dispatcher never
                // recorded (operator-triggered runs); create the row.
                sqlx::query(
                    "INSERT INTO jobs (id, package, revision, reference, maintainer, status) \
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(event.id)
                .bind(&event.package)
                .bind(&event.revision)
                .bind(&event.reference)
                .bind(&event.maintainer)
                .bind(JobStatus::Pending.to_string())
                .execute(&mut *tx)
                .await?;
                TokenSet::new()
            }
        };

        let (next, outcome, merged) = if !event.succeeded {
            (JobStatus::BuildFailed, EventOutcome::Failed, None)
        } else if let (Some(tokens), Some(artifacts)) = (&event.tokens, &event.artifacts) {
            // One-shot backend: everything arrived with the event, no
            // separate metadata fetch.
            let merged = prior_tokens.merged(tokens);
            let (next, outcome) = if merged.disables_build() {
                (JobStatus::NotBuilt, EventOutcome::NotBuilt)
            } else if policy.eligible(&event.reference, &event.package, &merged) {
                (JobStatus::Fetching, EventOutcome::Fetching)
            } else {
                (JobStatus::BuildSucceeded, EventOutcome::Settled)
            };
            (next, outcome, Some((merged, artifacts)))
        } else {
            (
                JobStatus::FetchingMetadata,
                EventOutcome::AwaitingMetadata,
                None,
            )
        };

        sqlx::query(
            "UPDATE jobs SET status = ?, \
             logurl = COALESCE(?, logurl), \
             timestamp = COALESCE(?, timestamp), \
             duration = COALESCE(?, duration) \
             WHERE id = ?",
        )
        .bind(next.to_string())
        .bind(&event.logurl)
        .bind(event.timestamp)
        .bind(event.duration)
        .bind(event.id)
        .execute(&mut *tx)
        .await?;

        if let Some((tokens, artifacts)) = merged {
            sqlx::query("UPDATE jobs SET tokens = ?, arches = ?, artifacts = ? WHERE id = ?")
                .bind(tokens.to_string())
                .bind(artifacts.arches_string())
                .bind(artifacts.locators_string())
                .bind(event.id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        info!(job_id = event.id, status = %next, "build event applied");
        Ok(outcome)
    }

    /// Merge a fetched metadata artifact into the row and run deploy
    /// gating.
    pub async fn apply_metadata(
        &self,
        update: &MetadataUpdate,
        policy: &DeployPolicy,
    ) -> DbResult<MetadataOutcome> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<(String, String, String, String)> = sqlx::query_as(
            "SELECT status, tokens, reference, package FROM jobs WHERE id = ?",
        )
        .bind(update.id)
        .fetch_optional(&mut *tx)
        .await?;
        let (status, tokens, reference, package) =
            existing.ok_or(DbError::NotFound(update.id))?;

        if JobStatus::from_str(&status)? != JobStatus::FetchingMetadata {
            info!(job_id = update.id, %status, "metadata for a job not awaiting it; ignored");
            return Ok(MetadataOutcome::Ignored);
        }

        let merged = TokenSet::parse(&tokens).merged(&update.tokens);
        let (next, outcome) = if merged.disables_build() {
            (JobStatus::NotBuilt, MetadataOutcome::NotBuilt)
        } else if policy.eligible(&reference, &package, &merged) {
            (JobStatus::Fetching, MetadataOutcome::Fetching)
        } else {
            (JobStatus::BuildSucceeded, MetadataOutcome::Settled)
        };

        // arches/artifacts are persisted even when gating declines, so
        // a later force-deploy has the locators to work from.
        sqlx::query(
            "UPDATE jobs SET status = ?, tokens = ?, announce = ?, arches = ?, artifacts = ? \
             WHERE id = ?",
        )
        .bind(next.to_string())
        .bind(merged.to_string())
        .bind(&update.announce)
        .bind(update.artifacts.arches_string())
        .bind(update.artifacts.locators_string())
        .bind(update.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(job_id = update.id, status = %next, "metadata applied");
        Ok(outcome)
    }

    /// Advance a row along one state-machine edge. Returns false when
    /// the row was not at `from` (another writer got there first).
    pub async fn advance(&self, id: i64, from: JobStatus, to: JobStatus) -> DbResult<bool> {
        if !from.can_transition(to) {
            return Err(DomainError::InvalidTransition { from, to }.into());
        }
        let result = sqlx::query("UPDATE jobs SET status = ? WHERE id = ? AND status = ?")
            .bind(to.to_string())
            .bind(id)
            .bind(from.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Operator force-publish: bypasses the token gate, keeps the
    /// branch/package gate. The job must have settled at
    /// `build succeeded` with known artifacts.
    pub async fn force_deploy(&self, id: i64, policy: &DeployPolicy) -> DbResult<()> {
        let job = self.get(id).await?.ok_or(DbError::NotFound(id))?;

        if job.status != JobStatus::BuildSucceeded {
            return Err(DbError::Invalid(format!(
                "job {id} is {}, not settled at build succeeded",
                job.status
            )));
        }
        if job.arches.is_none() || job.artifacts.is_none() {
            return Err(DbError::Invalid(format!("job {id} has no recorded artifacts")));
        }
        if !policy.branch_and_package_allow(&job.reference, &job.package) {
            return Err(DbError::Invalid(format!(
                "job {id} ({}, {}) is excluded from publication",
                job.package, job.reference
            )));
        }

        self.advance(id, JobStatus::BuildSucceeded, JobStatus::Fetching)
            .await?;
        info!(job_id = id, "force deploy accepted");
        Ok(())
    }
}
