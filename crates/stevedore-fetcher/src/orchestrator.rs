//! The orchestrator loop and its two passes.
//!
//! One long-running process drives every job from build completion to
//! publication. Jobs are independent; each pass walks all ready jobs
//! sequentially, and a fault in one job is logged and skipped so it
//! cannot take down monitoring of the others. Transient conditions
//! never advance job state; the next wake retries.

use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use stevedore_backend::Backends;
use stevedore_config::Config;
use stevedore_core::{ArtifactSet, Backend, DeployPolicy, Job, JobStatus};
use stevedore_db::JobStore;

use crate::error::{FetchError, FetchResult};
use crate::{signal, stage, watch};

/// Architecture tag that carries no binary artifact bundle.
const SOURCE_ARCH: &str = "source";

pub struct Orchestrator {
    store: JobStore,
    backends: Backends,
    policy: DeployPolicy,
    staging_root: PathBuf,
    indexer_pidfile: Option<PathBuf>,
    store_path: PathBuf,
    wake_interval: Duration,
}

impl Orchestrator {
    pub fn new(store: JobStore, backends: Backends, config: &Config) -> Self {
        Self {
            store,
            backends,
            policy: config.policy.clone(),
            staging_root: config.staging.root.clone(),
            indexer_pidfile: config.staging.indexer_pidfile.clone(),
            store_path: config.store.path.clone(),
            wake_interval: Duration::from_secs(config.orchestrator.wake_interval_secs),
        }
    }

    /// Run forever: wake on a store change or the interval timeout,
    /// whichever comes first. While retryable work is outstanding the
    /// loop waits on the timeout alone, so flaky backends cannot stall
    /// progress and idle periods cost nothing.
    pub async fn run(&self) {
        info!(store = %self.store_path.display(), "orchestrator started");
        let mut incomplete = true;
        loop {
            if incomplete {
                tokio::time::sleep(self.wake_interval).await;
            } else {
                match tokio::time::timeout(
                    self.wake_interval,
                    watch::store_written(&self.store_path),
                )
                .await
                {
                    Ok(Ok(())) => debug!("woken by store change"),
                    Ok(Err(e)) => {
                        warn!(error = %e, "store watch failed; falling back to timeout waking");
                        tokio::time::sleep(self.wake_interval).await;
                    }
                    Err(_) => debug!("woken by timeout"),
                }
            }
            incomplete = self.process().await;
        }
    }

    /// One pass: metadata fetch, then artifact fetch. Returns true
    /// when retryable work remains.
    pub async fn process(&self) -> bool {
        let metadata_incomplete = self.fetch_metadata_pass().await;
        let artifacts_incomplete = self.fetch_artifacts_pass().await;
        metadata_incomplete || artifacts_incomplete
    }

    async fn fetch_metadata_pass(&self) -> bool {
        let jobs = match self.store.jobs_with_status(JobStatus::FetchingMetadata).await {
            Ok(jobs) => jobs,
            Err(e) if e.is_busy() => {
                info!("store busy, deferring metadata pass");
                return true;
            }
            Err(e) => {
                error!(error = %e, "cannot list jobs awaiting metadata");
                return true;
            }
        };
        if !jobs.is_empty() {
            info!(count = jobs.len(), "jobs ready for metadata fetch");
        }

        let mut incomplete = false;
        for job in jobs {
            // only the out-of-band backend reports results this way
            if job.backend != Some(Backend::Github) {
                debug!(job_id = job.id, "job's backend has no metadata artifact");
                continue;
            }
            match self.fetch_metadata_for(&job).await {
                Ok(true) => {}
                Ok(false) => {
                    info!(job_id = job.id, "metadata not yet available, will retry");
                    incomplete = true;
                }
                Err(e) => {
                    error!(job_id = job.id, error = %e, "metadata fetch failed, will retry");
                    incomplete = true;
                }
            }
        }
        incomplete
    }

    async fn fetch_metadata_for(&self, job: &Job) -> FetchResult<bool> {
        let backend_id = job
            .backend_id
            .as_deref()
            .ok_or(FetchError::MissingBackend(job.id))?;
        let backend = self.backends.get(Backend::Github)?;

        match backend.fetch_run_metadata(job.id, backend_id).await? {
            Some(update) => {
                self.store.apply_metadata(&update, &self.policy).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn fetch_artifacts_pass(&self) -> bool {
        let jobs = match self.store.jobs_with_status(JobStatus::Fetching).await {
            Ok(jobs) => jobs,
            Err(e) if e.is_busy() => {
                info!("store busy, deferring artifact pass");
                return true;
            }
            Err(e) => {
                error!(error = %e, "cannot list jobs awaiting artifacts");
                return true;
            }
        };
        if !jobs.is_empty() {
            info!(count = jobs.len(), "jobs ready for artifact fetch");
        }

        let mut incomplete = false;
        let mut staged = Vec::new();
        for job in jobs {
            match self.fetch_job_artifacts(&job).await {
                Ok(true) => {
                    match self
                        .store
                        .advance(job.id, JobStatus::Fetching, JobStatus::Deploying)
                        .await
                    {
                        Ok(true) => staged.push(job.id),
                        Ok(false) => warn!(job_id = job.id, "job moved while staging"),
                        Err(e) => {
                            error!(job_id = job.id, error = %e, "cannot record staging");
                            incomplete = true;
                        }
                    }
                }
                Ok(false) => incomplete = true,
                Err(
                    e @ (FetchError::MissingArtifacts(_)
                    | FetchError::MissingBackend(_)
                    | FetchError::Domain(_)),
                ) => {
                    // a row in this shape cannot make progress
                    error!(job_id = job.id, error = %e, "unrecoverable artifact state");
                    if let Err(e) = self
                        .store
                        .advance(job.id, JobStatus::Fetching, JobStatus::Errored)
                        .await
                    {
                        error!(job_id = job.id, error = %e, "cannot record job error");
                    }
                }
                Err(e) => {
                    error!(job_id = job.id, error = %e, "artifact fetch failed, will retry");
                    incomplete = true;
                }
            }
        }

        // one repository-wide rescan however many jobs were staged
        if !staged.is_empty() {
            signal::rescan(self.indexer_pidfile.as_deref());
            for id in staged {
                if let Err(e) = self
                    .store
                    .advance(id, JobStatus::Deploying, JobStatus::Deployed)
                    .await
                {
                    error!(job_id = id, error = %e, "cannot record deployment");
                }
            }
        }
        incomplete
    }

    /// Download and stage every architecture of one job. `Ok(false)`
    /// means a transient failure: nothing advanced, the whole artifact
    /// set is retried on the next wake (no finer resume point is
    /// kept).
    async fn fetch_job_artifacts(&self, job: &Job) -> FetchResult<bool> {
        let (Some(arches), Some(artifacts)) = (job.arches.as_deref(), job.artifacts.as_deref())
        else {
            return Err(FetchError::MissingArtifacts(job.id));
        };
        let set = ArtifactSet::from_parallel(arches, artifacts).map_err(FetchError::Domain)?;
        let backend_kind = job.backend.ok_or(FetchError::MissingBackend(job.id))?;

        tokio::fs::create_dir_all(&self.staging_root).await?;

        for (arch, locator) in set.iter() {
            if arch == SOURCE_ARCH {
                continue;
            }
            if stage::already_staged(&self.staging_root, job.id, &job.maintainer, arch) {
                debug!(job_id = job.id, arch, "already staged by an earlier pass");
                continue;
            }

            let backend = self.backends.get(backend_kind)?;
            let bundle = self
                .staging_root
                .join(format!(".download.{}", std::process::id()));

            info!(job_id = job.id, arch, locator, "fetching artifact");
            if let Err(e) = backend.download_artifact(locator, &bundle).await {
                info!(job_id = job.id, arch, error = %e, "artifact not retrievable this pass");
                let _ = tokio::fs::remove_file(&bundle).await;
                return Ok(false);
            }

            let root = self.staging_root.clone();
            let maintainer = job.maintainer.clone();
            let arch_owned = arch.to_string();
            let job_id = job.id;
            let bundle_path = bundle.clone();
            let published = tokio::task::spawn_blocking(move || {
                stage::publish(&root, job_id, &maintainer, &arch_owned, &bundle_path)
            })
            .await
            .map_err(|e| FetchError::Io(std::io::Error::other(e)))?;
            let _ = tokio::fs::remove_file(&bundle).await;

            if let Err(e) = published {
                warn!(job_id = job.id, arch, error = %e, "unpack failed, will refetch");
                return Ok(false);
            }
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stevedore_core::{ArtifactSet, BuildEvent, TokenSet};

    async fn harness(name: &str) -> (Orchestrator, JobStore) {
        let staging = std::env::temp_dir().join(format!(
            "stevedore-orchestrator-{}-{name}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&staging);

        let config: Config = toml::from_str(&format!(
            "[store]\npath = \"/tmp/unused.db\"\n\
             [staging]\nroot = {:?}\n\
             [dispatch]\nmaintainer_root = \"/home\"\n",
            staging.display().to_string()
        ))
        .unwrap();

        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        stevedore_db::migrate::run(&pool).await.unwrap();
        let store = JobStore::new(pool);

        let backends = Backends {
            github: None,
            appveyor: None,
        };
        (Orchestrator::new(store.clone(), backends, &config), store)
    }

    /// Put a job into `fetching` with the given artifact set.
    async fn fetching_job(store: &JobStore, artifacts: ArtifactSet) -> i64 {
        let id = store
            .create_requested("zlib", "abc", "refs/heads/master", "jane", &TokenSet::new())
            .await
            .unwrap();
        store
            .mark_pending(id, Backend::Appveyor, "9", None)
            .await
            .unwrap();
        let event = BuildEvent {
            id,
            package: "zlib".into(),
            revision: "abc".into(),
            reference: "refs/heads/master".into(),
            maintainer: "jane".into(),
            succeeded: true,
            logurl: None,
            timestamp: None,
            duration: None,
            tokens: Some(TokenSet::parse("deploy")),
            artifacts: Some(artifacts),
        };
        store
            .apply_build_event(&event, &DeployPolicy::default())
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn settled_store_reports_complete() {
        let (orchestrator, _store) = harness("idle").await;
        assert!(!orchestrator.process().await);
    }

    #[tokio::test]
    async fn source_only_job_deploys_without_downloads() {
        let (orchestrator, store) = harness("source-only").await;
        let mut artifacts = ArtifactSet::new();
        artifacts.insert("source", "https://ci.example.com/src");
        let id = fetching_job(&store, artifacts).await;

        let incomplete = orchestrator.process().await;
        assert!(!incomplete);

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Deployed);
    }

    #[tokio::test]
    async fn unconfigured_backend_is_retried_not_errored() {
        let (orchestrator, store) = harness("no-backend").await;
        let mut artifacts = ArtifactSet::new();
        artifacts.insert("x86_64", "https://ci.example.com/a");
        let id = fetching_job(&store, artifacts).await;

        let incomplete = orchestrator.process().await;
        assert!(incomplete);

        // state untouched; the next wake retries
        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Fetching);
    }
}
