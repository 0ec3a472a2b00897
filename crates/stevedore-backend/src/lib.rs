//! CI backend clients.
//!
//! Two external services execute builds: GitHub workflow dispatch and
//! AppVeyor. Both sit behind [`CiBackend`]; the dispatcher and the
//! fetchers never speak REST themselves.

pub mod appveyor;
pub mod auth;
pub mod error;
pub mod github;

pub use appveyor::AppveyorBackend;
pub use error::{BackendError, BackendResult};
pub use github::GithubBackend;

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use stevedore_core::{Backend, MetadataUpdate};

/// Parameters handed to a backend when submitting a build.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    /// Our build number; round-trips through the backend and the
    /// metadata artifact.
    pub build_number: i64,
    pub package: String,
    pub revision: String,
    pub reference: String,
    pub maintainer: String,
    /// Resolved token string passed to the build harness.
    pub tokens: String,
}

/// Result of a successful submission.
#[derive(Debug, Clone)]
pub struct Submission {
    /// Backend-assigned run handle, opaque to us.
    pub backend_id: String,
    /// Human-facing page for the run, when the backend reports one.
    pub logurl: Option<String>,
}

/// One external CI service.
#[async_trait]
pub trait CiBackend: Send + Sync {
    fn name(&self) -> Backend;

    /// Submit a build and resolve its backend handle.
    async fn submit(&self, request: &SubmitRequest) -> BackendResult<Submission>;

    /// Abort an in-progress remote build. Backends without a cancel
    /// API report the limitation instead of silently succeeding.
    async fn cancel(&self, backend_id: &str) -> BackendResult<()>;

    /// Retrieve the run's metadata artifact. `Ok(None)` means the
    /// artifact is not yet available and the caller should retry on a
    /// later wake.
    async fn fetch_run_metadata(
        &self,
        build_number: i64,
        backend_id: &str,
    ) -> BackendResult<Option<MetadataUpdate>>;

    /// Download one artifact bundle to a local file.
    async fn download_artifact(&self, locator: &str, dest: &Path) -> BackendResult<()>;
}

/// The configured backends, looked up per job.
pub struct Backends {
    pub github: Option<GithubBackend>,
    pub appveyor: Option<AppveyorBackend>,
}

impl Backends {
    /// Construct every backend present in the configuration.
    pub fn from_config(
        config: &stevedore_config::Config,
        timeout: Duration,
    ) -> BackendResult<Self> {
        let github = config
            .github
            .as_ref()
            .map(|c| GithubBackend::new(c, timeout))
            .transpose()?;
        let appveyor = config
            .appveyor
            .as_ref()
            .map(|c| AppveyorBackend::new(c, timeout))
            .transpose()?;
        Ok(Self { github, appveyor })
    }

    pub fn get(&self, backend: Backend) -> BackendResult<&dyn CiBackend> {
        match backend {
            Backend::Github => self
                .github
                .as_ref()
                .map(|b| b as &dyn CiBackend)
                .ok_or(BackendError::NotConfigured(backend)),
            Backend::Appveyor => self
                .appveyor
                .as_ref()
                .map(|b| b as &dyn CiBackend)
                .ok_or(BackendError::NotConfigured(backend)),
        }
    }
}

/// Stream an HTTP response body to a file.
pub(crate) async fn download_to_file(
    response: reqwest::Response,
    dest: &Path,
) -> BackendResult<()> {
    use futures::StreamExt;
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::File::create(dest).await?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        file.write_all(&chunk?).await?;
    }
    file.flush().await?;
    Ok(())
}
