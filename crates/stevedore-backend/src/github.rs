//! GitHub workflow-dispatch backend.
//!
//! Triggering a workflow via `repository_dispatch` returns no run
//! handle; the only way to learn the assigned run id is to record the
//! most recent run id before triggering and poll until a different
//! one appears. The caller must hold the dispatch lock across
//! [`CiBackend::submit`] so concurrent dispatches cannot confuse that
//! discovery.

use async_trait::async_trait;
use serde::Deserialize;
use std::io::{Cursor, Read};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use stevedore_config::GithubConfig;
use stevedore_core::{ArtifactSet, Backend, MetadataUpdate, TokenSet};

use crate::auth::{ACCEPT_GITHUB_JSON, AppTokenMinter, GITHUB_API, USER_AGENT};
use crate::error::{BackendError, BackendResult};
use crate::{CiBackend, SubmitRequest, Submission, download_to_file};

/// Only runs created by our trigger event are considered during
/// discovery.
const RUN_DISCOVERY_EVENT: &str = "repository_dispatch";
/// Bounded poll for the new run id: tens of attempts, 1 s spacing.
const POLL_ATTEMPTS: u32 = 60;
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Well-known artifact carrying the build's self-description.
const METADATA_ARTIFACT: &str = "metadata";
/// The document inside the metadata artifact zip.
const METADATA_MEMBER: &str = "metadata.json";
/// Scratch artifacts never fetched.
const BUILDDIR_MARKER: &str = "builddir";
/// Per-arch artifact bundles are named `<arch> packages`.
const PACKAGES_SUFFIX: &str = "packages";

#[derive(Debug, Deserialize)]
struct RunList {
    workflow_runs: Vec<Run>,
}

#[derive(Debug, Deserialize)]
struct Run {
    id: u64,
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArtifactList {
    artifacts: Vec<ArtifactEntry>,
}

#[derive(Debug, Deserialize)]
struct ArtifactEntry {
    name: String,
    archive_download_url: String,
}

#[derive(Debug, Deserialize)]
struct MetadataDoc {
    #[serde(rename = "BUILDNUMBER")]
    build_number: i64,
    #[serde(rename = "PACKAGE")]
    package: String,
    #[serde(rename = "COMMIT")]
    revision: String,
    #[serde(rename = "REFERENCE")]
    reference: String,
    #[serde(rename = "MAINTAINER")]
    maintainer: String,
    #[serde(rename = "TOKENS")]
    tokens: String,
    #[serde(rename = "ANNOUNCE", default)]
    announce: Option<String>,
}

pub struct GithubBackend {
    client: reqwest::Client,
    owner: String,
    repo: String,
    minter: AppTokenMinter,
}

impl GithubBackend {
    pub fn new(config: &GithubConfig, timeout: Duration) -> BackendResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            minter: AppTokenMinter::new(config.app_id, &config.private_key_file)?,
        })
    }

    fn repo_url(&self, tail: &str) -> String {
        format!("{GITHUB_API}/repos/{}/{}/{tail}", self.owner, self.repo)
    }

    /// The id and page URL of the most recent trigger-event run, if
    /// the backend reports one. Transient failures come back as
    /// `None`; the callers all retry.
    async fn most_recent_run(&self, token: &str) -> Option<(u64, Option<String>)> {
        let url = format!(
            "{}?event={}&per_page=1",
            self.repo_url("actions/runs"),
            urlencoding::encode(RUN_DISCOVERY_EVENT)
        );
        let response = match self
            .client
            .get(&url)
            .bearer_auth(token)
            .header("Accept", ACCEPT_GITHUB_JSON)
            .header("User-Agent", USER_AGENT)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "run listing request failed");
                return None;
            }
        };
        if !response.status().is_success() {
            warn!(status = %response.status(), "run listing REST API failed");
            return None;
        }
        let list: RunList = match response.json().await {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "run listing parse failed");
                return None;
            }
        };
        let run = list.workflow_runs.into_iter().next()?;
        debug!(run_id = run.id, "most recent run");
        Some((run.id, run.html_url))
    }
}

#[async_trait]
impl CiBackend for GithubBackend {
    fn name(&self) -> Backend {
        Backend::Github
    }

    async fn submit(&self, request: &SubmitRequest) -> BackendResult<Submission> {
        let token = self
            .minter
            .installation_token(&self.client, &self.owner)
            .await?;

        // record the most recent run id before triggering
        let mut prior = None;
        for _ in 0..POLL_ATTEMPTS {
            if let Some((id, _)) = self.most_recent_run(&token).await {
                prior = Some(id);
                break;
            }
            info!("waiting for the prior run id before retry");
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        if prior.is_none() {
            // proceed anyway: any run id that appears now is ours
            error!("backend never reported a prior run id; discovery may misattribute");
        }

        // quoting in the token string is harmful once the payload is
        // passed to the build harness on a command line
        let tokens: String = request
            .tokens
            .chars()
            .filter(|c| *c != '\'' && *c != '"')
            .collect();

        let payload = serde_json::json!({
            // shows up as the run name in the UI
            "event_type": format!("({}) {}", request.build_number, request.package),
            "client_payload": {
                "BUILDNUMBER": request.build_number,
                "PACKAGE": request.package,
                "MAINTAINER": request.maintainer,
                "COMMIT": request.revision,
                "REFERENCE": request.reference,
                "DEFAULT_TOKENS": tokens,
            },
        });

        let response = self
            .client
            .post(self.repo_url("dispatches"))
            .bearer_auth(&token)
            .header("Accept", ACCEPT_GITHUB_JSON)
            .header("User-Agent", USER_AGENT)
            .json(&payload)
            .send()
            .await?;
        if response.status() != reqwest::StatusCode::NO_CONTENT {
            return Err(BackendError::Api(format!(
                "dispatch trigger failed with status {}",
                response.status()
            )));
        }

        // the requested run surfaces in the listing with some delay;
        // poll until an id different from the prior one appears
        for _ in 0..POLL_ATTEMPTS {
            if let Some((id, logurl)) = self.most_recent_run(&token).await {
                if Some(id) != prior {
                    info!(run_id = id, "new run discovered");
                    return Ok(Submission {
                        backend_id: id.to_string(),
                        logurl,
                    });
                }
            }
            debug!("waiting for a new run id");
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        Err(BackendError::RunDiscoveryTimeout)
    }

    async fn cancel(&self, backend_id: &str) -> BackendResult<()> {
        let token = self
            .minter
            .installation_token(&self.client, &self.owner)
            .await?;
        let response = self
            .client
            .post(self.repo_url(&format!("actions/runs/{backend_id}/cancel")))
            .bearer_auth(&token)
            .header("Accept", ACCEPT_GITHUB_JSON)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;
        if response.status() != reqwest::StatusCode::ACCEPTED {
            return Err(BackendError::Api(format!(
                "run cancel failed with status {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn fetch_run_metadata(
        &self,
        build_number: i64,
        backend_id: &str,
    ) -> BackendResult<Option<MetadataUpdate>> {
        let token = self
            .minter
            .installation_token(&self.client, &self.owner)
            .await?;

        let response = self
            .client
            .get(self.repo_url(&format!("actions/runs/{backend_id}/artifacts")))
            .bearer_auth(&token)
            .header("Accept", ACCEPT_GITHUB_JSON)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;
        if !response.status().is_success() {
            info!(status = %response.status(), "artifact listing not available");
            return Ok(None);
        }
        let list: ArtifactList = response.json().await?;

        let mut artifacts = ArtifactSet::new();
        let mut doc = None;

        for entry in &list.artifacts {
            if entry.name.contains(BUILDDIR_MARKER) {
                continue;
            }
            if entry.name == METADATA_ARTIFACT {
                // the download URL takes a while to become valid after
                // the run finishes; a failure here is "not yet"
                let response = self
                    .client
                    .get(&entry.archive_download_url)
                    .bearer_auth(&token)
                    .header("User-Agent", USER_AGENT)
                    .send()
                    .await?;
                if !response.status().is_success() {
                    info!(status = %response.status(), "metadata artifact not yet downloadable");
                    return Ok(None);
                }
                let bytes = response.bytes().await?;
                doc = Some(parse_metadata_zip(&bytes)?);
                continue;
            }
            if let Some(arch) = artifact_arch(&entry.name) {
                artifacts.insert(&arch, &entry.archive_download_url);
            }
        }

        let Some(doc) = doc else {
            info!("metadata artifact not present in the listing yet");
            return Ok(None);
        };
        if doc.build_number != build_number {
            warn!(
                doc_build_number = doc.build_number,
                build_number, "metadata artifact names a different build"
            );
        }

        Ok(Some(MetadataUpdate {
            id: build_number,
            package: doc.package,
            revision: doc.revision,
            reference: doc.reference,
            maintainer: doc.maintainer,
            tokens: TokenSet::parse(&doc.tokens),
            announce: doc.announce.filter(|a| !a.is_empty()),
            artifacts,
        }))
    }

    async fn download_artifact(&self, locator: &str, dest: &Path) -> BackendResult<()> {
        let token = self
            .minter
            .installation_token(&self.client, &self.owner)
            .await?;
        let response = self
            .client
            .get(locator)
            .bearer_auth(&token)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?
            .error_for_status()?;
        download_to_file(response, dest).await
    }
}

/// Architecture tag of a `<arch> packages` artifact, normalized.
fn artifact_arch(name: &str) -> Option<String> {
    let arch = name.strip_suffix(PACKAGES_SUFFIX)?.trim();
    if arch.is_empty() {
        return None;
    }
    Some(arch.replace("i686", "x86"))
}

fn parse_metadata_zip(bytes: &[u8]) -> BackendResult<MetadataDoc> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut member = archive.by_name(METADATA_MEMBER)?;
    let mut contents = String::new();
    member.read_to_string(&mut contents)?;
    Ok(serde_json::from_str(&contents)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn run_listing_parses() {
        let list: RunList = serde_json::from_str(
            r#"{"total_count": 1, "workflow_runs": [
                {"id": 31415, "html_url": "https://github.com/example/builders/actions/runs/31415"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(list.workflow_runs[0].id, 31415);
    }

    #[test]
    fn artifact_arch_normalizes() {
        assert_eq!(artifact_arch("x86_64 packages").as_deref(), Some("x86_64"));
        assert_eq!(artifact_arch("i686 packages").as_deref(), Some("x86"));
        assert_eq!(artifact_arch("metadata"), None);
        assert_eq!(artifact_arch("packages"), None);
    }

    #[test]
    fn metadata_zip_round_trips() {
        let doc = serde_json::json!({
            "BUILDNUMBER": 42,
            "PACKAGE": "zlib",
            "COMMIT": "abc123",
            "REFERENCE": "refs/heads/master",
            "MAINTAINER": "Jane Maintainer",
            "TOKENS": "deploy",
            "ANNOUNCE": "new upstream release",
        });
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file(METADATA_MEMBER, options).unwrap();
            writer.write_all(doc.to_string().as_bytes()).unwrap();
            writer.finish().unwrap();
        }

        let parsed = parse_metadata_zip(buffer.get_ref()).unwrap();
        assert_eq!(parsed.build_number, 42);
        assert_eq!(parsed.package, "zlib");
        assert_eq!(parsed.tokens, "deploy");
        assert_eq!(parsed.announce.as_deref(), Some("new upstream release"));
    }
}
