//! AppVeyor backend.
//!
//! The legacy poll-free path: the build-submission endpoint returns
//! the assigned build id synchronously, so no discovery lock or poll
//! loop is needed. Completion events arrive with tokens and artifact
//! locators inline, so this backend never serves a metadata fetch.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use stevedore_config::AppveyorConfig;
use stevedore_core::{Backend, MetadataUpdate};

use crate::auth::read_token_file;
use crate::error::{BackendError, BackendResult};
use crate::{CiBackend, SubmitRequest, Submission, download_to_file};

const APPVEYOR_API: &str = "https://ci.appveyor.com/api";

#[derive(Debug, Deserialize)]
struct BuildResponse {
    #[serde(rename = "buildId")]
    build_id: u64,
}

pub struct AppveyorBackend {
    client: reqwest::Client,
    account: String,
    slug: String,
    token: String,
}

impl AppveyorBackend {
    pub fn new(config: &AppveyorConfig, timeout: Duration) -> BackendResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            account: config.account.clone(),
            slug: config.slug.clone(),
            token: read_token_file(&config.token_file)?,
        })
    }

    /// A bare locator is an AppVeyor build-job id; expand it to the
    /// job's bundled-artifacts URL. Full URLs pass through.
    fn artifact_url(locator: &str) -> String {
        if locator.starts_with("http") {
            locator.to_string()
        } else {
            format!("{APPVEYOR_API}/buildjobs/{locator}/artifacts/artifacts.zip")
        }
    }
}

#[async_trait]
impl CiBackend for AppveyorBackend {
    fn name(&self) -> Backend {
        Backend::Appveyor
    }

    async fn submit(&self, request: &SubmitRequest) -> BackendResult<Submission> {
        let payload = serde_json::json!({
            "accountName": self.account,
            "projectSlug": self.slug,
            "branch": "master",
            "environmentVariables": {
                "BUILDNUMBER": request.build_number,
                "PACKAGE": request.package,
                "MAINTAINER": request.maintainer,
                "COMMIT": request.revision,
                "REFERENCE": request.reference,
                "DEFAULT_TOKENS": request.tokens,
            },
        });

        let response = self
            .client
            .post(format!("{APPVEYOR_API}/builds"))
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .json(&payload)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(BackendError::Api(format!(
                "build submission failed with status {}",
                response.status()
            )));
        }
        let build: BuildResponse = response.json().await?;

        info!(build_id = build.build_id, "build submitted");
        Ok(Submission {
            backend_id: build.build_id.to_string(),
            logurl: None,
        })
    }

    async fn cancel(&self, _backend_id: &str) -> BackendResult<()> {
        Err(BackendError::Unsupported("build cancellation"))
    }

    async fn fetch_run_metadata(
        &self,
        _build_number: i64,
        _backend_id: &str,
    ) -> BackendResult<Option<MetadataUpdate>> {
        Err(BackendError::Unsupported("metadata fetch"))
    }

    async fn download_artifact(&self, locator: &str, dest: &Path) -> BackendResult<()> {
        let response = self
            .client
            .get(Self::artifact_url(locator))
            .send()
            .await?
            .error_for_status()?;
        download_to_file(response, dest).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_locators_expand_to_the_buildjobs_url() {
        assert_eq!(
            AppveyorBackend::artifact_url("abc123"),
            "https://ci.appveyor.com/api/buildjobs/abc123/artifacts/artifacts.zip"
        );
    }

    #[test]
    fn full_urls_pass_through() {
        let url = "https://ci.appveyor.com/api/buildjobs/xyz/artifacts/artifacts.zip";
        assert_eq!(AppveyorBackend::artifact_url(url), url);
    }

    #[test]
    fn build_response_parses() {
        let response: BuildResponse =
            serde_json::from_str(r#"{"buildId": 987654, "status": "queued"}"#).unwrap();
        assert_eq!(response.build_id, 987654);
    }
}
