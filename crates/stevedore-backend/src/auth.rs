//! Backend credentials.
//!
//! GitHub uses a GitHub App: a short-lived RS256-signed assertion is
//! exchanged for an installation access token on every use. AppVeyor
//! uses a static bearer token read from a file.

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::{BackendError, BackendResult};

pub const GITHUB_API: &str = "https://api.github.com";
pub const ACCEPT_GITHUB_JSON: &str = "application/vnd.github.v3+json";
pub const USER_AGENT: &str = "stevedore";

#[derive(Debug, Serialize)]
struct AppClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

#[derive(Debug, Deserialize)]
struct Installation {
    account: InstallationAccount,
    access_tokens_url: String,
}

#[derive(Debug, Deserialize)]
struct InstallationAccount {
    login: String,
}

#[derive(Debug, Deserialize)]
struct AccessToken {
    token: String,
}

/// Mints installation access tokens for a GitHub App.
pub struct AppTokenMinter {
    app_id: u64,
    key: EncodingKey,
}

impl AppTokenMinter {
    pub fn new(app_id: u64, private_key_file: &Path) -> BackendResult<Self> {
        let pem = std::fs::read(private_key_file)?;
        let key = EncodingKey::from_rsa_pem(&pem)?;
        Ok(Self { app_id, key })
    }

    /// The app-level JWT: issued slightly in the past to tolerate
    /// clock drift, valid for the 10 minute maximum.
    fn app_jwt(&self) -> BackendResult<String> {
        let now = Utc::now().timestamp();
        let claims = AppClaims {
            iat: now - 60,
            exp: now + 10 * 60,
            iss: self.app_id.to_string(),
        };
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::RS256),
            &claims,
            &self.key,
        )?)
    }

    /// Exchange the app assertion for an installation token on the
    /// installation belonging to `owner`.
    pub async fn installation_token(
        &self,
        client: &reqwest::Client,
        owner: &str,
    ) -> BackendResult<String> {
        let jwt = self.app_jwt()?;

        let installations: Vec<Installation> = client
            .get(format!("{GITHUB_API}/app/installations"))
            .bearer_auth(&jwt)
            .header("Accept", ACCEPT_GITHUB_JSON)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| BackendError::Auth(format!("cannot list installations: {e}")))?
            .json()
            .await?;

        let installation = installations
            .into_iter()
            .find(|i| i.account.login == owner)
            .ok_or_else(|| BackendError::Auth(format!("no installation on {owner}")))?;

        debug!(owner, "minting installation access token");
        let token: AccessToken = client
            .post(&installation.access_tokens_url)
            .bearer_auth(&jwt)
            .header("Accept", ACCEPT_GITHUB_JSON)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| BackendError::Auth(format!("cannot create access token: {e}")))?
            .json()
            .await?;

        Ok(token.token)
    }
}

/// Read a static bearer token from a file, trimming trailing
/// whitespace.
pub fn read_token_file(path: &Path) -> BackendResult<String> {
    Ok(std::fs::read_to_string(path)?.trim().to_string())
}
