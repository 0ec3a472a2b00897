//! System configuration for stevedore.
//!
//! One TOML file (`stevedore.toml`) configures every process: the
//! dispatcher CLI, the orchestrator daemon and the analyzer. Backend
//! sections are optional so a deployment can run with a single
//! backend configured.

pub mod error;

pub use error::{ConfigError, ConfigResult};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use stevedore_core::DeployPolicy;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "STEVEDORE_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "/etc/stevedore.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    pub staging: StagingConfig,
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub policy: DeployPolicy,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub github: Option<GithubConfig>,
    #[serde(default)]
    pub appveyor: Option<AppveyorConfig>,
}

/// Job store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path of the SQLite database file.
    pub path: PathBuf,
}

/// Staging tree layout and downstream signalling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingConfig {
    /// Root of the published staging tree.
    pub root: PathBuf,
    /// Pidfile of the downstream repository indexer; a missing file
    /// means no rescan signal is sent.
    #[serde(default)]
    pub indexer_pidfile: Option<PathBuf>,
}

/// Dispatcher knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Exclusive lock taken around the GitHub dispatch window.
    #[serde(default = "default_lock_file")]
    pub lock_file: PathBuf,
    /// Root of per-maintainer home directories holding `!tokens`
    /// defaults files.
    pub maintainer_root: PathBuf,
    /// Base URL of the job tracking page printed after dispatch.
    #[serde(default)]
    pub jobs_url: Option<Url>,
}

fn default_lock_file() -> PathBuf {
    PathBuf::from("/tmp/stevedore.dispatch.lock")
}

/// Script analyzer knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// External evaluator command for the port-script dialect.
    #[serde(default = "default_evaluator")]
    pub evaluator: String,
}

fn default_evaluator() -> String {
    "port".to_string()
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            evaluator: default_evaluator(),
        }
    }
}

/// Orchestrator daemon knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Fallback wake interval, seconds.
    #[serde(default = "default_wake_interval")]
    pub wake_interval_secs: u64,
    /// Request timeout applied to every backend HTTP call, seconds.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

fn default_wake_interval() -> u64 {
    60
}

fn default_http_timeout() -> u64 {
    60
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            wake_interval_secs: default_wake_interval(),
            http_timeout_secs: default_http_timeout(),
        }
    }
}

/// GitHub backend: the repository whose workflow runs the builds, and
/// the GitHub App used to authenticate against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    pub owner: String,
    pub repo: String,
    pub app_id: u64,
    /// PEM-encoded RSA private key of the GitHub App.
    pub private_key_file: PathBuf,
}

/// AppVeyor backend: account, project and static token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppveyorConfig {
    pub account: String,
    pub slug: String,
    pub token_file: PathBuf,
}

impl Config {
    /// Parse a configuration file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        Ok(toml::from_str(&text)?)
    }

    /// Parse the file named by `STEVEDORE_CONFIG`, falling back to the
    /// system default path.
    pub fn load_default() -> ConfigResult<Self> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [store]
        path = "/var/lib/stevedore/jobs.db"

        [staging]
        root = "/srv/staging"

        [dispatch]
        maintainer_root = "/home"
    "#;

    #[test]
    fn minimal_config_fills_defaults() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.analyzer.evaluator, "port");
        assert_eq!(config.orchestrator.wake_interval_secs, 60);
        assert_eq!(config.orchestrator.http_timeout_secs, 60);
        assert_eq!(config.policy.mainline_reference, "refs/heads/master");
        assert_eq!(config.policy.sandbox_package, "playground");
        assert_eq!(
            config.dispatch.lock_file,
            PathBuf::from("/tmp/stevedore.dispatch.lock")
        );
        assert!(config.github.is_none());
        assert!(config.appveyor.is_none());
    }

    #[test]
    fn backend_sections_parse() {
        let text = format!(
            "{MINIMAL}\n\
             [github]\n\
             owner = \"example\"\n\
             repo = \"builders\"\n\
             app_id = 12345\n\
             private_key_file = \"/etc/stevedore/app.pem\"\n\
             \n\
             [appveyor]\n\
             account = \"example\"\n\
             slug = \"builders\"\n\
             token_file = \"/etc/stevedore/appveyor.token\"\n"
        );
        let config: Config = toml::from_str(&text).unwrap();
        let github = config.github.unwrap();
        assert_eq!(github.app_id, 12345);
        assert_eq!(config.appveyor.unwrap().slug, "builders");
    }
}
