//! Build dispatcher.
//!
//! Resolves a maintainer's behavior tokens, records the job, submits
//! it to a backend and stores the backend handle. Dispatch requests
//! arrive from many concurrent callers (one per source-control push),
//! so the GitHub path takes a cross-process file lock around its
//! run-discovery window.

pub mod error;
pub mod lock;

pub use error::{DispatchError, DispatchResult};
pub use lock::DispatchLock;

use std::path::Path;
use tracing::info;

use stevedore_backend::{Backends, SubmitRequest};
use stevedore_config::Config;
use stevedore_core::{Backend, TokenSet};
use stevedore_db::JobStore;

/// Per-maintainer defaults file inside the maintainer's home.
const TOKENS_FILE: &str = "!tokens";

/// One inbound build request.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub revision: String,
    pub reference: String,
    pub package: String,
    pub maintainer: String,
    /// Tokens given with the request itself.
    pub tokens: TokenSet,
}

/// What dispatch did.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// Declined before any row was created.
    Declined(&'static str),
    Submitted {
        build_number: i64,
        backend: Backend,
        tracking_url: Option<String>,
    },
}

/// Why a resolved token set blocks dispatch, if it does.
fn decline_reason(tokens: &TokenSet) -> Option<&'static str> {
    if tokens.disabled() {
        return Some("disabled by maintainer");
    }
    if tokens.disables_build() {
        return Some("nobuild token present");
    }
    None
}

/// Read the maintainer's standing default tokens. A missing file is
/// an empty set.
fn default_tokens(maintainer_root: &Path, maintainer: &str) -> TokenSet {
    let path = maintainer_root.join(maintainer).join(TOKENS_FILE);
    match std::fs::read_to_string(&path) {
        Ok(text) => TokenSet::parse(&text),
        Err(_) => TokenSet::new(),
    }
}

fn tracking_url(config: &Config, build_number: i64) -> Option<String> {
    config
        .dispatch
        .jobs_url
        .as_ref()
        .map(|url| format!("{url}?id={build_number}"))
}

/// Dispatch a build request.
///
/// On a declined request nothing is recorded. On a backend failure
/// the job row remains at `requested` and the error propagates; no
/// `pending` row ever exists without a backend handle.
pub async fn request_build(
    request: &BuildRequest,
    store: &JobStore,
    backends: &Backends,
    config: &Config,
) -> DispatchResult<DispatchOutcome> {
    let defaults = default_tokens(&config.dispatch.maintainer_root, &request.maintainer);
    let resolved = defaults.merged(&request.tokens);

    if let Some(reason) = decline_reason(&resolved) {
        info!(
            package = %request.package,
            maintainer = %request.maintainer,
            reason,
            "build request declined"
        );
        return Ok(DispatchOutcome::Declined(reason));
    }

    let build_number = store
        .create_requested(
            &request.package,
            &request.revision,
            &request.reference,
            &request.maintainer,
            &request.tokens,
        )
        .await?;

    let submit = SubmitRequest {
        build_number,
        package: request.package.clone(),
        revision: request.revision.clone(),
        reference: request.reference.clone(),
        maintainer: request.maintainer.clone(),
        tokens: resolved.to_string(),
    };

    let (backend, submission) = if resolved.selects_appveyor() {
        let backend = backends.get(Backend::Appveyor)?;
        (Backend::Appveyor, backend.submit(&submit).await?)
    } else {
        // run discovery on this backend is diff-based; serialize all
        // dispatches system-wide for the whole window
        let _lock = DispatchLock::acquire(&config.dispatch.lock_file).await?;
        let backend = backends.get(Backend::Github)?;
        (Backend::Github, backend.submit(&submit).await?)
    };

    store
        .mark_pending(
            build_number,
            backend,
            &submission.backend_id,
            submission.logurl.as_deref(),
        )
        .await?;

    info!(build_number, %backend, "build queued");
    Ok(DispatchOutcome::Submitted {
        build_number,
        backend,
        tracking_url: tracking_url(config, build_number),
    })
}

/// Abort an in-progress remote build.
pub async fn cancel_build(
    backend: Backend,
    backend_id: &str,
    backends: &Backends,
) -> DispatchResult<()> {
    backends.get(backend)?.cancel(backend_id).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn disable_and_nobuild_decline() {
        assert_eq!(
            decline_reason(&TokenSet::parse("disable")),
            Some("disabled by maintainer")
        );
        assert_eq!(
            decline_reason(&TokenSet::parse("nobuild deploy")),
            Some("nobuild token present")
        );
        assert_eq!(decline_reason(&TokenSet::parse("deploy")), None);
    }

    #[test]
    fn missing_defaults_file_is_empty() {
        let tokens = default_tokens(Path::new("/nonexistent"), "nobody");
        assert!(tokens.is_empty());
    }

    #[test]
    fn defaults_file_is_read_and_merged() {
        let root = std::env::temp_dir().join(format!(
            "stevedore-dispatch-{}-defaults",
            std::process::id()
        ));
        let home = root.join("jane");
        std::fs::create_dir_all(&home).unwrap();
        std::fs::write(home.join(TOKENS_FILE), "appveyor\ndeploy\n").unwrap();

        let defaults = default_tokens(&root, "jane");
        assert!(defaults.selects_appveyor());

        let resolved = defaults.merged(&TokenSet::parse("nodeploy"));
        assert!(resolved.contains("deploy"));
        assert!(resolved.contains("nodeploy"));
    }

    #[test]
    fn tracking_url_includes_the_build_number() {
        let mut config: Config = toml::from_str(
            "[store]\npath = \"/tmp/jobs.db\"\n[staging]\nroot = \"/tmp/staging\"\n[dispatch]\nmaintainer_root = \"/home\"\n",
        )
        .unwrap();
        assert_eq!(tracking_url(&config, 7), None);

        config.dispatch.jobs_url = Some("https://example.com/jobs".parse().unwrap());
        assert_eq!(
            tracking_url(&config, 7).as_deref(),
            Some("https://example.com/jobs?id=7")
        );
    }

    #[test]
    fn defaults_path_layout() {
        // <root>/<maintainer>/!tokens
        let path = PathBuf::from("/home").join("jane").join(TOKENS_FILE);
        assert_eq!(path, PathBuf::from("/home/jane/!tokens"));
    }
}
