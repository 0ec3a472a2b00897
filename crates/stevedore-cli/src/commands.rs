//! Subcommand implementations.

use anyhow::Context;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use stevedore_backend::Backends;
use stevedore_config::Config;
use stevedore_core::{BuildEvent, TokenSet};
use stevedore_db::JobStore;
use stevedore_dispatch::{BuildRequest, DispatchOutcome};
use stevedore_fetcher::Orchestrator;

async fn open_store(config: &Config) -> anyhow::Result<JobStore> {
    let pool = stevedore_db::create_pool(&config.store.path)
        .await
        .with_context(|| format!("cannot open job store {}", config.store.path.display()))?;
    stevedore_db::migrate::run(&pool).await?;
    Ok(JobStore::new(pool))
}

fn open_backends(config: &Config) -> anyhow::Result<Backends> {
    let timeout = Duration::from_secs(config.orchestrator.http_timeout_secs);
    Ok(Backends::from_config(config, timeout)?)
}

/// The invoking maintainer: explicit flag, the wrapper-provided
/// environment variable, the account's full name, or the login name.
fn maintainer_name(explicit: Option<String>) -> anyhow::Result<String> {
    if let Some(name) = explicit {
        return Ok(name);
    }
    if let Ok(name) = std::env::var("STEVEDORE_MAINTAINER") {
        return Ok(name);
    }
    let user = nix::unistd::User::from_uid(nix::unistd::getuid())?
        .context("cannot resolve the invoking user")?;
    let gecos = user.gecos.to_string_lossy();
    let full_name = gecos.split(',').next().unwrap_or("").trim();
    if !full_name.is_empty() {
        return Ok(full_name.to_string());
    }
    Ok(user.name)
}

pub async fn request(
    config: &Config,
    package: String,
    commit: String,
    reference: String,
    maintainer: Option<String>,
    tokens: String,
) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let backends = open_backends(config)?;

    let request = BuildRequest {
        revision: commit,
        reference,
        package,
        maintainer: maintainer_name(maintainer)?,
        tokens: TokenSet::parse(&tokens),
    };

    match stevedore_dispatch::request_build(&request, &store, &backends, config).await {
        Ok(DispatchOutcome::Declined(reason)) => {
            println!("stevedore: not building: {reason}");
        }
        Ok(DispatchOutcome::Submitted {
            build_number,
            backend,
            tracking_url,
        }) => {
            println!("stevedore: build {build_number} queued on {backend}");
            if let Some(url) = tracking_url {
                println!("stevedore: {url}");
            }
        }
        Err(e) if e.is_protocol_anomaly() => {
            println!("stevedore: {e}");
            println!("stevedore: PLEASE REPORT THIS!");
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

pub async fn cancel(config: &Config, id: i64) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let backends = open_backends(config)?;

    let job = store
        .get(id)
        .await?
        .with_context(|| format!("no job {id}"))?;
    let (backend, backend_id) = match (job.backend, job.backend_id) {
        (Some(backend), Some(backend_id)) => (backend, backend_id),
        _ => anyhow::bail!("job {id} was never dispatched"),
    };

    match stevedore_dispatch::cancel_build(backend, &backend_id, &backends).await {
        Ok(()) => println!("stevedore: cancellation requested for build {id}"),
        Err(stevedore_dispatch::DispatchError::Backend(
            stevedore_backend::BackendError::Unsupported(what),
        )) => {
            println!("stevedore: {what} is not supported by {backend}");
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

pub async fn force_deploy(config: &Config, id: i64) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    store.force_deploy(id, &config.policy).await?;
    println!("stevedore: build {id} queued for publication");
    Ok(())
}

pub async fn report(config: &Config) -> anyhow::Result<()> {
    let store = open_store(config).await?;

    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;
    let event: BuildEvent = serde_json::from_str(&input).context("malformed build event")?;

    let outcome = store.apply_build_event(&event, &config.policy).await?;
    println!("stevedore: event for build {} applied: {outcome:?}", event.id);
    Ok(())
}

pub async fn analyze(config: &Config, source: &Path, tokens: &str) -> anyhow::Result<()> {
    let metadata =
        stevedore_analyzer::analyze(source, &TokenSet::parse(tokens), &config.analyzer).await;
    println!("{}", serde_json::to_string_pretty(&metadata)?);
    Ok(())
}

pub async fn daemon(config: &Config) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let backends = open_backends(config)?;

    tracing::info!("starting orchestrator daemon");
    let orchestrator = Orchestrator::new(store, backends, config);
    orchestrator.run().await;
    Ok(())
}

pub async fn migrate(config: &Config) -> anyhow::Result<()> {
    let pool = stevedore_db::create_pool(&config.store.path).await?;
    stevedore_db::migrate::run(&pool).await?;
    println!("stevedore: job store schema is current");
    Ok(())
}
