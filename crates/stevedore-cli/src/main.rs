//! stevedore CLI.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "stevedore")]
#[command(about = "Dispatch, track and stage CI package builds", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, env = "STEVEDORE_CONFIG", default_value = "/etc/stevedore.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Request a build of a package revision
    Request {
        /// Package name
        package: String,
        /// Source revision to build
        #[arg(long)]
        commit: String,
        /// Source reference (e.g. refs/heads/master)
        #[arg(long)]
        reference: String,
        /// Requesting maintainer (defaults to the invoking user)
        #[arg(long)]
        maintainer: Option<String>,
        /// Extra behavior tokens
        #[arg(long, default_value = "")]
        tokens: String,
    },
    /// Cancel a job's in-progress remote build
    Cancel {
        /// Job id
        id: i64,
    },
    /// Force publication of a settled job (operator path)
    ForceDeploy {
        /// Job id
        id: i64,
    },
    /// Apply a build-completion event read as JSON from stdin
    Report,
    /// Analyze a source checkout and print its package metadata
    Analyze {
        /// Source checkout directory
        source: PathBuf,
        /// Default behavior tokens
        #[arg(long, default_value = "")]
        tokens: String,
    },
    /// Run the orchestrator daemon
    Daemon,
    /// Create or upgrade the job store schema
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = stevedore_config::Config::load(&cli.config)?;

    match cli.command {
        Commands::Request {
            package,
            commit,
            reference,
            maintainer,
            tokens,
        } => {
            commands::request(&config, package, commit, reference, maintainer, tokens).await?;
        }
        Commands::Cancel { id } => {
            commands::cancel(&config, id).await?;
        }
        Commands::ForceDeploy { id } => {
            commands::force_deploy(&config, id).await?;
        }
        Commands::Report => {
            commands::report(&config).await?;
        }
        Commands::Analyze { source, tokens } => {
            commands::analyze(&config, &source, &tokens).await?;
        }
        Commands::Daemon => {
            commands::daemon(&config).await?;
        }
        Commands::Migrate => {
            commands::migrate(&config).await?;
        }
    }

    Ok(())
}
