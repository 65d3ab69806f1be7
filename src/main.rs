//! Pagesmith binary entrypoint.
//!
//! Loads configuration from the environment, wires the production service
//! clients into the orchestrator, and serves the HTTP intake surface.

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use pagesmith::config::Config;
use pagesmith::generator::OpenRouterGenerator;
use pagesmith::github::GithubClient;
use pagesmith::ledger::FileLedger;
use pagesmith::notify::HttpNotifier;
use pagesmith::pipeline::Orchestrator;
use pagesmith::server::{self, AppState};

#[derive(Parser, Debug)]
#[command(
    name = "pagesmith",
    about = "Build service that turns app briefs into published static sites",
    version
)]
struct Args {
    /// Socket address to listen on (overrides PAGESMITH_BIND)
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Ledger file location (overrides the state directory default)
    #[arg(long)]
    ledger: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = Config::from_env()?;
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(ledger) = args.ledger {
        config.ledger_path = ledger;
    }

    tracing::info!(
        ledger = %config.ledger_path.display(),
        github_user = %config.github_username,
        "Configuration loaded"
    );

    let ledger = Arc::new(FileLedger::new(&config.ledger_path));
    let generator = Arc::new(OpenRouterGenerator::new(config.openrouter_api_key.clone())?);
    let repos = Arc::new(GithubClient::new(
        config.github_username.clone(),
        config.github_token.clone(),
    )?);
    let notifier = Arc::new(HttpNotifier::new()?);

    let orchestrator = Arc::new(Orchestrator::new(
        config.shared_secret.clone(),
        config.github_username.clone(),
        config.attachments_dir.clone(),
        ledger,
        generator,
        repos,
        notifier,
    ));

    server::serve(config.bind, AppState { orchestrator }).await
}
