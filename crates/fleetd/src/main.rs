//! fleetd — the fleet autoscaler daemon.
//!
//! Wires one agent group together:
//! - GoCD server client (job queue, agents)
//! - Docker backend (one container per agent)
//! - Reconciler poll loop
//!
//! # Usage
//!
//! ```text
//! fleetd run --agent-env FT --agent-resources docker --agent-max-count 4 \
//!     --server-host ci.internal --agent-auto-register-key $KEY
//! fleetd check-config --config /etc/fleet/fleet.toml
//! ```

mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fleet_core::FleetConfig;
use fleet_docker::{AgentTemplate, DockerExecutor, Endpoint};
use fleet_gocd::GocdClient;
use fleet_reconcile::{CiServer, Executor, Reconciler};

use crate::cli::{Cli, Command, LogFormat, Settings};

const DEFAULT_FILTER: &str = "info,fleetd=debug,fleet=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = cli.command.settings();
    init_tracing(settings.verbose, settings.log_format);

    match cli.command {
        Command::Run { settings, once } => run(&settings, once).await,
        Command::CheckConfig { settings } => check_config(&settings),
    }
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let default = if verbose { "debug" } else { DEFAULT_FILTER };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

async fn run(settings: &Settings, once: bool) -> anyhow::Result<()> {
    let config = settings.load()?;
    let interval = config.poll_interval()?;

    let server = gocd_client(&config)?;
    let executor = docker_executor(&config).await?;
    let reconciler = Reconciler::new(config.match_config(), server, executor);

    info!(
        server = %config.server_url(),
        environments = ?config.agent.environments,
        resources = ?config.agent.resources,
        max_agents = config.agent.max_agents,
        "fleetd starting"
    );

    if once {
        let decision = reconciler.execute().await.into_result()?;
        info!(?decision, "cycle complete");
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        reconciler.run(interval, shutdown_rx).await;
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to install Ctrl-C handler")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    handle.await?;

    info!("fleetd stopped");
    Ok(())
}

fn check_config(settings: &Settings) -> anyhow::Result<()> {
    let config = settings.load()?;
    print!("{}", config.redacted().to_toml_string()?);
    Ok(())
}

fn gocd_client(config: &FleetConfig) -> anyhow::Result<Arc<dyn CiServer>> {
    let mut client = GocdClient::new(&config.server_url())?;
    if !config.server.username.is_empty() {
        client = client.with_basic_auth(&config.server.username, &config.server.password)?;
    }
    Ok(Arc::new(client))
}

async fn docker_executor(config: &FleetConfig) -> anyhow::Result<Arc<dyn Executor>> {
    let endpoint = if config.docker.from_env {
        Endpoint::FromEnv
    } else {
        Endpoint::parse(&config.docker.endpoint)?
    };
    let docker = fleet_docker::connect(&endpoint).await?;
    info!(image = %config.docker.image, "docker backend ready");
    Ok(Arc::new(DockerExecutor::new(docker, AgentTemplate::from_config(config))))
}
