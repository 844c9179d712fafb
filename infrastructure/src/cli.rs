//! CLI argument parsing with clap derive

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use che_common::{ReplicationConfig, workspace_status_key};
use serde::Serialize;

use che_infra::application::converters::{
    DockerEnvironmentConverter, KubernetesEnvironmentConverter,
};
use che_infra::application::idle::{
    EventService, ServerIdleDetector, WorkspaceIdleFilter, agent_router, status_changes,
};
use che_infra::application::{
    EnvironmentConverter, MachineTokenProvider, WorkspaceStatusCache, docker_pipeline,
    kubernetes_pipeline,
};
use che_infra::domain::{InfraConfig, InternalEnvironment, RuntimeIdentity};
use che_infra::infra::{
    FileMachineTokenProvider, ValkeyReplicatedMap, load_infra_config, load_replication_config,
};

/// Workspace runtime infrastructure: environment provisioning and idle
/// detection
#[derive(Parser)]
#[command(
    name = "che-infra",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Convert and provision an environment, print it as JSON
    Provision(ProvisionArgs),

    /// Follow workspace statuses and report when the server is idle
    Watch(WatchArgs),

    /// Serve a workspace agent that stops the workspace when idle
    Agent(AgentArgs),
}

#[derive(Args)]
pub struct ProvisionArgs {
    /// YAML document with the recipe and machine declarations
    #[arg(long)]
    pub recipe: PathBuf,

    /// Workspace id
    #[arg(long)]
    pub workspace: String,

    /// Environment name
    #[arg(long, default_value = "default")]
    pub env_name: String,

    /// Workspace owner id
    #[arg(long, default_value = "che")]
    pub owner: String,

    #[arg(long, value_enum, default_value_t = Target::Kubernetes)]
    pub target: Target,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Target {
    Docker,
    Kubernetes,
}

#[derive(Args)]
pub struct WatchArgs {
    /// Seconds between reads of the status cache
    #[arg(long, default_value_t = 5)]
    pub poll_secs: u64,
}

#[derive(Args)]
pub struct AgentArgs {
    /// Workspace id the agent belongs to
    #[arg(long)]
    pub workspace: String,

    /// Listen address
    #[arg(long, default_value = "0.0.0.0:4401")]
    pub listen: String,
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded or the command fails.
    pub async fn run(self) -> Result<()> {
        let config = load_infra_config()?;
        match self.command {
            Command::Provision(args) => provision(&config, &args),
            Command::Watch(args) => {
                watch(&config, Duration::from_secs(args.poll_secs.max(1))).await
            }
            Command::Agent(args) => agent(&config, args).await,
        }
    }
}

// ── provision ────────────────────────────────────────────────────────────────

fn provision(config: &InfraConfig, args: &ProvisionArgs) -> Result<()> {
    let content = std::fs::read_to_string(&args.recipe)
        .with_context(|| format!("cannot read {}", args.recipe.display()))?;
    let internal: InternalEnvironment = serde_yaml::from_str(&content)
        .with_context(|| format!("cannot parse {}", args.recipe.display()))?;
    let identity = RuntimeIdentity::new(&args.workspace, &args.env_name, &args.owner);
    let tokens = config.machine_token_dir.as_ref().map(|dir| {
        Arc::new(FileMachineTokenProvider::new(dir)) as Arc<dyn MachineTokenProvider>
    });

    match args.target {
        Target::Docker => {
            let mut env = DockerEnvironmentConverter
                .convert(&internal)
                .context("cannot convert environment to Docker")?;
            docker_pipeline(config, tokens)
                .provision(&mut env, &identity)
                .context("cannot provision Docker environment")?;
            print_json(&env)
        }
        Target::Kubernetes => {
            let mut env = KubernetesEnvironmentConverter
                .convert(&internal)
                .context("cannot convert environment to Kubernetes")?;
            kubernetes_pipeline(config, tokens)
                .provision(&mut env, &identity)
                .context("cannot provision Kubernetes environment")?;
            print_json(&env)
        }
    }
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("cannot serialize environment")?;
    println!("{json}");
    Ok(())
}

// ── watch / agent ────────────────────────────────────────────────────────────

fn replication_config(config: &InfraConfig) -> Result<ReplicationConfig> {
    match &config.cache_config {
        Some(path) => load_replication_config(path),
        None => Ok(ReplicationConfig::default()),
    }
}

type StatusCache = WorkspaceStatusCache<ValkeyReplicatedMap>;

async fn status_cache(config: &InfraConfig) -> Result<Arc<StatusCache>> {
    let replication = replication_config(config)?;
    let hash_key = workspace_status_key(&replication.deployment);
    let map = ValkeyReplicatedMap::connect(&replication, hash_key)
        .await
        .context("cannot join workspace status cache")?;
    Ok(Arc::new(WorkspaceStatusCache::new(map)))
}

async fn watch(config: &InfraConfig, poll_interval: Duration) -> Result<()> {
    let cache = status_cache(config).await?;
    let events = EventService::new();
    let mut idle = events.subscribe_idle();
    let detector =
        ServerIdleDetector::start(config.server_idle_timeout(), cache.clone(), events.clone())?;

    let mut ticker = tokio::time::interval(poll_interval);
    let mut snapshot = BTreeMap::new();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = ticker.tick() => match cache.as_map().await {
                Ok(next) => {
                    for event in status_changes(&snapshot, &next) {
                        tracing::info!(
                            workspace_id = %event.workspace_id,
                            status = %event.status,
                            "workspace status changed"
                        );
                        events.publish_status(event);
                    }
                    snapshot = next;
                }
                Err(e) => tracing::warn!(error = %e, "cannot read workspace statuses"),
            },
            Ok(event) = idle.recv() => {
                tracing::info!(
                    timeout_secs = event.timeout_secs,
                    timestamp = %event.timestamp,
                    "server idle"
                );
            }
            () = &mut shutdown => break,
        }
    }

    detector.shutdown();
    cache.shutdown().await;
    Ok(())
}

async fn agent(config: &InfraConfig, args: AgentArgs) -> Result<()> {
    let cache = status_cache(config).await?;
    let filter =
        WorkspaceIdleFilter::new(args.workspace, config.workspace_idle_timeout(), cache.clone())?;

    let listener = tokio::net::TcpListener::bind(&args.listen)
        .await
        .context("failed to bind TCP listener")?;
    tracing::info!(listen = %args.listen, workspace_id = %filter.workspace_id(), "agent ready");

    axum::serve(listener, agent_router(filter.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    filter.shutdown();
    cache.shutdown().await;
    tracing::info!("agent shut down");
    Ok(())
}

/// Wait for SIGINT (Ctrl-C) for graceful shutdown.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl-C");
    }
    tracing::info!("received shutdown signal");
}
