//! Cluster convergence verifier CLI
//!
//! Waits for an operator's replica group and its cluster resource to
//! converge, probes the data path, and gathers pod logs afterwards.

mod commands;
mod config;
mod output;
mod teardown;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::{status, verify};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Cluster convergence verifier
#[derive(Parser)]
#[command(name = "cvt")]
#[command(
    author,
    version,
    about = "Verify that an operator-managed cluster converged",
    long_about = None
)]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to kubeconfig file (uses default if not specified)
    #[arg(long, env = "KUBECONFIG", global = true)]
    pub kubeconfig: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table", global = true)]
    pub format: output::OutputFormat,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Wait for the cluster to converge, then probe its data path
    Verify(verify::VerifyArgs),

    /// Show the current convergence state without waiting
    Status(status::StatusArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_json, cli.verbose);

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = config::Config::load(cli.config.as_deref())?;
    let client = kube_client(cli.kubeconfig.as_deref()).await?;

    match cli.command {
        Commands::Verify(args) => verify::run(client, config, args, cli.format).await,
        Commands::Status(args) => status::run(client, config, args, cli.format).await,
    }
}

/// Initialize tracing with an env filter; logs go to stderr so stdout stays parseable
fn init_tracing(json: bool, verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

/// Build a client from the kubeconfig file, falling back to in-cluster config
async fn kube_client(override_path: Option<&str>) -> Result<Client> {
    let path = config::kubeconfig_path(override_path)?;

    let kube_config = if path.exists() {
        info!(path = %path.display(), "Using kubeconfig");
        let kubeconfig = Kubeconfig::read_from(&path)
            .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
        kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .context("Invalid kubeconfig")?
    } else {
        kube::Config::infer()
            .await
            .context("No kubeconfig found and not running in a cluster")?
    };

    Client::try_from(kube_config).context("Failed to create Kubernetes client")
}
