//! Full convergence verification

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use convergence_lib::report::{StageReport, StageStatus};
use convergence_lib::source::{KubeExecutor, KubeReplicaGroups, KubeTopology};
use convergence_lib::{
    with_cluster, ClusterFixture, ClusterHealthVerifier, OverallStatus, ProbeSpec,
    VerificationReport, VerifierMetrics, VerifyLogger,
};
use kube::Client;
use prometheus::{Registry, TextEncoder};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tabled::Tabled;

use super::TargetArgs;
use crate::config::Config;
use crate::output::{
    color_status, format_elapsed, format_timestamp, print_info, print_json, print_success,
    print_warning, render_table, OutputFormat,
};
use crate::teardown::PodLogGatherer;

#[derive(Args, Debug)]
pub struct VerifyArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Attempts for each control-plane check
    #[arg(long)]
    pub attempts: Option<u32>,

    /// Seconds between attempts of a control-plane check
    #[arg(long)]
    pub interval_secs: Option<u64>,

    /// Skip the data-path probe
    #[arg(long)]
    pub no_probe: bool,

    /// Pod to run the data-path probe in
    #[arg(long)]
    pub probe_pod: Option<String>,

    /// Directory receiving pod logs after the run
    #[arg(long)]
    pub logs_dir: Option<PathBuf>,

    /// Name of this run, used for the log subdirectory
    #[arg(long, default_value = "cluster-creation")]
    pub test_name: String,

    /// Write Prometheus metrics in text format to this file
    #[arg(long)]
    pub metrics_out: Option<PathBuf>,
}

impl VerifyArgs {
    fn apply(&self, config: &mut Config) {
        self.target.apply(config);
        if let Some(attempts) = self.attempts {
            config.replica_attempts = attempts;
            config.topology_attempts = attempts;
        }
        if let Some(interval) = self.interval_secs {
            config.replica_interval_secs = interval;
            config.topology_interval_secs = interval;
        }
        if self.no_probe {
            config.probe_enabled = false;
        }
        if let Some(pod) = &self.probe_pod {
            config.probe_pod = Some(pod.clone());
        }
        if let Some(dir) = &self.logs_dir {
            config.logs_dir = dir.clone();
        }
    }
}

/// Row for the stage table
#[derive(Tabled)]
struct StageRow {
    #[tabled(rename = "Stage")]
    stage: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Attempts")]
    attempts: u32,
    #[tabled(rename = "Elapsed")]
    elapsed: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

impl From<&StageReport> for StageRow {
    fn from(stage: &StageReport) -> Self {
        let status = match stage.status {
            StageStatus::Passed => "passed",
            StageStatus::Failed => "failed",
            StageStatus::Skipped => "skipped",
        };
        // passed probes carry the full command output, keep the table to one line
        let detail = match stage.status {
            StageStatus::Passed => stage.description.clone(),
            _ => stage.message.clone().or_else(|| stage.description.clone()),
        };
        Self {
            stage: stage.stage.to_string(),
            status: color_status(status),
            attempts: stage.attempts,
            elapsed: format_elapsed(stage.elapsed_ms),
            detail: detail.unwrap_or_default(),
        }
    }
}

/// Run the verification inside the teardown guard and report the outcome
pub async fn run(
    client: Client,
    mut config: Config,
    args: VerifyArgs,
    format: OutputFormat,
) -> Result<()> {
    args.apply(&mut config);
    let fixture = config.fixture();

    let registry = Registry::new();
    let metrics = VerifierMetrics::new(&registry).context("Failed to register metrics")?;

    let mut builder = ClusterHealthVerifier::builder()
        .replica_group(
            Arc::new(KubeReplicaGroups::new(client.clone(), config.replica_group_kind)),
            config.replica_poll()?,
        )
        .rack_topology(Arc::new(KubeTopology::new(client.clone())), config.topology_poll()?)
        .metrics(metrics);

    if config.probe_enabled {
        let spec = ProbeSpec::cql_round_trip(
            &fixture.namespace,
            config.probe_pod(),
            config.probe_attempts,
            Duration::from_secs(config.probe_interval_secs),
        )
        .context("Invalid probe settings")?;
        builder = builder.probe(Arc::new(KubeExecutor::new(client.clone())), spec);
    }

    let verifier = builder.build().context("Failed to build verifier")?;
    let lifecycle = PodLogGatherer::new(client, &config.logs_dir);
    let logger = VerifyLogger::tracing();

    let report = with_cluster(
        &lifecycle,
        &fixture,
        &args.test_name,
        &logger,
        |fixture| async move {
            verifier
                .verify(&fixture.operator_ref(), &fixture.cluster_ref())
                .await
        },
    )
    .await
    .context("Verification aborted")?;

    if let Some(path) = &args.metrics_out {
        write_metrics(&registry, path)?;
    }

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            print_report(&fixture, &report, &config.logs_dir.join(&args.test_name))
        }
    }

    check_outcome(&report)
}

/// A degraded cluster still counts as converged
fn check_outcome(report: &VerificationReport) -> Result<()> {
    if !report.status.is_operational() {
        bail!(
            "{}",
            report
                .failure_reason
                .as_deref()
                .unwrap_or("control plane did not converge")
        );
    }
    Ok(())
}

fn print_report(fixture: &ClusterFixture, report: &VerificationReport, logs_dir: &Path) {
    println!("{}", "Cluster Verification".bold());
    println!("{}", "=".repeat(60));
    println!("Operator: {}", fixture.operator_ref().to_string().cyan());
    println!("Cluster:  {}", fixture.cluster_ref().to_string().cyan());
    println!("Status:   {}", color_status(&report.status.to_string()));
    println!(
        "Run:      {} to {}",
        format_timestamp(report.started_at),
        format_timestamp(report.finished_at)
    );
    println!();

    let rows: Vec<StageRow> = report.stages.iter().map(StageRow::from).collect();
    println!("{}", render_table(rows));
    println!();

    match report.status {
        OverallStatus::Healthy => print_success("Control plane converged"),
        OverallStatus::Degraded => {
            print_success("Control plane converged");
            print_warning("Data-path probe did not succeed; see pod logs for details");
        }
        OverallStatus::Unhealthy => print_info(&format!("Pod logs: {}", logs_dir.display())),
    }
}

fn write_metrics(registry: &Registry, path: &Path) -> Result<()> {
    let text = TextEncoder::new()
        .encode_to_string(&registry.gather())
        .context("Failed to encode metrics")?;
    std::fs::write(path, text)
        .with_context(|| format!("Failed to write metrics to {}", path.display()))
}
