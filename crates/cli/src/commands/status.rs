//! One-shot convergence status, without retries

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use convergence_lib::checks::RackIssue;
use convergence_lib::source::{KubeReplicaGroups, KubeTopology};
use convergence_lib::{
    ClusterObservation, ObservedReplicaGroupState, ReplicaGroupSource, ReplicaGroupVerdict,
    TopologySource, TopologyVerdict,
};
use kube::Client;
use serde::Serialize;
use tabled::Tabled;

use super::TargetArgs;
use crate::config::Config;
use crate::output::{
    color_status, print_json, print_success, print_warning, render_table, OutputFormat,
};

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub target: TargetArgs,
}

/// Row for the rack table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Tabled)]
struct RackRow {
    #[tabled(rename = "Rack")]
    rack: String,
    #[tabled(rename = "Desired", display_with = "display_count")]
    desired: Option<i32>,
    #[tabled(rename = "Members", display_with = "display_count")]
    members: Option<i32>,
    #[tabled(rename = "Ready", display_with = "display_count")]
    ready: Option<i32>,
    #[tabled(rename = "Status")]
    status: String,
}

fn display_count(count: &Option<i32>) -> String {
    count.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string())
}

#[derive(Serialize)]
struct StatusView<'a> {
    replica_group: String,
    kind: String,
    state: ObservedReplicaGroupState,
    replica_group_converged: bool,
    lags: Vec<String>,
    cluster: String,
    racks: &'a [RackRow],
    topology_converged: bool,
    failing_racks: Vec<&'a str>,
}

/// Observe each layer once and print what is converged
pub async fn run(
    client: Client,
    mut config: Config,
    args: StatusArgs,
    format: OutputFormat,
) -> Result<()> {
    args.target.apply(&mut config);
    let fixture = config.fixture();
    let operator = fixture.operator_ref();
    let cluster = fixture.cluster_ref();

    let state = KubeReplicaGroups::new(client.clone(), config.replica_group_kind)
        .observe(&operator)
        .await
        .with_context(|| {
            format!("Failed to observe {} {}", config.replica_group_kind, operator)
        })?;
    let replica_verdict = ReplicaGroupVerdict::evaluate(&state);

    let observation = KubeTopology::new(client)
        .observe(&cluster)
        .await
        .with_context(|| format!("Failed to observe cluster {cluster}"))?;
    let topology_verdict = TopologyVerdict::evaluate(&observation);
    let racks = rack_rows(&observation, &topology_verdict);

    match format {
        OutputFormat::Json => print_json(&StatusView {
            replica_group: operator.to_string(),
            kind: config.replica_group_kind.to_string(),
            state,
            replica_group_converged: replica_verdict.is_converged(),
            lags: replica_verdict.lags.iter().map(ToString::to_string).collect(),
            cluster: cluster.to_string(),
            racks: &racks,
            topology_converged: topology_verdict.is_converged(),
            failing_racks: topology_verdict.failing_racks(),
        })?,
        OutputFormat::Table => {
            println!("{}", "Replica Group".bold());
            println!("{}", "=".repeat(60));
            println!("{}:  {}", config.replica_group_kind, operator.to_string().cyan());
            println!(
                "Generation:   {} (observed {})",
                state.generation, state.observed_generation
            );
            println!(
                "Replicas:     {} desired, {} updated, {} ready",
                state.desired_replicas, state.updated_replicas, state.ready_replicas
            );
            if replica_verdict.is_converged() {
                print_success("Replica group converged");
            } else {
                for lag in &replica_verdict.lags {
                    print_warning(&format!("{operator} {lag}"));
                }
            }
            println!();

            println!("{}", "Racks".bold());
            println!("{}", "=".repeat(60));
            println!("Cluster: {}", cluster.to_string().cyan());
            let colored: Vec<RackRow> = racks
                .iter()
                .cloned()
                .map(|row| RackRow {
                    status: color_status(&row.status),
                    ..row
                })
                .collect();
            println!("{}", render_table(colored));
            if topology_verdict.is_converged() {
                print_success("Rack topology converged");
            } else {
                print_warning(&format!(
                    "Racks not converged: {}",
                    topology_verdict.failing_racks().join(", ")
                ));
                for issue in &topology_verdict.issues {
                    print_warning(&issue.to_string());
                }
            }
        }
    }

    Ok(())
}

/// One row per declared rack in declaration order, then undeclared observed racks
fn rack_rows(observation: &ClusterObservation, verdict: &TopologyVerdict) -> Vec<RackRow> {
    let mut rows: Vec<RackRow> = Vec::new();

    for spec in &observation.desired_racks {
        if rows.iter().any(|r| r.rack == spec.name) {
            continue;
        }
        let observed = observation.observed_racks.get(&spec.name);
        rows.push(RackRow {
            rack: spec.name.clone(),
            desired: Some(spec.desired_members),
            members: observed.map(|s| s.members),
            ready: observed.map(|s| s.ready_members),
            status: rack_status(verdict, &spec.name).to_string(),
        });
    }

    for (name, status) in &observation.observed_racks {
        if rows.iter().any(|r| &r.rack == name) {
            continue;
        }
        rows.push(RackRow {
            rack: name.clone(),
            desired: None,
            members: Some(status.members),
            ready: Some(status.ready_members),
            status: rack_status(verdict, name).to_string(),
        });
    }

    rows
}

fn rack_status(verdict: &TopologyVerdict, rack: &str) -> &'static str {
    match verdict.issues.iter().find(|issue| issue.rack() == rack) {
        None => "ready",
        Some(RackIssue::Missing { .. }) => "missing",
        Some(RackIssue::NotReady { .. }) => "not ready",
        Some(RackIssue::MembershipMismatch { .. }) => "updating",
        Some(RackIssue::Undeclared { .. }) => "undeclared",
    }
}
