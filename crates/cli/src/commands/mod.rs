//! CLI subcommands

pub mod status;
pub mod verify;

use crate::config::Config;
use clap::Args;
use convergence_lib::source::ReplicaGroupKind;

/// Flags selecting the cluster under test, shared by every subcommand
#[derive(Args, Debug, Default)]
pub struct TargetArgs {
    /// Namespace of the cluster under test
    #[arg(long, short)]
    pub namespace: Option<String>,

    /// Name of the operator's replica group
    #[arg(long)]
    pub operator: Option<String>,

    /// Workload kind backing the operator (statefulset, deployment)
    #[arg(long)]
    pub kind: Option<ReplicaGroupKind>,

    /// Name of the cluster resource (defaults to the namespace)
    #[arg(long)]
    pub cluster: Option<String>,
}

impl TargetArgs {
    /// Override configured values with the flags that were given
    pub fn apply(&self, config: &mut Config) {
        if let Some(namespace) = &self.namespace {
            config.namespace = namespace.clone();
        }
        if let Some(operator) = &self.operator {
            config.operator_name = operator.clone();
        }
        if let Some(kind) = self.kind {
            config.replica_group_kind = kind;
        }
        if let Some(cluster) = &self.cluster {
            config.cluster_name = Some(cluster.clone());
        }
    }
}
