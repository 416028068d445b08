//! Observation sources for the convergence checks
//!
//! The checks never talk to a cluster directly. They pull a fresh snapshot
//! through one of these traits on every attempt, which keeps them testable
//! against in-memory fakes. Kubernetes-backed implementations live in
//! [`kubernetes`].

pub mod kubernetes;

use crate::error::Result;
use crate::models::{ClusterObservation, ObservedReplicaGroupState, ResourceRef};
use async_trait::async_trait;

pub use self::kubernetes::{KubeExecutor, KubeReplicaGroups, KubeTopology, ReplicaGroupKind};

/// Reads the current state of a replica group
#[async_trait]
pub trait ReplicaGroupSource: Send + Sync {
    async fn observe(&self, target: &ResourceRef) -> Result<ObservedReplicaGroupState>;
}

/// Reads the declared and observed rack topology of a cluster resource
#[async_trait]
pub trait TopologySource: Send + Sync {
    async fn observe(&self, target: &ResourceRef) -> Result<ClusterObservation>;
}

/// Runs a command inside a pod and returns its standard output
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        command: &str,
        args: &[String],
    ) -> Result<String>;
}
