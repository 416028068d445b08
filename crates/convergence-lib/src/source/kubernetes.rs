//! Kubernetes-backed observation sources

use super::{CommandExecutor, ReplicaGroupSource, TopologySource};
use crate::crd::Cluster;
use crate::error::{Result, VerifyError};
use crate::models::{ClusterObservation, ObservedReplicaGroupState, ResourceRef};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Pod;
use kube::api::AttachParams;
use kube::{Api, Client};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Workload kind backing the replica group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicaGroupKind {
    #[default]
    StatefulSet,
    Deployment,
}

impl ReplicaGroupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplicaGroupKind::StatefulSet => "StatefulSet",
            ReplicaGroupKind::Deployment => "Deployment",
        }
    }
}

impl fmt::Display for ReplicaGroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReplicaGroupKind {
    type Err = VerifyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "statefulset" | "sts" => Ok(ReplicaGroupKind::StatefulSet),
            "deployment" | "deploy" => Ok(ReplicaGroupKind::Deployment),
            other => Err(VerifyError::config(format!(
                "unknown replica group kind `{other}` (expected statefulset or deployment)"
            ))),
        }
    }
}

impl From<&StatefulSet> for ObservedReplicaGroupState {
    fn from(sts: &StatefulSet) -> Self {
        let status = sts.status.as_ref();
        Self {
            generation: sts.metadata.generation.unwrap_or(0),
            observed_generation: status.and_then(|s| s.observed_generation).unwrap_or(0),
            // the API server defaults an unset replica count to 1
            desired_replicas: sts.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1),
            updated_replicas: status.and_then(|s| s.updated_replicas).unwrap_or(0),
            ready_replicas: status.and_then(|s| s.ready_replicas).unwrap_or(0),
        }
    }
}

impl From<&Deployment> for ObservedReplicaGroupState {
    fn from(deploy: &Deployment) -> Self {
        let status = deploy.status.as_ref();
        Self {
            generation: deploy.metadata.generation.unwrap_or(0),
            observed_generation: status.and_then(|s| s.observed_generation).unwrap_or(0),
            desired_replicas: deploy.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1),
            updated_replicas: status.and_then(|s| s.updated_replicas).unwrap_or(0),
            ready_replicas: status.and_then(|s| s.ready_replicas).unwrap_or(0),
        }
    }
}

/// Map a kube error onto the verifier's error taxonomy
fn observe_error(err: kube::Error, kind: &'static str, target: &ResourceRef) -> VerifyError {
    match err {
        kube::Error::Api(ae) if ae.code == 404 => {
            VerifyError::not_found(kind, &target.namespace, &target.name)
        }
        kube::Error::SerdeError(e) => {
            VerifyError::malformed(format!("{kind} {target}"), e.to_string())
        }
        other => VerifyError::transport(format!("{kind} {target}"), other.to_string()),
    }
}

/// Replica groups read through the Kubernetes API
#[derive(Clone)]
pub struct KubeReplicaGroups {
    client: Client,
    kind: ReplicaGroupKind,
}

impl KubeReplicaGroups {
    pub fn new(client: Client, kind: ReplicaGroupKind) -> Self {
        Self { client, kind }
    }
}

#[async_trait]
impl ReplicaGroupSource for KubeReplicaGroups {
    async fn observe(&self, target: &ResourceRef) -> Result<ObservedReplicaGroupState> {
        debug!(kind = %self.kind, target = %target, "Observing replica group");
        let kind = self.kind.as_str();
        match self.kind {
            ReplicaGroupKind::StatefulSet => {
                let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), &target.namespace);
                let sts = api
                    .get(&target.name)
                    .await
                    .map_err(|e| observe_error(e, kind, target))?;
                Ok(ObservedReplicaGroupState::from(&sts))
            }
            ReplicaGroupKind::Deployment => {
                let api: Api<Deployment> = Api::namespaced(self.client.clone(), &target.namespace);
                let deploy = api
                    .get(&target.name)
                    .await
                    .map_err(|e| observe_error(e, kind, target))?;
                Ok(ObservedReplicaGroupState::from(&deploy))
            }
        }
    }
}

/// Cluster topology read from the `Cluster` custom resource
#[derive(Clone)]
pub struct KubeTopology {
    client: Client,
}

impl KubeTopology {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TopologySource for KubeTopology {
    async fn observe(&self, target: &ResourceRef) -> Result<ClusterObservation> {
        debug!(target = %target, "Observing cluster topology");
        let api: Api<Cluster> = Api::namespaced(self.client.clone(), &target.namespace);
        let cluster = api
            .get(&target.name)
            .await
            .map_err(|e| observe_error(e, "Cluster", target))?;
        Ok(ClusterObservation::from(&cluster))
    }
}

/// Executes commands in pods over the API server's exec subresource
#[derive(Clone)]
pub struct KubeExecutor {
    client: Client,
}

impl KubeExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CommandExecutor for KubeExecutor {
    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        command: &str,
        args: &[String],
    ) -> Result<String> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let argv: Vec<String> = std::iter::once(command.to_string())
            .chain(args.iter().cloned())
            .collect();
        let params = AttachParams::default().stdout(true).stderr(false);

        let mut attached = pods
            .exec(pod, argv, &params)
            .await
            .map_err(|e| VerifyError::exec(namespace, pod, e.to_string()))?;

        let mut output = String::new();
        if let Some(mut stdout) = attached.stdout() {
            stdout
                .read_to_string(&mut output)
                .await
                .map_err(|e| VerifyError::exec(namespace, pod, format!("reading stdout: {e}")))?;
        }

        let status = match attached.take_status() {
            Some(status) => status.await,
            None => None,
        };
        if let Some(status) = status {
            if status.status.as_deref() == Some("Failure") {
                let message = status
                    .message
                    .unwrap_or_else(|| format!("`{command}` exited with failure"));
                return Err(VerifyError::exec(namespace, pod, message));
            }
        }

        Ok(output)
    }
}
