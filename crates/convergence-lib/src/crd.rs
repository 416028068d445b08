//! Cassandra `Cluster` custom resource (`cassandra.rook.io/v1alpha1`)
//!
//! Only the fields the verifier reads are modelled; unknown fields are
//! ignored on deserialization.

use crate::models::{ClusterObservation, RackSpec, RackStatus};
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Spec of the cluster custom resource
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "cassandra.rook.io",
    version = "v1alpha1",
    kind = "Cluster",
    namespaced,
    status = "ClusterStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default)]
    pub datacenter: DatacenterSpec,
}

/// Single datacenter holding the racks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatacenterSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub racks: Vec<RackDeclaration>,
}

/// Declared rack as written in the custom resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RackDeclaration {
    pub name: String,
    #[serde(default)]
    pub members: i32,
}

/// Status reported by the operator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    #[serde(default)]
    pub racks: BTreeMap<String, RackState>,
}

/// Observed state of one rack
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RackState {
    #[serde(default)]
    pub members: i32,
    #[serde(default)]
    pub ready_members: i32,
}

impl From<&Cluster> for ClusterObservation {
    fn from(cluster: &Cluster) -> Self {
        let desired = cluster
            .spec
            .datacenter
            .racks
            .iter()
            .map(|r| RackSpec::new(&r.name, r.members))
            .collect();

        let observed = cluster
            .status
            .iter()
            .flat_map(|s| s.racks.iter())
            .map(|(name, rack)| RackStatus::new(name, rack.members, rack.ready_members));

        ClusterObservation::new(desired, observed)
    }
}

/// Name of the pod backing a rack member
///
/// The operator names member pods `<cluster>-<datacenter>-<rack>-<ordinal>`.
pub fn member_pod_name(cluster: &str, datacenter: &str, rack: &str, ordinal: u32) -> String {
    format!("{cluster}-{datacenter}-{rack}-{ordinal}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cluster_from(value: serde_json::Value) -> Cluster {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_observation_from_cluster_resource() {
        let cluster = cluster_from(json!({
            "apiVersion": "cassandra.rook.io/v1alpha1",
            "kind": "Cluster",
            "metadata": { "name": "cassandra-ns", "namespace": "cassandra-ns" },
            "spec": {
                "version": "3.11.6",
                "mode": "cassandra",
                "datacenter": {
                    "name": "us-east-1",
                    "racks": [
                        { "name": "us-east-1a", "members": 3 },
                        { "name": "us-east-1b", "members": 2 }
                    ]
                }
            },
            "status": {
                "racks": {
                    "us-east-1a": { "members": 3, "readyMembers": 3 },
                    "us-east-1b": { "members": 2, "readyMembers": 1 }
                }
            }
        }));

        let obs = ClusterObservation::from(&cluster);
        assert_eq!(
            obs.desired_racks,
            vec![RackSpec::new("us-east-1a", 3), RackSpec::new("us-east-1b", 2)]
        );
        assert_eq!(obs.observed_racks["us-east-1b"], RackStatus::new("us-east-1b", 2, 1));
    }

    #[test]
    fn test_observation_without_status() {
        let cluster = cluster_from(json!({
            "apiVersion": "cassandra.rook.io/v1alpha1",
            "kind": "Cluster",
            "metadata": { "name": "c", "namespace": "ns" },
            "spec": { "datacenter": { "name": "dc", "racks": [{ "name": "r", "members": 1 }] } }
        }));

        let obs = ClusterObservation::from(&cluster);
        assert_eq!(obs.desired_racks.len(), 1);
        assert!(obs.observed_racks.is_empty());
    }

    #[test]
    fn test_member_pod_name() {
        assert_eq!(
            member_pod_name("cassandra-ns", "us-east-1", "us-east-1a", 0),
            "cassandra-ns-us-east-1-us-east-1a-0"
        );
    }
}
