//! Core data models for convergence verification

use crate::error::{Result, VerifyError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Namespaced reference to an observed object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub namespace: String,
    pub name: String,
}

impl ResourceRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Parameters for one bounded polling run
///
/// Immutable once built; `max_attempts` is always at least one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSpec {
    description: String,
    max_attempts: u32,
    interval: Duration,
}

impl PollSpec {
    /// Build a poll spec, rejecting a zero attempt budget
    pub fn new(
        description: impl Into<String>,
        max_attempts: u32,
        interval: Duration,
    ) -> Result<Self> {
        let description = description.into();
        if max_attempts == 0 {
            return Err(VerifyError::InvalidPollSpec {
                description,
                reason: "max_attempts must be greater than zero".to_string(),
            });
        }
        Ok(Self {
            description,
            max_attempts,
            interval,
        })
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Upper bound on time spent sleeping between attempts
    pub fn budget(&self) -> Duration {
        self.interval * (self.max_attempts - 1)
    }
}

/// A single observation of a replica group (StatefulSet or Deployment)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedReplicaGroupState {
    pub generation: i64,
    pub observed_generation: i64,
    pub desired_replicas: i32,
    pub updated_replicas: i32,
    pub ready_replicas: i32,
}

/// Declared target size of one rack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RackSpec {
    pub name: String,
    pub desired_members: i32,
}

impl RackSpec {
    pub fn new(name: impl Into<String>, desired_members: i32) -> Self {
        Self {
            name: name.into(),
            desired_members,
        }
    }
}

/// Observed membership of one rack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RackStatus {
    pub name: String,
    pub members: i32,
    pub ready_members: i32,
}

impl RackStatus {
    pub fn new(name: impl Into<String>, members: i32, ready_members: i32) -> Self {
        Self {
            name: name.into(),
            members,
            ready_members,
        }
    }
}

/// Declared and observed rack topology taken from one read of the cluster resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterObservation {
    pub desired_racks: Vec<RackSpec>,
    pub observed_racks: BTreeMap<String, RackStatus>,
}

impl ClusterObservation {
    /// Build an observation from desired racks and observed statuses
    pub fn new(
        desired_racks: Vec<RackSpec>,
        observed: impl IntoIterator<Item = RackStatus>,
    ) -> Self {
        Self {
            desired_racks,
            observed_racks: observed.into_iter().map(|r| (r.name.clone(), r)).collect(),
        }
    }

    /// Desired member count for a rack; the first declaration wins on duplicates
    pub fn desired_members(&self, rack: &str) -> Option<i32> {
        self.desired_racks
            .iter()
            .find(|r| r.name == rack)
            .map(|r| r.desired_members)
    }
}
