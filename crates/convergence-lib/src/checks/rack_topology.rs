//! Rack topology convergence check

use crate::error::Result;
use crate::models::{ClusterObservation, ResourceRef};
use crate::observability::VerifyLogger;
use crate::source::TopologySource;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Why a single rack fails the topology check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum RackIssue {
    /// Observed rack absent from the declared topology
    Undeclared { rack: String, members: i32 },
    /// Actual membership differs from the declared size
    MembershipMismatch {
        rack: String,
        desired: i32,
        members: i32,
    },
    /// Some present members are not ready
    NotReady {
        rack: String,
        members: i32,
        ready: i32,
    },
    /// Declared rack not created yet
    Missing { rack: String, desired: i32 },
}

impl RackIssue {
    pub fn rack(&self) -> &str {
        match self {
            RackIssue::Undeclared { rack, .. }
            | RackIssue::MembershipMismatch { rack, .. }
            | RackIssue::NotReady { rack, .. }
            | RackIssue::Missing { rack, .. } => rack,
        }
    }
}

impl fmt::Display for RackIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RackIssue::Undeclared { rack, members } => write!(
                f,
                "rack `{rack}` has {members} members but is not declared in the cluster spec"
            ),
            RackIssue::MembershipMismatch {
                rack,
                desired,
                members,
            } => write!(f, "rack `{rack}` has {members} members, want {desired}"),
            RackIssue::NotReady {
                rack,
                members,
                ready,
            } => write!(
                f,
                "rack `{rack}` is not ready yet: {ready} of {members} members ready"
            ),
            RackIssue::Missing { rack, desired } => write!(
                f,
                "rack `{rack}` ({desired} members) has not been created yet"
            ),
        }
    }
}

/// Verdict over one topology observation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TopologyVerdict {
    pub issues: Vec<RackIssue>,
}

impl TopologyVerdict {
    /// Evaluate every rack of the observation
    ///
    /// All racks are visited even after the first failure so every problem
    /// shows up in the diagnostics.
    pub fn evaluate(observation: &ClusterObservation) -> Self {
        let mut issues = Vec::new();

        for (name, status) in &observation.observed_racks {
            let Some(desired) = observation.desired_members(name) else {
                issues.push(RackIssue::Undeclared {
                    rack: name.clone(),
                    members: status.members,
                });
                continue;
            };

            if desired != status.members {
                issues.push(RackIssue::MembershipMismatch {
                    rack: name.clone(),
                    desired,
                    members: status.members,
                });
            }
            if status.members != status.ready_members {
                issues.push(RackIssue::NotReady {
                    rack: name.clone(),
                    members: status.members,
                    ready: status.ready_members,
                });
            }
        }

        let mut seen = BTreeSet::new();
        for rack in &observation.desired_racks {
            if observation.observed_racks.contains_key(&rack.name)
                || !seen.insert(rack.name.as_str())
            {
                continue;
            }
            issues.push(RackIssue::Missing {
                rack: rack.name.clone(),
                desired: rack.desired_members,
            });
        }

        Self { issues }
    }

    pub fn is_converged(&self) -> bool {
        self.issues.is_empty()
    }

    /// Names of the racks with at least one issue, in report order
    pub fn failing_racks(&self) -> Vec<&str> {
        let mut racks: Vec<&str> = Vec::new();
        for issue in &self.issues {
            if !racks.contains(&issue.rack()) {
                racks.push(issue.rack());
            }
        }
        racks
    }
}

/// Checks whether every rack of a cluster matches its declared membership
#[derive(Clone)]
pub struct RackTopologyChecker {
    source: Arc<dyn TopologySource>,
    logger: VerifyLogger,
}

impl RackTopologyChecker {
    pub fn new(source: Arc<dyn TopologySource>, logger: VerifyLogger) -> Self {
        Self { source, logger }
    }

    /// Observe the cluster once and decide whether its topology has converged
    pub async fn check(&self, target: &ResourceRef) -> Result<bool> {
        let observation = self.source.observe(target).await?;
        let verdict = TopologyVerdict::evaluate(&observation);

        let scope = format!("cluster {target}");
        for issue in &verdict.issues {
            match issue {
                RackIssue::Undeclared { .. } => {
                    self.logger.warn("rack_not_converged", &scope, issue.to_string())
                }
                _ => self.logger.info("rack_not_converged", &scope, issue.to_string()),
            }
        }

        Ok(verdict.is_converged())
    }
}
