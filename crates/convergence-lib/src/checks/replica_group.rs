//! Replica-group convergence check

use crate::error::Result;
use crate::models::{ObservedReplicaGroupState, ResourceRef};
use crate::observability::VerifyLogger;
use crate::source::ReplicaGroupSource;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// A convergence condition the replica group does not meet yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "condition", rename_all = "snake_case")]
pub enum ReplicaGroupLag {
    /// The controller has not processed the latest spec
    GenerationNotObserved {
        generation: i64,
        observed_generation: i64,
    },
    /// A rollout is still replacing replicas
    RollingUpdate { updated: i32, desired: i32 },
    /// Some replicas have not passed readiness
    NotReady { ready: i32, desired: i32 },
}

impl fmt::Display for ReplicaGroupLag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicaGroupLag::GenerationNotObserved {
                generation,
                observed_generation,
            } => write!(
                f,
                "has not converged yet: generation {generation}, observed generation {observed_generation}"
            ),
            ReplicaGroupLag::RollingUpdate { updated, desired } => write!(
                f,
                "is rolling updating: {updated} of {desired} replicas updated"
            ),
            ReplicaGroupLag::NotReady { ready, desired } => {
                write!(f, "not ready: got {ready} ready replicas, want {desired}")
            }
        }
    }
}

/// Verdict over one replica-group observation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplicaGroupVerdict {
    pub lags: Vec<ReplicaGroupLag>,
}

impl ReplicaGroupVerdict {
    /// Evaluate every convergence condition against the same observation
    pub fn evaluate(state: &ObservedReplicaGroupState) -> Self {
        let mut lags = Vec::new();

        if state.generation != state.observed_generation {
            lags.push(ReplicaGroupLag::GenerationNotObserved {
                generation: state.generation,
                observed_generation: state.observed_generation,
            });
        }
        if state.updated_replicas != state.desired_replicas {
            lags.push(ReplicaGroupLag::RollingUpdate {
                updated: state.updated_replicas,
                desired: state.desired_replicas,
            });
        }
        if state.ready_replicas != state.desired_replicas {
            lags.push(ReplicaGroupLag::NotReady {
                ready: state.ready_replicas,
                desired: state.desired_replicas,
            });
        }

        Self { lags }
    }

    pub fn is_converged(&self) -> bool {
        self.lags.is_empty()
    }
}

/// Checks whether a replica group finished converging
#[derive(Clone)]
pub struct ReplicaGroupChecker {
    source: Arc<dyn ReplicaGroupSource>,
    logger: VerifyLogger,
}

impl ReplicaGroupChecker {
    pub fn new(source: Arc<dyn ReplicaGroupSource>, logger: VerifyLogger) -> Self {
        Self { source, logger }
    }

    /// Observe the replica group once and decide whether it has converged
    pub async fn check(&self, target: &ResourceRef) -> Result<bool> {
        let state = self.source.observe(target).await?;
        let verdict = ReplicaGroupVerdict::evaluate(&state);

        let scope = format!("replica group {target}");
        for lag in &verdict.lags {
            match lag {
                ReplicaGroupLag::RollingUpdate { .. } => {
                    self.logger.warn("replica_group_lagging", &scope, lag.to_string())
                }
                _ => self.logger.info("replica_group_lagging", &scope, lag.to_string()),
            }
        }

        Ok(verdict.is_converged())
    }
}
