//! Verification report
//!
//! Records the outcome of every verification stage and derives the overall
//! status. The control-plane verdict and the data-plane probe are kept apart
//! so callers can assert on the former and treat the latter as informational.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reason reported when the replica group never converged
pub const REPLICA_GROUP_NOT_CONVERGED: &str = "replica group did not converge";

/// Reason reported when the rack topology never converged
pub const RACK_TOPOLOGY_NOT_CONVERGED: &str = "rack topology did not converge";

/// Verification stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ReplicaGroup,
    RackTopology,
    DataPath,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ReplicaGroup => "replica_group",
            Stage::RackTopology => "rack_topology",
            Stage::DataPath => "data_path",
        }
    }

    /// Returns true for the stages that decide the verdict
    pub fn is_control_plane(&self) -> bool {
        matches!(self, Stage::ReplicaGroup | Stage::RackTopology)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Passed,
    Failed,
    /// Not run, either disabled or an earlier stage failed
    Skipped,
}

/// Information about one stage's run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub attempts: u32,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StageReport {
    pub fn passed(
        stage: Stage,
        description: impl Into<String>,
        attempts: u32,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            stage,
            status: StageStatus::Passed,
            description: Some(description.into()),
            attempts,
            elapsed_ms,
            message: None,
        }
    }

    pub fn failed(
        stage: Stage,
        description: impl Into<String>,
        attempts: u32,
        elapsed_ms: u64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            stage,
            status: StageStatus::Failed,
            description: Some(description.into()),
            attempts,
            elapsed_ms,
            message: Some(message.into()),
        }
    }

    pub fn skipped(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            status: StageStatus::Skipped,
            description: None,
            attempts: 0,
            elapsed_ms: 0,
            message: Some(message.into()),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Overall status of a verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    /// Control plane converged and the probe passed (or was not configured)
    Healthy,
    /// Control plane converged but the probe failed
    Degraded,
    /// Control plane did not converge
    Unhealthy,
}

impl OverallStatus {
    /// Returns true if the control plane converged
    pub fn is_operational(&self) -> bool {
        matches!(self, OverallStatus::Healthy | OverallStatus::Degraded)
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OverallStatus::Healthy => "healthy",
            OverallStatus::Degraded => "degraded",
            OverallStatus::Unhealthy => "unhealthy",
        };
        f.write_str(s)
    }
}

/// Result of a full verification run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub status: OverallStatus,
    pub control_plane_converged: bool,
    pub data_plane_succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub stages: Vec<StageReport>,
    pub started_at: i64,
    pub finished_at: i64,
}

impl VerificationReport {
    /// Build a report from the stage outcomes
    pub fn from_stages(stages: Vec<StageReport>, started_at: i64) -> Self {
        let stage_passed = |stage: Stage| {
            stages
                .iter()
                .any(|s| s.stage == stage && s.status == StageStatus::Passed)
        };

        let replica_ok = stage_passed(Stage::ReplicaGroup);
        let racks_ok = stage_passed(Stage::RackTopology);
        let control_plane_converged = replica_ok && racks_ok;
        let data_plane_succeeded = stage_passed(Stage::DataPath);

        let failure_reason = if !replica_ok {
            Some(REPLICA_GROUP_NOT_CONVERGED.to_string())
        } else if !racks_ok {
            Some(RACK_TOPOLOGY_NOT_CONVERGED.to_string())
        } else {
            None
        };

        let status = Self::compute_status(&stages, control_plane_converged);

        Self {
            status,
            control_plane_converged,
            data_plane_succeeded,
            failure_reason,
            stages,
            started_at,
            finished_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Compute overall status from stage outcomes
    pub fn compute_status(stages: &[StageReport], control_plane_converged: bool) -> OverallStatus {
        if !control_plane_converged {
            return OverallStatus::Unhealthy;
        }

        let probe_failed = stages
            .iter()
            .any(|s| !s.stage.is_control_plane() && s.status == StageStatus::Failed);

        if probe_failed {
            OverallStatus::Degraded
        } else {
            OverallStatus::Healthy
        }
    }

    /// Report for one stage, if it was recorded
    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn converged_stages() -> Vec<StageReport> {
        vec![
            StageReport::passed(Stage::ReplicaGroup, "operator", 1, 10),
            StageReport::passed(Stage::RackTopology, "cluster", 2, 30_000),
        ]
    }

    #[test]
    fn test_healthy_without_probe() {
        let mut stages = converged_stages();
        stages.push(StageReport::skipped(Stage::DataPath, "probe disabled"));

        let report = VerificationReport::from_stages(stages, 0);
        assert_eq!(report.status, OverallStatus::Healthy);
        assert!(report.control_plane_converged);
        assert!(!report.data_plane_succeeded);
        assert!(report.failure_reason.is_none());
    }

    #[test]
    fn test_probe_failure_only_degrades() {
        let mut stages = converged_stages();
        stages.push(StageReport::failed(Stage::DataPath, "cql", 5, 0, "Connection refused"));

        let report = VerificationReport::from_stages(stages, 0);
        assert_eq!(report.status, OverallStatus::Degraded);
        assert!(report.status.is_operational());
        assert!(report.control_plane_converged);
    }

    #[test]
    fn test_replica_group_failure_reason() {
        let stages = vec![
            StageReport::failed(Stage::ReplicaGroup, "operator", 10, 0, "retries exhausted"),
            StageReport::skipped(Stage::RackTopology, REPLICA_GROUP_NOT_CONVERGED),
            StageReport::skipped(Stage::DataPath, REPLICA_GROUP_NOT_CONVERGED),
        ];

        let report = VerificationReport::from_stages(stages, 0);
        assert_eq!(report.status, OverallStatus::Unhealthy);
        assert_eq!(report.failure_reason.as_deref(), Some(REPLICA_GROUP_NOT_CONVERGED));
    }

    #[test]
    fn test_rack_topology_failure_reason() {
        let stages = vec![
            StageReport::passed(Stage::ReplicaGroup, "operator", 1, 0),
            StageReport::failed(Stage::RackTopology, "cluster", 10, 0, "retries exhausted"),
        ];

        let report = VerificationReport::from_stages(stages, 0);
        assert_eq!(report.failure_reason.as_deref(), Some(RACK_TOPOLOGY_NOT_CONVERGED));
        assert!(!report.status.is_operational());
    }

    #[test]
    fn test_report_serializes_stage_names() {
        let report = VerificationReport::from_stages(converged_stages(), 0);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["stages"][0]["stage"], "replica_group");
        assert_eq!(json["stages"][1]["status"], "passed");
    }
}
