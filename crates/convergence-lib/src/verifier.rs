//! Cluster health verification
//!
//! Runs the replica-group check, then the rack topology check, each under
//! its own bounded poll, then the optional data-path probe. Stages run
//! strictly in order; a stage only starts once the previous one resolved.

use crate::checks::{RackTopologyChecker, ReplicaGroupChecker};
use crate::error::{Result, VerifyError};
use crate::models::{PollSpec, ResourceRef};
use crate::observability::{VerifierMetrics, VerifyLogger};
use crate::poller::{Poller, Sleeper, TokioSleeper};
use crate::probe::{DataPathProbe, ProbeSpec};
use crate::report::{
    Stage, StageReport, StageStatus, VerificationReport, RACK_TOPOLOGY_NOT_CONVERGED,
    REPLICA_GROUP_NOT_CONVERGED,
};
use crate::source::{CommandExecutor, ReplicaGroupSource, TopologySource};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Orchestrates the convergence checks and the data-path probe
pub struct ClusterHealthVerifier {
    poller: Poller,
    replica_group: ReplicaGroupChecker,
    rack_topology: RackTopologyChecker,
    replica_poll: PollSpec,
    topology_poll: PollSpec,
    probe: Option<DataPathProbe>,
    logger: VerifyLogger,
    metrics: Option<VerifierMetrics>,
}

impl ClusterHealthVerifier {
    pub fn builder() -> VerifierBuilder {
        VerifierBuilder::new()
    }

    /// Verify that the replica group and then the cluster topology converged
    ///
    /// A check that runs out of attempts is reported as a failed stage. Only
    /// non-recoverable errors from the control-plane checks surface as `Err`;
    /// probe failures of any kind are recorded and logged.
    pub async fn verify(
        &self,
        replica_group: &ResourceRef,
        cluster: &ResourceRef,
    ) -> Result<VerificationReport> {
        let started_at = chrono::Utc::now().timestamp();
        self.logger
            .log_verification_started(&replica_group.to_string(), &cluster.to_string());

        let mut stages = Vec::with_capacity(3);

        let replica = self
            .run_check(Stage::ReplicaGroup, &self.replica_poll, || {
                self.replica_group.check(replica_group)
            })
            .await?;
        if replica.status != StageStatus::Passed {
            stages.push(replica);
            return Ok(self.fail(
                stages,
                started_at,
                REPLICA_GROUP_NOT_CONVERGED,
                &[Stage::RackTopology, Stage::DataPath],
            ));
        }
        stages.push(replica);

        let racks = self
            .run_check(Stage::RackTopology, &self.topology_poll, || {
                self.rack_topology.check(cluster)
            })
            .await?;
        if racks.status != StageStatus::Passed {
            stages.push(racks);
            return Ok(self.fail(
                stages,
                started_at,
                RACK_TOPOLOGY_NOT_CONVERGED,
                &[Stage::DataPath],
            ));
        }
        stages.push(racks);

        stages.push(self.run_probe().await);

        let report = VerificationReport::from_stages(stages, started_at);
        self.logger
            .log_verification_finished(report.control_plane_converged, report.data_plane_succeeded);
        Ok(report)
    }

    /// Poll one control-plane check and record its outcome
    async fn run_check<F, Fut>(
        &self,
        stage: Stage,
        spec: &PollSpec,
        mut predicate: F,
    ) -> Result<StageReport>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        let polled = self
            .poller
            .poll_for(spec, || {
                let attempt = predicate();
                async move { attempt.await.map(|ready| ready.then_some(())) }
            })
            .await;

        let polled = match polled {
            Ok(polled) => polled,
            Err(aborted) => {
                self.observe(stage, "error", aborted.attempts, aborted.elapsed);
                return Err(aborted.error);
            }
        };

        let elapsed_ms = polled.elapsed.as_millis() as u64;
        if polled.succeeded() {
            self.observe(stage, "passed", polled.attempts, polled.elapsed);
            Ok(StageReport::passed(
                stage,
                spec.description(),
                polled.attempts,
                elapsed_ms,
            ))
        } else {
            self.observe(stage, "failed", polled.attempts, polled.elapsed);
            Ok(StageReport::failed(
                stage,
                spec.description(),
                polled.attempts,
                elapsed_ms,
                format!(
                    "timed out after {} attempts ({}s budget)",
                    polled.attempts,
                    spec.budget().as_secs()
                ),
            ))
        }
    }

    /// Run the probe if one is configured; never fails the verification
    async fn run_probe(&self) -> StageReport {
        let Some(probe) = &self.probe else {
            return StageReport::skipped(Stage::DataPath, "no data-path probe configured");
        };
        let description = probe.spec().poll.description().to_string();

        match probe.run(&self.poller).await {
            Ok(polled) => {
                let elapsed_ms = polled.elapsed.as_millis() as u64;
                match polled.value {
                    Some(output) => {
                        self.observe(Stage::DataPath, "passed", polled.attempts, polled.elapsed);
                        StageReport::passed(
                            Stage::DataPath,
                            description,
                            polled.attempts,
                            elapsed_ms,
                        )
                        .with_message(output.trim().to_string())
                    }
                    None => {
                        self.observe(Stage::DataPath, "failed", polled.attempts, polled.elapsed);
                        self.logger.warn(
                            "probe_failed",
                            &description,
                            "data-path probe did not succeed; control-plane verdict unaffected",
                        );
                        StageReport::failed(
                            Stage::DataPath,
                            description,
                            polled.attempts,
                            elapsed_ms,
                            format!("no successful attempt in {}", polled.attempts),
                        )
                    }
                }
            }
            Err(aborted) => {
                self.observe(Stage::DataPath, "error", aborted.attempts, aborted.elapsed);
                self.logger.error(
                    "probe_failed",
                    &description,
                    format!(
                        "data-path probe aborted: {}; control-plane verdict unaffected",
                        aborted.error
                    ),
                );
                StageReport::failed(
                    Stage::DataPath,
                    description,
                    aborted.attempts,
                    aborted.elapsed.as_millis() as u64,
                    aborted.error.to_string(),
                )
            }
        }
    }

    fn fail(
        &self,
        mut stages: Vec<StageReport>,
        started_at: i64,
        reason: &str,
        skipped: &[Stage],
    ) -> VerificationReport {
        self.logger.error("verification_failed", "verify", reason);
        stages.extend(skipped.iter().map(|s| StageReport::skipped(*s, reason)));

        let report = VerificationReport::from_stages(stages, started_at);
        self.logger
            .log_verification_finished(report.control_plane_converged, report.data_plane_succeeded);
        report
    }

    fn observe(&self, stage: Stage, result: &str, attempts: u32, elapsed: Duration) {
        if let Some(metrics) = &self.metrics {
            metrics.observe_check(stage.as_str(), result, attempts, elapsed);
        }
    }
}

/// Builder for [`ClusterHealthVerifier`]
pub struct VerifierBuilder {
    replica_source: Option<Arc<dyn ReplicaGroupSource>>,
    topology_source: Option<Arc<dyn TopologySource>>,
    replica_poll: Option<PollSpec>,
    topology_poll: Option<PollSpec>,
    probe: Option<(Arc<dyn CommandExecutor>, ProbeSpec)>,
    sleeper: Arc<dyn Sleeper>,
    logger: VerifyLogger,
    metrics: Option<VerifierMetrics>,
}

impl Default for VerifierBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl VerifierBuilder {
    /// Create a new builder sleeping on the Tokio timer and logging through `tracing`
    pub fn new() -> Self {
        Self {
            replica_source: None,
            topology_source: None,
            replica_poll: None,
            topology_poll: None,
            probe: None,
            sleeper: Arc::new(TokioSleeper),
            logger: VerifyLogger::tracing(),
            metrics: None,
        }
    }

    /// Set the replica-group source and its poll spec
    pub fn replica_group(mut self, source: Arc<dyn ReplicaGroupSource>, poll: PollSpec) -> Self {
        self.replica_source = Some(source);
        self.replica_poll = Some(poll);
        self
    }

    /// Set the topology source and its poll spec
    pub fn rack_topology(mut self, source: Arc<dyn TopologySource>, poll: PollSpec) -> Self {
        self.topology_source = Some(source);
        self.topology_poll = Some(poll);
        self
    }

    /// Enable the data-path probe
    pub fn probe(mut self, executor: Arc<dyn CommandExecutor>, spec: ProbeSpec) -> Self {
        self.probe = Some((executor, spec));
        self
    }

    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn logger(mut self, logger: VerifyLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn metrics(mut self, metrics: VerifierMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the verifier
    pub fn build(self) -> Result<ClusterHealthVerifier> {
        let (replica_source, replica_poll) = self
            .replica_source
            .zip(self.replica_poll)
            .ok_or_else(|| VerifyError::config("replica group source is required"))?;
        let (topology_source, topology_poll) = self
            .topology_source
            .zip(self.topology_poll)
            .ok_or_else(|| VerifyError::config("rack topology source is required"))?;

        let logger = self.logger;
        let probe = self
            .probe
            .map(|(executor, spec)| DataPathProbe::new(executor, spec, logger.clone()));

        Ok(ClusterHealthVerifier {
            poller: Poller::new(self.sleeper, logger.clone()),
            replica_group: ReplicaGroupChecker::new(replica_source, logger.clone()),
            rack_topology: RackTopologyChecker::new(topology_source, logger.clone()),
            replica_poll,
            topology_poll,
            probe,
            logger,
            metrics: self.metrics,
        })
    }
}
