//! Convergence verification for multi-tier cluster resources
//!
//! This crate provides the core functionality for:
//! - Bounded polling of convergence predicates
//! - Replica-group (StatefulSet / Deployment) convergence checks
//! - Rack topology convergence checks against the cluster custom resource
//! - Orchestrated cluster health verification with an advisory data-path probe
//! - Kubernetes-backed observation sources
//! - Structured logging, metrics and reporting

pub mod checks;
pub mod crd;
pub mod error;
pub mod fixture;
pub mod models;
pub mod observability;
pub mod poller;
pub mod probe;
pub mod report;
pub mod source;
pub mod verifier;

pub use checks::{RackTopologyChecker, ReplicaGroupChecker, ReplicaGroupVerdict, TopologyVerdict};
pub use error::{Result, VerifyError};
pub use fixture::{with_cluster, ClusterFixture, ClusterLifecycle};
pub use models::*;
pub use observability::{
    LogLevel, LogRecord, LogSink, MemorySink, TracingSink, VerifierMetrics, VerifyLogger,
};
pub use poller::{PollAborted, Polled, Poller, Sleeper, TokioSleeper};
pub use probe::{DataPathProbe, ProbeCommand, ProbeSpec};
pub use report::{OverallStatus, Stage, StageReport, StageStatus, VerificationReport};
pub use source::{CommandExecutor, ReplicaGroupSource, TopologySource};
pub use verifier::{ClusterHealthVerifier, VerifierBuilder};
