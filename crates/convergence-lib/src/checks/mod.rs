//! Convergence checks
//!
//! Each check reads one fresh observation per call and turns it into a
//! verdict. Verdicts are pure functions of that single observation; nothing
//! is carried over between calls, so retries only wait out eventual
//! consistency.

mod rack_topology;
mod replica_group;


pub use rack_topology::{RackIssue, RackTopologyChecker, TopologyVerdict};
pub use replica_group::{ReplicaGroupChecker, ReplicaGroupLag, ReplicaGroupVerdict};
