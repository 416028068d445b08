//! Error types for convergence verification

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T, E = VerifyError> = std::result::Result<T, E>;

/// Errors raised while observing or verifying a cluster
///
/// Variants split into two classes. Recoverable errors describe conditions
/// that are expected while a cluster is still settling; the poller logs them
/// and spends another attempt. Everything else is a programming or
/// configuration fault and aborts the check immediately.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum VerifyError {
    /// The observed object does not exist (yet)
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    /// API server or connectivity failure
    #[error("transport error observing {target}: {message}")]
    Transport { target: String, message: String },

    /// A command run inside a pod failed or could not be started
    #[error("exec in pod {namespace}/{pod} failed: {message}")]
    Exec {
        namespace: String,
        pod: String,
        message: String,
    },

    /// Poll parameters that can never produce a verdict
    #[error("invalid poll spec `{description}`: {reason}")]
    InvalidPollSpec { description: String, reason: String },

    /// The object exists but cannot be interpreted
    #[error("malformed {target}: {message}")]
    Malformed { target: String, message: String },

    /// Installing or removing the cluster under test failed
    #[error("lifecycle error: {0}")]
    Lifecycle(String),

    /// Configuration could not be loaded or is inconsistent
    #[error("configuration error: {0}")]
    Config(String),
}

impl VerifyError {
    /// Create a not-found error for a namespaced object
    pub fn not_found(
        kind: &'static str,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a transport error with the given message
    pub fn transport(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create an exec error for a pod
    pub fn exec(
        namespace: impl Into<String>,
        pod: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Exec {
            namespace: namespace.into(),
            pod: pod.into(),
            message: message.into(),
        }
    }

    /// Create a malformed-object error
    pub fn malformed(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Malformed {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create a lifecycle error with the given message
    pub fn lifecycle(msg: impl Into<String>) -> Self {
        Self::Lifecycle(msg.into())
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Returns true if the poller may retry after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            VerifyError::NotFound { .. } | VerifyError::Transport { .. } | VerifyError::Exec { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_failures_are_recoverable() {
        assert!(VerifyError::not_found("StatefulSet", "ns", "op").is_recoverable());
        assert!(VerifyError::transport("ns/op", "connection refused").is_recoverable());
        assert!(VerifyError::exec("ns", "pod-0", "exit 1").is_recoverable());
    }

    #[test]
    fn test_faults_are_not_recoverable() {
        let err = VerifyError::InvalidPollSpec {
            description: "wait".into(),
            reason: "max_attempts must be greater than zero".into(),
        };
        assert!(!err.is_recoverable());
        assert!(!VerifyError::malformed("Cluster ns/c", "no datacenter").is_recoverable());
        assert!(!VerifyError::lifecycle("uninstall failed").is_recoverable());
        assert!(!VerifyError::config("bad interval").is_recoverable());
    }

    #[test]
    fn test_messages_carry_context() {
        let err = VerifyError::not_found("Cluster", "cassandra-ns", "cassandra-ns");
        assert_eq!(err.to_string(), "Cluster cassandra-ns/cassandra-ns not found");

        let err = VerifyError::exec("cassandra-ns", "c-0", "command terminated");
        assert!(err.to_string().contains("cassandra-ns/c-0"));
    }
}
