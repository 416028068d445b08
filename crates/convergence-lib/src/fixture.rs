//! Cluster-under-test fixture and teardown guard

use crate::error::Result;
use crate::models::ResourceRef;
use crate::observability::VerifyLogger;
use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

/// Immutable description of the cluster under test
///
/// Built once per run and handed to every check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterFixture {
    /// Namespace holding the cluster's member pods
    pub namespace: String,
    /// Namespace holding the operator
    pub system_namespace: String,
    /// Name of the operator's replica group
    pub operator_name: String,
    pub cluster_name: String,
    pub cluster_namespace: String,
    pub instance_count: u32,
}

impl ClusterFixture {
    /// Fixture with the conventional layout: operator in `<namespace>-system`,
    /// cluster named after its namespace
    pub fn new(namespace: impl Into<String>, operator_name: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            system_namespace: system_namespace(&namespace),
            operator_name: operator_name.into(),
            cluster_name: namespace.clone(),
            cluster_namespace: namespace.clone(),
            namespace,
            instance_count: 1,
        }
    }

    /// Reference to the operator's replica group
    pub fn operator_ref(&self) -> ResourceRef {
        ResourceRef::new(&self.system_namespace, &self.operator_name)
    }

    /// Reference to the cluster custom resource
    pub fn cluster_ref(&self) -> ResourceRef {
        ResourceRef::new(&self.cluster_namespace, &self.cluster_name)
    }
}

/// Namespace the operator is installed into for a given cluster namespace
pub fn system_namespace(namespace: &str) -> String {
    format!("{namespace}-system")
}

/// Acquisition and release of the cluster under test
#[async_trait]
pub trait ClusterLifecycle: Send + Sync {
    /// Bring the cluster up; the default attaches to an existing cluster
    async fn install(&self, _fixture: &ClusterFixture) -> Result<()> {
        Ok(())
    }

    /// Collect diagnostics before the cluster goes away
    async fn gather_logs(&self, fixture: &ClusterFixture, test_name: &str) -> Result<()>;

    /// Tear the cluster down; the default leaves it in place
    async fn uninstall(&self, _fixture: &ClusterFixture) -> Result<()> {
        Ok(())
    }
}

/// Run `body` against the cluster under test with guaranteed teardown
///
/// Logs are gathered and the cluster uninstalled on every exit path: after
/// a successful body, after a body error, after a failed install, and after
/// a panic in the body, which is resumed once teardown finishes.
/// Teardown errors are logged and never replace the body's result.
pub async fn with_cluster<L, F, Fut, T>(
    lifecycle: &L,
    fixture: &ClusterFixture,
    test_name: &str,
    logger: &VerifyLogger,
    body: F,
) -> Result<T>
where
    L: ClusterLifecycle + ?Sized,
    F: FnOnce(ClusterFixture) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if let Err(err) = lifecycle.install(fixture).await {
        logger.error(
            "install_failed",
            test_name,
            format!("cluster was not installed successfully: {err}"),
        );
        teardown(lifecycle, fixture, test_name, logger).await;
        return Err(err);
    }

    let outcome = AssertUnwindSafe(async { body(fixture.clone()).await })
        .catch_unwind()
        .await;
    let result = match outcome {
        Ok(result) => result,
        Err(payload) => {
            logger.error(
                "test_panicked",
                test_name,
                format!("panicked: {}", panic_message(payload.as_ref())),
            );
            teardown(lifecycle, fixture, test_name, logger).await;
            std::panic::resume_unwind(payload);
        }
    };
    if let Err(err) = &result {
        logger.error("test_failed", test_name, format!("aborted: {err}"));
    }

    teardown(lifecycle, fixture, test_name, logger).await;
    result
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

async fn teardown<L>(
    lifecycle: &L,
    fixture: &ClusterFixture,
    test_name: &str,
    logger: &VerifyLogger,
) where
    L: ClusterLifecycle + ?Sized,
{
    if let Err(err) = lifecycle.gather_logs(fixture, test_name).await {
        logger.warn("gather_logs_failed", test_name, err.to_string());
    }
    if let Err(err) = lifecycle.uninstall(fixture).await {
        logger.warn("uninstall_failed", test_name, err.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VerifyError;
    use crate::observability::MemorySink;
    use std::sync::{Arc, Mutex};

    /// Records lifecycle calls in order
    #[derive(Default)]
    struct RecordingLifecycle {
        calls: Mutex<Vec<String>>,
        fail_install: bool,
        fail_gather: bool,
    }

    impl RecordingLifecycle {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ClusterLifecycle for RecordingLifecycle {
        async fn install(&self, fixture: &ClusterFixture) -> Result<()> {
            self.calls.lock().unwrap().push(format!("install {}", fixture.namespace));
            if self.fail_install {
                return Err(VerifyError::lifecycle("operator manifest rejected"));
            }
            Ok(())
        }

        async fn gather_logs(&self, _fixture: &ClusterFixture, test_name: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("gather {test_name}"));
            if self.fail_gather {
                return Err(VerifyError::lifecycle("log directory not writable"));
            }
            Ok(())
        }

        async fn uninstall(&self, _fixture: &ClusterFixture) -> Result<()> {
            self.calls.lock().unwrap().push("uninstall".to_string());
            Ok(())
        }
    }

    fn logger() -> (VerifyLogger, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        (VerifyLogger::new(sink.clone()), sink)
    }

    #[test]
    fn test_fixture_layout() {
        let fixture = ClusterFixture::new("cassandra-ns", "rook-cassandra-operator");
        assert_eq!(fixture.system_namespace, "cassandra-ns-system");
        assert_eq!(
            fixture.operator_ref(),
            ResourceRef::new("cassandra-ns-system", "rook-cassandra-operator")
        );
        assert_eq!(fixture.cluster_ref(), ResourceRef::new("cassandra-ns", "cassandra-ns"));
    }

    #[tokio::test]
    async fn test_teardown_after_success() {
        let lifecycle = RecordingLifecycle::default();
        let fixture = ClusterFixture::new("ns", "op");
        let (logger, _) = logger();

        let value = with_cluster(&lifecycle, &fixture, "creation", &logger, |f| async move {
            Ok(f.cluster_name)
        })
        .await
        .unwrap();

        assert_eq!(value, "ns");
        assert_eq!(lifecycle.calls(), vec!["install ns", "gather creation", "uninstall"]);
    }

    #[tokio::test]
    async fn test_teardown_after_body_error() {
        let lifecycle = RecordingLifecycle::default();
        let fixture = ClusterFixture::new("ns", "op");
        let (logger, sink) = logger();

        let err = with_cluster(&lifecycle, &fixture, "creation", &logger, |_| async {
            Err::<(), _>(VerifyError::malformed("Cluster ns/ns", "no datacenter"))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, VerifyError::Malformed { .. }));
        assert_eq!(lifecycle.calls(), vec!["install ns", "gather creation", "uninstall"]);
        assert_eq!(sink.events("test_failed").len(), 1);
    }

    #[tokio::test]
    async fn test_teardown_after_install_failure() {
        let lifecycle = RecordingLifecycle {
            fail_install: true,
            ..Default::default()
        };
        let fixture = ClusterFixture::new("ns", "op");
        let (logger, _) = logger();
        let mut body_ran = false;

        let err = with_cluster(&lifecycle, &fixture, "creation", &logger, |_| {
            body_ran = true;
            async { Ok(()) }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, VerifyError::Lifecycle(_)));
        assert!(!body_ran);
        assert_eq!(lifecycle.calls(), vec!["install ns", "gather creation", "uninstall"]);
    }

    async fn failing_assertion() -> Result<()> {
        panic!("expected 3 ready members, found 2")
    }

    #[tokio::test]
    async fn test_teardown_after_body_panic() {
        let lifecycle = RecordingLifecycle::default();
        let fixture = ClusterFixture::new("ns", "op");
        let (logger, sink) = logger();

        let outcome = AssertUnwindSafe(with_cluster(
            &lifecycle,
            &fixture,
            "creation",
            &logger,
            |_| failing_assertion(),
        ))
        .catch_unwind()
        .await;

        let payload = outcome.unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "expected 3 ready members, found 2");
        assert_eq!(lifecycle.calls(), vec!["install ns", "gather creation", "uninstall"]);
        assert!(sink.contains("expected 3 ready members, found 2"));
        assert_eq!(sink.events("test_panicked").len(), 1);
    }

    #[tokio::test]
    async fn test_teardown_error_does_not_mask_result() {
        let lifecycle = RecordingLifecycle {
            fail_gather: true,
            ..Default::default()
        };
        let fixture = ClusterFixture::new("ns", "op");
        let (logger, sink) = logger();

        let value = with_cluster(&lifecycle, &fixture, "creation", &logger, |_| async { Ok(7) })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(lifecycle.calls().last().map(String::as_str), Some("uninstall"));
        assert!(sink.contains("log directory not writable"));
    }
}
