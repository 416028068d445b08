//! Teardown for clusters under test
//!
//! The CLI attaches to a cluster that is already installed, so teardown only
//! collects pod logs for later inspection and leaves the cluster in place.

use async_trait::async_trait;
use convergence_lib::{ClusterFixture, ClusterLifecycle, VerifyError};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{ListParams, LogParams};
use kube::{Api, Client};
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Writes the logs of every pod in the operator and cluster namespaces
pub struct PodLogGatherer {
    client: Client,
    logs_dir: PathBuf,
}

impl PodLogGatherer {
    pub fn new(client: Client, logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            logs_dir: logs_dir.into(),
        }
    }

    async fn gather_namespace(
        &self,
        namespace: &str,
        dir: &Path,
    ) -> convergence_lib::Result<usize> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = pods
            .list(&ListParams::default())
            .await
            .map_err(|e| VerifyError::transport(format!("pods in {namespace}"), e.to_string()))?;

        let mut written = 0;
        for pod in list.items {
            let Some(name) = pod.metadata.name else {
                continue;
            };
            match pods.logs(&name, &LogParams::default()).await {
                Ok(logs) => {
                    write_log(dir, namespace, &name, &logs).await?;
                    written += 1;
                }
                Err(e) => {
                    warn!(
                        namespace = %namespace,
                        pod = %name,
                        error = %e,
                        "Failed to fetch pod logs"
                    )
                }
            }
        }
        Ok(written)
    }
}

#[async_trait]
impl ClusterLifecycle for PodLogGatherer {
    async fn gather_logs(
        &self,
        fixture: &ClusterFixture,
        test_name: &str,
    ) -> convergence_lib::Result<()> {
        let dir = self.logs_dir.join(test_name);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            VerifyError::lifecycle(format!("failed to create {}: {e}", dir.display()))
        })?;

        let namespaces = gathered_namespaces(fixture);
        gather_each(&namespaces, |namespace| self.gather_namespace(namespace, &dir)).await
    }
}

/// Visit every namespace even when an earlier one fails, then report all failures at once
async fn gather_each<'a, F, Fut>(
    namespaces: &[&'a str],
    mut gather: F,
) -> convergence_lib::Result<()>
where
    F: FnMut(&'a str) -> Fut,
    Fut: Future<Output = convergence_lib::Result<usize>>,
{
    let mut failed: Vec<&str> = Vec::new();
    for &namespace in namespaces {
        match gather(namespace).await {
            Ok(written) => info!(namespace = %namespace, pods = written, "Gathered pod logs"),
            Err(e) => {
                warn!(namespace = %namespace, error = %e, "Failed to gather pod logs");
                failed.push(namespace);
            }
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(VerifyError::lifecycle(format!(
            "failed to gather logs from {}",
            failed.join(", ")
        )))
    }
}

/// Namespaces whose pods are gathered, operator first, without duplicates
fn gathered_namespaces(fixture: &ClusterFixture) -> Vec<&str> {
    let mut namespaces = vec![fixture.system_namespace.as_str()];
    for namespace in [fixture.namespace.as_str(), fixture.cluster_namespace.as_str()] {
        if !namespaces.contains(&namespace) {
            namespaces.push(namespace);
        }
    }
    namespaces
}

fn log_file_path(dir: &Path, namespace: &str, pod: &str) -> PathBuf {
    dir.join(format!("{namespace}_{pod}.log"))
}

async fn write_log(
    dir: &Path,
    namespace: &str,
    pod: &str,
    logs: &str,
) -> convergence_lib::Result<()> {
    let path = log_file_path(dir, namespace, pod);
    tokio::fs::write(&path, logs)
        .await
        .map_err(|e| VerifyError::lifecycle(format!("failed to write {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gathered_namespaces_are_deduplicated() {
        let fixture = ClusterFixture::new("cassandra-ns", "rook-cassandra-operator");
        assert_eq!(gathered_namespaces(&fixture), vec!["cassandra-ns-system", "cassandra-ns"]);

        let mut split = fixture.clone();
        split.cluster_namespace = "data".to_string();
        assert_eq!(
            gathered_namespaces(&split),
            vec!["cassandra-ns-system", "cassandra-ns", "data"]
        );
    }

    #[tokio::test]
    async fn test_write_log_layout() {
        let dir = tempfile::tempdir().unwrap();

        write_log(
            dir.path(),
            "cassandra-ns",
            "cassandra-ns-us-east-1-us-east-1a-0",
            "INFO started\n",
        )
        .await
        .unwrap();

        let path = dir
            .path()
            .join("cassandra-ns_cassandra-ns-us-east-1-us-east-1a-0.log");
        assert_eq!(std::fs::read_to_string(path).unwrap(), "INFO started\n");
    }

    #[tokio::test]
    async fn test_gathering_continues_past_a_failing_namespace() {
        let visited = std::sync::Mutex::new(Vec::new());
        let namespaces = ["cassandra-ns-system", "cassandra-ns", "data"];

        let result = gather_each(&namespaces, |namespace| {
            visited.lock().unwrap().push(namespace);
            async move {
                if namespace == "cassandra-ns-system" {
                    Err(VerifyError::transport("pods in cassandra-ns-system", "forbidden"))
                } else {
                    Ok(1)
                }
            }
        })
        .await;

        assert_eq!(*visited.lock().unwrap(), namespaces);
        let err = result.unwrap_err();
        assert!(matches!(err, VerifyError::Lifecycle(_)));
        assert!(err.to_string().contains("cassandra-ns-system"));
        assert!(!err.to_string().contains("data"));
    }

    #[tokio::test]
    async fn test_gathering_every_namespace_succeeds() {
        let result = gather_each(&["a", "b"], |_| async { Ok(0) }).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_write_log_into_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent");

        let err = write_log(&missing, "ns", "pod", "").await.unwrap_err();
        assert!(matches!(err, VerifyError::Lifecycle(_)));
    }
}
