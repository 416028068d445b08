//! Configuration management for the CLI
//!
//! Settings are layered: built-in defaults, then an optional config file,
//! then `CVT_*` environment variables, then command-line flags.

use anyhow::{Context, Result};
use convergence_lib::{
    crd::member_pod_name, fixture::system_namespace, source::ReplicaGroupKind, ClusterFixture,
    PollSpec,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix
const ENV_PREFIX: &str = "CVT";

/// Verifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Namespace of the cluster under test
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Operator namespace, `<namespace>-system` when unset
    #[serde(default)]
    pub system_namespace: Option<String>,

    #[serde(default = "default_operator_name")]
    pub operator_name: String,

    #[serde(default)]
    pub replica_group_kind: ReplicaGroupKind,

    /// Cluster resource name, the namespace when unset
    #[serde(default)]
    pub cluster_name: Option<String>,

    #[serde(default)]
    pub cluster_namespace: Option<String>,

    #[serde(default = "default_datacenter")]
    pub datacenter: String,

    /// Rack whose first member runs the data-path probe
    #[serde(default = "default_rack")]
    pub rack: String,

    #[serde(default = "default_check_attempts")]
    pub replica_attempts: u32,

    #[serde(default = "default_check_interval")]
    pub replica_interval_secs: u64,

    #[serde(default = "default_check_attempts")]
    pub topology_attempts: u32,

    #[serde(default = "default_check_interval")]
    pub topology_interval_secs: u64,

    #[serde(default = "default_true")]
    pub probe_enabled: bool,

    /// Pod running the probe, derived from the rack when unset
    #[serde(default)]
    pub probe_pod: Option<String>,

    #[serde(default = "default_probe_attempts")]
    pub probe_attempts: u32,

    #[serde(default = "default_check_interval")]
    pub probe_interval_secs: u64,

    /// Directory receiving pod logs on teardown
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,
}

fn default_namespace() -> String {
    "cassandra-ns".to_string()
}

fn default_operator_name() -> String {
    "rook-cassandra-operator".to_string()
}

fn default_datacenter() -> String {
    "us-east-1".to_string()
}

fn default_rack() -> String {
    "us-east-1a".to_string()
}

fn default_check_attempts() -> u32 {
    10
}

fn default_check_interval() -> u64 {
    30
}

fn default_probe_attempts() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("_output").join("logs")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            system_namespace: None,
            operator_name: default_operator_name(),
            replica_group_kind: ReplicaGroupKind::default(),
            cluster_name: None,
            cluster_namespace: None,
            datacenter: default_datacenter(),
            rack: default_rack(),
            replica_attempts: default_check_attempts(),
            replica_interval_secs: default_check_interval(),
            topology_attempts: default_check_attempts(),
            topology_interval_secs: default_check_interval(),
            probe_enabled: true,
            probe_pod: None,
            probe_attempts: default_probe_attempts(),
            probe_interval_secs: default_check_interval(),
            logs_dir: default_logs_dir(),
        }
    }
}

impl Config {
    /// Load configuration from an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("Failed to load configuration")?;

        settings
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// Fixture describing the cluster under test
    pub fn fixture(&self) -> ClusterFixture {
        let mut fixture = ClusterFixture::new(&self.namespace, &self.operator_name);
        fixture.system_namespace = self
            .system_namespace
            .clone()
            .unwrap_or_else(|| system_namespace(&self.namespace));
        if let Some(name) = &self.cluster_name {
            fixture.cluster_name = name.clone();
        }
        if let Some(namespace) = &self.cluster_namespace {
            fixture.cluster_namespace = namespace.clone();
        }
        fixture
    }

    /// Pod the probe runs in: the first member of the configured rack by default
    pub fn probe_pod(&self) -> String {
        self.probe_pod.clone().unwrap_or_else(|| {
            let cluster = self.cluster_name.as_deref().unwrap_or(&self.namespace);
            member_pod_name(cluster, &self.datacenter, &self.rack, 0)
        })
    }

    pub fn replica_poll(&self) -> Result<PollSpec> {
        let fixture = self.fixture();
        PollSpec::new(
            format!(
                "Waiting for {} {} to be ready",
                self.replica_group_kind,
                fixture.operator_ref()
            ),
            self.replica_attempts,
            Duration::from_secs(self.replica_interval_secs),
        )
        .context("Invalid replica group poll settings")
    }

    pub fn topology_poll(&self) -> Result<PollSpec> {
        PollSpec::new(
            format!("Waiting for cluster {} to be ready", self.fixture().cluster_ref()),
            self.topology_attempts,
            Duration::from_secs(self.topology_interval_secs),
        )
        .context("Invalid rack topology poll settings")
    }
}

/// Get kubeconfig path
pub fn kubeconfig_path(override_path: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = override_path {
        return Ok(PathBuf::from(path));
    }

    if let Ok(path) = std::env::var("KUBECONFIG") {
        return Ok(PathBuf::from(path));
    }

    let home = dirs_next::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".kube").join("config"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(extension: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(extension)
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_match_suite_layout() {
        let config = Config::default();
        let fixture = config.fixture();

        assert_eq!(
            fixture.operator_ref().to_string(),
            "cassandra-ns-system/rook-cassandra-operator"
        );
        assert_eq!(fixture.cluster_ref().to_string(), "cassandra-ns/cassandra-ns");
        assert_eq!(config.probe_pod(), "cassandra-ns-us-east-1-us-east-1a-0");
        assert_eq!(config.replica_poll().unwrap().max_attempts(), 10);
        assert_eq!(config.topology_poll().unwrap().interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_load_toml_file() {
        let file = write_config(
            ".toml",
            r#"
namespace = "scylla"
operator_name = "scylla-operator"
replica_group_kind = "deployment"
topology_attempts = 3
probe_enabled = false
"#,
        );

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.namespace, "scylla");
        assert_eq!(config.replica_group_kind, ReplicaGroupKind::Deployment);
        assert_eq!(config.topology_attempts, 3);
        assert_eq!(config.replica_attempts, 10);
        assert!(!config.probe_enabled);
        assert_eq!(config.fixture().system_namespace, "scylla-system");
    }

    #[test]
    fn test_load_json_file_with_overrides() {
        let file = write_config(
            ".json",
            r#"{"namespace": "cassandra-ns", "system_namespace": "rook-system", "cluster_name": "main", "probe_pod": "main-0"}"#,
        );

        let config = Config::load(Some(file.path())).unwrap();
        let fixture = config.fixture();
        assert_eq!(fixture.system_namespace, "rook-system");
        assert_eq!(fixture.cluster_ref().to_string(), "cassandra-ns/main");
        assert_eq!(config.probe_pod(), "main-0");
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let config = Config {
            replica_attempts: 0,
            ..Config::default()
        };
        assert!(config.replica_poll().is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(Config::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_kubeconfig_override_wins() {
        let path = kubeconfig_path(Some("/tmp/kind.yaml")).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/kind.yaml"));
    }
}
