//! Best-effort data-path probe
//!
//! Runs a representative read/write workload inside one member pod. The
//! probe is advisory: the data plane may need longer to warm up than the
//! control plane, so its result never decides the verification verdict.

use crate::error::{Result, VerifyError};
use crate::models::PollSpec;
use crate::observability::VerifyLogger;
use crate::poller::{PollAborted, Polled, Poller};
use crate::source::CommandExecutor;
use std::sync::Arc;
use std::time::Duration;

/// CQL script writing one row and reading it back
const CQL_ROUND_TRIP: &str = "
CREATE KEYSPACE IF NOT EXISTS test WITH REPLICATION = {
'class': 'SimpleStrategy',
'replication_factor': 1
};
USE test;
CREATE TABLE IF NOT EXISTS map (key text, value text, PRIMARY KEY(key));
INSERT INTO map (key, value) VALUES('test_key', 'test_value');
SELECT key,value FROM map WHERE key='test_key';";

/// A command and its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeCommand {
    pub command: String,
    pub args: Vec<String>,
}

impl ProbeCommand {
    pub fn new<I, S>(command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// What the probe runs and where
#[derive(Debug, Clone)]
pub struct ProbeSpec {
    pub namespace: String,
    pub pod: String,
    /// Resolves the pod's address; its trimmed output is appended to the workload arguments
    pub resolve_address: Option<ProbeCommand>,
    pub workload: ProbeCommand,
    /// Markers that must all appear in the workload output
    pub expect: Vec<String>,
    pub poll: PollSpec,
}

impl ProbeSpec {
    /// CQL write-then-read against the member pod's own address
    pub fn cql_round_trip(
        namespace: impl Into<String>,
        pod: impl Into<String>,
        max_attempts: u32,
        interval: Duration,
    ) -> Result<Self> {
        let pod = pod.into();
        let poll = PollSpec::new(
            format!("CQL round trip in pod {pod}"),
            max_attempts,
            interval,
        )?;
        Ok(Self {
            namespace: namespace.into(),
            pod,
            resolve_address: Some(ProbeCommand::new("hostname", ["-i"])),
            workload: ProbeCommand::new("cqlsh", ["-e", CQL_ROUND_TRIP]),
            expect: vec!["test_key".to_string(), "test_value".to_string()],
            poll,
        })
    }
}

/// Executes a [`ProbeSpec`] with bounded retries
#[derive(Clone)]
pub struct DataPathProbe {
    executor: Arc<dyn CommandExecutor>,
    spec: ProbeSpec,
    logger: VerifyLogger,
}

impl DataPathProbe {
    pub fn new(executor: Arc<dyn CommandExecutor>, spec: ProbeSpec, logger: VerifyLogger) -> Self {
        Self {
            executor,
            spec,
            logger,
        }
    }

    pub fn spec(&self) -> &ProbeSpec {
        &self.spec
    }

    /// Run the probe until it succeeds or its attempts run out
    ///
    /// On success the value holds the workload output.
    pub async fn run(&self, poller: &Poller) -> std::result::Result<Polled<String>, PollAborted> {
        poller.poll_for(&self.spec.poll, || self.attempt()).await
    }

    /// One probe attempt; `Ok(None)` when the output lacks an expected marker
    async fn attempt(&self) -> Result<Option<String>> {
        let spec = &self.spec;
        let mut args = spec.workload.args.clone();

        if let Some(resolve) = &spec.resolve_address {
            let address = self
                .executor
                .exec(&spec.namespace, &spec.pod, &resolve.command, &resolve.args)
                .await?;
            let address = address.trim();
            if address.is_empty() {
                return Err(VerifyError::exec(
                    &spec.namespace,
                    &spec.pod,
                    format!("`{}` returned no address", resolve.command),
                ));
            }
            args.push(address.to_string());
        }

        let output = self
            .executor
            .exec(&spec.namespace, &spec.pod, &spec.workload.command, &args)
            .await?;

        let missing: Vec<&str> = spec
            .expect
            .iter()
            .map(String::as_str)
            .filter(|marker| !output.contains(marker))
            .collect();
        if !missing.is_empty() {
            self.logger.warn(
                "probe_output_mismatch",
                spec.poll.description(),
                format!("`{}` output is missing {:?}", spec.workload.command, missing),
            );
            return Ok(None);
        }

        Ok(Some(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::MemorySink;
    use crate::poller::Sleeper;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct NoSleep;

    #[async_trait]
    impl Sleeper for NoSleep {
        async fn sleep(&self, _duration: Duration) {}
    }

    /// Executor answering from a script and recording every call
    #[derive(Default)]
    struct ScriptedExecutor {
        responses: Mutex<VecDeque<Result<String>>>,
        calls: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl ScriptedExecutor {
        fn new(responses: Vec<Result<String>>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().collect()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CommandExecutor for ScriptedExecutor {
        async fn exec(
            &self,
            namespace: &str,
            pod: &str,
            command: &str,
            args: &[String],
        ) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((command.to_string(), args.to_vec()));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(VerifyError::exec(namespace, pod, "no scripted response")))
        }
    }

    fn harness() -> (Poller, VerifyLogger, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let logger = VerifyLogger::new(sink.clone());
        (Poller::new(Arc::new(NoSleep), logger.clone()), logger, sink)
    }

    fn cql_spec(attempts: u32) -> ProbeSpec {
        ProbeSpec::cql_round_trip(
            "cassandra-ns",
            "cassandra-ns-us-east-1-us-east-1a-0",
            attempts,
            Duration::ZERO,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_cql_probe_appends_pod_address() {
        let (poller, logger, _) = harness();
        let executor = Arc::new(ScriptedExecutor::new(vec![
            Ok("10.244.0.12\n".into()),
            Ok(" key      | value\n----------+------------\n test_key | test_value\n".into()),
        ]));
        let probe = DataPathProbe::new(executor.clone(), cql_spec(5), logger);

        let polled = probe.run(&poller).await.unwrap();
        assert!(polled.succeeded());
        assert_eq!(polled.attempts, 1);

        let calls = executor.calls.lock().unwrap();
        assert_eq!(calls[0], ("hostname".to_string(), vec!["-i".to_string()]));
        assert_eq!(calls[1].0, "cqlsh");
        assert_eq!(calls[1].1.last().map(String::as_str), Some("10.244.0.12"));
    }

    #[tokio::test]
    async fn test_probe_retries_exec_failures() {
        let (poller, logger, sink) = harness();
        let executor = Arc::new(ScriptedExecutor::new(vec![
            Ok("10.0.0.1".into()),
            Err(VerifyError::exec("cassandra-ns", "pod", "Connection refused")),
            Ok("10.0.0.1".into()),
            Ok("test_key | test_value".into()),
        ]));
        let probe = DataPathProbe::new(executor, cql_spec(3), logger);

        let polled = probe.run(&poller).await.unwrap();
        assert_eq!(polled.attempts, 2);
        assert!(sink.contains("Connection refused"));
    }

    #[tokio::test]
    async fn test_probe_output_must_contain_markers() {
        let (poller, logger, sink) = harness();
        let executor = Arc::new(ScriptedExecutor::new(vec![
            Ok("10.0.0.1".into()),
            Ok("(0 rows)".into()),
        ]));
        let probe = DataPathProbe::new(executor, cql_spec(1), logger);

        let polled = probe.run(&poller).await.unwrap();
        assert!(!polled.succeeded());
        assert_eq!(sink.events("probe_output_mismatch").len(), 1);
    }

    #[tokio::test]
    async fn test_empty_address_fails_attempt() {
        let (poller, logger, sink) = harness();
        let executor = Arc::new(ScriptedExecutor::new(vec![Ok("  \n".into())]));
        let probe = DataPathProbe::new(executor.clone(), cql_spec(1), logger);

        let polled = probe.run(&poller).await.unwrap();
        assert!(!polled.succeeded());
        assert!(sink.contains("returned no address"));
        assert_eq!(executor.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_probe_without_address_step() {
        let (poller, logger, _) = harness();
        let executor = Arc::new(ScriptedExecutor::new(vec![Ok("PONG".into())]));
        let spec = ProbeSpec {
            namespace: "ns".into(),
            pod: "redis-0".into(),
            resolve_address: None,
            workload: ProbeCommand::new("redis-cli", ["ping"]),
            expect: vec!["PONG".into()],
            poll: PollSpec::new("ping", 1, Duration::ZERO).unwrap(),
        };
        let probe = DataPathProbe::new(executor.clone(), spec, logger);

        let polled = probe.run(&poller).await.unwrap();
        assert_eq!(polled.value.as_deref(), Some("PONG"));
        assert_eq!(executor.calls.lock().unwrap()[0].1, vec!["ping".to_string()]);
    }
}
