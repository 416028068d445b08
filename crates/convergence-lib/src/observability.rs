//! Observability infrastructure for convergence verification
//!
//! Provides:
//! - An injectable log sink with a `tracing` backend and an in-memory capture
//! - `VerifyLogger`, the structured logger handed to every component
//! - Prometheus metrics registered into a caller-supplied registry

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};

/// Histogram buckets for check durations (in seconds)
const CHECK_DURATION_BUCKETS: &[f64] = &[
    0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0,
];

/// Severity of a log record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

/// One log line emitted by a verification component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: LogLevel,
    /// Machine-readable event name, e.g. `poll_attempt`
    pub event: &'static str,
    /// Description of the check or stage that emitted the record
    pub scope: String,
    pub message: String,
}

/// Destination for log records
pub trait LogSink: Send + Sync {
    fn emit(&self, record: LogRecord);
}

/// Forwards records to the `tracing` subscriber installed by the binary
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, record: LogRecord) {
        match record.level {
            LogLevel::Info => {
                info!(event = record.event, scope = %record.scope, "{}", record.message)
            }
            LogLevel::Warn => {
                warn!(event = record.event, scope = %record.scope, "{}", record.message)
            }
            LogLevel::Error => {
                error!(event = record.event, scope = %record.scope, "{}", record.message)
            }
        }
    }
}

/// Keeps every record in memory
///
/// Used by tests to assert on diagnostics without a global subscriber.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records emitted so far
    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Records of one event type
    pub fn events(&self, event: &str) -> Vec<LogRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.event == event)
            .collect()
    }

    /// Returns true if any record message contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.records().iter().any(|r| r.message.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn emit(&self, record: LogRecord) {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record);
    }
}

/// Structured logger for verification events
///
/// Cheap to clone; every clone writes to the same sink.
#[derive(Clone)]
pub struct VerifyLogger {
    sink: Arc<dyn LogSink>,
}

impl Default for VerifyLogger {
    fn default() -> Self {
        Self::tracing()
    }
}

impl fmt::Debug for VerifyLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifyLogger").finish_non_exhaustive()
    }
}

impl VerifyLogger {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    /// Logger backed by `tracing`
    pub fn tracing() -> Self {
        Self::new(Arc::new(TracingSink))
    }

    pub fn info(&self, event: &'static str, scope: &str, message: impl Into<String>) {
        self.emit(LogLevel::Info, event, scope, message);
    }

    pub fn warn(&self, event: &'static str, scope: &str, message: impl Into<String>) {
        self.emit(LogLevel::Warn, event, scope, message);
    }

    pub fn error(&self, event: &'static str, scope: &str, message: impl Into<String>) {
        self.emit(LogLevel::Error, event, scope, message);
    }

    fn emit(&self, level: LogLevel, event: &'static str, scope: &str, message: impl Into<String>) {
        self.sink.emit(LogRecord {
            level,
            event,
            scope: scope.to_string(),
            message: message.into(),
        });
    }

    /// Log a verification run starting
    pub fn log_verification_started(&self, replica_group: &str, cluster: &str) {
        self.info(
            "verification_started",
            "verify",
            format!("verifying replica group {replica_group} and cluster {cluster}"),
        );
    }

    /// Log the end of a verification run
    pub fn log_verification_finished(&self, control_plane_converged: bool, data_plane_ok: bool) {
        if control_plane_converged {
            self.info(
                "verification_finished",
                "verify",
                format!("control plane converged, data plane probe ok: {data_plane_ok}"),
            );
        } else {
            self.error(
                "verification_finished",
                "verify",
                "control plane did not converge",
            );
        }
    }
}

/// Prometheus metrics for verification runs
#[derive(Clone)]
pub struct VerifierMetrics {
    poll_attempts: IntCounterVec,
    check_results: IntCounterVec,
    check_duration_seconds: HistogramVec,
}

impl VerifierMetrics {
    /// Create the metrics and register them into `registry`
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let poll_attempts = IntCounterVec::new(
            Opts::new(
                "convergence_poll_attempts_total",
                "Predicate evaluations performed per check",
            ),
            &["check"],
        )?;
        let check_results = IntCounterVec::new(
            Opts::new(
                "convergence_check_results_total",
                "Check outcomes by result",
            ),
            &["check", "result"],
        )?;
        let check_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "convergence_check_duration_seconds",
                "Wall time spent polling a check",
            )
            .buckets(CHECK_DURATION_BUCKETS.to_vec()),
            &["check"],
        )?;

        registry.register(Box::new(poll_attempts.clone()))?;
        registry.register(Box::new(check_results.clone()))?;
        registry.register(Box::new(check_duration_seconds.clone()))?;

        Ok(Self {
            poll_attempts,
            check_results,
            check_duration_seconds,
        })
    }

    /// Record one finished check
    pub fn observe_check(&self, check: &str, result: &str, attempts: u32, elapsed: Duration) {
        self.poll_attempts
            .with_label_values(&[check])
            .inc_by(u64::from(attempts));
        self.check_results.with_label_values(&[check, result]).inc();
        self.check_duration_seconds
            .with_label_values(&[check])
            .observe(elapsed.as_secs_f64());
    }
}
