//! Bounded retry polling
//!
//! Evaluates a predicate up to a fixed number of times with a fixed delay
//! between attempts. Recoverable errors count as a failed attempt, anything
//! else aborts the poll. Attempts run strictly one after another.

use crate::error::{Result, VerifyError};
use crate::models::PollSpec;
use crate::observability::VerifyLogger;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Delay between attempts
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the Tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Outcome of a poll that ran to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Polled<T> {
    /// The value produced by the successful attempt, `None` when attempts ran out
    pub value: Option<T>,
    /// Number of predicate evaluations performed
    pub attempts: u32,
    pub elapsed: Duration,
}

impl<T> Polled<T> {
    pub fn succeeded(&self) -> bool {
        self.value.is_some()
    }
}

/// A poll stopped early by a non-recoverable error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollAborted {
    pub error: VerifyError,
    /// Evaluations performed, including the one that failed
    pub attempts: u32,
    pub elapsed: Duration,
}

impl From<PollAborted> for VerifyError {
    fn from(aborted: PollAborted) -> Self {
        aborted.error
    }
}

/// Bounded retry poller
#[derive(Clone)]
pub struct Poller {
    sleeper: Arc<dyn Sleeper>,
    logger: VerifyLogger,
}

impl Poller {
    pub fn new(sleeper: Arc<dyn Sleeper>, logger: VerifyLogger) -> Self {
        Self { sleeper, logger }
    }

    /// Poller sleeping on the Tokio timer
    pub fn with_logger(logger: VerifyLogger) -> Self {
        Self::new(Arc::new(TokioSleeper), logger)
    }

    /// Evaluate `predicate` until it returns `true` or attempts run out
    ///
    /// Returns `Ok(false)` when every attempt failed, `Err` on the first
    /// non-recoverable error.
    pub async fn poll<F, Fut>(&self, spec: &PollSpec, mut predicate: F) -> Result<bool>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        let polled = self
            .poll_for(spec, || {
                let attempt = predicate();
                async move { attempt.await.map(|ready| ready.then_some(())) }
            })
            .await?;
        Ok(polled.succeeded())
    }

    /// Value-carrying form of [`Poller::poll`]
    ///
    /// `attempt` returns `Ok(Some(value))` when done and `Ok(None)` to keep
    /// waiting. A non-recoverable error stops the poll and is returned with
    /// the attempts and time spent so far.
    pub async fn poll_for<T, F, Fut>(
        &self,
        spec: &PollSpec,
        mut attempt: F,
    ) -> std::result::Result<Polled<T>, PollAborted>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let scope = spec.description();
        let max = spec.max_attempts();
        let start = Instant::now();

        for n in 1..=max {
            match attempt().await {
                Ok(Some(value)) => {
                    self.logger.info(
                        "poll_succeeded",
                        scope,
                        format!("ready after attempt {n}/{max}"),
                    );
                    return Ok(Polled {
                        value: Some(value),
                        attempts: n,
                        elapsed: start.elapsed(),
                    });
                }
                Ok(None) => {
                    self.logger.info(
                        "poll_attempt",
                        scope,
                        format!("attempt {n}/{max}: not ready yet"),
                    );
                }
                Err(err) if err.is_recoverable() => {
                    self.logger.warn("poll_attempt", scope, format!("attempt {n}/{max}: {err}"));
                }
                Err(err) => {
                    self.logger.error(
                        "poll_aborted",
                        scope,
                        format!("attempt {n}/{max} hit a non-recoverable error: {err}"),
                    );
                    return Err(PollAborted {
                        error: err,
                        attempts: n,
                        elapsed: start.elapsed(),
                    });
                }
            }

            if n < max {
                self.sleeper.sleep(spec.interval()).await;
            }
        }

        self.logger.error(
            "poll_exhausted",
            scope,
            format!("gave up after {max} attempts"),
        );
        Ok(Polled {
            value: None,
            attempts: max,
            elapsed: start.elapsed(),
        })
    }
}
