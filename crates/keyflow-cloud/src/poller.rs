//! Convergence polling
//!
//! Remote deletes are acknowledged before they are visible to reads. The
//! poller re-runs an operation on a fixed cadence until a convergence
//! predicate is satisfied, the time budget is spent, or the caller cancels.

use crate::error::{CloudError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Default convergence budget
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default polling cadence
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(3);

/// Timing for convergence operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Give up once this much time has elapsed
    pub timeout: Duration,

    /// Delay between attempts
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl PollConfig {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Verdict of the convergence predicate on one attempt
#[derive(Debug)]
pub enum Convergence<T> {
    /// Converged; stop polling
    Done(T),
    /// Not yet; the string describes the observed condition
    Pending(String),
    /// Abort without further attempts
    Fatal(CloudError),
}

/// Successful poll result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Converged<T> {
    pub value: T,

    /// Attempts made after the first one
    pub retries: u32,
}

/// Run `operation` until `is_converged` reports [`Convergence::Done`]
///
/// The first attempt runs immediately. A pending attempt observed after
/// `config.timeout` has elapsed ends the loop with
/// [`CloudError::ConvergenceTimeout`], so the loop never runs longer than
/// `timeout + interval` plus the latency of the operation itself.
pub async fn poll_until<T, R, F, Fut, P>(
    subject: &str,
    config: &PollConfig,
    cancel: &CancellationToken,
    mut operation: F,
    mut is_converged: P,
) -> Result<Converged<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = R>,
    P: FnMut(R) -> Convergence<T>,
{
    let start = Instant::now();
    let mut retries = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(CloudError::Cancelled(subject.to_string()));
        }

        let outcome = operation().await;
        let condition = match is_converged(outcome) {
            Convergence::Done(value) => {
                tracing::debug!(%subject, retries, "converged");
                return Ok(Converged { value, retries });
            }
            Convergence::Fatal(err) => return Err(err),
            Convergence::Pending(condition) => condition,
        };

        let elapsed = start.elapsed();
        if elapsed >= config.timeout {
            tracing::warn!(
                %subject,
                elapsed_ms = elapsed.as_millis() as u64,
                "gave up waiting for convergence"
            );
            return Err(CloudError::ConvergenceTimeout {
                subject: subject.to_string(),
                last_condition: condition,
            });
        }

        tracing::debug!(
            %subject,
            attempt = retries + 1,
            %condition,
            "not converged, retrying in {:?}",
            config.interval
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(CloudError::Cancelled(subject.to_string()));
            }
            _ = tokio::time::sleep(config.interval) => {}
        }
        retries += 1;
    }
}
