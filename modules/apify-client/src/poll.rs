//! Bounded, cancellable polling.
//!
//! Every call site that waits on the remote platform (run status, usage
//! settlement) goes through [`poll_until`]: a fixed interval between attempts,
//! a per-attempt timeout, a maximum attempt count, and a shared
//! [`CancellationToken`] checked at every suspension point.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cancelled")]
pub struct Cancelled;

/// Sleep for `duration` unless `cancel` fires first.
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> Result<(), Cancelled> {
    if cancel.is_cancelled() {
        return Err(Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub attempt_timeout: Duration,
    pub max_attempts: u32,
    /// Wait one interval before the first attempt as well.
    pub wait_first: bool,
}

impl PollPolicy {
    pub fn new(interval: Duration, attempt_timeout: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            attempt_timeout,
            max_attempts,
            wait_first: true,
        }
    }

    pub fn immediate_first(mut self) -> Self {
        self.wait_first = false;
        self
    }

    /// Total time spent in interval waits when every attempt is used.
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

/// What a single attempt observed.
#[derive(Debug)]
pub enum Attempt<T> {
    Ready(T),
    /// Not done yet. A partial value is remembered and handed back if the
    /// attempts run out.
    Retry(Option<T>),
}

#[derive(Debug)]
pub enum PollError<T, E> {
    Cancelled,
    Exhausted { attempts: u32, last: Option<T> },
    Failed(E),
}

/// Run `attempt` until it reports [`Attempt::Ready`], fails, runs out of
/// attempts, or `cancel` fires.
///
/// An attempt that exceeds `attempt_timeout` counts as a retry, not a failure.
pub async fn poll_until<T, E, F, Fut>(
    policy: &PollPolicy,
    cancel: &CancellationToken,
    mut attempt: F,
) -> Result<T, PollError<T, E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Attempt<T>, E>>,
{
    let mut last = None;

    for n in 1..=policy.max_attempts {
        if policy.wait_first || n > 1 {
            sleep_or_cancel(policy.interval, cancel)
                .await
                .map_err(|_| PollError::Cancelled)?;
        } else if cancel.is_cancelled() {
            return Err(PollError::Cancelled);
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            res = tokio::time::timeout(policy.attempt_timeout, attempt(n)) => res,
        };

        match outcome {
            Err(_) => {
                debug!(
                    attempt = n,
                    max_attempts = policy.max_attempts,
                    timeout_secs = policy.attempt_timeout.as_secs(),
                    "Poll attempt timed out, retrying"
                );
            }
            Ok(Err(e)) => return Err(PollError::Failed(e)),
            Ok(Ok(Attempt::Ready(value))) => return Ok(value),
            Ok(Ok(Attempt::Retry(partial))) => {
                if partial.is_some() {
                    last = partial;
                }
            }
        }
    }

    Err(PollError::Exhausted {
        attempts: policy.max_attempts,
        last,
    })
}
