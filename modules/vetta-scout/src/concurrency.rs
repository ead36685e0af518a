use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use apify_client::{sleep_or_cancel, ErrorKind, TaskError};
use futures::future::join_all;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::query::QueryTask;

/// What happened to one round's tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundOutcome {
    pub launched: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Failures at submission (the job never started).
    pub submit_failures: usize,
    /// Tasks never launched because the round stopped early.
    pub skipped: usize,
    pub fatal_quota: bool,
    pub cancelled: bool,
}

impl RoundOutcome {
    /// Every task failed before a job was created.
    pub fn all_submits_failed(&self) -> bool {
        self.launched > 0 && self.submit_failures == self.launched
    }
}

enum TaskResult {
    Done,
    Skipped,
    Failed(ErrorKind),
    Cancelled,
}

/// Runs a round's tasks in fixed-width chunks. Each task sleeps a random
/// jitter first; a chunk finishes completely before the next starts. The
/// first quota failure stops anything not yet started.
pub struct ConcurrencyController {
    width: usize,
    max_jitter: Duration,
}

impl ConcurrencyController {
    pub fn new(width: usize, max_jitter: Duration) -> Self {
        Self {
            width: width.max(1),
            max_jitter,
        }
    }

    pub async fn run_round<F, Fut>(
        &self,
        tasks: &[QueryTask],
        cancel: &CancellationToken,
        execute: F,
    ) -> RoundOutcome
    where
        F: Fn(QueryTask) -> Fut,
        Fut: Future<Output = Result<(), TaskError>>,
    {
        let mut outcome = RoundOutcome::default();
        let fatal = AtomicBool::new(false);

        for chunk in tasks.chunks(self.width) {
            if fatal.load(Ordering::SeqCst) || cancel.is_cancelled() {
                outcome.skipped += chunk.len();
                continue;
            }

            let results = join_all(chunk.iter().map(|task| {
                let fatal = &fatal;
                let execute = &execute;
                async move {
                    if fatal.load(Ordering::SeqCst) || cancel.is_cancelled() {
                        return TaskResult::Skipped;
                    }
                    let jitter = jitter_delay(self.max_jitter);
                    if sleep_or_cancel(jitter, cancel).await.is_err() {
                        return TaskResult::Cancelled;
                    }
                    if fatal.load(Ordering::SeqCst) {
                        return TaskResult::Skipped;
                    }

                    match execute(task.clone()).await {
                        Ok(()) => TaskResult::Done,
                        Err(e) if e.is_cancelled() => TaskResult::Cancelled,
                        Err(e) => {
                            let kind = e.kind();
                            warn!(query = task.query.as_str(), dimension = %task.dimension, error = %e, "Probe failed");
                            if kind == ErrorKind::FatalQuota {
                                warn!("Monthly hard limit reached, stopping new probes");
                                fatal.store(true, Ordering::SeqCst);
                            }
                            TaskResult::Failed(kind)
                        }
                    }
                }
            }))
            .await;

            for result in results {
                match result {
                    TaskResult::Done => {
                        outcome.launched += 1;
                        outcome.succeeded += 1;
                    }
                    TaskResult::Failed(kind) => {
                        outcome.launched += 1;
                        outcome.failed += 1;
                        if kind == ErrorKind::SubmitFailure {
                            outcome.submit_failures += 1;
                        }
                    }
                    TaskResult::Cancelled => {
                        outcome.launched += 1;
                        outcome.cancelled = true;
                    }
                    TaskResult::Skipped => outcome.skipped += 1,
                }
            }
        }

        outcome.fatal_quota = fatal.load(Ordering::SeqCst);
        outcome.cancelled |= cancel.is_cancelled();
        debug!(?outcome, "Round complete");
        outcome
    }
}

fn jitter_delay(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..max_ms))
}
