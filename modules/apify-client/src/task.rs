//! Submit-poll-fetch lifecycle for a single remote job.
//!
//! [`TaskRunner::run_task`] starts a run, polls its status through
//! [`poll_until`], fetches the dataset, and reports cost on a side channel.
//! Cancellation at any suspension point stops the wait and sends one
//! best-effort abort for a run that was already started.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ApifyError, Result, TaskError};
use crate::poll::{poll_until, Attempt, PollError, PollPolicy};
use crate::types::{LimitsSummary, RunData, RunStatus, RunUsage};
use crate::INSTAGRAM_SEARCH_SCRAPER;

// ---------------------------------------------------------------------------
// JobService
// ---------------------------------------------------------------------------

#[async_trait]
pub trait JobService: Send + Sync {
    /// Start a run of `actor_id` with an actor-specific payload.
    async fn submit(&self, actor_id: &str, payload: &Value) -> Result<RunData>;

    /// Current metadata of a run.
    async fn status(&self, run_id: &str) -> Result<RunData>;

    /// Items of a finished run's dataset.
    async fn results(&self, dataset_id: &str) -> Result<Vec<Value>>;

    /// Ask the platform to abort a run. `Ok(false)` means it refused.
    async fn abort(&self, run_id: &str) -> Result<bool>;

    /// Resource usage of a run.
    async fn usage(&self, run_id: &str) -> Result<RunUsage>;

    /// Account-level limits, where the service exposes them.
    async fn limits(&self) -> Result<Option<LimitsSummary>> {
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Slow job classes get a proportionally longer polling budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobClass {
    Standard,
    Search,
}

impl JobClass {
    pub fn for_actor(actor_id: &str) -> Self {
        if actor_id.contains(INSTAGRAM_SEARCH_SCRAPER) {
            JobClass::Search
        } else {
            JobClass::Standard
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskPolicy {
    pub poll_interval: Duration,
    pub attempt_timeout: Duration,
    pub standard_attempts: u32,
    pub search_attempts: u32,
    pub usage_attempts: u32,
    /// Upper bound on the best-effort abort call.
    pub abort_timeout: Duration,
}

impl Default for TaskPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            attempt_timeout: Duration::from_secs(10),
            standard_attempts: 30,
            search_attempts: 60,
            usage_attempts: 6,
            abort_timeout: Duration::from_secs(5),
        }
    }
}

impl TaskPolicy {
    pub fn status_poll(&self, class: JobClass) -> PollPolicy {
        let attempts = match class {
            JobClass::Standard => self.standard_attempts,
            JobClass::Search => self.search_attempts,
        };
        PollPolicy::new(self.poll_interval, self.attempt_timeout, attempts)
    }

    pub fn usage_poll(&self) -> PollPolicy {
        PollPolicy::new(self.poll_interval, self.attempt_timeout, self.usage_attempts)
            .immediate_first()
    }
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TaskOutput {
    pub run_id: String,
    pub dataset_id: String,
    pub items: Vec<Value>,
}

/// Cost report for a finished run, delivered to the cost observer.
#[derive(Debug, Clone)]
pub struct RunFinished {
    pub actor_id: String,
    pub run_id: String,
    pub dataset_id: String,
    pub usage: Option<RunUsage>,
}

impl RunFinished {
    /// Settled total if known, otherwise the partial figure.
    pub fn usd(&self) -> Option<f64> {
        let usage = self.usage?;
        usage.usage_total_usd.or(usage.usage_usd)
    }
}

pub type CostObserver = Arc<dyn Fn(&RunFinished) + Send + Sync>;

// ---------------------------------------------------------------------------
// TaskRunner
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct TaskRunner {
    service: Arc<dyn JobService>,
    policy: TaskPolicy,
    on_finished: Option<CostObserver>,
}

impl TaskRunner {
    pub fn new(service: Arc<dyn JobService>) -> Self {
        Self {
            service,
            policy: TaskPolicy::default(),
            on_finished: None,
        }
    }

    pub fn with_policy(mut self, policy: TaskPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Receive a cost report after every successful run.
    pub fn with_cost_observer(mut self, observer: CostObserver) -> Self {
        self.on_finished = Some(observer);
        self
    }

    pub fn service(&self) -> &Arc<dyn JobService> {
        &self.service
    }

    pub fn policy(&self) -> &TaskPolicy {
        &self.policy
    }

    /// Run one job end-to-end: start, poll, fetch results.
    pub async fn run_task(
        &self,
        actor_id: &str,
        payload: &Value,
        cancel: &CancellationToken,
    ) -> std::result::Result<TaskOutput, TaskError> {
        if cancel.is_cancelled() {
            return Err(TaskError::Cancelled);
        }

        let run = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TaskError::Cancelled),
            res = self.service.submit(actor_id, payload) => res.map_err(TaskError::Submit)?,
        };
        info!(actor_id, run_id = %run.id, "Apify run started, polling for completion");

        if cancel.is_cancelled() {
            self.abort_quietly(&run.id).await;
            return Err(TaskError::Cancelled);
        }

        let poll = self.policy.status_poll(JobClass::for_actor(actor_id));
        let service = &self.service;
        let run_id = run.id.as_str();
        let max_attempts = poll.max_attempts;

        let polled = poll_until(&poll, cancel, |n| async move {
            match service.status(run_id).await {
                Ok(data) => {
                    let status = RunStatus::parse(&data.status);
                    debug!(run_id, status = %data.status, attempt = n, max_attempts, "Run status");
                    if status == RunStatus::Succeeded {
                        Ok(Attempt::Ready(data))
                    } else if status.is_failure() {
                        Err(data.status)
                    } else {
                        Ok(Attempt::Retry(None))
                    }
                }
                Err(e) => {
                    warn!(run_id, attempt = n, error = %e, "Polling status failed, retrying");
                    Ok(Attempt::Retry(None))
                }
            }
        })
        .await;

        match polled {
            Ok(_) => {}
            Err(PollError::Cancelled) => {
                self.abort_quietly(run_id).await;
                return Err(TaskError::Cancelled);
            }
            Err(PollError::Failed(status)) => return Err(TaskError::RemoteFailure { status }),
            Err(PollError::Exhausted { .. }) => {
                return Err(TaskError::Timeout {
                    waited: poll.budget(),
                })
            }
        }

        let dataset_id = run.default_dataset_id.clone();
        debug!(run_id, dataset_id = %dataset_id, "Run completed, fetching results");
        let items = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TaskError::Cancelled),
            res = self.service.results(&dataset_id) => res.map_err(TaskError::Fetch)?,
        };
        debug!(run_id, items = items.len(), "Dataset fetched");

        if let Some(observer) = &self.on_finished {
            let usage = self.lookup_usage(run_id, cancel).await;
            observer(&RunFinished {
                actor_id: actor_id.to_string(),
                run_id: run.id.clone(),
                dataset_id: dataset_id.clone(),
                usage,
            });
        }

        Ok(TaskOutput {
            run_id: run.id,
            dataset_id,
            items,
        })
    }

    /// Wait for the platform to settle a run's cost. Best-effort: any error
    /// or cancellation yields whatever was last seen.
    async fn lookup_usage(&self, run_id: &str, cancel: &CancellationToken) -> Option<RunUsage> {
        let service = &self.service;
        let result = poll_until(&self.policy.usage_poll(), cancel, |_| async move {
            match service.usage(run_id).await {
                Ok(usage) if usage.is_settled() => Ok::<_, ApifyError>(Attempt::Ready(usage)),
                Ok(usage) => Ok(Attempt::Retry(Some(usage))),
                Err(e) => Err(e),
            }
        })
        .await;

        match result {
            Ok(usage) => Some(usage),
            Err(PollError::Exhausted { last, .. }) => last,
            Err(PollError::Failed(e)) => {
                debug!(run_id, error = %e, "Usage lookup failed");
                None
            }
            Err(PollError::Cancelled) => None,
        }
    }

    async fn abort_quietly(&self, run_id: &str) {
        match tokio::time::timeout(self.policy.abort_timeout, self.service.abort(run_id)).await {
            Ok(Ok(true)) => info!(run_id, "Aborted remote run"),
            Ok(Ok(false)) => debug!(run_id, "Abort request was refused"),
            Ok(Err(e)) => debug!(run_id, error = %e, "Abort request failed"),
            Err(_) => debug!(run_id, "Abort request timed out"),
        }
    }
}
