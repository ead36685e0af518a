// Scripted JobService for exercising the task lifecycle without a network.
//
// Every run walks the same status script; once the script is exhausted the
// last status repeats. Calls are recorded so tests can assert on them.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{ApifyError, Result};
use crate::task::JobService;
use crate::types::{LimitsSummary, RunData, RunUsage};

pub struct MockJobService {
    statuses: Vec<String>,
    items: Vec<Value>,
    submit_failure: Option<(u16, String)>,
    results_failure: Option<u16>,
    status_errors: AtomicUsize,
    status_delay: Option<Duration>,
    usage_script: Mutex<VecDeque<RunUsage>>,
    limits: Option<LimitsSummary>,

    cursors: Mutex<HashMap<String, usize>>,
    next_run: AtomicUsize,
    pub submits: Mutex<Vec<(String, Value)>>,
    pub status_calls: AtomicUsize,
    pub aborts: Mutex<Vec<String>>,
    pub usage_calls: AtomicUsize,
}

impl Default for MockJobService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockJobService {
    pub fn new() -> Self {
        Self {
            statuses: vec!["SUCCEEDED".to_string()],
            items: Vec::new(),
            submit_failure: None,
            results_failure: None,
            status_errors: AtomicUsize::new(0),
            status_delay: None,
            usage_script: Mutex::new(VecDeque::new()),
            limits: None,
            cursors: Mutex::new(HashMap::new()),
            next_run: AtomicUsize::new(0),
            submits: Mutex::new(Vec::new()),
            status_calls: AtomicUsize::new(0),
            aborts: Mutex::new(Vec::new()),
            usage_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_statuses(mut self, statuses: &[&str]) -> Self {
        self.statuses = statuses.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_items(mut self, items: Vec<Value>) -> Self {
        self.items = items;
        self
    }

    pub fn fail_submit(mut self, status: u16, message: &str) -> Self {
        self.submit_failure = Some((status, message.to_string()));
        self
    }

    pub fn fail_results(mut self, status: u16) -> Self {
        self.results_failure = Some(status);
        self
    }

    /// The first `n` status calls return a network error.
    pub fn status_errors(self, n: usize) -> Self {
        self.status_errors.store(n, Ordering::SeqCst);
        self
    }

    /// Every status call takes this long to answer.
    pub fn slow_status(mut self, delay: Duration) -> Self {
        self.status_delay = Some(delay);
        self
    }

    pub fn with_usage(self, script: Vec<RunUsage>) -> Self {
        *self.usage_script.lock().unwrap() = script.into();
        self
    }

    pub fn with_limits(mut self, limits: LimitsSummary) -> Self {
        self.limits = Some(limits);
        self
    }

    pub fn submit_count(&self) -> usize {
        self.submits.lock().unwrap().len()
    }

    pub fn abort_count(&self) -> usize {
        self.aborts.lock().unwrap().len()
    }

    fn run_data(&self, id: &str, status: &str) -> RunData {
        RunData {
            id: id.to_string(),
            status: status.to_string(),
            default_dataset_id: format!("ds-{}", id.trim_start_matches("run-")),
            started_at: None,
            finished_at: None,
        }
    }
}

#[async_trait]
impl JobService for MockJobService {
    async fn submit(&self, actor_id: &str, payload: &Value) -> Result<RunData> {
        self.submits
            .lock()
            .unwrap()
            .push((actor_id.to_string(), payload.clone()));
        if let Some((status, message)) = &self.submit_failure {
            return Err(ApifyError::Api {
                status: *status,
                message: message.clone(),
            });
        }
        let n = self.next_run.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(self.run_data(&format!("run-{n}"), "READY"))
    }

    async fn status(&self, run_id: &str) -> Result<RunData> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.status_delay {
            tokio::time::sleep(delay).await;
        }
        let remaining = self.status_errors.load(Ordering::SeqCst);
        if remaining > 0 {
            self.status_errors.store(remaining - 1, Ordering::SeqCst);
            return Err(ApifyError::Network("connection reset".to_string()));
        }
        let status = {
            let mut cursors = self.cursors.lock().unwrap();
            let cursor = cursors.entry(run_id.to_string()).or_insert(0);
            let idx = (*cursor).min(self.statuses.len().saturating_sub(1));
            *cursor += 1;
            self.statuses
                .get(idx)
                .cloned()
                .unwrap_or_else(|| "RUNNING".to_string())
        };
        Ok(self.run_data(run_id, &status))
    }

    async fn results(&self, _dataset_id: &str) -> Result<Vec<Value>> {
        if let Some(status) = self.results_failure {
            return Err(ApifyError::Api {
                status,
                message: "dataset unavailable".to_string(),
            });
        }
        Ok(self.items.clone())
    }

    async fn abort(&self, run_id: &str) -> Result<bool> {
        self.aborts.lock().unwrap().push(run_id.to_string());
        Ok(true)
    }

    async fn usage(&self, _run_id: &str) -> Result<RunUsage> {
        self.usage_calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.usage_script.lock().unwrap();
        let next = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().copied()
        };
        Ok(next.unwrap_or_default())
    }

    async fn limits(&self) -> Result<Option<LimitsSummary>> {
        Ok(self.limits.clone())
    }
}
