use std::sync::{Arc, Mutex};

use apify_client::{CostObserver, RunFinished};
use serde::Serialize;
use tracing::info;

/// Remote spend seen so far this session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SpendSummary {
    pub last_run_usd: Option<f64>,
    pub session_usd: f64,
    pub runs_reported: u32,
}

/// Accumulates per-job cost reports from the task runner.
#[derive(Debug, Default)]
pub struct SpendTracker {
    inner: Mutex<SpendSummary>,
}

impl SpendTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, finished: &RunFinished) {
        let mut summary = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(usd) = finished.usd() {
            summary.runs_reported += 1;
            summary.last_run_usd = Some(usd);
            summary.session_usd += usd;
        }
        info!(
            actor = finished.actor_id.as_str(),
            run_id = finished.run_id.as_str(),
            usd = finished.usd(),
            session_usd = summary.session_usd,
            "Apify cost"
        );
    }

    pub fn summary(&self) -> SpendSummary {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Adapter for `TaskRunner::with_cost_observer`.
    pub fn observer(self: &Arc<Self>) -> CostObserver {
        let tracker = Arc::clone(self);
        Arc::new(move |finished: &RunFinished| tracker.record(finished))
    }
}
