use std::sync::Arc;

use apify_client::{sleep_or_cancel, TaskError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::{AuditPump, Auditor};
use crate::concurrency::{ConcurrencyController, RoundOutcome};
use crate::config::DiscoveryConfig;
use crate::ingest::{Candidate, IngestionEngine, SuppressionCounts};
use crate::probe::ProbeExecutor;
use crate::query::QueryTask;
use crate::scheduler::QueryScheduler;
use crate::scoring::ScoringPolicy;
use crate::sink::CandidateSink;
use crate::spend::{SpendSummary, SpendTracker};
use crate::strategy::StrategyMatrix;

/// How a run ended. None of these are errors: every run returns the pool it
/// built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Cancelled,
    /// The remote platform refused more work for this billing cycle.
    FatallyStopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Running,
    Finished(RunOutcome),
}

/// Why a completed run came back empty-handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoProgress {
    /// Every probe in the last round failed before a job started.
    AllSubmitsFailed,
    /// The scheduler ran out of queries and the last round added nothing.
    SchedulerExhausted,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub outcome: RunOutcome,
    /// Ranked: score descending, ties in arrival order.
    pub candidates: Vec<Candidate>,
    pub suppressed: SuppressionCounts,
    pub rounds_run: u32,
    pub probes_failed: usize,
    pub no_progress: Option<NoProgress>,
    pub audits_started: usize,
    pub spend: Option<SpendSummary>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

// =============================================================================
// DiscoveryRun
// =============================================================================

/// One adaptive discovery run: rounds of scheduled probes until the pool
/// reaches its target, the round budget is spent, the queries run out, the
/// caller cancels, or the platform quota is hit.
pub struct DiscoveryRun {
    run_id: Uuid,
    config: DiscoveryConfig,
    scheduler: QueryScheduler,
    probe: Arc<dyn ProbeExecutor>,
    engine: Arc<IngestionEngine>,
    auditor: Option<Arc<Auditor>>,
    spend: Option<Arc<SpendTracker>>,
    phase: watch::Sender<RunPhase>,
}

impl DiscoveryRun {
    pub fn new(
        config: DiscoveryConfig,
        strategy: &StrategyMatrix,
        probe: Arc<dyn ProbeExecutor>,
        sink: Arc<dyn CandidateSink>,
    ) -> Self {
        let scheduler = QueryScheduler::new(strategy.query_pools(), config.slots_per_round);
        let policy = ScoringPolicy::new(
            config.min_followers,
            config.creator_only,
            &strategy.aesthetic_keywords,
            &strategy.core_tags,
        );
        let (phase, _) = watch::channel(RunPhase::Idle);
        Self {
            run_id: Uuid::new_v4(),
            config,
            scheduler,
            probe,
            engine: Arc::new(IngestionEngine::new(policy, sink)),
            auditor: None,
            spend: None,
            phase,
        }
    }

    /// Replace the scheduler, e.g. with a seeded one.
    pub fn with_scheduler(mut self, scheduler: QueryScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_auditor(mut self, auditor: Auditor) -> Self {
        self.auditor = Some(Arc::new(auditor));
        self
    }

    /// Tracker already wired into the task runner; its summary goes into the
    /// report.
    pub fn with_spend_tracker(mut self, tracker: Arc<SpendTracker>) -> Self {
        self.spend = Some(tracker);
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<RunPhase> {
        self.phase.subscribe()
    }

    fn set_phase(&self, phase: RunPhase) {
        info!(run_id = %self.run_id, ?phase, "Run phase");
        self.phase.send_replace(phase);
    }

    pub async fn run(mut self, cancel: CancellationToken) -> RunReport {
        let started_at = Utc::now();
        let target = self.config.target_pool_size;
        let max_rounds = self.config.max_rounds;
        self.set_phase(RunPhase::Running);
        info!(run_id = %self.run_id, target, max_rounds, "Adaptive sourcing started");

        self.log_limits(&cancel).await;

        let controller = ConcurrencyController::new(self.config.concurrency, self.config.max_jitter);
        let pump = self.auditor.as_ref().filter(|_| self.config.max_audits > 0).map(|auditor| {
            Arc::new(AuditPump::new(
                Arc::clone(auditor),
                Arc::clone(&self.engine),
                self.config.max_audits,
                self.config.audit_min_score,
                cancel.child_token(),
            ))
        });

        let mut rounds_run = 0u32;
        let mut probes_failed = 0usize;
        let mut no_progress = None;
        let mut last_round_grew = false;

        let outcome = loop {
            if cancel.is_cancelled() {
                break RunOutcome::Cancelled;
            }
            if self.engine.len() >= target {
                info!(run_id = %self.run_id, pool = self.engine.len(), "Target reached");
                break RunOutcome::Completed;
            }
            if rounds_run >= max_rounds {
                info!(run_id = %self.run_id, rounds_run, "Round budget spent");
                break RunOutcome::Completed;
            }

            let plan = self.scheduler.plan_round();
            if plan.is_empty() {
                info!(run_id = %self.run_id, "Query pools exhausted");
                if !last_round_grew {
                    no_progress = Some(NoProgress::SchedulerExhausted);
                }
                break RunOutcome::Completed;
            }

            rounds_run += 1;
            let queries: Vec<&str> = plan.iter().map(|t| t.query.as_str()).collect();
            info!(
                run_id = %self.run_id,
                round = rounds_run,
                max_rounds,
                ?queries,
                degraded = plan.iter().filter(|t| t.degraded).count(),
                "Probing dimensions"
            );

            let before = self.engine.len();
            let round = self.execute_round(&controller, &plan, &cancel, pump.as_ref()).await;
            let grew = self.engine.len() - before;

            probes_failed += round.failed;
            last_round_grew = grew > 0;
            if round.all_submits_failed() {
                warn!(run_id = %self.run_id, round = rounds_run, "Every probe failed to start");
                no_progress = Some(NoProgress::AllSubmitsFailed);
            } else if last_round_grew {
                no_progress = None;
            }

            info!(
                run_id = %self.run_id,
                round = rounds_run,
                pool = self.engine.len(),
                target,
                added = grew,
                failed = round.failed,
                "Round finished"
            );

            if round.fatal_quota {
                warn!(run_id = %self.run_id, pool = self.engine.len(), "Monthly usage hard limit reached, keeping current results");
                break RunOutcome::FatallyStopped;
            }
            if round.cancelled || cancel.is_cancelled() {
                break RunOutcome::Cancelled;
            }

            if self.engine.len() < target && rounds_run < max_rounds {
                if sleep_or_cancel(self.config.round_cooldown, &cancel).await.is_err() {
                    break RunOutcome::Cancelled;
                }
            }
        };

        let audits_started = match &pump {
            Some(pump) => {
                pump.finish().await;
                pump.audits_started()
            }
            None => 0,
        };

        // A cancelled run publishes nothing further.
        let candidates = if outcome == RunOutcome::Cancelled || self.engine.is_empty() {
            self.engine.ranked()
        } else {
            self.engine.publish_now()
        };
        let suppressed = self.engine.suppressed();
        info!(
            run_id = %self.run_id,
            ?outcome,
            candidates = candidates.len(),
            suppressed_commercial = suppressed.commercial,
            suppressed_off_topic = suppressed.off_topic,
            rounds_run,
            "Adaptive sourcing finished"
        );
        self.set_phase(RunPhase::Finished(outcome));

        RunReport {
            run_id: self.run_id,
            outcome,
            candidates,
            suppressed,
            rounds_run,
            probes_failed,
            no_progress,
            audits_started,
            spend: self.spend.as_ref().map(|s| s.summary()),
            started_at,
            finished_at: Utc::now(),
        }
    }

    async fn execute_round(
        &self,
        controller: &ConcurrencyController,
        plan: &[QueryTask],
        cancel: &CancellationToken,
        pump: Option<&Arc<AuditPump>>,
    ) -> RoundOutcome {
        let probe = &self.probe;
        let engine = &self.engine;
        controller
            .run_round(plan, cancel, move |task| async move {
                let records = probe.probe(&task, cancel).await?;
                if cancel.is_cancelled() {
                    return Err(TaskError::Cancelled);
                }
                let stats = engine.ingest(&records, &task);
                info!(
                    query = task.query.as_str(),
                    records = records.len(),
                    added = stats.added,
                    duplicates = stats.duplicates,
                    suppressed = stats.suppressed,
                    "Probe ingested"
                );
                if let Some(pump) = pump {
                    pump.kick();
                }
                Ok(())
            })
            .await
    }

    async fn log_limits(&self, cancel: &CancellationToken) {
        let lookup = tokio::time::timeout(self.config.limits_timeout, self.probe.limits());
        let limits = tokio::select! {
            _ = cancel.cancelled() => return,
            limits = lookup => limits,
        };
        let Ok(limits) = limits else {
            debug!(run_id = %self.run_id, timeout = ?self.config.limits_timeout, "Apify limits lookup timed out");
            return;
        };
        if let Some(limits) = limits {
            info!(
                run_id = %self.run_id,
                monthly_usage_usd = limits.monthly_usage_usd,
                max_monthly_usage_usd = limits.max_monthly_usage_usd,
                remaining_usd = limits.remaining_usd(),
                cycle_end = limits.cycle_end.as_deref(),
                "Apify limits"
            );
        }
    }
}
