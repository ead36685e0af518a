//! DiscoveryRun end to end against MockProbe, RecordingSink and a seeded
//! scheduler. Paused clock throughout.

use std::sync::Arc;
use std::time::Duration;

use apify_client::testing::MockJobService;
use apify_client::{LimitsSummary, TaskRunner};
use serde_json::{json, Value};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::audit::Auditor;
use crate::config::DiscoveryConfig;
use crate::controller::{DiscoveryRun, NoProgress, RunOutcome, RunPhase};
use crate::probe::ApifyProbe;
use crate::scheduler::QueryScheduler;
use crate::strategy::StrategyMatrix;
use crate::testing::{post, sample_strategy, MockFailure, MockProbe, RecordingSink, ScriptedGenerator};

const SEED: u64 = 11;

fn config() -> DiscoveryConfig {
    DiscoveryConfig::builder()
        .target_pool_size(10)
        .max_jitter(Duration::ZERO)
        .max_audits(0)
        .build()
}

fn creator_for(query: &str) -> Value {
    post(&query.replace(' ', "_"), 5000, "minimalist studio notes", "")
}

/// Every term in the strategy yields one distinct on-topic creator.
fn probe_finding_creators(strategy: &StrategyMatrix) -> MockProbe {
    let pools = strategy.query_pools();
    pools
        .action
        .iter()
        .chain(&pools.aesthetic)
        .chain(&pools.identity)
        .chain(&pools.fallback)
        .fold(MockProbe::new(), |probe, term| probe.on_query(term, vec![creator_for(term)]))
}

fn discovery(
    config: DiscoveryConfig,
    strategy: &StrategyMatrix,
    probe: Arc<MockProbe>,
    sink: Arc<RecordingSink>,
) -> DiscoveryRun {
    let scheduler = QueryScheduler::seeded(strategy.query_pools(), config.slots_per_round, SEED);
    DiscoveryRun::new(config, strategy, probe, sink).with_scheduler(scheduler)
}

// =============================================================================
// Stop conditions
// =============================================================================

#[tokio::test(start_paused = true)]
async fn stops_as_soon_as_the_target_is_reached() {
    let strategy = sample_strategy();
    let probe = Arc::new(probe_finding_creators(&strategy));
    let sink = Arc::new(RecordingSink::new());
    let config = DiscoveryConfig {
        target_pool_size: 3,
        ..config()
    };

    let report = discovery(config, &strategy, probe.clone(), sink.clone())
        .run(CancellationToken::new())
        .await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.rounds_run, 1);
    assert_eq!(report.candidates.len(), 3);
    assert_eq!(probe.call_count(), 3);
    assert_eq!(report.no_progress, None);
}

#[tokio::test(start_paused = true)]
async fn published_snapshots_never_shrink() {
    let strategy = sample_strategy();
    let probe = Arc::new(probe_finding_creators(&strategy));
    let sink = Arc::new(RecordingSink::new());
    let config = DiscoveryConfig {
        target_pool_size: 7,
        ..config()
    };

    let report = discovery(config, &strategy, probe, sink.clone())
        .run(CancellationToken::new())
        .await;

    let sizes: Vec<_> = sink.snapshots().iter().map(Vec::len).collect();
    assert!(sizes.windows(2).all(|w| w[0] <= w[1]), "sizes: {sizes:?}");
    assert_eq!(sizes.last().copied(), Some(report.candidates.len()));
    assert_eq!(sink.last().unwrap(), report.candidates);
}

#[tokio::test(start_paused = true)]
async fn runs_out_the_round_budget_when_nothing_turns_up() {
    let strategy = sample_strategy();
    let probe = Arc::new(MockProbe::new());
    let sink = Arc::new(RecordingSink::new());
    let config = DiscoveryConfig {
        max_rounds: 2,
        ..config()
    };

    let report = discovery(config, &strategy, probe.clone(), sink.clone())
        .run(CancellationToken::new())
        .await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.rounds_run, 2);
    assert_eq!(probe.call_count(), 6);
    assert!(report.candidates.is_empty());
    assert_eq!(report.no_progress, None);
    assert_eq!(sink.publish_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn exhausted_pools_end_the_run() {
    let strategy = StrategyMatrix {
        core_tags: vec!["curator one".to_string()],
        lifestyle_tags: vec!["slowliving".to_string()],
        visual_actions: vec!["pouring coffee".to_string()],
        aesthetic_keywords: vec!["minimalist".to_string()],
        search_queries: Vec::new(),
    };
    let probe = Arc::new(MockProbe::new());
    let sink = Arc::new(RecordingSink::new());

    let report = discovery(config(), &strategy, probe.clone(), sink)
        .run(CancellationToken::new())
        .await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.rounds_run, 2);
    assert_eq!(probe.call_count(), 4);
    assert_eq!(report.no_progress, Some(NoProgress::SchedulerExhausted));

    let mut queries = probe.queries();
    queries.sort();
    assert_eq!(queries, vec!["curator one", "minimalist", "pouring coffee", "slowliving"]);
}

#[tokio::test(start_paused = true)]
async fn round_where_every_submit_fails_is_flagged() {
    let strategy = sample_strategy();
    let probe = Arc::new(MockProbe::new().otherwise_fail(MockFailure::Submit));
    let sink = Arc::new(RecordingSink::new());
    let config = DiscoveryConfig {
        max_rounds: 1,
        ..config()
    };

    let report = discovery(config, &strategy, probe, sink)
        .run(CancellationToken::new())
        .await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.probes_failed, 3);
    assert_eq!(report.no_progress, Some(NoProgress::AllSubmitsFailed));
}

#[tokio::test(start_paused = true)]
async fn quota_failure_halts_planning_and_keeps_results() {
    let strategy = sample_strategy();
    let mut preview = QueryScheduler::seeded(strategy.query_pools(), 3, SEED);
    let first_round = preview.plan_round();
    let probe = first_round.iter().fold(
        MockProbe::new().otherwise_fail(MockFailure::HardLimit),
        |probe, task| probe.on_query(&task.query, vec![creator_for(&task.query)]),
    );
    let probe = Arc::new(probe);
    let sink = Arc::new(RecordingSink::new());

    let report = discovery(config(), &strategy, probe.clone(), sink.clone())
        .run(CancellationToken::new())
        .await;

    assert_eq!(report.outcome, RunOutcome::FatallyStopped);
    assert_eq!(report.rounds_run, 2);
    assert!(report.probes_failed >= 1);
    // Round two stops at its first chunk; round three is never planned.
    assert!(probe.call_count() <= 5, "calls: {}", probe.call_count());
    assert_eq!(report.candidates.len(), 3);
    assert_eq!(sink.last().map(|s| s.len()), Some(3));
}

#[tokio::test(start_paused = true)]
async fn remote_failures_and_timeouts_stay_local_to_their_task() {
    let strategy = sample_strategy();
    let mut preview = QueryScheduler::seeded(strategy.query_pools(), 3, SEED);
    let first_round = preview.plan_round();
    let probe = probe_finding_creators(&strategy)
        .failing(&first_round[0].query, MockFailure::Remote)
        .failing(&first_round[1].query, MockFailure::Timeout)
        .with_latency(Duration::from_secs(3));
    let probe = Arc::new(probe);
    let sink = Arc::new(RecordingSink::new());
    let config = DiscoveryConfig {
        target_pool_size: 4,
        ..config()
    };

    let report = discovery(config, &strategy, probe.clone(), sink)
        .run(CancellationToken::new())
        .await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.rounds_run, 2);
    assert_eq!(report.probes_failed, 2);
    assert_eq!(report.no_progress, None);
    assert_eq!(report.candidates.len(), 4);
    // The second chunk of the failing round still ran.
    assert!(probe.queries().contains(&first_round[2].query));
    let identities: Vec<_> = report.candidates.iter().map(|c| c.identity.as_str()).collect();
    assert!(!identities.contains(&first_round[0].query.replace(' ', "_").as_str()));
}

// =============================================================================
// Timing and cancellation
// =============================================================================

#[tokio::test(start_paused = true)]
async fn limits_are_read_before_the_first_round() {
    let strategy = sample_strategy();
    let limits = LimitsSummary {
        max_monthly_usage_usd: Some(49.0),
        monthly_usage_usd: Some(3.2),
        ..LimitsSummary::default()
    };
    let probe = Arc::new(probe_finding_creators(&strategy).with_limits(limits));
    let sink = Arc::new(RecordingSink::new());
    let config = DiscoveryConfig {
        target_pool_size: 3,
        ..config()
    };
    let started = Instant::now();

    let report = discovery(config, &strategy, probe, sink)
        .run(CancellationToken::new())
        .await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.candidates.len(), 3);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn unanswered_limits_lookup_is_abandoned() {
    let strategy = sample_strategy();
    let probe = Arc::new(probe_finding_creators(&strategy).hanging_limits());
    let sink = Arc::new(RecordingSink::new());
    let config = DiscoveryConfig {
        target_pool_size: 3,
        limits_timeout: Duration::from_secs(10),
        ..config()
    };
    let started = Instant::now();

    let report = discovery(config, &strategy, probe.clone(), sink)
        .run(CancellationToken::new())
        .await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.rounds_run, 1);
    assert_eq!(probe.call_count(), 3);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(10), "elapsed: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(11), "elapsed: {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn cancel_during_limits_lookup_skips_every_round() {
    let strategy = sample_strategy();
    let probe = Arc::new(MockProbe::new().hanging_limits());
    let run = discovery(config(), &strategy, probe.clone(), Arc::new(RecordingSink::new()));
    let cancel = CancellationToken::new();

    let (report, _) = tokio::join!(run.run(cancel.clone()), async {
        tokio::time::sleep(Duration::from_secs(2)).await;
        cancel.cancel();
    });

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert_eq!(report.rounds_run, 0);
    assert_eq!(probe.call_count(), 0);
}


#[tokio::test(start_paused = true)]
async fn cooldown_runs_between_rounds_but_not_after_the_last() {
    let strategy = sample_strategy();
    let probe = Arc::new(MockProbe::new());
    let sink = Arc::new(RecordingSink::new());
    let config = DiscoveryConfig {
        max_rounds: 2,
        round_cooldown: Duration::from_millis(1500),
        ..config()
    };
    let started = Instant::now();

    discovery(config, &strategy, probe, sink)
        .run(CancellationToken::new())
        .await;

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(1500), "elapsed: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(3000), "elapsed: {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn cancelling_mid_round_stops_new_work() {
    let strategy = sample_strategy();
    let probe = Arc::new(MockProbe::new().otherwise_hang());
    let sink = Arc::new(RecordingSink::new());
    let run = discovery(config(), &strategy, probe.clone(), sink);
    let mut phase = run.subscribe_phase();
    let cancel = CancellationToken::new();

    let (report, _) = tokio::join!(run.run(cancel.clone()), async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        cancel.cancel();
    });

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert_eq!(report.rounds_run, 1);
    assert_eq!(probe.call_count(), 2);
    assert_eq!(*phase.borrow_and_update(), RunPhase::Finished(RunOutcome::Cancelled));
}

#[tokio::test(start_paused = true)]
async fn cancelling_during_cooldown_ends_promptly() {
    let strategy = sample_strategy();
    let probe = Arc::new(MockProbe::new());
    let sink = Arc::new(RecordingSink::new());
    let config = DiscoveryConfig {
        round_cooldown: Duration::from_secs(60),
        ..config()
    };
    let run = discovery(config, &strategy, probe.clone(), sink);
    let cancel = CancellationToken::new();
    let started = Instant::now();

    let (report, _) = tokio::join!(run.run(cancel.clone()), async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        cancel.cancel();
    });

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert_eq!(report.rounds_run, 1);
    assert_eq!(probe.call_count(), 3);
    assert!(started.elapsed() < Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn cancel_aborts_every_job_in_flight() {
    let strategy = sample_strategy();
    let config = config();
    let service = Arc::new(MockJobService::new().with_statuses(&["RUNNING"]));
    let probe = Arc::new(ApifyProbe::new(TaskRunner::new(service.clone()), &config));
    let scheduler = QueryScheduler::seeded(strategy.query_pools(), config.slots_per_round, SEED);
    let run = DiscoveryRun::new(config, &strategy, probe, Arc::new(RecordingSink::new()))
        .with_scheduler(scheduler);
    let cancel = CancellationToken::new();
    let started = Instant::now();

    let (report, _) = tokio::join!(run.run(cancel.clone()), async {
        tokio::time::sleep(Duration::from_secs(10)).await;
        cancel.cancel();
    });

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert_eq!(service.submit_count(), 2);
    assert_eq!(service.abort_count(), service.submit_count());
    // Within one poll interval of the cancel.
    assert!(started.elapsed() < Duration::from_secs(12));
}

// =============================================================================
// Auditing
// =============================================================================

#[tokio::test(start_paused = true)]
async fn audits_are_capped_and_attached_to_candidates() {
    let strategy = sample_strategy();
    let pools = strategy.query_pools();
    // Empty bios make every candidate audit-worthy.
    let probe = pools
        .action
        .iter()
        .chain(&pools.aesthetic)
        .chain(&pools.identity)
        .chain(&pools.fallback)
        .fold(MockProbe::new(), |probe, term| {
            probe.on_query(term, vec![post(&term.replace(' ', "_"), 5000, "", "minimalist morning")])
        });
    let verdict = json!({
        "account_type": "creator",
        "is_creator_account": true,
        "confidence": 0.9,
        "aesthetic_match_score": 80
    });
    let generator = Arc::new(ScriptedGenerator::new(vec![verdict; 5]));
    let sink = Arc::new(RecordingSink::new());
    let config = DiscoveryConfig {
        target_pool_size: 3,
        max_audits: 2,
        ..config()
    };
    let auditor = Auditor::new(
        generator.clone(),
        strategy.aesthetic_keywords.clone(),
        config.audit_timeout,
    );

    let report = discovery(config, &strategy, Arc::new(probe), sink)
        .with_auditor(auditor)
        .run(CancellationToken::new())
        .await;

    assert_eq!(report.audits_started, 2);
    assert_eq!(generator.prompts().len(), 2);
    let audited: Vec<_> = report.candidates.iter().filter_map(|c| c.audit.as_ref()).collect();
    assert_eq!(audited.len(), 2);
    assert!(audited.iter().all(|v| v.account_type == "creator"));
}

#[tokio::test(start_paused = true)]
async fn cancel_drops_an_audit_in_flight() {
    let strategy = sample_strategy();
    let mut preview = QueryScheduler::seeded(strategy.query_pools(), 3, SEED);
    let first_round = preview.plan_round();
    // An empty bio makes the first creator audit-worthy; its chunk partner
    // holds the round open until the cancel.
    let probe = MockProbe::new()
        .on_query(
            &first_round[0].query,
            vec![post("quiet.rooms", 5000, "", "minimalist morning")],
        )
        .hanging(&first_round[1].query);
    let generator = Arc::new(
        ScriptedGenerator::new(vec![json!({ "account_type": "creator" })])
            .with_latency(Duration::from_secs(30)),
    );
    let config = DiscoveryConfig {
        max_audits: 3,
        ..config()
    };
    let auditor = Auditor::new(
        generator.clone(),
        strategy.aesthetic_keywords.clone(),
        config.audit_timeout,
    );
    let run = discovery(config, &strategy, Arc::new(probe), Arc::new(RecordingSink::new()))
        .with_auditor(auditor);
    let cancel = CancellationToken::new();
    let started = Instant::now();

    let (report, _) = tokio::join!(run.run(cancel.clone()), async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        cancel.cancel();
    });

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert_eq!(report.audits_started, 1);
    assert_eq!(generator.prompts().len(), 1);
    assert_eq!(report.candidates.len(), 1);
    assert!(report.candidates[0].audit.is_none());
    assert!(started.elapsed() < Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn phase_moves_from_idle_to_finished() {
    let strategy = sample_strategy();
    let probe = Arc::new(probe_finding_creators(&strategy));
    let sink = Arc::new(RecordingSink::new());
    let run = discovery(
        DiscoveryConfig {
            target_pool_size: 1,
            ..config()
        },
        &strategy,
        probe,
        sink,
    );
    let phase = run.subscribe_phase();
    assert_eq!(*phase.borrow(), RunPhase::Idle);

    let report = run.run(CancellationToken::new()).await;

    assert_eq!(*phase.borrow(), RunPhase::Finished(report.outcome));
}
