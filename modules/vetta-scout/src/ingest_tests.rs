//! Ingestion and scoring through RunState and IngestionEngine.

use std::sync::Arc;

use serde_json::json;

use crate::audit::{AuditResponse, AuditVerdict};
use crate::ingest::{IngestionEngine, RunState};
use crate::query::{Dimension, QueryTask};
use crate::scoring::{tokenize_query, MatchSignal, ScoreInput, ScoringPolicy};
use crate::sink::WatchSink;
use crate::testing::{post, profile, RecordingSink};

fn policy(creator_only: bool) -> ScoringPolicy {
    ScoringPolicy::new(
        1000,
        creator_only,
        &["minimalist".to_string(), "film grain".to_string()],
        &["ceramicist".to_string()],
    )
}

fn task(query: &str) -> QueryTask {
    QueryTask::new(query, Dimension::Action)
}

// =============================================================================
// Scoring arithmetic
// =============================================================================

#[test]
fn low_follower_off_topic_record_scores_25_and_is_suppressed() {
    let policy = policy(true);
    let record = post("trailrunner_ana", 500, "weekend hiking photos", "long run today");

    let tokens = tokenize_query("pottery studio");
    let score = policy.score(&ScoreInput {
        context_text: "trailrunner_ana weekend hiking photos long run today",
        follower_count: 500,
        commercial: false,
        query_tokens: &tokens,
    });
    assert_eq!(score.value, 25);
    assert_eq!(score.signals, vec![MatchSignal::LowFollowers(500), MatchSignal::OffTopic]);

    let mut state = RunState::new();
    let stats = state.ingest(&[record], &task("pottery studio"), &policy);

    assert_eq!(stats.suppressed, 1);
    assert_eq!(stats.added, 0);
    assert_eq!(state.suppressed().off_topic, 1);
    assert_eq!(state.suppressed().commercial, 0);
    assert!(state.is_empty());
}

#[test]
fn off_topic_record_is_kept_when_creator_only_is_off() {
    let mut state = RunState::new();
    let record = post("trailrunner_ana", 500, "weekend hiking photos", "long run today");

    state.ingest(&[record], &task("pottery studio"), &policy(false));

    let kept = state.get("trailrunner_ana").unwrap();
    assert_eq!(kept.score, 25);
    assert_eq!(state.suppressed().total(), 0);
}

#[test]
fn commercial_account_at_fifty_is_kept() {
    let mut state = RunState::new();
    let record = profile("dealsdaily", "Deals Daily", 5000, "daily picks");

    let stats = state.ingest(&[record], &QueryTask::new("deals", Dimension::Identity), &policy(true));

    assert_eq!(stats.added, 1);
    let kept = state.get("dealsdaily").unwrap();
    assert_eq!(kept.score, 50);
    assert!(kept.commercial);
    assert_eq!(kept.match_signals, vec![MatchSignal::Commercial]);
}

#[test]
fn commercial_account_below_fifty_is_suppressed() {
    let mut state = RunState::new();
    // No follower data: 80 - 10 - 30 = 40.
    let record = profile("dealsdaily", "Deals Daily", 0, "daily picks");

    let stats = state.ingest(&[record], &QueryTask::new("deals", Dimension::Identity), &policy(true));

    assert_eq!(stats.suppressed, 1);
    assert_eq!(state.suppressed().commercial, 1);
    assert!(!state.contains("dealsdaily"));
}

#[test]
fn scores_are_clamped_to_bounds() {
    let mut state = RunState::new();
    let records = vec![
        // 80 + 15 + 10 = 105
        post("mira.clay", 4200, "ceramicist in lisbon", "minimalist glaze tests"),
        // 80 - 10 - 30 - 35 = 5
        post("bulkshop", 0, "", ""),
    ];

    state.ingest(&records, &task("pottery"), &policy(false));

    assert_eq!(state.get("mira.clay").unwrap().score, 99);
    assert_eq!(
        state.get("mira.clay").unwrap().match_signals,
        vec![MatchSignal::Aesthetic, MatchSignal::IdentityMatch]
    );
    assert_eq!(state.get("bulkshop").unwrap().score, 10);
}

// =============================================================================
// Pool bookkeeping
// =============================================================================

#[test]
fn duplicates_keep_the_first_sighting() {
    let mut state = RunState::new();
    let policy = policy(true);
    let first = post("mira.clay", 4200, "ceramicist in lisbon", "minimalist glaze tests");

    state.ingest(&[first], &task("glaze"), &policy);
    let before = state.get("mira.clay").unwrap().clone();
    assert_eq!(before.score, 99);

    // Would score 25 with low followers and no matching text.
    let weaker = post("Mira.Clay", 300, "travel diary", "airport snacks");
    let stats = state.ingest(&[weaker], &QueryTask::new("ceramics", Dimension::Identity), &policy);

    assert_eq!(stats.duplicates, 1);
    assert_eq!(stats.added, 0);
    assert_eq!(stats.suppressed, 0);
    assert_eq!(state.len(), 1);
    let kept = state.get("mira.clay").unwrap();
    assert_eq!(kept.score, before.score);
    assert_eq!(kept.match_signals, before.match_signals);
    assert_eq!(kept.follower_count, 4200);
    assert_eq!(kept.bio, "ceramicist in lisbon");
    assert_eq!(kept.match_reason, "glaze");
    assert_eq!(kept.match_dimension, Dimension::Action);
}

#[test]
fn tags_under_a_later_alias_count_as_on_topic() {
    let mut state = RunState::new();
    let record = json!({
        "ownerUsername": "quiet.rooms",
        "caption": "",
        "hashtags": [],
        "tags": ["Pottery", "Wheel"],
        "owner": { "username": "quiet.rooms", "followersCount": 2500 }
    });

    let stats = state.ingest(&[record], &task("pottery"), &policy(true));

    assert_eq!(stats.added, 1);
    let kept = state.get("quiet.rooms").unwrap();
    assert!(!kept.match_signals.contains(&MatchSignal::OffTopic));
    assert_eq!(state.suppressed().off_topic, 0);
}

#[test]
fn error_rows_and_missing_identities_are_skipped() {
    let mut state = RunState::new();
    let records = vec![
        json!({ "error": "not_found", "errorDescription": "Profile does not exist" }),
        json!({ "caption": "nobody wrote this" }),
        json!({ "username": "x" }),
        post("mira.clay", 4200, "ceramicist", ""),
    ];

    let stats = state.ingest(&records, &task("pottery"), &policy(true));

    assert_eq!(stats.skipped, 3);
    assert_eq!(stats.added, 1);
}

#[test]
fn candidate_carries_profile_fields() {
    let mut state = RunState::new();
    state.ingest(
        &[post("mira.clay", 4200, "Ceramicist in Lisbon", "Minimalist glaze tests")],
        &QueryTask::new("glaze tests", Dimension::Aesthetic),
        &policy(true),
    );

    let c = state.get("mira.clay").unwrap();
    assert_eq!(c.display_name, "MIRA.CLAY");
    assert_eq!(c.follower_count, 4200);
    assert_eq!(c.bio, "ceramicist in lisbon");
    assert_eq!(c.sample_captions, vec!["minimalist glaze tests".to_string()]);
    assert_eq!(c.avatar_url.as_deref(), Some("https://cdn.example.com/mira.clay.jpg"));
    assert_eq!(c.match_dimension, Dimension::Aesthetic);
    assert_eq!(c.profile_url(), "https://www.instagram.com/mira.clay/");
}

#[test]
fn ranking_is_score_descending_with_stable_ties() {
    let mut state = RunState::new();
    let records = vec![
        post("first.potter", 4200, "ceramicist", ""),
        post("second.potter", 4200, "ceramicist", ""),
        post("third.potter", 4200, "minimalist ceramicist", ""),
    ];

    state.ingest(&records, &task("pottery"), &policy(true));

    let order: Vec<_> = state.ranked().into_iter().map(|c| (c.identity, c.score)).collect();
    assert_eq!(
        order,
        vec![
            ("third.potter".to_string(), 99),
            ("first.potter".to_string(), 90),
            ("second.potter".to_string(), 90),
        ]
    );
}

// =============================================================================
// Publishing
// =============================================================================

#[test]
fn engine_publishes_only_when_the_pool_grows() {
    let sink = Arc::new(RecordingSink::new());
    let engine = IngestionEngine::new(policy(true), sink.clone());
    let batch = vec![post("mira.clay", 4200, "ceramicist", "")];

    engine.ingest(&batch, &task("pottery"));
    engine.ingest(&batch, &task("pottery"));
    engine.ingest(&[post("trailrunner_ana", 500, "hiking", "")], &task("pottery studio"));
    assert_eq!(sink.publish_count(), 1);

    engine.ingest(&[post("kiln.notes", 3000, "ceramicist", "")], &task("pottery"));
    let sizes: Vec<_> = sink.snapshots().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![1, 2]);
}

#[test]
fn attaching_an_audit_republishes() {
    let sink = Arc::new(RecordingSink::new());
    let engine = IngestionEngine::new(policy(true), sink.clone());
    engine.ingest(&[post("mira.clay", 4200, "ceramicist", "")], &task("pottery"));

    engine.attach_audit("nobody", AuditVerdict::from_response(AuditResponse::default()));
    assert_eq!(sink.publish_count(), 1);

    engine.attach_audit("mira.clay", AuditVerdict::from_response(AuditResponse::default()));
    assert_eq!(sink.publish_count(), 2);
    let last = sink.last().unwrap();
    assert_eq!(last[0].audit.as_ref().unwrap().account_type, "other");
}

#[test]
fn watch_sink_holds_the_latest_snapshot() {
    let (sink, rx) = WatchSink::channel();
    let engine = IngestionEngine::new(policy(true), Arc::new(sink));

    engine.ingest(&[post("mira.clay", 4200, "ceramicist", "")], &task("pottery"));
    engine.ingest(&[post("kiln.notes", 3000, "minimalist ceramicist", "")], &task("pottery"));

    let latest = rx.borrow().clone();
    assert_eq!(latest.len(), 2);
    assert_eq!(latest[0].identity, "kiln.notes");
}
