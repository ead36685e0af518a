use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::audit::AuditVerdict;
use crate::query::{Dimension, QueryTask};
use crate::record::RawRecord;
use crate::scoring::{
    is_commercial, tokenize_query, MatchSignal, ScoreInput, ScoringPolicy, SuppressionReason,
};
use crate::sink::CandidateSink;

/// One discovered account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    /// Lowercased handle, unique within a run.
    pub identity: String,
    pub display_name: String,
    pub follower_count: u64,
    pub avatar_url: Option<String>,
    pub verified: bool,
    pub score: u8,
    pub commercial: bool,
    pub match_dimension: Dimension,
    /// The query that surfaced this account.
    pub match_reason: String,
    pub match_signals: Vec<MatchSignal>,
    pub bio: String,
    pub sample_captions: Vec<String>,
    pub audit: Option<AuditVerdict>,
}

impl Candidate {
    pub fn profile_url(&self) -> String {
        format!("https://www.instagram.com/{}/", self.identity)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SuppressionCounts {
    pub commercial: u32,
    pub off_topic: u32,
}

impl SuppressionCounts {
    pub fn total(&self) -> u32 {
        self.commercial + self.off_topic
    }

    fn record(&mut self, reason: SuppressionReason) {
        match reason {
            SuppressionReason::Commercial => self.commercial += 1,
            SuppressionReason::OffTopic => self.off_topic += 1,
        }
    }
}

/// Per-batch ingestion tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub added: usize,
    pub duplicates: usize,
    pub suppressed: usize,
    /// Error rows and rows without a usable identity.
    pub skipped: usize,
}

// =============================================================================
// RunState
// =============================================================================

/// Candidate pool for one run, keyed by identity. Insertion order is kept so
/// that equal scores rank by arrival.
#[derive(Debug, Default)]
pub struct RunState {
    candidates: Vec<Candidate>,
    index: HashMap<String, usize>,
    suppressed: SuppressionCounts,
    last_published: usize,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.index.contains_key(identity)
    }

    pub fn get(&self, identity: &str) -> Option<&Candidate> {
        self.index.get(identity).map(|&i| &self.candidates[i])
    }

    pub fn suppressed(&self) -> SuppressionCounts {
        self.suppressed
    }

    /// Score a batch of raw records and add the ones that survive. Identities
    /// already in the pool are dropped without rescoring.
    pub fn ingest(&mut self, records: &[Value], task: &QueryTask, policy: &ScoringPolicy) -> IngestStats {
        let mut stats = IngestStats::default();
        let query_tokens = tokenize_query(&task.query);

        for item in records {
            let record = RawRecord::new(item);
            if record.is_error() {
                stats.skipped += 1;
                continue;
            }
            let Some(identity) = record.identity() else {
                stats.skipped += 1;
                continue;
            };
            if self.index.contains_key(&identity) {
                stats.duplicates += 1;
                continue;
            }

            let bio = record.bio();
            let commercial = is_commercial(&identity, &bio);
            let display_name = record.display_name().unwrap_or_else(|| identity.clone());
            let caption = record.caption();
            let hashtags = record.hashtags();
            let follower_count = record.follower_count();

            let context_text = [
                identity.as_str(),
                display_name.as_str(),
                bio.as_str(),
                caption.as_str(),
                hashtags.as_str(),
            ]
                .iter()
                .filter(|part| !part.is_empty())
                .copied()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase();

            let score = policy.score(&ScoreInput {
                context_text: &context_text,
                follower_count,
                commercial,
                query_tokens: &query_tokens,
            });

            if let Some(reason) = policy.suppression(&score, commercial) {
                debug!(identity = identity.as_str(), score = score.value, ?reason, "Candidate suppressed");
                self.suppressed.record(reason);
                stats.suppressed += 1;
                continue;
            }

            let sample_captions = if caption.is_empty() { Vec::new() } else { vec![caption] };
            let candidate = Candidate {
                identity: identity.clone(),
                display_name,
                follower_count,
                avatar_url: record.avatar_url(),
                verified: record.verified(),
                score: score.value,
                commercial,
                match_dimension: task.dimension,
                match_reason: task.query.clone(),
                match_signals: score.signals,
                bio,
                sample_captions,
                audit: None,
            };
            self.index.insert(identity, self.candidates.len());
            self.candidates.push(candidate);
            stats.added += 1;
        }

        stats
    }

    /// Ranked copy of the pool: score descending, ties in arrival order.
    pub fn ranked(&self) -> Vec<Candidate> {
        let mut snapshot = self.candidates.clone();
        snapshot.sort_by(|a, b| b.score.cmp(&a.score));
        snapshot
    }

    /// Ranked snapshot if the pool grew since the last one handed out.
    pub fn take_growth(&mut self) -> Option<Vec<Candidate>> {
        if self.candidates.len() > self.last_published {
            self.last_published = self.candidates.len();
            Some(self.ranked())
        } else {
            None
        }
    }

    pub fn attach_audit(&mut self, identity: &str, verdict: AuditVerdict) -> bool {
        match self.index.get(identity) {
            Some(&i) => {
                self.candidates[i].audit = Some(verdict);
                true
            }
            None => false,
        }
    }
}

// =============================================================================
// IngestionEngine
// =============================================================================

/// Shared front for concurrent probes: serializes updates to the run state
/// and publishes a snapshot whenever the pool grows.
pub struct IngestionEngine {
    state: Mutex<RunState>,
    policy: ScoringPolicy,
    sink: Arc<dyn CandidateSink>,
}

impl IngestionEngine {
    pub fn new(policy: ScoringPolicy, sink: Arc<dyn CandidateSink>) -> Self {
        Self {
            state: Mutex::new(RunState::new()),
            policy,
            sink,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Ingest one probe's records. Publishes when the pool grew.
    pub fn ingest(&self, records: &[Value], task: &QueryTask) -> IngestStats {
        let mut state = self.lock();
        let stats = state.ingest(records, task, &self.policy);
        if let Some(snapshot) = state.take_growth() {
            info!(
                query = task.query.as_str(),
                added = stats.added,
                pool = snapshot.len(),
                "Candidate pool grew"
            );
            self.sink.publish(&snapshot);
        }
        stats
    }

    /// Publish the current ranking unconditionally.
    pub fn publish_now(&self) -> Vec<Candidate> {
        let snapshot = self.lock().ranked();
        self.sink.publish(&snapshot);
        snapshot
    }

    pub fn ranked(&self) -> Vec<Candidate> {
        self.lock().ranked()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn suppressed(&self) -> SuppressionCounts {
        self.lock().suppressed()
    }

    /// Attach a verdict and republish so readers see it.
    pub fn attach_audit(&self, identity: &str, verdict: AuditVerdict) {
        let snapshot = {
            let mut state = self.lock();
            if !state.attach_audit(identity, verdict) {
                return;
            }
            state.ranked()
        };
        self.sink.publish(&snapshot);
    }
}
