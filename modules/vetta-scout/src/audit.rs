//! Optional AI audit of borderline candidates.
//!
//! High-scoring accounts that still look like a business (commercial flag,
//! booking/menu language in the profile, or no bio at all) get a second
//! opinion from the model. At most one audit runs at a time and a run spends
//! a fixed number of audits.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ai_client::{truncate_to_char_boundary, AiError, JsonGenerator};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::ingest::{Candidate, IngestionEngine};

const BUSINESS_HINTS: &[&str] = &[
    "menu",
    "reservation",
    "book",
    "booking",
    "address",
    "hours",
    "open",
    "whatsapp",
    "order",
    "delivery",
    "happy hour",
    "dm to order",
];

const MAX_LISTED: usize = 3;

/// Prompt limits, in bytes.
const BIO_PROMPT_LIMIT: usize = 600;
const CAPTION_PROMPT_LIMIT: usize = 280;

// =============================================================================
// Verdict
// =============================================================================

/// Shape the model is asked to return.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct AuditResponse {
    /// One of: creator, business, brand, community, other.
    #[serde(default)]
    pub account_type: Option<String>,
    #[serde(default)]
    pub is_creator_account: bool,
    /// 0.0 to 1.0.
    #[serde(default)]
    pub confidence: Option<f64>,
    /// 0 to 100.
    #[serde(default)]
    pub aesthetic_match_score: Option<f64>,
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default)]
    pub evidence: AuditEvidence,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct AuditEvidence {
    #[serde(default)]
    pub business_signals: Vec<String>,
    #[serde(default)]
    pub creator_signals: Vec<String>,
    #[serde(default)]
    pub mismatch_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditVerdict {
    pub account_type: String,
    pub is_creator_account: bool,
    pub confidence: Option<f64>,
    pub aesthetic_match_score: Option<f64>,
    pub reasons: Vec<String>,
    pub business_signals: Vec<String>,
    pub creator_signals: Vec<String>,
    pub mismatch_reason: Option<String>,
    /// "Aesthetic 82% • Conf 90% • Type creator • Evidence: ..."
    pub summary: String,
}

impl AuditVerdict {
    pub fn from_response(response: AuditResponse) -> Self {
        let account_type = response
            .account_type
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "other".to_string());
        let reasons = first_nonempty(response.reasons);
        let business_signals = first_nonempty(response.evidence.business_signals);
        let creator_signals = first_nonempty(response.evidence.creator_signals);
        let mismatch_reason = response
            .evidence
            .mismatch_reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        let mut parts = Vec::new();
        if let Some(score) = response.aesthetic_match_score {
            parts.push(format!("Aesthetic {}%", score.round() as i64));
        }
        if let Some(confidence) = response.confidence {
            parts.push(format!("Conf {}%", (confidence * 100.0).round() as i64));
        }
        parts.push(format!("Type {account_type}"));
        let evidence = business_signals
            .first()
            .or(creator_signals.first())
            .or(mismatch_reason.as_ref());
        if let Some(evidence) = evidence {
            parts.push(format!("Evidence: {evidence}"));
        }

        Self {
            account_type,
            is_creator_account: response.is_creator_account,
            confidence: response.confidence,
            aesthetic_match_score: response.aesthetic_match_score,
            reasons,
            business_signals,
            creator_signals,
            mismatch_reason,
            summary: parts.join(" • "),
        }
    }
}

fn first_nonempty(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .take(MAX_LISTED)
        .collect()
}

// =============================================================================
// Selection
// =============================================================================

pub fn has_business_hint(text: &str) -> bool {
    let text = text.to_lowercase();
    BUSINESS_HINTS.iter().any(|hint| text.contains(hint))
}

/// Worth a model call: strong score, not yet audited, and something about
/// the profile says "business".
pub fn needs_audit(candidate: &Candidate, min_score: u8) -> bool {
    if candidate.audit.is_some() || candidate.score < min_score {
        return false;
    }
    let profile_text = format!(
        "{} {} {} {}",
        candidate.identity,
        candidate.display_name,
        candidate.bio,
        candidate.sample_captions.join(" ")
    );
    candidate.commercial || candidate.bio.trim().is_empty() || has_business_hint(&profile_text)
}

// =============================================================================
// Auditor
// =============================================================================

pub struct Auditor {
    generator: Arc<dyn JsonGenerator>,
    aesthetic_keywords: Vec<String>,
    timeout: Duration,
}

impl Auditor {
    pub fn new(generator: Arc<dyn JsonGenerator>, aesthetic_keywords: Vec<String>, timeout: Duration) -> Self {
        Self {
            generator,
            aesthetic_keywords,
            timeout,
        }
    }

    pub async fn audit(&self, candidate: &Candidate) -> Result<AuditVerdict, AiError> {
        let prompt = self.prompt(candidate);
        let value = self.generator.generate_json(&prompt, self.timeout).await?;
        let response: AuditResponse = serde_json::from_value(value)?;
        Ok(AuditVerdict::from_response(response))
    }

    fn prompt(&self, candidate: &Candidate) -> String {
        let schema = schemars::schema_for!(AuditResponse);
        let schema_json = serde_json::to_string_pretty(&schema).unwrap_or_default();
        let captions = if candidate.sample_captions.is_empty() {
            "(none)".to_string()
        } else {
            candidate
                .sample_captions
                .iter()
                .map(|c| truncate_to_char_boundary(c, CAPTION_PROMPT_LIMIT))
                .collect::<Vec<_>>()
                .join("\n- ")
        };
        let bio = truncate_to_char_boundary(&candidate.bio, BIO_PROMPT_LIMIT);
        format!(
            "You audit Instagram accounts for a creator sourcing team.\n\
             Decide whether this account is an individual creator or a business, brand, \
             venue or reseller, and how well it matches the target aesthetic.\n\n\
             Target aesthetic keywords: {keywords}\n\n\
             Account: @{identity}\n\
             Name: {name}\n\
             Followers: {followers}\n\
             Bio: {bio}\n\
             Recent captions:\n- {captions}\n\n\
             Respond with JSON only, matching this schema:\n{schema_json}",
            keywords = self.aesthetic_keywords.join(", "),
            identity = candidate.identity,
            name = candidate.display_name,
            followers = candidate.follower_count,
            bio = if bio.is_empty() { "(empty)" } else { bio },
        )
    }
}

// =============================================================================
// AuditPump
// =============================================================================

#[derive(Default)]
struct PumpState {
    started: usize,
    attempted: HashSet<String>,
    worker: Option<JoinHandle<()>>,
}

/// Drains the audit queue in the background, one candidate at a time,
/// highest score first.
pub(crate) struct AuditPump {
    auditor: Arc<Auditor>,
    engine: Arc<IngestionEngine>,
    max_audits: usize,
    min_score: u8,
    cancel: CancellationToken,
    state: Mutex<PumpState>,
}

impl AuditPump {
    pub fn new(
        auditor: Arc<Auditor>,
        engine: Arc<IngestionEngine>,
        max_audits: usize,
        min_score: u8,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            auditor,
            engine,
            max_audits,
            min_score,
            cancel,
            state: Mutex::new(PumpState::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PumpState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start a worker unless one is already running or the budget is spent.
    pub fn kick(self: &Arc<Self>) {
        let mut state = self.lock();
        if state.started >= self.max_audits {
            return;
        }
        if state.worker.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let pump = Arc::clone(self);
        state.worker = Some(tokio::spawn(async move { pump.drain().await }));
    }

    /// Wait for outstanding audits. On cancellation the worker is dropped
    /// instead.
    pub async fn finish(self: &Arc<Self>) {
        let worker = self.lock().worker.take();
        if self.cancel.is_cancelled() {
            if let Some(worker) = worker {
                worker.abort();
            }
            return;
        }
        if let Some(worker) = worker {
            let _ = worker.await;
        }
        // Candidates that arrived while the last worker was winding down.
        Arc::clone(self).drain().await;
    }

    pub fn audits_started(&self) -> usize {
        self.lock().started
    }

    fn claim_next(&self) -> Option<Candidate> {
        let mut state = self.lock();
        if state.started >= self.max_audits {
            return None;
        }
        let next = self
            .engine
            .ranked()
            .into_iter()
            .find(|c| !state.attempted.contains(&c.identity) && needs_audit(c, self.min_score))?;
        state.attempted.insert(next.identity.clone());
        state.started += 1;
        Some(next)
    }

    async fn drain(self: Arc<Self>) {
        while let Some(candidate) = self.claim_next() {
            let result = tokio::select! {
                _ = self.cancel.cancelled() => return,
                result = self.auditor.audit(&candidate) => result,
            };
            match result {
                Ok(verdict) => {
                    info!(
                        identity = candidate.identity.as_str(),
                        account_type = verdict.account_type.as_str(),
                        summary = verdict.summary.as_str(),
                        "AI audit complete"
                    );
                    self.engine.attach_audit(&candidate.identity, verdict);
                }
                Err(e) => {
                    warn!(identity = candidate.identity.as_str(), error = %e, "AI audit failed");
                }
            }
        }
    }
}
