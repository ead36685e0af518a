// Test doubles for the discovery engine.
//
// Three mocks matching the three trait boundaries:
// - MockProbe (ProbeExecutor): query -> scripted records, failures, or hangs
// - ScriptedGenerator (JsonGenerator): queued JSON responses, records prompts
// - RecordingSink (CandidateSink): keeps every published snapshot
//
// Plus builders for raw scraper records and a ready-made strategy matrix.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use ai_client::{AiError, JsonGenerator};
use apify_client::{ApifyError, LimitsSummary, TaskError};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::ingest::Candidate;
use crate::probe::ProbeExecutor;
use crate::query::QueryTask;
use crate::sink::CandidateSink;
use crate::strategy::StrategyMatrix;

// ---------------------------------------------------------------------------
// MockProbe
// ---------------------------------------------------------------------------

/// Failure a scripted probe returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Submission rejected by the monthly usage hard limit.
    HardLimit,
    /// Submission rejected for an ordinary reason.
    Submit,
    /// The remote job ended FAILED.
    Remote,
    Timeout,
}

impl MockFailure {
    fn to_error(self) -> TaskError {
        match self {
            MockFailure::HardLimit => TaskError::Submit(ApifyError::Api {
                status: 403,
                message: "By launching this job you will exceed the monthly usage hard limit"
                    .to_string(),
            }),
            MockFailure::Submit => TaskError::Submit(ApifyError::Api {
                status: 400,
                message: "invalid input".to_string(),
            }),
            MockFailure::Remote => TaskError::RemoteFailure {
                status: "FAILED".to_string(),
            },
            MockFailure::Timeout => TaskError::Timeout {
                waited: Duration::from_secs(60),
            },
        }
    }
}

#[derive(Debug, Clone)]
enum ProbeScript {
    Items(Vec<Value>),
    Fail(MockFailure),
    /// Never finishes on its own; resolves as cancelled.
    Hang,
}

/// Query-keyed probe. Unregistered queries return the default script
/// (no records unless `.otherwise()` says differently).
pub struct MockProbe {
    scripts: HashMap<String, ProbeScript>,
    default: ProbeScript,
    latency: Duration,
    limits: Option<LimitsSummary>,
    limits_hang: bool,
    calls: Mutex<Vec<QueryTask>>,
}

impl Default for MockProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProbe {
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            default: ProbeScript::Items(Vec::new()),
            latency: Duration::ZERO,
            limits: None,
            limits_hang: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn on_query(mut self, query: &str, records: Vec<Value>) -> Self {
        self.scripts.insert(query.to_lowercase(), ProbeScript::Items(records));
        self
    }

    pub fn failing(mut self, query: &str, failure: MockFailure) -> Self {
        self.scripts.insert(query.to_lowercase(), ProbeScript::Fail(failure));
        self
    }

    pub fn hanging(mut self, query: &str) -> Self {
        self.scripts.insert(query.to_lowercase(), ProbeScript::Hang);
        self
    }

    /// Script for every query not registered explicitly.
    pub fn otherwise_fail(mut self, failure: MockFailure) -> Self {
        self.default = ProbeScript::Fail(failure);
        self
    }

    pub fn otherwise_hang(mut self) -> Self {
        self.default = ProbeScript::Hang;
        self
    }

    /// Simulated remote time per probe.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_limits(mut self, limits: LimitsSummary) -> Self {
        self.limits = Some(limits);
        self
    }

    /// The limits lookup never answers.
    pub fn hanging_limits(mut self) -> Self {
        self.limits_hang = true;
        self
    }

    pub fn calls(&self) -> Vec<QueryTask> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn queries(&self) -> Vec<String> {
        self.calls().into_iter().map(|t| t.query).collect()
    }
}

#[async_trait]
impl ProbeExecutor for MockProbe {
    async fn probe(&self, task: &QueryTask, cancel: &CancellationToken) -> Result<Vec<Value>, TaskError> {
        self.calls.lock().unwrap().push(task.clone());
        let script = self
            .scripts
            .get(&task.query.to_lowercase())
            .cloned()
            .unwrap_or_else(|| self.default.clone());

        if !self.latency.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(TaskError::Cancelled),
                _ = tokio::time::sleep(self.latency) => {}
            }
        }

        match script {
            ProbeScript::Items(records) => Ok(records),
            ProbeScript::Fail(failure) => Err(failure.to_error()),
            ProbeScript::Hang => {
                cancel.cancelled().await;
                Err(TaskError::Cancelled)
            }
        }
    }

    async fn limits(&self) -> Option<LimitsSummary> {
        if self.limits_hang {
            return std::future::pending().await;
        }
        self.limits.clone()
    }
}

// ---------------------------------------------------------------------------
// ScriptedGenerator
// ---------------------------------------------------------------------------

/// Hands out queued JSON responses in order. Once the queue is empty every
/// call fails with `EmptyResponse`.
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<Value>>,
    prompts: Mutex<Vec<String>>,
    latency: Duration,
}

impl ScriptedGenerator {
    pub fn new(responses: Vec<Value>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
            latency: Duration::ZERO,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl JsonGenerator for ScriptedGenerator {
    async fn generate_json(&self, prompt: &str, _timeout: Duration) -> Result<Value, AiError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let next = self.responses.lock().unwrap().pop_front();
        next.ok_or(AiError::EmptyResponse)
    }
}

// ---------------------------------------------------------------------------
// RecordingSink
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingSink {
    snapshots: Mutex<Vec<Vec<Candidate>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> Vec<Vec<Candidate>> {
        self.snapshots.lock().unwrap().clone()
    }

    pub fn publish_count(&self) -> usize {
        self.snapshots.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<Vec<Candidate>> {
        self.snapshots.lock().unwrap().last().cloned()
    }
}

impl CandidateSink for RecordingSink {
    fn publish(&self, snapshot: &[Candidate]) {
        self.snapshots.lock().unwrap().push(snapshot.to_vec());
    }
}

// ---------------------------------------------------------------------------
// Record builders
// ---------------------------------------------------------------------------

/// A tag-page post with the author nested under `owner`.
pub fn post(owner: &str, followers: u64, bio: &str, caption: &str) -> Value {
    json!({
        "ownerUsername": owner,
        "caption": caption,
        "owner": {
            "username": owner,
            "fullName": owner.to_uppercase(),
            "biography": bio,
            "followersCount": followers,
            "profile_pic_url": format!("https://cdn.example.com/{owner}.jpg"),
        }
    })
}

/// A flat account-search hit.
pub fn profile(username: &str, full_name: &str, followers: u64, bio: &str) -> Value {
    json!({
        "username": username,
        "fullName": full_name,
        "biography": bio,
        "followersCount": followers,
        "isVerified": false,
    })
}

/// A strategy with eight terms in every list.
pub fn sample_strategy() -> StrategyMatrix {
    let terms = |prefix: &str| (1..=8).map(|i| format!("{prefix} {i}")).collect::<Vec<_>>();
    StrategyMatrix {
        core_tags: terms("curator"),
        lifestyle_tags: terms("slowliving"),
        visual_actions: terms("pouring coffee"),
        aesthetic_keywords: vec![
            "minimalist".to_string(),
            "muted tones".to_string(),
            "film grain".to_string(),
            "soft light".to_string(),
            "neutral palette".to_string(),
            "linen texture".to_string(),
        ],
        search_queries: terms("quiet interiors"),
    }
}
