use std::env;
use std::str::FromStr;
use std::time::Duration;

use ai_client::{Gemini, DEFAULT_MODEL};
use apify_client::{ApifyClient, TaskPolicy};
use tracing::info;
use typed_builder::TypedBuilder;

use crate::error::{DiscoveryError, Result};

/// Knobs for one discovery run.
#[derive(Debug, Clone, TypedBuilder)]
pub struct DiscoveryConfig {
    /// Stop once the pool holds this many candidates.
    #[builder(default = 5)]
    pub target_pool_size: usize,
    #[builder(default = 8)]
    pub max_rounds: u32,
    #[builder(default = 3)]
    pub slots_per_round: usize,
    /// Probes in flight at once.
    #[builder(default = 2)]
    pub concurrency: usize,
    #[builder(default = 1000)]
    pub min_followers: u64,
    /// Suppress weak commercial and off-topic candidates.
    #[builder(default = true)]
    pub creator_only: bool,
    /// Upper bound of the random delay before each probe.
    #[builder(default = Duration::from_millis(1000))]
    pub max_jitter: Duration,
    #[builder(default = Duration::from_millis(1500))]
    pub round_cooldown: Duration,
    #[builder(default = 12)]
    pub hashtag_results_limit: u32,
    #[builder(default = 10)]
    pub user_search_limit: u32,
    #[builder(default = 5)]
    pub hashtag_hint_limit: u32,
    /// AI audits per run. Zero disables auditing.
    #[builder(default = 8)]
    pub max_audits: usize,
    #[builder(default = 65)]
    pub audit_min_score: u8,
    #[builder(default = Duration::from_secs(35))]
    pub audit_timeout: Duration,
    #[builder(default = Duration::from_secs(60))]
    pub strategy_timeout: Duration,
    /// Cap on the best-effort usage limits lookup before round one.
    #[builder(default = Duration::from_secs(10))]
    pub limits_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl DiscoveryConfig {
    /// Defaults overridden by `DISCOVERY_*` variables where set.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            target_pool_size: env_or("DISCOVERY_TARGET", defaults.target_pool_size)?,
            max_rounds: env_or("DISCOVERY_MAX_ROUNDS", defaults.max_rounds)?,
            min_followers: env_or("DISCOVERY_MIN_FOLLOWERS", defaults.min_followers)?,
            creator_only: env_or("DISCOVERY_CREATOR_ONLY", defaults.creator_only)?,
            max_audits: env_or("DISCOVERY_MAX_AUDITS", defaults.max_audits)?,
            ..defaults
        })
    }

    pub fn log(&self) {
        info!(
            target_pool_size = self.target_pool_size,
            max_rounds = self.max_rounds,
            concurrency = self.concurrency,
            min_followers = self.min_followers,
            creator_only = self.creator_only,
            max_audits = self.max_audits,
            "Discovery config"
        );
    }
}

/// Credentials and endpoints for the remote services.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub apify_token: String,
    pub apify_base_url: Option<String>,
    /// Optional: without it strategy generation and audits are unavailable.
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: Option<String>,
    pub task_policy: TaskPolicy,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            apify_token: required_env("APIFY_TOKEN")?,
            apify_base_url: optional_env("APIFY_BASE_URL"),
            gemini_api_key: optional_env("GEMINI_API_KEY"),
            gemini_model: optional_env("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            gemini_base_url: optional_env("GEMINI_BASE_URL"),
            task_policy: TaskPolicy::default(),
        })
    }

    pub fn apify_client(&self) -> ApifyClient {
        let client = ApifyClient::new(self.apify_token.clone());
        match &self.apify_base_url {
            Some(url) => client.with_base_url(url),
            None => client,
        }
    }

    pub fn gemini(&self) -> Option<Gemini> {
        let key = self.gemini_api_key.as_ref()?;
        let gemini = Gemini::new(key.clone(), self.gemini_model.clone());
        Some(match &self.gemini_base_url {
            Some(url) => gemini.with_base_url(url),
            None => gemini,
        })
    }

    /// Log the config with secrets masked.
    pub fn log_redacted(&self) {
        info!(
            apify_token = redact(&self.apify_token).as_str(),
            apify_base_url = self.apify_base_url.as_deref().unwrap_or("default"),
            gemini_api_key = self.gemini_api_key.as_deref().map(redact).as_deref().unwrap_or("unset"),
            gemini_model = self.gemini_model.as_str(),
            "Service config"
        );
    }
}

fn redact(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    if secret.chars().count() <= 8 {
        "****".to_string()
    } else {
        format!("{visible}****")
    }
}

fn required_env(key: &str) -> Result<String> {
    optional_env(key)
        .ok_or_else(|| DiscoveryError::Config(format!("{key} environment variable is required")))
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match optional_env(key) {
        Some(raw) => raw.parse().map_err(|_| DiscoveryError::InvalidEnv {
            key: key.to_string(),
            value: raw,
        }),
        None => Ok(default),
    }
}
