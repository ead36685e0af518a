use apify_client::{
    InstagramScraperInput, InstagramSearchInput, LimitsSummary, ProxyConfig, TaskError,
    TaskRunner, INSTAGRAM_SCRAPER, INSTAGRAM_SEARCH_SCRAPER,
};
use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::DiscoveryConfig;
use crate::query::{QueryTask, SearchMode};

/// Runs one query against the remote scrapers and returns raw records.
#[async_trait]
pub trait ProbeExecutor: Send + Sync {
    async fn probe(&self, task: &QueryTask, cancel: &CancellationToken) -> Result<Vec<Value>, TaskError>;

    /// Account limits, if the backend exposes them.
    async fn limits(&self) -> Option<LimitsSummary> {
        None
    }
}

// =============================================================================
// ApifyProbe
// =============================================================================

/// Content queries go to tag pages; identity queries go to account search.
/// Multi-word content queries are first resolved to a real hashtag.
pub struct ApifyProbe {
    runner: TaskRunner,
    hashtag_results_limit: u32,
    user_search_limit: u32,
    hashtag_hint_limit: u32,
}

impl ApifyProbe {
    pub fn new(runner: TaskRunner, config: &DiscoveryConfig) -> Self {
        Self {
            runner,
            hashtag_results_limit: config.hashtag_results_limit,
            user_search_limit: config.user_search_limit,
            hashtag_hint_limit: config.hashtag_hint_limit,
        }
    }

    async fn resolve_hashtag(&self, query: &str, cancel: &CancellationToken) -> Result<String, TaskError> {
        let fallback = compact(query).to_lowercase();
        if !query.contains(char::is_whitespace) {
            return Ok(fallback);
        }

        let input = search_input(query, "hashtag", self.hashtag_hint_limit);
        let hints = self
            .runner
            .run_task(INSTAGRAM_SEARCH_SCRAPER, &input, cancel)
            .await?;
        let tag = best_hashtag(&hints.items).unwrap_or(fallback);
        debug!(query, tag = tag.as_str(), "Resolved hashtag");
        Ok(tag)
    }
}

#[async_trait]
impl ProbeExecutor for ApifyProbe {
    async fn probe(&self, task: &QueryTask, cancel: &CancellationToken) -> Result<Vec<Value>, TaskError> {
        let query = normalize_query(&task.query);

        let output = match task.search_mode {
            SearchMode::ContentSearch => {
                let tag = self.resolve_hashtag(&query, cancel).await?;
                let input = hashtag_input(&tag, self.hashtag_results_limit);
                self.runner.run_task(INSTAGRAM_SCRAPER, &input, cancel).await?
            }
            SearchMode::IdentitySearch => {
                let input = search_input(&query, "user", self.user_search_limit);
                self.runner
                    .run_task(INSTAGRAM_SEARCH_SCRAPER, &input, cancel)
                    .await?
            }
        };

        info!(
            query = task.query.as_str(),
            dimension = %task.dimension,
            results = output.items.len(),
            "Probe returned"
        );
        Ok(output.items)
    }

    async fn limits(&self) -> Option<LimitsSummary> {
        self.runner.service().limits().await.ok().flatten()
    }
}

/// Trim and drop one leading `@` or `#`.
pub fn normalize_query(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix(['@', '#'])
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}

fn compact(query: &str) -> String {
    query.chars().filter(|c| !c.is_whitespace()).collect()
}

/// First hint whose name survives cleanup as a tag of two or more characters.
pub fn best_hashtag(hints: &[Value]) -> Option<String> {
    hints.iter().find_map(|hint| {
        let raw = ["name", "searchTerm", "search"]
            .iter()
            .filter_map(|key| hint.get(*key).and_then(Value::as_str))
            .find(|s| !s.is_empty())?;
        let tag: String = raw
            .chars()
            .filter(|c| *c != '#' && !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        (tag.chars().count() > 1).then_some(tag)
    })
}

fn hashtag_input(tag: &str, limit: u32) -> Value {
    let input = InstagramScraperInput {
        direct_urls: vec![format!("https://www.instagram.com/explore/tags/{tag}/")],
        results_type: "posts".to_string(),
        results_limit: limit,
    };
    serde_json::to_value(input).unwrap_or(Value::Null)
}

fn search_input(query: &str, search_type: &str, limit: u32) -> Value {
    let input = InstagramSearchInput {
        search: query.to_string(),
        search_type: search_type.to_string(),
        search_limit: limit,
        proxy: ProxyConfig::default(),
    };
    serde_json::to_value(input).unwrap_or(Value::Null)
}
