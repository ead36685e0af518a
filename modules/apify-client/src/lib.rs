pub mod error;
pub mod poll;
pub mod task;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;


pub use error::{is_hard_limit_message, ApifyError, ErrorKind, Result, TaskError};
pub use poll::{poll_until, sleep_or_cancel, Attempt, Cancelled, PollError, PollPolicy};
pub use task::{CostObserver, JobClass, JobService, RunFinished, TaskOutput, TaskPolicy, TaskRunner};
pub use types::{
    InstagramScraperInput, InstagramSearchInput, LimitsSummary, ProxyConfig, RunData, RunStatus,
    RunUsage,
};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use types::{unwrap_data, ApiResponse};

const BASE_URL: &str = "https://api.apify.com/v2";

/// Actor ID for apify/instagram-scraper (profile details, posts, tag pages).
pub const INSTAGRAM_SCRAPER: &str = "apify~instagram-scraper";

/// Actor ID for apify/instagram-search-scraper (user and hashtag search).
pub const INSTAGRAM_SEARCH_SCRAPER: &str = "apify~instagram-search-scraper";

pub struct ApifyClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl ApifyClient {
    pub fn new(token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            base_url: BASE_URL.to_string(),
        }
    }

    /// Point the client at a proxy or a test server.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Start an actor run. Returns immediately with run metadata.
    pub async fn start_run(&self, actor_id: &str, input: &Value) -> Result<RunData> {
        let url = format!("{}/acts/{}/runs", self.base_url, actor_id);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(input)
            .send()
            .await?;

        let resp = check_status(resp).await?;
        let api_resp: ApiResponse<RunData> = resp.json().await?;
        Ok(api_resp.data)
    }

    /// Fetch a run's current metadata.
    pub async fn get_run(&self, run_id: &str) -> Result<RunData> {
        let json = self.get_json(&format!("actor-runs/{}", run_id)).await?;
        Ok(serde_json::from_value(unwrap_data(&json).clone())?)
    }

    /// Fetch dataset items from a completed run.
    pub async fn get_dataset_items<T: DeserializeOwned>(&self, dataset_id: &str) -> Result<Vec<T>> {
        let url = format!("{}/datasets/{}/items?format=json", self.base_url, dataset_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let resp = check_status(resp).await?;
        let items: Vec<T> = resp.json().await?;
        Ok(items)
    }

    /// Ask the platform to abort a run. Returns whether it accepted.
    pub async fn abort_run(&self, run_id: &str) -> Result<bool> {
        let url = format!("{}/actor-runs/{}/abort", self.base_url, run_id);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(resp.status().is_success())
    }

    /// Usage figures for a run.
    pub async fn run_usage(&self, run_id: &str) -> Result<RunUsage> {
        let json = self.get_json(&format!("actor-runs/{}", run_id)).await?;
        Ok(RunUsage::from_value(unwrap_data(&json)))
    }

    /// Monthly limits of the account behind the token. `None` when the
    /// endpoint is unavailable.
    pub async fn limits(&self) -> Result<Option<LimitsSummary>> {
        let url = format!("{}/users/me/limits", self.base_url);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Ok(None);
        }
        let json: Value = resp.json().await?;
        Ok(Some(LimitsSummary::from_value(unwrap_data(&json))))
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ApifyError::Api {
            status: status.as_u16(),
            message: body,
        });
    }
    Ok(resp)
}

#[async_trait]
impl JobService for ApifyClient {
    async fn submit(&self, actor_id: &str, payload: &Value) -> Result<RunData> {
        self.start_run(actor_id, payload).await
    }

    async fn status(&self, run_id: &str) -> Result<RunData> {
        self.get_run(run_id).await
    }

    async fn results(&self, dataset_id: &str) -> Result<Vec<Value>> {
        self.get_dataset_items(dataset_id).await
    }

    async fn abort(&self, run_id: &str) -> Result<bool> {
        self.abort_run(run_id).await
    }

    async fn usage(&self, run_id: &str) -> Result<RunUsage> {
        self.run_usage(run_id).await
    }

    async fn limits(&self) -> Result<Option<LimitsSummary>> {
        ApifyClient::limits(self).await
    }
}
