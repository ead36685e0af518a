use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// --- Actor inputs ---

/// Input for the apify/instagram-scraper actor.
#[derive(Debug, Clone, Serialize)]
pub struct InstagramScraperInput {
    #[serde(rename = "directUrls")]
    pub direct_urls: Vec<String>,
    /// "posts" or "details".
    #[serde(rename = "resultsType")]
    pub results_type: String,
    #[serde(rename = "resultsLimit")]
    pub results_limit: u32,
}

/// Input for the apify/instagram-search-scraper actor.
#[derive(Debug, Clone, Serialize)]
pub struct InstagramSearchInput {
    pub search: String,
    /// "user" or "hashtag".
    #[serde(rename = "searchType")]
    pub search_type: String,
    #[serde(rename = "searchLimit")]
    pub search_limit: u32,
    pub proxy: ProxyConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProxyConfig {
    #[serde(rename = "useApifyProxy")]
    pub use_apify_proxy: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            use_apify_proxy: true,
        }
    }
}

// --- Run metadata ---

/// Wrapper for Apify API responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// Apify actor run metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct RunData {
    pub id: String,
    pub status: String,
    #[serde(rename = "defaultDatasetId")]
    pub default_dataset_id: String,
    #[serde(rename = "startedAt")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(rename = "finishedAt")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Lifecycle state of a remote run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Ready,
    Running,
    Succeeded,
    Failed,
    Aborting,
    Aborted,
    TimingOut,
    TimedOut,
    Unknown,
}

impl RunStatus {
    pub fn parse(status: &str) -> Self {
        match status.trim().to_ascii_uppercase().replace('_', "-").as_str() {
            "READY" => RunStatus::Ready,
            "RUNNING" => RunStatus::Running,
            "SUCCEEDED" => RunStatus::Succeeded,
            "FAILED" => RunStatus::Failed,
            "ABORTING" => RunStatus::Aborting,
            "ABORTED" => RunStatus::Aborted,
            "TIMING-OUT" => RunStatus::TimingOut,
            "TIMED-OUT" => RunStatus::TimedOut,
            _ => RunStatus::Unknown,
        }
    }

    /// Terminal states that will never produce a dataset.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            RunStatus::Failed | RunStatus::Aborted | RunStatus::TimedOut
        )
    }
}

// --- Usage and limits ---

/// Resource usage of a single run, in USD.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunUsage {
    pub usage_usd: Option<f64>,
    pub usage_total_usd: Option<f64>,
}

impl RunUsage {
    /// Parse a run payload, accepting both the flat and the nested `usage`
    /// layouts.
    pub fn from_value(data: &Value) -> Self {
        Self {
            usage_usd: first_number(data, &[&["usageUsd"], &["usage", "usageUsd"]]),
            usage_total_usd: first_number(
                data,
                &[&["usageTotalUsd"], &["usage", "usageTotalUsd"]],
            ),
        }
    }

    /// True once the platform has settled a non-zero total.
    pub fn is_settled(&self) -> bool {
        self.usage_total_usd.is_some_and(|usd| usd > 0.0)
    }
}

/// Monthly account limits and the current cycle's consumption.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LimitsSummary {
    pub max_monthly_usage_usd: Option<f64>,
    pub monthly_usage_usd: Option<f64>,
    pub cycle_start: Option<String>,
    pub cycle_end: Option<String>,
}

impl LimitsSummary {
    pub fn from_value(data: &Value) -> Self {
        Self {
            max_monthly_usage_usd: first_number(
                data,
                &[
                    &["limits", "maxMonthlyUsageUsd"],
                    &["maxMonthlyUsageUsd"],
                    &["maxMonthlyUsage", "usd"],
                    &["maxMonthlyUsageUSD"],
                ],
            ),
            monthly_usage_usd: first_number(
                data,
                &[
                    &["currentUsage", "monthlyUsageUsd"],
                    &["currentUsage", "monthlyUsageUSD"],
                    &["current", "monthlyUsageUsd"],
                    &["current", "monthlyUsageUSD"],
                    &["currentUsage", "totalUsd"],
                    &["currentUsage", "usageUsd"],
                    &["usage", "monthlyUsageUsd"],
                    &["usage", "totalUsd"],
                    &["usageUsd"],
                    &["totalUsd"],
                ],
            ),
            cycle_start: first_string(
                data,
                &[
                    &["currentUsageCycle", "startedAt"],
                    &["currentUsageCycle", "startAt"],
                    &["monthlyUsageCycle", "startedAt"],
                    &["monthlyUsageCycle", "startAt"],
                    &["usageCycle", "startedAt"],
                    &["usageCycle", "startAt"],
                    &["startedAt"],
                ],
            ),
            cycle_end: first_string(
                data,
                &[
                    &["currentUsageCycle", "endsAt"],
                    &["currentUsageCycle", "endAt"],
                    &["monthlyUsageCycle", "endsAt"],
                    &["monthlyUsageCycle", "endAt"],
                    &["usageCycle", "endsAt"],
                    &["usageCycle", "endAt"],
                    &["endsAt"],
                ],
            ),
        }
    }

    /// Remaining allowance for this cycle, if both sides are known.
    pub fn remaining_usd(&self) -> Option<f64> {
        Some(self.max_monthly_usage_usd? - self.monthly_usage_usd?)
    }
}

/// Unwrap the `{ "data": ... }` envelope when present.
pub(crate) fn unwrap_data(json: &Value) -> &Value {
    json.get("data").filter(|d| !d.is_null()).unwrap_or(json)
}

fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |v, key| v.get(key))
}

/// A finite number, or a string that parses as one.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn first_number(value: &Value, paths: &[&[&str]]) -> Option<f64> {
    paths
        .iter()
        .find_map(|path| lookup(value, path).and_then(as_number))
}

fn first_string(value: &Value, paths: &[&[&str]]) -> Option<String> {
    paths.iter().find_map(|path| {
        lookup(value, path)
            .and_then(Value::as_str)
            .map(str::to_string)
    })
}
