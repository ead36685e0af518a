use std::sync::LazyLock;
use std::time::Duration;

use ai_client::JsonGenerator;
use anyhow::{Context, Result};
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::scheduler::QueryPools;

/// Terms kept per list.
pub const MAX_TERMS: usize = 8;

/// Minimum list sizes for a usable matrix.
const MIN_CORE_TAGS: usize = 4;
const MIN_LIFESTYLE_TAGS: usize = 6;
const MIN_VISUAL_ACTIONS: usize = 6;
const MIN_AESTHETIC_KEYWORDS: usize = 6;
const MIN_SEARCH_QUERIES: usize = 8;

const REGENERATE_INSTRUCTION: &str = "Your previous JSON was low quality or violated rules. \
Fix it by regenerating a brand new JSON that satisfies ALL rules and minimum counts. Return JSON only.";

static EMOJI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"[\x{1F600}-\x{1F64F}\x{1F300}-\x{1F5FF}\x{1F680}-\x{1F6FF}\x{1F700}-\x{1F77F}\x{1F780}-\x{1F7FF}\x{1F800}-\x{1F8FF}\x{1F900}-\x{1F9FF}\x{1FA00}-\x{1FA6F}\x{1FA70}-\x{1FAFF}\x{2600}-\x{26FF}\x{2700}-\x{27BF}]",
    )
    .unwrap()
});

// =============================================================================
// StrategyMatrix
// =============================================================================

/// Search vocabulary for one brief.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StrategyMatrix {
    /// How creators describe themselves ("visual curator", "film photographer").
    #[serde(default)]
    pub core_tags: Vec<String>,
    /// Lifestyle and aesthetic hashtags.
    #[serde(default)]
    pub lifestyle_tags: Vec<String>,
    /// Scenes and actions that show up in their posts.
    #[serde(default)]
    pub visual_actions: Vec<String>,
    /// Words that describe the look.
    #[serde(default)]
    pub aesthetic_keywords: Vec<String>,
    /// Free-form search phrases.
    #[serde(default)]
    pub search_queries: Vec<String>,
}

impl StrategyMatrix {
    /// Lenient parse of a model response: every list is normalized and
    /// non-string entries are dropped.
    pub fn from_value(value: &Value) -> Self {
        let list = |key: &str| match value.get(key) {
            Some(Value::Array(items)) => normalize_terms(items),
            _ => Vec::new(),
        };
        Self {
            core_tags: list("core_tags"),
            lifestyle_tags: list("lifestyle_tags"),
            visual_actions: list("visual_actions"),
            aesthetic_keywords: list("aesthetic_keywords"),
            search_queries: list("search_queries"),
        }
    }

    /// Names of lists below their minimum size.
    pub fn shortfalls(&self) -> Vec<&'static str> {
        [
            ("core_tags", self.core_tags.len(), MIN_CORE_TAGS),
            ("lifestyle_tags", self.lifestyle_tags.len(), MIN_LIFESTYLE_TAGS),
            ("visual_actions", self.visual_actions.len(), MIN_VISUAL_ACTIONS),
            ("aesthetic_keywords", self.aesthetic_keywords.len(), MIN_AESTHETIC_KEYWORDS),
            ("search_queries", self.search_queries.len(), MIN_SEARCH_QUERIES),
        ]
        .into_iter()
        .filter(|(_, len, min)| len < min)
        .map(|(name, _, _)| name)
        .collect()
    }

    pub fn is_usable(&self) -> bool {
        self.shortfalls().is_empty()
    }

    /// Scheduler pools: actions, lifestyle tags as aesthetic, core tags as
    /// identity, and everything concatenated as fallback.
    pub fn query_pools(&self) -> QueryPools {
        let fallback = self
            .search_queries
            .iter()
            .chain(&self.aesthetic_keywords)
            .chain(&self.core_tags)
            .chain(&self.lifestyle_tags)
            .chain(&self.visual_actions)
            .cloned()
            .collect();
        QueryPools {
            action: self.visual_actions.clone(),
            aesthetic: self.lifestyle_tags.clone(),
            identity: self.core_tags.clone(),
            fallback,
        }
    }
}

/// Strip emoji and `#`/`@`, trim, keep terms longer than two characters, cap
/// at [`MAX_TERMS`].
pub fn normalize_terms(values: &[Value]) -> Vec<String> {
    values
        .iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .map(|s| {
            EMOJI
                .replace_all(&s, "")
                .chars()
                .filter(|&c| !matches!(c, '#' | '@'))
                .collect::<String>()
                .trim()
                .to_string()
        })
        .filter(|s| s.chars().count() > 2)
        .take(MAX_TERMS)
        .collect()
}

// =============================================================================
// Generation
// =============================================================================

#[derive(Debug, Clone)]
pub struct GeneratedStrategy {
    pub matrix: StrategyMatrix,
    /// False when even the regenerated matrix missed its minimums.
    pub usable: bool,
    pub attempts: u32,
}

fn strategy_prompt(brief: &str) -> String {
    let schema = schemars::schema_for!(StrategyMatrix);
    let schema_json = serde_json::to_string_pretty(&schema).unwrap_or_default();
    format!(
        "You are a creator sourcing strategist. Build an Instagram search vocabulary for \
         finding individual creators (not brands, shops or venues) who fit this brief.\n\n\
         Brief:\n{brief}\n\n\
         Rules:\n\
         - core_tags: at least {MIN_CORE_TAGS} ways these creators describe themselves\n\
         - lifestyle_tags: at least {MIN_LIFESTYLE_TAGS} lifestyle hashtags, no # sign\n\
         - visual_actions: at least {MIN_VISUAL_ACTIONS} scenes or actions seen in their posts\n\
         - aesthetic_keywords: at least {MIN_AESTHETIC_KEYWORDS} words describing the look\n\
         - search_queries: at least {MIN_SEARCH_QUERIES} short search phrases\n\
         - No emoji, no @ or # signs, every term longer than two characters\n\n\
         Return JSON only, matching this schema:\n{schema_json}"
    )
}

/// Ask the model for a matrix, regenerating once if it misses the minimums.
pub async fn generate_strategy(
    generator: &dyn JsonGenerator,
    brief: &str,
    timeout: Duration,
) -> Result<GeneratedStrategy> {
    let prompt = strategy_prompt(brief);

    let first = generator
        .generate_json(&prompt, timeout)
        .await
        .context("Strategy generation failed")?;
    let matrix = StrategyMatrix::from_value(&first);
    if matrix.is_usable() {
        info!("Strategy matrix ready");
        return Ok(GeneratedStrategy {
            matrix,
            usable: true,
            attempts: 1,
        });
    }

    warn!(shortfalls = ?matrix.shortfalls(), "Matrix quality low, regenerating with stricter constraints");
    let retry_prompt = format!("{prompt}\n\n{REGENERATE_INSTRUCTION}");
    let second = generator
        .generate_json(&retry_prompt, timeout)
        .await
        .context("Strategy regeneration failed")?;
    let matrix = StrategyMatrix::from_value(&second);
    let usable = matrix.is_usable();
    if !usable {
        warn!(shortfalls = ?matrix.shortfalls(), "Regenerated matrix still below minimums, continuing");
    }
    Ok(GeneratedStrategy {
        matrix,
        usable,
        attempts: 2,
    })
}
