use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Substrings that mark reseller and storefront accounts.
pub const COMMERCIAL_BLACKLIST: &[&str] = &[
    "daigou",
    "price",
    "wholesale",
    "reseller",
    "seller",
    "sale",
    "shop",
    "store",
    "factory",
    "deals",
    "global",
    "shipping",
    "order",
    "original",
    "discount",
    "agent",
    "proxy",
    "personalshopper",
    "mall",
    "outlet",
    "service",
];

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "to", "for", "of", "with", "in", "on", "at", "by", "from", "as",
    "is", "are", "be", "this", "that", "these", "those", "your", "my", "our", "their", "it", "its",
];

const MIN_TOKEN_LEN: usize = 3;

pub const BASE_SCORE: i32 = 80;
pub const SCORE_FLOOR: u8 = 10;
pub const SCORE_CEILING: u8 = 99;

const LOW_FOLLOWER_PENALTY: i32 = 20;
const NO_FOLLOWER_DATA_PENALTY: i32 = 10;
const COMMERCIAL_PENALTY: i32 = 30;
const AESTHETIC_BONUS: i32 = 15;
const IDENTITY_BONUS: i32 = 10;
const OFF_TOPIC_PENALTY: i32 = 35;

/// Commercial candidates under this score are suppressed in creator-only mode.
pub const COMMERCIAL_SUPPRESS_BELOW: u8 = 50;
/// Off-topic candidates under this score are suppressed in creator-only mode.
pub const OFF_TOPIC_SUPPRESS_BELOW: u8 = 60;

static TOKEN_SPLIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s/_\-]+").unwrap());

// =============================================================================
// Signals
// =============================================================================

/// Why a candidate scored the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MatchSignal {
    LowFollowers(u64),
    NoFollowerData,
    Commercial,
    Aesthetic,
    IdentityMatch,
    OffTopic,
}

impl fmt::Display for MatchSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchSignal::LowFollowers(n) => write!(f, "LowFollowers({n})"),
            MatchSignal::NoFollowerData => f.write_str("NoData"),
            MatchSignal::Commercial => f.write_str("Commercial"),
            MatchSignal::Aesthetic => f.write_str("Aesthetic"),
            MatchSignal::IdentityMatch => f.write_str("TagMatch"),
            MatchSignal::OffTopic => f.write_str("OffTopic"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionReason {
    Commercial,
    OffTopic,
}

// =============================================================================
// ScoringPolicy
// =============================================================================

/// Keyword lists and thresholds a run scores against.
#[derive(Debug, Clone)]
pub struct ScoringPolicy {
    pub min_followers: u64,
    pub creator_only: bool,
    aesthetic_keywords: Vec<String>,
    identity_keywords: Vec<String>,
}

/// Text and counts extracted from one record.
#[derive(Debug, Clone, Copy)]
pub struct ScoreInput<'a> {
    pub context_text: &'a str,
    pub follower_count: u64,
    pub commercial: bool,
    pub query_tokens: &'a [String],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Score {
    /// Clamped to `[SCORE_FLOOR, SCORE_CEILING]`.
    pub value: u8,
    /// Additive total before clamping.
    pub raw: i32,
    pub signals: Vec<MatchSignal>,
}

impl Score {
    pub fn is_off_topic(&self) -> bool {
        self.signals.contains(&MatchSignal::OffTopic)
    }
}

impl ScoringPolicy {
    pub fn new(
        min_followers: u64,
        creator_only: bool,
        aesthetic_keywords: &[String],
        identity_keywords: &[String],
    ) -> Self {
        Self {
            min_followers,
            creator_only,
            aesthetic_keywords: lowercase_nonempty(aesthetic_keywords),
            identity_keywords: lowercase_nonempty(identity_keywords),
        }
    }

    /// Additive score from the base, then clamped.
    pub fn score(&self, input: &ScoreInput<'_>) -> Score {
        let mut raw = BASE_SCORE;
        let mut signals = Vec::new();

        let followers = input.follower_count;
        if followers > 0 && followers < self.min_followers {
            raw -= LOW_FOLLOWER_PENALTY;
            signals.push(MatchSignal::LowFollowers(followers));
        }
        if followers == 0 {
            raw -= NO_FOLLOWER_DATA_PENALTY;
            signals.push(MatchSignal::NoFollowerData);
        }

        if input.commercial {
            raw -= COMMERCIAL_PENALTY;
            signals.push(MatchSignal::Commercial);
        }

        let context = input.context_text;
        let aesthetic_hit = contains_any(context, &self.aesthetic_keywords);
        if aesthetic_hit {
            raw += AESTHETIC_BONUS;
            signals.push(MatchSignal::Aesthetic);
        }

        let identity_hit = contains_any(context, &self.identity_keywords);
        if identity_hit {
            raw += IDENTITY_BONUS;
            signals.push(MatchSignal::IdentityMatch);
        }

        let query_hit = contains_any(context, input.query_tokens);
        if !query_hit && !aesthetic_hit && !identity_hit {
            raw -= OFF_TOPIC_PENALTY;
            signals.push(MatchSignal::OffTopic);
        }

        Score {
            value: clamp_score(raw),
            raw,
            signals,
        }
    }

    /// Creator-only gate, checked against the clamped score.
    pub fn suppression(&self, score: &Score, commercial: bool) -> Option<SuppressionReason> {
        suppression_reason(self.creator_only, score.value, commercial, score.is_off_topic())
    }
}

pub fn clamp_score(raw: i32) -> u8 {
    raw.clamp(SCORE_FLOOR as i32, SCORE_CEILING as i32) as u8
}

/// Commercial takes precedence over off-topic.
pub fn suppression_reason(
    creator_only: bool,
    score: u8,
    commercial: bool,
    off_topic: bool,
) -> Option<SuppressionReason> {
    if !creator_only {
        return None;
    }
    if commercial && score < COMMERCIAL_SUPPRESS_BELOW {
        Some(SuppressionReason::Commercial)
    } else if off_topic && score < OFF_TOPIC_SUPPRESS_BELOW {
        Some(SuppressionReason::OffTopic)
    } else {
        None
    }
}

/// Blacklist substring in the handle or the bio.
pub fn is_commercial(identity: &str, bio: &str) -> bool {
    COMMERCIAL_BLACKLIST
        .iter()
        .any(|kw| identity.contains(kw) || bio.contains(kw))
}

/// Split a query into match tokens: lowercase, drop a leading `@`/`#`,
/// split on whitespace, `/`, `_` and `-`, keep tokens of three or more
/// characters that are not stopwords.
pub fn tokenize_query(query: &str) -> Vec<String> {
    let lowered = query.trim().to_lowercase();
    let stripped = lowered.trim_start_matches(['@', '#']);
    TOKEN_SPLIT
        .split(stripped)
        .map(str::trim)
        .filter(|t| t.chars().count() >= MIN_TOKEN_LEN && !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    needles.iter().any(|n| !n.is_empty() && haystack.contains(n.as_str()))
}

fn lowercase_nonempty(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ScoringPolicy {
        ScoringPolicy::new(
            1000,
            true,
            &["Minimalist".to_string(), "film grain".to_string()],
            &["visual curator".to_string()],
        )
    }

    fn input<'a>(context: &'a str, followers: u64, commercial: bool, tokens: &'a [String]) -> ScoreInput<'a> {
        ScoreInput {
            context_text: context,
            follower_count: followers,
            commercial,
            query_tokens: tokens,
        }
    }

    #[test]
    fn tokenizer_splits_and_filters() {
        assert_eq!(tokenize_query("#Slow-Living_in/the city"), vec!["slow", "living", "city"]);
        assert_eq!(tokenize_query("@ana"), vec!["ana"]);
        assert!(tokenize_query("a of it").is_empty());
        assert!(tokenize_query("   ").is_empty());
    }

    #[test]
    fn commercial_matches_handle_or_bio() {
        assert!(is_commercial("dealsdaily", ""));
        assert!(is_commercial("ana", "dm for price"));
        assert!(!is_commercial("ana.films", "film photographer"));
    }

    #[test]
    fn on_topic_creator_keeps_bonuses() {
        let tokens = tokenize_query("film photography");
        let score = policy().score(&input("ana minimalist visual curator film", 5000, false, &tokens));
        assert_eq!(score.raw, 80 + 15 + 10);
        assert_eq!(score.value, 99);
        assert_eq!(score.signals, vec![MatchSignal::Aesthetic, MatchSignal::IdentityMatch]);
    }

    #[test]
    fn low_followers_and_off_topic_stack() {
        let tokens = tokenize_query("film photography");
        let score = policy().score(&input("random cat pics", 400, false, &tokens));
        assert_eq!(score.raw, 80 - 20 - 35);
        assert_eq!(score.value, 25);
        assert_eq!(
            score.signals,
            vec![MatchSignal::LowFollowers(400), MatchSignal::OffTopic]
        );
        assert_eq!(
            policy().suppression(&score, false),
            Some(SuppressionReason::OffTopic)
        );
    }

    #[test]
    fn missing_followers_is_a_smaller_penalty() {
        let tokens = tokenize_query("film");
        let score = policy().score(&input("film diary", 0, false, &tokens));
        assert_eq!(score.value, 70);
        assert_eq!(score.signals, vec![MatchSignal::NoFollowerData]);
    }

    #[test]
    fn commercial_with_query_hit_survives_at_fifty() {
        let tokens = tokenize_query("deals");
        let score = policy().score(&input("dealsdaily", 5000, true, &tokens));
        assert_eq!(score.value, 50);
        assert_eq!(policy().suppression(&score, true), None);
    }

    #[test]
    fn score_is_clamped_both_ways() {
        let tokens: Vec<String> = Vec::new();
        let score = policy().score(&input("shop", 10, true, &tokens));
        assert_eq!(score.raw, 80 - 20 - 30 - 35);
        assert_eq!(score.value, SCORE_FLOOR);
        assert_eq!(clamp_score(140), SCORE_CEILING);
    }

    #[test]
    fn suppression_boundaries() {
        assert_eq!(suppression_reason(true, 49, true, false), Some(SuppressionReason::Commercial));
        assert_eq!(suppression_reason(true, 50, true, false), None);
        assert_eq!(suppression_reason(true, 59, false, true), Some(SuppressionReason::OffTopic));
        assert_eq!(suppression_reason(true, 60, false, true), None);
        assert_eq!(suppression_reason(true, 40, true, true), Some(SuppressionReason::Commercial));
        assert_eq!(suppression_reason(false, 10, true, true), None);
    }

    #[test]
    fn signal_labels() {
        assert_eq!(MatchSignal::LowFollowers(420).to_string(), "LowFollowers(420)");
        assert_eq!(MatchSignal::NoFollowerData.to_string(), "NoData");
        assert_eq!(MatchSignal::IdentityMatch.to_string(), "TagMatch");
    }
}
