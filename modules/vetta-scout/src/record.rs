//! Read profile fields out of the loosely-shaped items the scrapers return.
//!
//! Post scrapers nest the author under `owner`, some search results under
//! `user`, older tag pages under `node.owner`, and profile lookups are flat.
//! [`RawRecord`] classifies the item once and resolves every field through
//! its alias list.

use serde_json::Value;

/// Where an item keeps its profile fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordShape {
    /// Post with an `owner` object.
    Owner,
    /// Search hit with a `user` object.
    User,
    /// Graph edge with `node.owner`.
    NodeOwner,
    /// Profile fields live on the item itself.
    Flat,
}

const IDENTITY_PATHS: &[&[&str]] = &[
    &["owner", "username"],
    &["node", "owner", "username"],
    &["user", "username"],
    &["ownerUsername"],
    &["authorUsername"],
    &["userName"],
    &["username"],
    &["handle"],
];

const CAPTION_PATHS: &[&[&str]] = &[
    &["caption"],
    &["text"],
    &["description"],
    &["edge_media_to_caption", "edges", "0", "node", "text"],
    &["node", "edge_media_to_caption", "edges", "0", "node", "text"],
];

const HASHTAG_KEYS: &[&str] = &["hashtags", "hashTags", "tags", "tagList"];

const PROFILE_FOLLOWER_PATHS: &[&[&str]] = &[
    &["followerCount"],
    &["followersCount"],
    &["follower_count"],
    &["edge_followed_by", "count"],
];

const ITEM_FOLLOWER_PATHS: &[&[&str]] = &[
    &["followerCount"],
    &["followersCount"],
    &["follower_count"],
    &["followers"],
    &["followers_count"],
];

const AVATAR_KEYS: &[&str] = &["profile_pic_url", "profilePicUrl", "profile_pic_url_hd"];
const OWNER_AVATAR_KEYS: &[&str] = &["ownerProfilePicUrl", "owner_profile_pic_url"];

/// Minimum identity length after normalization.
const MIN_IDENTITY_LEN: usize = 2;

#[derive(Debug, Clone, Copy)]
pub struct RawRecord<'a> {
    item: &'a Value,
    shape: RecordShape,
}

impl<'a> RawRecord<'a> {
    pub fn new(item: &'a Value) -> Self {
        let shape = if is_object(item.get("owner")) {
            RecordShape::Owner
        } else if is_object(item.get("user")) {
            RecordShape::User
        } else if is_object(item.get("node").and_then(|n| n.get("owner"))) {
            RecordShape::NodeOwner
        } else {
            RecordShape::Flat
        };
        Self { item, shape }
    }

    pub fn shape(&self) -> RecordShape {
        self.shape
    }

    fn profile(&self) -> &'a Value {
        let nested = match self.shape {
            RecordShape::Owner => self.item.get("owner"),
            RecordShape::User => self.item.get("user"),
            RecordShape::NodeOwner => self.item.get("node").and_then(|n| n.get("owner")),
            RecordShape::Flat => None,
        };
        nested.unwrap_or(self.item)
    }

    /// Scraper placeholder rows carry `error` or `errorDescription`.
    pub fn is_error(&self) -> bool {
        ["error", "errorDescription"]
            .iter()
            .any(|key| self.item.get(*key).is_some_and(is_truthy))
    }

    /// Lowercased, trimmed handle. `None` when missing or shorter than two
    /// characters.
    pub fn identity(&self) -> Option<String> {
        let raw = first_text(self.item, IDENTITY_PATHS)?;
        let identity = raw.trim().to_lowercase();
        (identity.chars().count() >= MIN_IDENTITY_LEN).then_some(identity)
    }

    /// Lowercased biography, empty when absent.
    pub fn bio(&self) -> String {
        self.profile_or_item_text(&["biography", "bio"])
            .map(|s| s.to_lowercase())
            .unwrap_or_default()
    }

    pub fn display_name(&self) -> Option<String> {
        self.profile_or_item_text(&["fullName", "full_name"])
    }

    /// Lowercased caption text, empty when absent.
    pub fn caption(&self) -> String {
        first_text(self.item, CAPTION_PATHS)
            .map(|s| s.trim().to_lowercase())
            .unwrap_or_default()
    }

    /// Hashtags flattened to one space-separated lowercase string.
    pub fn hashtags(&self) -> String {
        let value = HASHTAG_KEYS
            .iter()
            .filter_map(|key| self.item.get(*key))
            .find(|v| has_tags(v));
        match value {
            Some(Value::Array(tags)) => tags
                .iter()
                .filter_map(text_of)
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase(),
            Some(other) => text_of(other).unwrap_or_default().to_lowercase(),
            None => String::new(),
        }
    }

    /// Follower count, 0 when no alias carries a usable number. Numeric
    /// strings are accepted.
    pub fn follower_count(&self) -> u64 {
        let profile_hit = PROFILE_FOLLOWER_PATHS
            .iter()
            .filter_map(|path| lookup(self.profile(), path))
            .find(|v| is_truthy(v));
        let hit = profile_hit.or_else(|| {
            ITEM_FOLLOWER_PATHS
                .iter()
                .filter_map(|path| lookup(self.item, path))
                .find(|v| is_truthy(v))
        });
        hit.and_then(as_count).unwrap_or(0)
    }

    /// First avatar URL that survives sanitizing.
    pub fn avatar_url(&self) -> Option<String> {
        let profile = self.profile();
        let candidates = AVATAR_KEYS
            .iter()
            .filter_map(|key| profile.get(*key))
            .chain(AVATAR_KEYS.iter().filter_map(|key| self.item.get(*key)))
            .chain(OWNER_AVATAR_KEYS.iter().filter_map(|key| self.item.get(*key)));
        candidates
            .filter_map(|v| v.as_str())
            .find_map(sanitize_url)
    }

    pub fn verified(&self) -> bool {
        let profile = self.profile();
        ["isVerified", "is_verified"]
            .iter()
            .filter_map(|key| profile.get(*key).or_else(|| self.item.get(*key)))
            .any(is_truthy)
    }

    fn profile_or_item_text(&self, keys: &[&str]) -> Option<String> {
        let profile = self.profile();
        keys.iter()
            .filter_map(|key| profile.get(*key))
            .chain(keys.iter().filter_map(|key| self.item.get(*key)))
            .filter_map(text_of)
            .find(|s| !s.is_empty())
    }
}

/// Trim, drop surrounding quote characters, and accept only http(s) URLs.
pub fn sanitize_url(raw: &str) -> Option<String> {
    let cleaned = raw.trim().trim_matches(['"', '\'', '`']).trim().to_string();
    let lower = cleaned.to_ascii_lowercase();
    (lower.starts_with("http://") || lower.starts_with("https://")).then_some(cleaned)
}

// -----------------------------------------------------------------------------
// Value helpers
// -----------------------------------------------------------------------------

fn is_object(value: Option<&Value>) -> bool {
    matches!(value, Some(Value::Object(_)))
}

fn lookup<'v>(value: &'v Value, path: &[&str]) -> Option<&'v Value> {
    path.iter().try_fold(value, |current, segment| match current {
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => current.get(*segment),
    })
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Empty arrays and blank strings fall through to the next tag alias.
fn has_tags(value: &Value) -> bool {
    match value {
        Value::Array(tags) => tags.iter().any(|t| text_of(t).is_some_and(|s| !s.trim().is_empty())),
        Value::String(s) => !s.trim().is_empty(),
        other => is_truthy(other),
    }
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_text(item: &Value, paths: &[&[&str]]) -> Option<String> {
    paths
        .iter()
        .filter_map(|path| lookup(item, path))
        .filter(|v| is_truthy(v))
        .find_map(text_of)
}

fn as_count(value: &Value) -> Option<u64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (n.is_finite() && n > 0.0).then_some(n as u64)
}
