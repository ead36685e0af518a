use std::fmt;

use serde::{Deserialize, Serialize};

/// Search axis a query was drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Action,
    Aesthetic,
    Identity,
    Fallback,
}

impl Dimension {
    pub fn label(self) -> &'static str {
        match self {
            Dimension::Action => "Action-Scene",
            Dimension::Aesthetic => "Aesthetic DNA",
            Dimension::Identity => "Creative Identity",
            Dimension::Fallback => "Fallback",
        }
    }

    /// Identity queries look up accounts; everything else searches content.
    pub fn search_mode(self) -> SearchMode {
        match self {
            Dimension::Identity => SearchMode::IdentitySearch,
            Dimension::Action | Dimension::Aesthetic | Dimension::Fallback => {
                SearchMode::ContentSearch
            }
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Hashtag/topic content search.
    ContentSearch,
    /// Account lookup by name.
    IdentitySearch,
}

/// One planned probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryTask {
    pub query: String,
    pub dimension: Dimension,
    pub search_mode: SearchMode,
    /// Drawn from the fallback pool because the slot's own pool ran dry.
    pub degraded: bool,
}

impl QueryTask {
    pub fn new(query: impl Into<String>, dimension: Dimension) -> Self {
        Self {
            query: query.into(),
            dimension,
            search_mode: dimension.search_mode(),
            degraded: false,
        }
    }

    pub fn degraded(query: impl Into<String>) -> Self {
        Self {
            degraded: true,
            ..Self::new(query, Dimension::Fallback)
        }
    }
}

/// Strip a leading `#`, trim, and reject blanks.
pub fn clean_query(raw: &str) -> Option<String> {
    let cleaned = raw.trim().trim_start_matches('#').trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}
