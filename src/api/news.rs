//! Hot-news feed and query suggestions.
//!
//! API: `GET /api/hot-news?sources=<csv>&count=<n>`,
//! `POST /api/suggest-queries {title}`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Sources queried when none is selected.
pub const DEFAULT_SOURCES: [&str; 5] = ["cls", "wallstreetcn", "xueqiu", "eastmoney", "yicai"];

/// Headlines requested per source.
pub const DEFAULT_COUNT: u32 = 8;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HotNewsResponse {
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub sources: Vec<HotNewsGroup>,
}

impl HotNewsResponse {
    pub fn item_count(&self) -> usize {
        self.sources.iter().map(|g| g.items.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HotNewsGroup {
    pub source: String,
    #[serde(default)]
    pub source_name: String,
    #[serde(default)]
    pub items: Vec<HotNewsItem>,
}

impl HotNewsGroup {
    /// Display name, falling back to the source id.
    pub fn display_name(&self) -> &str {
        if self.source_name.is_empty() {
            &self.source
        } else {
            &self.source_name
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HotNewsItem {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub rank: u32,
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_time: Option<String>,
}

fn string_or_number<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(de)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[derive(Debug, Serialize)]
pub(super) struct SuggestRequest<'a> {
    pub title: &'a str,
}

#[derive(Debug, Deserialize)]
pub(super) struct SuggestResponse {
    #[serde(default)]
    pub suggestions: Vec<String>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Path and query for a hot-news request. An empty selection means every
/// default source.
pub fn hot_news_path<S: AsRef<str>>(sources: &[S], count: u32) -> String {
    let joined = if sources.is_empty() {
        DEFAULT_SOURCES.join(",")
    } else {
        sources.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(",")
    };
    format!("api/hot-news?sources={}&count={}", urlencoding::encode(&joined), count)
}

/// Local suggestions used when the server answers with an error status.
pub fn fallback_suggestions(title: &str) -> Vec<String> {
    vec![
        format!("{title} market impact"),
        format!("{title} related stocks"),
        title.to_string(),
    ]
}
