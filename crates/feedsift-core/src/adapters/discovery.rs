//! Discovery Feed Adapter
//!
//! Parses social-graph cast updates of the form:
//! ```text
//! {"data":{"node":{"hash":"0x5f2e...","text":"gm","author":{"username":"alice","name":"Alice"}},"channel":{"id":"rust"}}}
//! ```

use crate::feed_adapter::{FeedAdapter, ParsedUpdate};
use crate::{ContentPayload, Error, Result};
use serde::Deserialize;

/// Number of hash characters kept in cast links
const LINK_HASH_CHARS: usize = 12;

/// Discovery-stream adapter for cast updates
#[derive(Debug, Clone)]
pub struct DiscoveryAdapter {
    /// Base URL used to build cast and author links
    link_base: String,
}

impl DiscoveryAdapter {
    /// Create a new discovery adapter with the default link base
    pub fn new() -> Self {
        Self {
            link_base: "https://warpcast.com".to_string(),
        }
    }

    /// Create with a custom link base
    pub fn with_link_base(link_base: impl Into<String>) -> Self {
        Self {
            link_base: link_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn cast_link(&self, username: &str, hash: &str) -> String {
        let short: String = hash.chars().take(LINK_HASH_CHARS).collect();
        format!("{}/{}/{}", self.link_base, username, short)
    }
}

impl Default for DiscoveryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedAdapter for DiscoveryAdapter {
    fn name(&self) -> &str {
        "discovery"
    }

    fn parse(&self, update: &serde_json::Value) -> Result<ParsedUpdate> {
        let data = update
            .get("data")
            .ok_or_else(|| Error::malformed("update has no data"))?;
        let node = data
            .get("node")
            .filter(|n| !n.is_null())
            .ok_or_else(|| Error::malformed("update has no data.node"))?;

        let cast: Cast = serde_json::from_value(node.clone())
            .map_err(|e| Error::malformed(format!("invalid cast node: {}", e)))?;

        let channel_id = data
            .get("channel")
            .and_then(|c| c.get("id"))
            .and_then(|id| id.as_str())
            .map(str::to_string);

        let display_name = cast
            .author
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| cast.author.username.clone());

        let payload = ContentPayload {
            text: cast.text,
            link: Some(self.cast_link(&cast.author.username, &cast.hash)),
            author: Some(display_name),
            author_handle: Some(cast.author.username),
            channel_id,
            raw: update.clone(),
        };

        Ok(ParsedUpdate::new(cast.hash, payload))
    }
}

#[derive(Debug, Deserialize)]
struct Cast {
    hash: String,
    #[serde(default)]
    text: String,
    author: CastAuthor,
}

#[derive(Debug, Deserialize)]
struct CastAuthor {
    username: String,
    #[serde(default)]
    name: Option<String>,
}
