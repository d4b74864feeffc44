//! Configurable Feed Adapter
//!
//! A generic adapter that can be configured to normalize various update
//! formats (event listings, article feeds) using path-based field extraction.

use crate::feed_adapter::{FeedAdapter, ParsedUpdate};
use crate::{ContentPayload, Cursor, Error, Result};
use serde::{Deserialize, Serialize};

/// Configuration for a custom update format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Adapter name
    pub name: String,

    /// Path to the object holding the update fields, if nested
    /// Examples: "data", "event", "items[0]"
    #[serde(default)]
    pub root_path: Option<String>,

    /// Path to the update identifier (dot-notation or simple JSONPath)
    pub id_path: String,

    /// Path to the text that gets classified
    pub text_path: String,

    /// Path to a canonical link
    #[serde(default)]
    pub link_path: Option<String>,

    /// Path to the author display name
    #[serde(default)]
    pub author_path: Option<String>,

    /// Path to a channel, venue or section
    #[serde(default)]
    pub channel_path: Option<String>,

    /// Path to an upstream-reported numeric cursor
    #[serde(default)]
    pub cursor_path: Option<String>,
}

/// A configurable feed adapter
#[derive(Debug, Clone)]
pub struct ConfigurableAdapter {
    config: AdapterConfig,
}

impl ConfigurableAdapter {
    /// Create a new configurable adapter
    pub fn new(config: AdapterConfig) -> Self {
        Self { config }
    }

    /// Extract value from JSON using a simple path notation
    fn extract_path<'a>(
        &self,
        value: &'a serde_json::Value,
        path: &str,
    ) -> Option<&'a serde_json::Value> {
        let mut current = value;

        for part in path.split('.') {
            // Handle array index notation: "authors[0]"
            if let Some(bracket_pos) = part.find('[') {
                let key = &part[..bracket_pos];
                let index_str = part[bracket_pos + 1..].strip_suffix(']')?;

                if !key.is_empty() {
                    current = current.get(key)?;
                }

                let index: usize = index_str.parse().ok()?;
                current = current.get(index)?;
            } else {
                current = current.get(part)?;
            }
        }

        Some(current)
    }

    /// Extract a field as a string, accepting numeric identifiers
    fn extract_string(&self, value: &serde_json::Value, path: &str) -> Option<String> {
        match self.extract_path(value, path)? {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn extract_optional(&self, value: &serde_json::Value, path: &Option<String>) -> Option<String> {
        path.as_deref().and_then(|p| self.extract_string(value, p))
    }
}

impl FeedAdapter for ConfigurableAdapter {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn reports_cursor(&self) -> bool {
        self.config.cursor_path.is_some()
    }

    fn parse(&self, update: &serde_json::Value) -> Result<ParsedUpdate> {
        let root = match self.config.root_path.as_deref() {
            Some(path) => self
                .extract_path(update, path)
                .ok_or_else(|| Error::malformed(format!("missing root '{}'", path)))?,
            None => update,
        };

        let id = self
            .extract_string(root, &self.config.id_path)
            .ok_or_else(|| Error::malformed(format!("missing id at '{}'", self.config.id_path)))?;

        let text = self.extract_string(root, &self.config.text_path).ok_or_else(|| {
            Error::malformed(format!("missing text at '{}'", self.config.text_path))
        })?;

        let cursor = self
            .config
            .cursor_path
            .as_deref()
            .and_then(|p| self.extract_path(root, p))
            .and_then(|v| v.as_u64())
            .map(Cursor::new);

        let payload = ContentPayload {
            text,
            link: self.extract_optional(root, &self.config.link_path),
            author: self.extract_optional(root, &self.config.author_path),
            author_handle: None,
            channel_id: self.extract_optional(root, &self.config.channel_path),
            raw: update.clone(),
        };

        Ok(ParsedUpdate {
            id,
            payload,
            cursor,
        })
    }
}

// =============================================================================
// Pre-built Adapters
// =============================================================================

/// Create a JSON Feed item adapter
///
/// JSON Feed item format:
/// ```text
/// {"id": "2", "url": "https://example.org/second-item", "content_text": "Second item", "authors": [{"name": "Jane"}]}
/// ```
pub fn article_adapter() -> ConfigurableAdapter {
    ConfigurableAdapter::new(AdapterConfig {
        name: "article".to_string(),
        root_path: None,
        id_path: "id".to_string(),
        text_path: "content_text".to_string(),
        link_path: Some("url".to_string()),
        author_path: Some("authors[0].name".to_string()),
        channel_path: None,
        cursor_path: None,
    })
}
