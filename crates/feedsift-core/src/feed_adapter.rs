//! Feed Adapter System
//!
//! Provides a pluggable system for normalizing vendor-specific update payloads
//! (social-graph posts, event listings, article feeds) into [`ContentPayload`].

use crate::{ContentItem, ContentPayload, Cursor, Result, SourceKind};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// An update parsed from a feed, before it is assigned a source and cursor
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedUpdate {
    /// Upstream identifier of the update
    pub id: String,

    /// Normalized payload
    pub payload: ContentPayload,

    /// Cursor reported by the upstream, if it reports one
    pub cursor: Option<Cursor>,
}

impl ParsedUpdate {
    /// Create a parsed update without an upstream cursor
    pub fn new(id: impl Into<String>, payload: ContentPayload) -> Self {
        Self {
            id: id.into(),
            payload,
            cursor: None,
        }
    }

    /// Turn this update into a content item
    ///
    /// `fallback` is used when the upstream did not report a cursor.
    pub fn into_item(self, source: SourceKind, fallback: Cursor) -> ContentItem {
        let cursor = self.cursor.unwrap_or(fallback);
        ContentItem::new(self.id, source, self.payload, cursor)
    }
}

/// Trait for normalizing one feed's update format
///
/// Implementations receive one decoded JSON update at a time and either
/// produce a [`ParsedUpdate`] or reject the update as malformed.
pub trait FeedAdapter: Send + Sync + Debug {
    /// Name of this adapter (for logging/debugging)
    fn name(&self) -> &str;

    /// Whether parsed updates carry the upstream's own cursor
    ///
    /// Sources only send a resume cursor upstream when this holds.
    fn reports_cursor(&self) -> bool {
        false
    }

    /// Normalize one decoded update
    fn parse(&self, update: &serde_json::Value) -> Result<ParsedUpdate>;

    /// Decode and normalize one raw update
    fn parse_str(&self, data: &str) -> Result<ParsedUpdate> {
        let value: serde_json::Value = serde_json::from_str(data)?;
        self.parse(&value)
    }
}

/// Registry of available feed adapters, keyed by lowercase name
#[derive(Debug, Default, Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn FeedAdapter>>,
}

impl AdapterRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under a name; names are case-insensitive
    pub fn register(&mut self, name: impl Into<String>, adapter: Arc<dyn FeedAdapter>) {
        self.adapters.insert(name.into().to_lowercase(), adapter);
    }

    /// Get an adapter by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn FeedAdapter>> {
        self.adapters.get(&name.to_lowercase()).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.adapters.contains_key(&name.to_lowercase())
    }

    /// List all registered adapter names, sorted
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.adapters.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}
