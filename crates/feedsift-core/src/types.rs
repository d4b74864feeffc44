//! Core types for feedsift

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Maximum number of characters of item text carried in a [`PayloadSummary`]
const SUMMARY_TEXT_CHARS: usize = 280;

/// Rationale recorded when the classifier deadline expires
pub const TIMEOUT_RATIONALE: &str = "timeout";

/// Name of a configured content source (e.g. `"farcaster"`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceKind(String);

impl SourceKind {
    /// Create a source kind from its configured name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the source name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceKind {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for SourceKind {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Monotonically increasing position within a content source
///
/// Cursors are only comparable within the same source.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Cursor(u64);

impl Cursor {
    /// The position before any item
    pub const ORIGIN: Cursor = Cursor(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// The cursor immediately after this one
    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalized body of a content update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentPayload {
    /// Main text of the update
    pub text: String,

    /// Canonical link to the update
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,

    /// Display name of the author
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// Handle of the author on the originating network
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_handle: Option<String>,

    /// Channel, venue or section the update was published in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,

    /// Untouched upstream payload
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub raw: serde_json::Value,
}

impl ContentPayload {
    /// Create a payload carrying only text
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }
}

/// A single update from a content source
///
/// Items are immutable once produced and shared read-only behind an `Arc`
/// after the scheduler takes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Source-unique identifier
    pub id: String,

    /// Source this item came from
    pub source: SourceKind,

    /// Normalized content
    pub payload: ContentPayload,

    /// Position of this item within its source
    pub cursor: Cursor,
}

impl ContentItem {
    /// Create a new content item
    pub fn new(
        id: impl Into<String>,
        source: SourceKind,
        payload: ContentPayload,
        cursor: Cursor,
    ) -> Self {
        Self {
            id: id.into(),
            source,
            payload,
            cursor,
        }
    }

    /// Condensed view of the payload sent to clients
    pub fn summary(&self) -> PayloadSummary {
        let text = if self.payload.text.chars().count() > SUMMARY_TEXT_CHARS {
            let mut cut: String = self.payload.text.chars().take(SUMMARY_TEXT_CHARS).collect();
            cut.push('…');
            cut
        } else {
            self.payload.text.clone()
        };

        PayloadSummary {
            text,
            link: self.payload.link.clone(),
            author: self.payload.author.clone(),
        }
    }
}

/// Client-facing summary of a content item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadSummary {
    pub text: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

/// Caller-supplied evaluation prompt
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Prompt(Arc<str>);

impl Prompt {
    pub fn new(text: impl Into<String>) -> Self {
        Self(Arc::from(text.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First `max_chars` characters, for log lines
    pub fn preview(&self, max_chars: usize) -> &str {
        match self.0.char_indices().nth(max_chars) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a client subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Classifier judgment of one item against one prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Match,
    NoMatch,
}

impl Verdict {
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Match)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Match => "match",
            Self::NoMatch => "no_match",
        }
    }
}

/// Outcome of evaluating one item for one subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub subscription_id: SubscriptionId,

    pub content_item_id: String,

    pub source: SourceKind,

    /// Summary of the evaluated item, kept so delivery never needs the item
    pub summary: PayloadSummary,

    pub verdict: Verdict,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,

    /// Classifier confidence, when the backend reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    pub timestamp: DateTime<Utc>,
}

impl EvaluationResult {
    /// Create a result for the given item
    pub fn new(
        subscription_id: SubscriptionId,
        item: &ContentItem,
        verdict: Verdict,
        rationale: Option<String>,
    ) -> Self {
        Self {
            subscription_id,
            content_item_id: item.id.clone(),
            source: item.source.clone(),
            summary: item.summary(),
            verdict,
            rationale,
            score: None,
            timestamp: Utc::now(),
        }
    }

    /// A `Match` result with a rationale
    pub fn matched(
        subscription_id: SubscriptionId,
        item: &ContentItem,
        rationale: impl Into<String>,
    ) -> Self {
        Self::new(subscription_id, item, Verdict::Match, Some(rationale.into()))
    }

    /// A `NoMatch` result without a rationale
    pub fn no_match(subscription_id: SubscriptionId, item: &ContentItem) -> Self {
        Self::new(subscription_id, item, Verdict::NoMatch, None)
    }

    /// The result recorded when the classifier deadline expires
    pub fn timeout(subscription_id: SubscriptionId, item: &ContentItem) -> Self {
        Self::new(
            subscription_id,
            item,
            Verdict::NoMatch,
            Some(TIMEOUT_RATIONALE.to_string()),
        )
    }

    /// Whether this result records an expired classifier deadline
    pub fn is_timeout(&self) -> bool {
        !self.is_match() && self.rationale.as_deref() == Some(TIMEOUT_RATIONALE)
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn is_match(&self) -> bool {
        self.verdict.is_match()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(text: &str) -> ContentItem {
        ContentItem::new(
            "0xabc",
            SourceKind::from("casts"),
            ContentPayload::text(text).with_author("alice"),
            Cursor::new(7),
        )
    }

    #[test]
    fn test_cursor_ordering() {
        assert!(Cursor::new(2) > Cursor::new(1));
        assert_eq!(Cursor::ORIGIN.next(), Cursor::new(1));
        assert_eq!(Cursor::new(u64::MAX).next(), Cursor::new(u64::MAX));
    }

    #[test]
    fn test_summary_truncates_long_text() {
        let long = "x".repeat(400);
        let summary = item(&long).summary();
        assert_eq!(summary.text.chars().count(), SUMMARY_TEXT_CHARS + 1);
        assert!(summary.text.ends_with('…'));
        assert_eq!(summary.author.as_deref(), Some("alice"));
    }

    #[test]
    fn test_prompt_preview_respects_char_boundaries() {
        let prompt = Prompt::new("héllo wörld");
        assert_eq!(prompt.preview(4), "héll");
        assert_eq!(prompt.preview(100), "héllo wörld");
    }

    #[test]
    fn test_timeout_result() {
        let result = EvaluationResult::timeout(SubscriptionId::new(), &item("gm"));
        assert_eq!(result.verdict, Verdict::NoMatch);
        assert_eq!(result.rationale.as_deref(), Some("timeout"));
        assert_eq!(result.content_item_id, "0xabc");
        assert!(result.is_timeout());
    }

    #[test]
    fn test_verdict_serialization() {
        assert_eq!(serde_json::to_string(&Verdict::NoMatch).unwrap(), "\"no_match\"");
        assert!(Verdict::Match.is_match());
    }
}
