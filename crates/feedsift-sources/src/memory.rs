//! In-process content source

use crate::ContentSource;
use async_trait::async_trait;
use feedsift_core::{ContentItem, ContentPayload, Cursor, Error, Result, SourceKind};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// A source backed by an in-memory list
///
/// Useful for local runs and for driving the pipeline in tests. Items can be
/// pushed at any time and a failure mode can be toggled to simulate an
/// unreachable upstream.
#[derive(Debug)]
pub struct MemorySource {
    kind: SourceKind,
    items: Mutex<Vec<ContentItem>>,
    failing: AtomicBool,
    fetches: AtomicU64,
}

impl MemorySource {
    pub fn new(kind: impl Into<SourceKind>) -> Self {
        Self {
            kind: kind.into(),
            items: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            fetches: AtomicU64::new(0),
        }
    }

    /// Append a text item at the next cursor
    pub fn push(&self, id: impl Into<String>, text: impl Into<String>) -> Cursor {
        let mut items = self.items.lock();
        let cursor = items
            .iter()
            .map(|i| i.cursor)
            .max()
            .unwrap_or(Cursor::ORIGIN)
            .next();
        items.push(ContentItem::new(
            id,
            self.kind.clone(),
            ContentPayload::text(text),
            cursor,
        ));
        cursor
    }

    /// Append a text item at an explicit cursor
    pub fn push_at(&self, id: impl Into<String>, text: impl Into<String>, cursor: Cursor) {
        self.push_item(ContentItem::new(
            id,
            self.kind.clone(),
            ContentPayload::text(text),
            cursor,
        ));
    }

    /// Append a fully built item
    pub fn push_item(&self, item: ContentItem) {
        self.items.lock().push(item);
    }

    /// Make subsequent fetches fail with `SourceUnavailable`
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// Number of fetches served or refused so far
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ContentSource for MemorySource {
    fn kind(&self) -> &SourceKind {
        &self.kind
    }

    async fn fetch_since(&self, since: Cursor) -> Result<Vec<ContentItem>> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        if self.failing.load(Ordering::Relaxed) {
            return Err(Error::source_unavailable(
                self.kind.as_str(),
                "simulated outage",
            ));
        }

        Ok(self
            .items
            .lock()
            .iter()
            .filter(|item| item.cursor > since)
            .cloned()
            .collect())
    }
}
