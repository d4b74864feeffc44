//! Client subscriptions
//!
//! A subscription holds one client's prompt, its per-source cursors and its
//! outbound result queue. All mutable state sits behind a single lock per
//! subscription so that state checks and queue mutation are atomic with
//! respect to each other, while different subscriptions never contend.

use feedsift_core::{
    ContentItem, Cursor, Error, EvaluationResult, Prompt, Result, ResultQueue, SourceKind,
    SubscriptionId,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use tokio::sync::Notify;

/// Content items are identified per source
type ItemKey = (SourceKind, String);

/// Lifecycle of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    /// Receives new work and results
    Active,
    /// Accepts results of work already started, but no new work
    Draining,
    /// Removed from the registry; results are discarded
    Closed,
}

/// Outcome of an enqueue that reached an open subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// Appended; `evicted` older results were dropped to respect the
    /// high-water mark
    Queued { evicted: usize },
    /// A result for this item was already queued or delivered
    Duplicate,
}

/// One client's standing request
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    prompt: Prompt,
    /// `None` subscribes to every source
    source_filter: Option<BTreeSet<SourceKind>>,
    inner: Mutex<Inner>,
    notify: Notify,
}

#[derive(Debug)]
struct Inner {
    state: SubscriptionState,
    cursors: HashMap<SourceKind, Cursor>,
    queue: ResultQueue,
    seen: SeenWindow,
    in_flight: HashSet<ItemKey>,
}

impl Subscription {
    pub(crate) fn new(
        prompt: Prompt,
        source_filter: Option<BTreeSet<SourceKind>>,
        cursors: HashMap<SourceKind, Cursor>,
        high_water_mark: usize,
        dedupe_window: usize,
    ) -> Self {
        Self {
            id: SubscriptionId::new(),
            prompt,
            source_filter,
            inner: Mutex::new(Inner {
                state: SubscriptionState::Active,
                cursors,
                queue: ResultQueue::new(high_water_mark),
                seen: SeenWindow::new(dedupe_window),
                in_flight: HashSet::new(),
            }),
            notify: Notify::new(),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn prompt(&self) -> &Prompt {
        &self.prompt
    }

    pub fn source_filter(&self) -> Option<&BTreeSet<SourceKind>> {
        self.source_filter.as_ref()
    }

    /// Whether items from `source` are of interest
    pub fn accepts(&self, source: &SourceKind) -> bool {
        self.source_filter
            .as_ref()
            .map_or(true, |filter| filter.contains(source))
    }

    pub fn state(&self) -> SubscriptionState {
        self.inner.lock().state
    }

    pub fn is_active(&self) -> bool {
        self.state() == SubscriptionState::Active
    }

    /// Last fully processed cursor for a source
    pub fn cursor(&self, source: &SourceKind) -> Cursor {
        self.inner
            .lock()
            .cursors
            .get(source)
            .copied()
            .unwrap_or(Cursor::ORIGIN)
    }

    /// Results waiting for the delivery loop
    pub fn pending(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn pending_matches(&self) -> usize {
        self.inner.lock().queue.pending_matches()
    }

    /// Results dropped over the high-water mark so far
    pub fn evicted(&self) -> u64 {
        self.inner.lock().queue.evicted()
    }

    /// Evaluations started but not yet completed
    pub fn in_flight(&self) -> usize {
        self.inner.lock().in_flight.len()
    }

    /// Reserve an item for evaluation
    ///
    /// Succeeds only while active, for an accepted source, for an item past
    /// the subscription's cursor that is neither being evaluated nor already
    /// evaluated.
    pub(crate) fn claim(&self, item: &ContentItem) -> bool {
        if !self.accepts(&item.source) {
            return false;
        }

        let mut inner = self.inner.lock();
        if inner.state != SubscriptionState::Active {
            return false;
        }

        let cursor = inner
            .cursors
            .get(&item.source)
            .copied()
            .unwrap_or(Cursor::ORIGIN);
        if item.cursor <= cursor {
            return false;
        }

        let key = (item.source.clone(), item.id.clone());
        if inner.seen.contains(&key) || inner.in_flight.contains(&key) {
            return false;
        }
        inner.in_flight.insert(key);
        true
    }

    pub(crate) fn enqueue(&self, result: EvaluationResult) -> Result<Enqueued> {
        let mut inner = self.inner.lock();
        if inner.state == SubscriptionState::Closed {
            return Err(Error::SubscriptionNotFound(self.id));
        }

        let key = (result.source.clone(), result.content_item_id.clone());
        if !inner.seen.insert(key) {
            return Ok(Enqueued::Duplicate);
        }

        let evicted = inner.queue.push(result);
        drop(inner);

        self.notify.notify_one();
        Ok(Enqueued::Queued { evicted })
    }

    /// Mark an item's evaluation finished and move the cursor past it
    pub(crate) fn complete(&self, item: &ContentItem) {
        let mut inner = self.inner.lock();
        inner
            .in_flight
            .remove(&(item.source.clone(), item.id.clone()));

        let cursor = inner
            .cursors
            .entry(item.source.clone())
            .or_insert(Cursor::ORIGIN);
        if item.cursor > *cursor {
            *cursor = item.cursor;
        }
        let idle = inner.in_flight.is_empty() && inner.state == SubscriptionState::Draining;
        drop(inner);

        if idle {
            self.notify.notify_one();
        }
    }

    /// Take the oldest queued result
    pub fn pop(&self) -> Option<EvaluationResult> {
        self.inner.lock().queue.pop()
    }

    /// Stop accepting new work
    pub(crate) fn drain(&self) {
        let mut inner = self.inner.lock();
        if inner.state == SubscriptionState::Active {
            inner.state = SubscriptionState::Draining;
        }
        drop(inner);
        self.notify.notify_one();
    }

    /// Close the subscription and release its queue
    pub(crate) fn close(&self) {
        let mut inner = self.inner.lock();
        inner.state = SubscriptionState::Closed;
        inner.queue.clear();
        inner.in_flight.clear();
        drop(inner);
        self.notify.notify_one();
    }

    /// Whether the delivery loop has nothing left to wait for
    pub(crate) fn is_finished(&self) -> bool {
        let inner = self.inner.lock();
        match inner.state {
            SubscriptionState::Active => false,
            SubscriptionState::Draining => inner.queue.is_empty() && inner.in_flight.is_empty(),
            SubscriptionState::Closed => true,
        }
    }

    /// Wait until a result is queued or the state changes
    pub(crate) async fn changed(&self) {
        self.notify.notified().await;
    }
}

/// Bounded memory of item keys already enqueued
#[derive(Debug)]
struct SeenWindow {
    capacity: usize,
    keys: HashSet<ItemKey>,
    order: VecDeque<ItemKey>,
}

impl SeenWindow {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            keys: HashSet::new(),
            order: VecDeque::new(),
        }
    }

    fn contains(&self, key: &ItemKey) -> bool {
        self.keys.contains(key)
    }

    /// Returns false if the key was already present
    fn insert(&mut self, key: ItemKey) -> bool {
        if !self.keys.insert(key.clone()) {
            return false;
        }
        self.order.push_back(key);
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.keys.remove(&oldest);
            }
        }
        true
    }
}
