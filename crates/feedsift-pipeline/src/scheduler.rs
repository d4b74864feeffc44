//! Evaluation scheduler
//!
//! Each source cycles `Idle -> Polling -> Dispatching -> Idle` on a fixed
//! interval. A cycle polls the source past its cursor, publishes the new
//! watermark, and fans every new item out to the active subscriptions that
//! want it. Every (subscription, item) pair becomes an independent task that
//! evaluates, enqueues the result whatever the verdict, and only then moves
//! the subscription's cursor.

use crate::registry::SubscriptionRegistry;
use crate::subscription::Enqueued;
use feedsift_classifiers::ClassifierClient;
use feedsift_core::{ContentItem, Cursor, Error, Prompt, Result, SourceKind, SubscriptionId};
use feedsift_sources::{ContentSource, SourceAdapter};
use feedsift_telemetry::PipelineMetrics;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Delay between the start of two polls of the same source
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Evaluate whatever a source returns on its first poll instead of
    /// only using it to establish "now"
    #[serde(default)]
    pub replay_backlog_on_start: bool,

    /// Time in-flight evaluations get to finish at shutdown
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            replay_backlog_on_start: false,
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::config("scheduler.poll_interval_ms must be non-zero"));
        }
        Ok(())
    }
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

fn default_shutdown_grace_ms() -> u64 {
    5_000
}

/// Where a source is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Idle,
    Polling,
    Dispatching,
}

/// Point-in-time view of one source
#[derive(Debug, Clone, Serialize)]
pub struct SourceSnapshot {
    pub source: SourceKind,
    pub status: SourceStatus,
    /// `None` until the first successful poll
    pub cursor: Option<Cursor>,
    pub consecutive_failures: u32,
    /// Items the source discarded before they were polled
    pub dropped: u64,
}

struct SourceState {
    adapter: SourceAdapter,
    /// Serializes polls of this source
    poll_lock: tokio::sync::Mutex<()>,
    cursor: Mutex<Option<Cursor>>,
    status: Mutex<SourceStatus>,
    /// Source drop count already recorded in metrics
    dropped_recorded: AtomicU64,
}

impl SourceState {
    fn kind(&self) -> &SourceKind {
        self.adapter.kind()
    }

    fn set_status(&self, status: SourceStatus) {
        *self.status.lock() = status;
    }

    fn snapshot(&self) -> SourceSnapshot {
        SourceSnapshot {
            source: self.kind().clone(),
            status: *self.status.lock(),
            cursor: *self.cursor.lock(),
            consecutive_failures: self.adapter.consecutive_failures(),
            dropped: self.adapter.source().dropped(),
        }
    }
}

/// Drives polling and fan-out for every configured source
pub struct Scheduler {
    registry: Arc<SubscriptionRegistry>,
    classifier: ClassifierClient,
    sources: Vec<Arc<SourceState>>,
    config: SchedulerConfig,
    limiter: Arc<Semaphore>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    metrics: PipelineMetrics,
    in_flight: Arc<AtomicUsize>,
    settled: Arc<Notify>,
}

impl Scheduler {
    /// Create a scheduler
    ///
    /// `max_concurrency` bounds classifier calls in flight across all
    /// subscriptions; work beyond it waits for a permit.
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        classifier: ClassifierClient,
        sources: Vec<Arc<dyn ContentSource>>,
        config: SchedulerConfig,
        max_concurrency: usize,
        metrics: PipelineMetrics,
    ) -> Self {
        let sources = sources
            .into_iter()
            .map(|source| {
                Arc::new(SourceState {
                    adapter: SourceAdapter::new(source),
                    poll_lock: tokio::sync::Mutex::new(()),
                    cursor: Mutex::new(None),
                    status: Mutex::new(SourceStatus::Idle),
                    dropped_recorded: AtomicU64::new(0),
                })
            })
            .collect();

        Self {
            registry,
            classifier,
            sources,
            config,
            limiter: Arc::new(Semaphore::new(max_concurrency.max(1))),
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
            metrics,
            in_flight: Arc::new(AtomicUsize::new(0)),
            settled: Arc::new(Notify::new()),
        }
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Names of the configured sources
    pub fn source_kinds(&self) -> Vec<SourceKind> {
        self.sources.iter().map(|s| s.kind().clone()).collect()
    }

    pub fn sources(&self) -> Vec<SourceSnapshot> {
        self.sources.iter().map(|s| s.snapshot()).collect()
    }

    /// Evaluations dispatched but not yet completed
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Token cancelled when shutdown begins
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Poll every source once and dispatch what is new
    ///
    /// Returns the number of evaluation tasks started. The tasks run in the
    /// background; see [`Scheduler::settle`].
    pub async fn run_cycle(&self) -> usize {
        let polls = self.sources.iter().map(|source| self.poll_source(source));
        futures::future::join_all(polls).await.into_iter().sum()
    }

    /// Wait until no evaluation is in flight
    pub async fn settle(&self) {
        loop {
            let notified = self.settled.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Start the background source connections and one poll loop per source
    pub fn spawn(self: &Arc<Self>) {
        for source in &self.sources {
            source
                .adapter
                .source()
                .start(&self.tracker, self.cancel.child_token());

            let scheduler = Arc::clone(self);
            let source = Arc::clone(source);
            self.tracker.spawn(async move {
                scheduler.poll_loop(source).await;
            });
        }

        info!(
            sources = self.sources.len(),
            poll_interval_ms = self.config.poll_interval_ms,
            "scheduler started"
        );
    }

    /// Stop polling and give in-flight evaluations the grace period
    ///
    /// Subscriptions are drained first so no new work starts. Tasks still
    /// running after the grace period are abandoned.
    pub async fn shutdown(&self) {
        info!(in_flight = self.in_flight(), "scheduler shutting down");
        self.registry.drain_all();
        self.cancel.cancel();
        self.tracker.close();

        let grace = self.config.shutdown_grace();
        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => info!("scheduler stopped"),
            Err(_) => warn!(
                abandoned = self.in_flight(),
                grace_ms = grace.as_millis() as u64,
                "grace period elapsed, abandoning in-flight evaluations"
            ),
        }
    }

    async fn poll_loop(&self, source: Arc<SourceState>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.poll_source(&source).await;
                }
            }
        }
        debug!(source = %source.kind(), "poll loop stopped");
    }

    async fn poll_source(&self, source: &SourceState) -> usize {
        let _guard = source.poll_lock.lock().await;
        let kind = source.kind().clone();
        let previous = *source.cursor.lock();

        source.set_status(SourceStatus::Polling);
        let items = source
            .adapter
            .poll(previous.unwrap_or(Cursor::ORIGIN))
            .await;

        let dropped = source.adapter.source().dropped();
        let recorded = source.dropped_recorded.swap(dropped, Ordering::Relaxed);
        if dropped > recorded {
            self.metrics.record_source_drops(&kind, dropped - recorded);
        }

        if !source.adapter.last_poll_succeeded() {
            self.metrics.record_poll_failure(&kind);
            source.set_status(SourceStatus::Idle);
            return 0;
        }
        self.metrics.record_poll(&kind, items.len());

        let high = items
            .last()
            .map(|item| item.cursor)
            .or(previous)
            .unwrap_or(Cursor::ORIGIN);
        *source.cursor.lock() = Some(high);
        self.registry.observe_watermark(&kind, high);

        if previous.is_none() && !self.config.replay_backlog_on_start {
            info!(
                source = %kind,
                cursor = %high,
                skipped = items.len(),
                "source primed, backlog not evaluated"
            );
            source.set_status(SourceStatus::Idle);
            return 0;
        }

        source.set_status(SourceStatus::Dispatching);
        let mut dispatched = 0;
        for item in items {
            dispatched += self.dispatch(Arc::new(item));
        }
        source.set_status(SourceStatus::Idle);

        if dispatched > 0 {
            debug!(source = %kind, cursor = %high, dispatched, "cycle dispatched evaluations");
        }
        dispatched
    }

    fn dispatch(&self, item: Arc<ContentItem>) -> usize {
        let mut dispatched = 0;

        for id in self.registry.active_subscriptions_for(&item.source) {
            let Some(prompt) = self.registry.claim(id, &item) else {
                continue;
            };

            let task = EvaluationTask {
                subscription_id: id,
                prompt,
                item: Arc::clone(&item),
                registry: Arc::clone(&self.registry),
                classifier: self.classifier.clone(),
                metrics: self.metrics.clone(),
            };
            let limiter = Arc::clone(&self.limiter);
            let in_flight = Arc::clone(&self.in_flight);
            let settled = Arc::clone(&self.settled);

            in_flight.fetch_add(1, Ordering::AcqRel);
            self.tracker.spawn(async move {
                task.run(limiter).await;
                if in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
                    settled.notify_waiters();
                }
            });
            dispatched += 1;
        }
        dispatched
    }
}

/// One (subscription, item) evaluation
struct EvaluationTask {
    subscription_id: SubscriptionId,
    prompt: Prompt,
    item: Arc<ContentItem>,
    registry: Arc<SubscriptionRegistry>,
    classifier: ClassifierClient,
    metrics: PipelineMetrics,
}

impl EvaluationTask {
    async fn run(self, limiter: Arc<Semaphore>) {
        let Ok(_permit) = limiter.acquire_owned().await else {
            return;
        };

        let start = Instant::now();
        let result = self
            .classifier
            .evaluate(self.subscription_id, &self.prompt, &self.item)
            .await;
        self.metrics
            .record_evaluation(result.verdict, result.is_timeout(), start.elapsed());

        match self.registry.enqueue(self.subscription_id, result) {
            Ok(Enqueued::Queued { .. }) | Ok(Enqueued::Duplicate) => {}
            Err(Error::SubscriptionNotFound(_)) => {
                debug!(
                    subscription = %self.subscription_id,
                    item = %self.item.id,
                    "subscription closed before evaluation finished"
                );
            }
            Err(e) => {
                warn!(subscription = %self.subscription_id, error = %e, "enqueue failed");
            }
        }

        // Not found here means the subscription closed; nothing to advance
        let _ = self.registry.advance_cursor(self.subscription_id, &self.item);
    }
}
