//! Mock classifiers for testing
//!
//! Provides configurable mock implementations of the Classifier trait
//! for testing the client's deadline, retry and isolation behavior.

use async_trait::async_trait;
use feedsift_classifiers::{CallPolicy, Classification, Classifier, ClassifierClient};
use feedsift_core::{
    ContentItem, ContentPayload, Cursor, Error, Prompt, Result, SourceKind, SubscriptionId,
    Verdict,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// A classifier that matches items whose text contains a keyword
pub struct MockClassifier {
    keyword: String,
    simulated_latency: Option<Duration>,
    call_count: AtomicU32,
}

impl MockClassifier {
    /// Create a new mock classifier matching the given keyword
    pub fn new(keyword: &str) -> Self {
        Self {
            keyword: keyword.to_string(),
            simulated_latency: None,
            call_count: AtomicU32::new(0),
        }
    }

    /// Set simulated latency for this classifier
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.simulated_latency = Some(latency);
        self
    }

    /// Get the number of times classify was called
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    async fn classify(&self, _prompt: &Prompt, item: &ContentItem) -> Result<Classification> {
        self.call_count.fetch_add(1, Ordering::Relaxed);

        if let Some(latency) = self.simulated_latency {
            tokio::time::sleep(latency).await;
        }

        if item.payload.text.contains(&self.keyword) {
            Ok(Classification::matched(format!("mentions {}", self.keyword)).with_score(0.9))
        } else {
            Ok(Classification::no_match())
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// A classifier that fails a fixed number of times before answering
pub struct FlakyClassifier {
    failures: u32,
    error: fn() -> Error,
    call_count: AtomicU32,
}

impl FlakyClassifier {
    /// Fail `failures` times with a transport error, then match
    pub fn new(failures: u32) -> Self {
        Self {
            failures,
            error: || Error::classifier_transport("connection reset by peer"),
            call_count: AtomicU32::new(0),
        }
    }

    /// Use a custom error for the failing attempts
    pub fn with_error(mut self, error: fn() -> Error) -> Self {
        self.error = error;
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Classifier for FlakyClassifier {
    async fn classify(&self, _prompt: &Prompt, _item: &ContentItem) -> Result<Classification> {
        let call = self.call_count.fetch_add(1, Ordering::Relaxed);
        if call < self.failures {
            Err((self.error)())
        } else {
            Ok(Classification::matched("recovered"))
        }
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

/// A classifier that never answers items containing "hang"
pub struct HangingClassifier;

#[async_trait]
impl Classifier for HangingClassifier {
    async fn classify(&self, _prompt: &Prompt, item: &ContentItem) -> Result<Classification> {
        if item.payload.text.contains("hang") {
            std::future::pending::<()>().await;
        }
        Ok(Classification::matched("answered"))
    }

    fn name(&self) -> &str {
        "hanging"
    }
}

fn item(id: &str, text: &str) -> ContentItem {
    ContentItem::new(
        id,
        SourceKind::from("casts"),
        ContentPayload::text(text),
        Cursor::new(1),
    )
}

fn client(classifier: Arc<dyn Classifier>) -> ClassifierClient {
    ClassifierClient::new(classifier, CallPolicy::default())
}

#[tokio::test]
async fn test_mock_classifier_verdicts() {
    let mock = Arc::new(MockClassifier::new("rust"));
    let client = client(mock.clone());
    let prompt = Prompt::new("rust news");
    let sub = SubscriptionId::new();

    let hit = client.evaluate(sub, &prompt, &item("1", "new rust release")).await;
    assert_eq!(hit.verdict, Verdict::Match);
    assert_eq!(hit.rationale.as_deref(), Some("mentions rust"));
    assert_eq!(hit.score, Some(0.9));
    assert_eq!(hit.subscription_id, sub);

    let miss = client.evaluate(sub, &prompt, &item("2", "gm")).await;
    assert_eq!(miss.verdict, Verdict::NoMatch);
    assert_eq!(mock.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_classifier_resolves_as_timeout() {
    let client = client(Arc::new(HangingClassifier));
    let start = Instant::now();

    let result = client
        .evaluate(SubscriptionId::new(), &Prompt::new("x"), &item("1", "hang forever"))
        .await;

    assert!(result.is_timeout());
    assert_eq!(result.verdict, Verdict::NoMatch);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(15));
    assert!(elapsed < Duration::from_secs(16));
}

#[tokio::test(start_paused = true)]
async fn test_hanging_evaluation_does_not_block_others() {
    let client = client(Arc::new(HangingClassifier));
    let prompt = Prompt::new("x");
    let start = Instant::now();

    let hang_item = item("1", "hang");
    let stuck = client.evaluate(SubscriptionId::new(), &prompt, &hang_item);
    let quick = async {
        let result = client
            .evaluate(SubscriptionId::new(), &prompt, &item("2", "fine"))
            .await;
        (result, start.elapsed())
    };

    let (stuck, (quick, quick_elapsed)) = tokio::join!(stuck, quick);

    assert!(stuck.is_timeout());
    assert_eq!(quick.verdict, Verdict::Match);
    assert!(quick_elapsed < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried() {
    let flaky = Arc::new(FlakyClassifier::new(2));
    let client = client(flaky.clone());
    let start = Instant::now();

    let result = client
        .evaluate(SubscriptionId::new(), &Prompt::new("x"), &item("1", "gm"))
        .await;

    assert_eq!(result.verdict, Verdict::Match);
    assert_eq!(flaky.call_count(), 3);
    // Backoff of 500ms then 1000ms
    assert!(start.elapsed() >= Duration::from_millis(1500));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_record_no_match() {
    let flaky = Arc::new(FlakyClassifier::new(10));
    let client = client(flaky.clone());

    let result = client
        .evaluate(SubscriptionId::new(), &Prompt::new("x"), &item("1", "gm"))
        .await;

    assert_eq!(result.verdict, Verdict::NoMatch);
    assert!(!result.is_timeout());
    assert!(result
        .rationale
        .as_deref()
        .unwrap()
        .starts_with("classifier error"));
    assert_eq!(flaky.call_count(), 3);
}

#[tokio::test]
async fn test_invalid_response_is_not_retried() {
    let flaky =
        Arc::new(FlakyClassifier::new(1).with_error(|| Error::classifier_response("not json")));
    let client = client(flaky.clone());

    let result = client
        .evaluate(SubscriptionId::new(), &Prompt::new("x"), &item("1", "gm"))
        .await;

    assert_eq!(result.verdict, Verdict::NoMatch);
    assert_eq!(flaky.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_covers_retries() {
    let slow = Arc::new(MockClassifier::new("gm").with_latency(Duration::from_secs(20)));
    let client = ClassifierClient::new(
        slow.clone(),
        CallPolicy {
            timeout_ms: 5_000,
            ..CallPolicy::default()
        },
    );

    let result = client
        .evaluate(SubscriptionId::new(), &Prompt::new("x"), &item("1", "gm"))
        .await;

    assert!(result.is_timeout());
    assert_eq!(slow.call_count(), 1);
}
