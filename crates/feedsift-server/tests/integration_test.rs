//! Router-level tests: request validation, the SSE stream, and config loading

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use feedsift_classifiers::{Classification, Classifier};
use feedsift_core::{ContentItem, Prompt, Result};
use feedsift_server::{create_router, AppState, ServerConfig};
use feedsift_sources::{ContentSource, MemorySource};
use futures::StreamExt;
use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const CONFIG: &str = r#"
classifier:
  endpoint: http://127.0.0.1:9/v1
  model: test-model
  base_prompt: You filter posts for a reader.
sources:
  - name: casts
    type: memory
  - name: events
    type: memory
scheduler:
  replay_backlog_on_start: false
"#;

/// Matches the listed item ids
struct IdClassifier(HashSet<String>);

#[async_trait]
impl Classifier for IdClassifier {
    async fn classify(&self, _prompt: &Prompt, item: &ContentItem) -> Result<Classification> {
        if self.0.contains(&item.id) {
            Ok(Classification::matched(format!("{} is relevant", item.id)))
        } else {
            Ok(Classification::no_match())
        }
    }

    fn name(&self) -> &str {
        "ids"
    }
}

struct Harness {
    state: AppState,
    casts: Arc<MemorySource>,
}

impl Harness {
    fn new(matching: &[&str]) -> Self {
        Self::with_config(CONFIG, matching)
    }

    fn with_config(yaml: &str, matching: &[&str]) -> Self {
        let config = ServerConfig::from_yaml(yaml).unwrap();
        config.validate().unwrap();

        let casts = Arc::new(MemorySource::new("casts"));
        let events = Arc::new(MemorySource::new("events"));
        let sources: Vec<Arc<dyn ContentSource>> = vec![casts.clone(), events];
        let classifier = Arc::new(IdClassifier(
            matching.iter().map(|s| s.to_string()).collect(),
        ));

        let state = AppState::with_components(config, classifier, sources, None);
        Self { state, casts }
    }

    fn app(&self) -> Router {
        create_router(self.state.clone())
    }

    async fn cycle(&self) {
        self.state.scheduler.run_cycle().await;
        self.state.scheduler.settle().await;
    }
}

async fn get(app: Router, uri: &str) -> Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let harness = Harness::new(&[]);
    let response = get(harness.app(), "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "OK");
}

#[tokio::test]
async fn test_missing_prompt_is_rejected() {
    let harness = Harness::new(&[]);

    for uri in ["/", "/?prompt=", "/?prompt=%20%20", "/v1/stream"] {
        let response = get(harness.app(), uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        assert!(body_text(response)
            .await
            .contains("Missing 'prompt' parameter"));
    }
    assert!(harness.state.registry.is_empty());
}

#[tokio::test]
async fn test_unknown_source_is_rejected() {
    let harness = Harness::new(&[]);
    let response = get(harness.app(), "/?prompt=zk&sources=casts,nope").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["error"]["type"], "invalid_request_error");
    assert_eq!(body["error"]["message"], "Unknown source 'nope'");
    assert!(harness.state.registry.is_empty());
}

#[tokio::test]
async fn test_unknown_route() {
    let harness = Harness::new(&[]);
    let response = get(harness.app(), "/nope").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_without_exporter() {
    let harness = Harness::new(&[]);
    let response = get(harness.app(), "/metrics").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_stream_delivers_only_matches() {
    let harness = Harness::new(&["1", "3"]);
    harness.cycle().await;

    let response = get(harness.app(), "/?prompt=zk%20proofs&sources=casts").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
    assert_eq!(harness.state.registry.len(), 1);

    harness.casts.push("1", "zero knowledge rollups");
    harness.casts.push("2", "gm");
    harness.cycle().await;
    harness.casts.push("3", "plonk vs groth16");
    harness.cycle().await;

    let mut body = response.into_body().into_data_stream();
    let mut text = String::new();
    while text.matches("data:").count() < 2 {
        let chunk = tokio::time::timeout(Duration::from_secs(5), body.next())
            .await
            .expect("no event within 5s")
            .expect("stream ended early")
            .unwrap();
        text.push_str(std::str::from_utf8(&chunk).unwrap());
    }

    assert!(text.contains("id: 1\n"));
    assert!(text.contains(r#""contentItemId":"1""#));
    assert!(text.contains(r#""rationale":"1 is relevant""#));
    assert!(text.contains(r#""contentItemId":"3""#));
    assert!(!text.contains(r#""contentItemId":"2""#));
    assert!(text.find(r#""contentItemId":"1""#) < text.find(r#""contentItemId":"3""#));

    let stats = harness.state.metrics.snapshot();
    assert_eq!(stats.evaluations, 3);
    assert_eq!(stats.events_delivered, 2);

    drop(body);
    assert!(harness.state.registry.is_empty());
}

#[tokio::test]
async fn test_stream_filtered_to_other_source_sees_nothing() {
    let harness = Harness::new(&["1"]);
    harness.cycle().await;

    let _response = get(harness.app(), "/v1/stream?prompt=meetups&sources=events").await;
    harness.casts.push("1", "zero knowledge rollups");
    harness.cycle().await;

    assert_eq!(harness.state.metrics.snapshot().evaluations, 0);
}

#[tokio::test]
async fn test_quiet_stream_outlives_idle_timeout_while_read() {
    let yaml = format!("{}delivery:\n  idle_timeout_secs: 2\n  keepalive_secs: 1\n", CONFIG);
    let harness = Harness::with_config(&yaml, &[]);
    harness.cycle().await;

    let response = get(harness.app(), "/?prompt=rarely%20matches").await;
    let started = std::time::Instant::now();

    let mut body = response.into_body().into_data_stream();
    let mut keepalives = 0;
    while keepalives < 4 {
        let chunk = tokio::time::timeout(Duration::from_secs(5), body.next())
            .await
            .expect("no keep-alive within 5s")
            .expect("stream ended while the client was reading")
            .unwrap();
        let text = std::str::from_utf8(&chunk).unwrap();
        keepalives += text.lines().filter(|line| *line == ":").count();
    }

    assert!(started.elapsed() > Duration::from_secs(2));
    assert_eq!(harness.state.registry.len(), 1);

    drop(body);
    assert!(harness.state.registry.is_empty());
}

#[tokio::test]
async fn test_shutdown_ends_open_streams() {
    let harness = Harness::new(&["1"]);
    harness.cycle().await;

    let response = get(harness.app(), "/?prompt=anything").await;
    harness.casts.push("1", "zero knowledge rollups");
    harness.cycle().await;

    harness.state.shutdown().await;

    let mut body = response.into_body().into_data_stream();
    let mut text = String::new();
    loop {
        let next = tokio::time::timeout(Duration::from_secs(5), body.next())
            .await
            .expect("stream did not end after shutdown");
        match next {
            Some(chunk) => text.push_str(std::str::from_utf8(&chunk.unwrap()).unwrap()),
            None => break,
        }
    }

    // Matches queued before shutdown are still flushed
    assert!(text.contains(r#""contentItemId":"1""#));
}

#[tokio::test]
async fn test_stats_lists_sources_and_subscriptions() {
    let harness = Harness::new(&[]);
    harness.cycle().await;
    let _stream = get(harness.app(), "/?prompt=anything").await;

    let response = get(harness.app(), "/stats").await;
    assert_eq!(response.status(), StatusCode::OK);
    let stats: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();

    assert_eq!(stats["sources"].as_array().unwrap().len(), 2);
    assert_eq!(stats["subscriptions"].as_array().unwrap().len(), 1);
    assert_eq!(stats["metrics"]["active_subscriptions"], 1);
    assert_eq!(stats["metrics"]["source_drops"], 0);
    assert_eq!(stats["sources"][0]["dropped"], 0);
}

#[tokio::test]
async fn test_state_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
listen:
  port: 9321
classifier:
  endpoint: http://127.0.0.1:9/v1
  model: test-model
  base_prompt: You filter posts for a reader.
sources:
  - name: casts
    type: http_poll
    url: http://127.0.0.1:9/casts
  - name: live
    type: sse
    url: http://127.0.0.1:9/discovery/updates?sources[]=casts
"#
    )
    .unwrap();

    let config = ServerConfig::load(file.path()).unwrap();
    assert_eq!(config.listen.socket_addr().unwrap().port(), 9321);

    let state = AppState::new(config, None).unwrap();
    assert_eq!(state.scheduler.source_kinds().len(), 2);
}

#[tokio::test]
async fn test_invalid_config_file_is_refused() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
classifier:
  endpoint: http://127.0.0.1:9/v1
  model: test-model
sources:
  - name: casts
    type: http_poll
    url: http://127.0.0.1:9/casts
"#
    )
    .unwrap();

    let config = ServerConfig::load(file.path()).unwrap();
    let err = AppState::new(config, None).err().unwrap();
    assert!(err.to_string().contains("base_prompt"));
}
