//! LlmClassifier against a mock chat completions server

use feedsift_classifiers::{Classifier, ClassifierConfig, LlmClassifier};
use feedsift_core::{ContentItem, ContentPayload, Cursor, Error, Prompt, SourceKind, Verdict};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> ClassifierConfig {
    serde_json::from_value(json!({
        "endpoint": format!("{}/v1", server.uri()),
        "api_key": "sk-test",
        "model": "router-small",
        "base_prompt": "You route social posts to readers."
    }))
    .unwrap()
}

fn item() -> ContentItem {
    ContentItem::new(
        "0x5f2e8a9c",
        SourceKind::from("farcaster"),
        ContentPayload::text("Shipping a new zk prover today")
            .with_link("https://warpcast.com/alice/0x5f2e8a9c"),
        Cursor::new(3),
    )
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
}

#[tokio::test]
async fn test_recommend_decision_is_match() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_string_contains("Show me zk proofs and nothing else."))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            r#"{"decision": "recommend", "rationale": "about zk proving", "score": 0.82}"#,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let classifier = LlmClassifier::new(config(&server)).unwrap();
    let classification = classifier
        .classify(&Prompt::new("zk proofs"), &item())
        .await
        .unwrap();

    assert_eq!(classification.verdict, Verdict::Match);
    assert_eq!(classification.rationale.as_deref(), Some("about zk proving"));
    assert_eq!(classification.score, Some(0.82));
    assert_eq!(classifier.name(), "router-small");
}

#[tokio::test]
async fn test_other_decisions_are_no_match() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            "```json\n{\"decision\": \"stop\", \"rationale\": \"unrelated\"}\n```",
        )))
        .mount(&server)
        .await;

    let classifier = LlmClassifier::new(config(&server)).unwrap();
    let classification = classifier
        .classify(&Prompt::new("cooking"), &item())
        .await
        .unwrap();

    assert_eq!(classification.verdict, Verdict::NoMatch);
}

#[tokio::test]
async fn test_server_error_is_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let classifier = LlmClassifier::new(config(&server)).unwrap();
    let err = classifier
        .classify(&Prompt::new("zk proofs"), &item())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ClassifierTransport(_)));
}

#[tokio::test]
async fn test_unparseable_answer_is_response_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(completion("I would rather not say.")),
        )
        .mount(&server)
        .await;

    let classifier = LlmClassifier::new(config(&server)).unwrap();
    let err = classifier
        .classify(&Prompt::new("zk proofs"), &item())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ClassifierResponse(_)));
}

#[tokio::test]
async fn test_remote_base_prompt_is_fetched_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/prompts/router.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Remote routing rules."))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("Remote routing rules."))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            r#"{"decision": "recommend", "rationale": "ok"}"#,
        )))
        .expect(2)
        .mount(&server)
        .await;

    let mut config = config(&server);
    config.base_prompt = None;
    config.base_prompt_url = Some(format!("{}/prompts/router.txt", server.uri()));

    let classifier = LlmClassifier::new(config).unwrap();
    for _ in 0..2 {
        let classification = classifier
            .classify(&Prompt::new("zk proofs"), &item())
            .await
            .unwrap();
        assert_eq!(classification.verdict, Verdict::Match);
    }
}

#[test]
fn test_invalid_config_is_rejected() {
    let config: ClassifierConfig = serde_json::from_value(json!({
        "endpoint": "",
        "model": "router-small",
        "base_prompt": "x"
    }))
    .unwrap();

    assert!(matches!(
        LlmClassifier::new(config),
        Err(Error::ConfigurationInvalid(_))
    ));
}
