//! LLM classifier backed by an OpenAI-compatible chat completions API

use crate::config::ClassifierConfig;
use crate::prompt::{build_prompt, parse_decision};
use crate::{Classification, Classifier};
use async_trait::async_trait;
use feedsift_core::{ContentItem, Error, Prompt, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Classifier that asks a chat-completions model for a routing decision
pub struct LlmClassifier {
    config: ClassifierConfig,
    http_client: reqwest::Client,
    base_prompt: OnceCell<String>,
}

impl LlmClassifier {
    /// Create a new LLM classifier
    ///
    /// The HTTP client carries no request timeout of its own; the deadline
    /// belongs to [`crate::ClassifierClient`].
    pub fn new(config: ClassifierConfig) -> Result<Self> {
        config.validate()?;

        let http_client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_prompt: OnceCell::new_with(config.base_prompt.clone()),
            config,
            http_client,
        })
    }

    /// Resolve the base prompt, fetching it once if it is remote
    async fn base_prompt(&self) -> Result<&str> {
        let prompt = self
            .base_prompt
            .get_or_try_init(|| async {
                let url = self.config.base_prompt_url.as_deref().ok_or_else(|| {
                    Error::config("classifier needs either base_prompt or base_prompt_url")
                })?;

                info!(url = %url, "fetching base prompt");
                let response = self
                    .http_client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| Error::classifier_transport(format!("base prompt: {}", e)))?;

                let status = response.status();
                if !status.is_success() {
                    return Err(status_error(status, "base prompt"));
                }

                response
                    .text()
                    .await
                    .map_err(|e| Error::classifier_transport(format!("base prompt: {}", e)))
            })
            .await?;

        Ok(prompt.as_str())
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'))
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, prompt: &Prompt, item: &ContentItem) -> Result<Classification> {
        let base_prompt = self.base_prompt().await?;
        let content = build_prompt(base_prompt, prompt, item);

        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &content,
            }],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stop: (!self.config.stop.is_empty()).then_some(self.config.stop.as_slice()),
        };

        let mut builder = self
            .http_client
            .post(self.completions_url())
            .header("Content-Type", "application/json")
            .json(&request);
        if let Some(api_key) = &self.config.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::classifier_transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, "chat completion"));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::classifier_response(format!("invalid completion body: {}", e)))?;

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::classifier_response("completion has no content"))?;

        debug!(item = %item.id, response = %text, "model response");

        Ok(parse_decision(&text)?.into_classification())
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

/// Map an HTTP failure status to the classifier error taxonomy
fn status_error(status: StatusCode, what: &str) -> Error {
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        Error::classifier_transport(format!("{} returned HTTP {}", what, status.as_u16()))
    } else {
        Error::classifier_response(format!("{} returned HTTP {}", what, status.as_u16()))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, "x"),
            Error::ClassifierTransport(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, "x"),
            Error::ClassifierTransport(_)
        ));
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, "x"),
            Error::ClassifierResponse(_)
        ));
    }
}
