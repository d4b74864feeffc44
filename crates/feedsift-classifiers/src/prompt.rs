//! Classification prompt construction and verdict parsing

use crate::Classification;
use feedsift_core::{ContentItem, Error, Prompt, Result, Verdict};
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

/// Prefix some models put in front of their JSON answer
const OUTPUT_PREFIX: &str = "Here is the output:";

/// Decision value that maps to [`Verdict::Match`]
const MATCH_DECISION: &str = "recommend";

fn fence_pattern() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("fence pattern is valid")
    })
}

/// Build the full classification prompt for one item
pub fn build_prompt(base_prompt: &str, prompt: &Prompt, item: &ContentItem) -> String {
    let payload = &item.payload;
    let author = match (&payload.author, &payload.author_handle) {
        (Some(name), Some(handle)) => format!("{} (@{})", name, handle),
        (Some(name), None) => name.clone(),
        (None, Some(handle)) => format!("@{}", handle),
        (None, None) => "unknown".to_string(),
    };

    format!(
        r#"{base}

-------------------
Here is the conversation history to check intent:
- User: Show me {prompt} and nothing else.
-------------------
New {source} update to evaluate:

Text: {text}
Link: {link}
Author: {author}

Output response only in JSON format with the following structure:
{{
    "decision": "recommend" | "inappropriate" | "stop",
    "rationale": "explanation for the decision",
    "score": numeric_value,
    "message": "update message for the conversation"
}}"#,
        base = base_prompt.trim(),
        prompt = prompt.as_str(),
        source = item.source,
        text = payload.text,
        link = payload.link.as_deref().unwrap_or("n/a"),
        author = author,
    )
}

/// Decision object the model is asked to produce
#[derive(Debug, Clone, Deserialize)]
pub struct LlmDecision {
    pub decision: String,

    #[serde(default)]
    pub rationale: Option<String>,

    #[serde(default)]
    pub score: Option<serde_json::Value>,

    #[serde(default)]
    pub message: Option<String>,
}

impl LlmDecision {
    pub fn verdict(&self) -> Verdict {
        if self.decision.trim().eq_ignore_ascii_case(MATCH_DECISION) {
            Verdict::Match
        } else {
            Verdict::NoMatch
        }
    }

    /// Numeric score, accepting numbers encoded as strings
    pub fn score(&self) -> Option<f64> {
        match self.score.as_ref()? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn into_classification(self) -> Classification {
        let mut classification = Classification::new(self.verdict());
        classification.score = self.score();
        classification.rationale = self.rationale.filter(|r| !r.trim().is_empty());
        classification
    }
}

/// Parse a model response into a decision
///
/// Accepts bare JSON, JSON inside a markdown fence, JSON preceded by a
/// prose prefix, and JSON whose closing brace was consumed as a stop
/// sequence.
pub fn parse_decision(response: &str) -> Result<LlmDecision> {
    let mut text = response.trim();

    if let Some(idx) = text.rfind(OUTPUT_PREFIX) {
        text = text[idx + OUTPUT_PREFIX.len()..].trim();
    }

    let unfenced;
    if let Some(captures) = fence_pattern().captures(text) {
        unfenced = captures.get(1).map(|m| m.as_str()).unwrap_or_default().to_string();
        text = unfenced.as_str();
    }

    if let Ok(decision) = serde_json::from_str::<LlmDecision>(text) {
        return Ok(decision);
    }

    let start = text
        .find('{')
        .ok_or_else(|| Error::classifier_response("no JSON object in response"))?;
    let candidate = match text.rfind('}') {
        Some(end) if end > start => text[start..=end].to_string(),
        _ => format!("{}}}", &text[start..]),
    };

    serde_json::from_str::<LlmDecision>(&candidate)
        .or_else(|_| serde_json::from_str::<LlmDecision>(&format!("{}}}", candidate)))
        .map_err(|e| Error::classifier_response(format!("failed to parse decision: {}", e)))
}
