//! Configuration for the classifier backend and call policy

use feedsift_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the LLM classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`)
    pub endpoint: String,

    /// Bearer token for the API
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model identifier
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens in the completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Stop sequences passed to the backend
    #[serde(default)]
    pub stop: Vec<String>,

    /// Instructions placed at the top of every classification prompt
    #[serde(default)]
    pub base_prompt: Option<String>,

    /// URL to fetch the base prompt from, once, when no inline prompt is set
    #[serde(default)]
    pub base_prompt_url: Option<String>,

    /// Call policy
    #[serde(default)]
    pub policy: CallPolicy,

    /// Maximum classification calls in flight across all subscriptions
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl ClassifierConfig {
    /// Check the configuration before any call is made
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(Error::config("classifier.endpoint must be set"));
        }
        if self.model.trim().is_empty() {
            return Err(Error::config("classifier.model must be set"));
        }
        if self.base_prompt.is_none() && self.base_prompt_url.is_none() {
            return Err(Error::config(
                "classifier needs either base_prompt or base_prompt_url",
            ));
        }
        if self.max_concurrency == 0 {
            return Err(Error::config("classifier.max_concurrency must be non-zero"));
        }
        self.policy.validate()
    }
}

/// Timeout and retry policy applied around every classifier call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallPolicy {
    /// Deadline for one evaluation, retries included
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Retries after the first attempt for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry; doubles on each further retry
    #[serde(default = "default_backoff_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound on a single backoff delay
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl CallPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay before retry number `attempt` (0-indexed)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = 2u64.saturating_pow(attempt);
        let delay_ms = self
            .backoff_base_ms
            .saturating_mul(exp)
            .min(self.backoff_max_ms);
        Duration::from_millis(delay_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(Error::config("classifier timeout must be non-zero"));
        }
        Ok(())
    }
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    512
}

fn default_timeout_ms() -> u64 {
    15_000
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    8_000
}

fn default_max_concurrency() -> usize {
    num_cpus::get() * 8
}
