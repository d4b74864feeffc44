//! feedsift Classifiers
//!
//! Classifiers decide whether a content item matches a subscriber's prompt.
//!
//! - [`Classifier`] is the backend seam: one attempt, one verdict
//! - [`ClassifierClient`] applies the deadline and the retry policy, and
//!   always resolves to an [`feedsift_core::EvaluationResult`]
//! - [`LlmClassifier`] talks to an OpenAI-compatible chat completions API

pub mod classifier;
pub mod client;
pub mod config;
pub mod llm;
pub mod prompt;

pub use classifier::{Classification, Classifier};
pub use client::{is_retryable, ClassifierClient};
pub use config::{CallPolicy, ClassifierConfig};
pub use llm::LlmClassifier;
pub use prompt::{build_prompt, parse_decision, LlmDecision};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classifier::{Classification, Classifier};
    pub use crate::client::ClassifierClient;
    pub use crate::config::{CallPolicy, ClassifierConfig};
    pub use crate::llm::LlmClassifier;
}
