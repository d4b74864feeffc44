//! Classifier trait and common types

use async_trait::async_trait;
use feedsift_core::{ContentItem, Prompt, Result, Verdict};

/// Trait for all classifiers
///
/// Implementations perform a single attempt. Deadlines and retries are
/// applied by [`crate::ClassifierClient`], so a classifier should surface
/// transient failures as [`feedsift_core::Error::ClassifierTransport`] and
/// unusable answers as [`feedsift_core::Error::ClassifierResponse`].
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Judge whether the item matches the prompt
    async fn classify(&self, prompt: &Prompt, item: &ContentItem) -> Result<Classification>;

    /// Get the classifier name
    fn name(&self) -> &str;
}

/// Verdict returned by a classifier
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Match or no match
    pub verdict: Verdict,

    /// Explanation for the verdict
    pub rationale: Option<String>,

    /// Confidence or relevance score, when reported
    pub score: Option<f64>,
}

impl Classification {
    /// Create a new classification
    pub fn new(verdict: Verdict) -> Self {
        Self {
            verdict,
            rationale: None,
            score: None,
        }
    }

    /// A match with a rationale
    pub fn matched(rationale: impl Into<String>) -> Self {
        Self::new(Verdict::Match).with_rationale(rationale)
    }

    /// A non-match without rationale
    pub fn no_match() -> Self {
        Self::new(Verdict::NoMatch)
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }
}
