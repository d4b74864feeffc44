//! Deadline and retry wrapper around a [`Classifier`]

use crate::config::CallPolicy;
use crate::{Classification, Classifier};
use feedsift_core::{
    ContentItem, Error, EvaluationResult, Prompt, Result, SubscriptionId, Verdict,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Classifier client used by the scheduler
///
/// `evaluate` never fails: a call that outlives the deadline resolves to a
/// `NoMatch` with rationale `"timeout"`, and a call whose retries are
/// exhausted resolves to a `NoMatch` describing the last error.
#[derive(Clone)]
pub struct ClassifierClient {
    classifier: Arc<dyn Classifier>,
    policy: CallPolicy,
}

impl ClassifierClient {
    /// Wrap a classifier with the given call policy
    pub fn new(classifier: Arc<dyn Classifier>, policy: CallPolicy) -> Self {
        Self { classifier, policy }
    }

    pub fn policy(&self) -> &CallPolicy {
        &self.policy
    }

    /// Name of the wrapped classifier
    pub fn name(&self) -> &str {
        self.classifier.name()
    }

    /// Evaluate one item for one subscription
    pub async fn evaluate(
        &self,
        subscription_id: SubscriptionId,
        prompt: &Prompt,
        item: &ContentItem,
    ) -> EvaluationResult {
        let start = Instant::now();
        let outcome =
            tokio::time::timeout(self.policy.timeout(), self.classify_with_retries(prompt, item))
                .await;

        match outcome {
            Ok(Ok(classification)) => {
                debug!(
                    classifier = %self.classifier.name(),
                    item = %item.id,
                    verdict = classification.verdict.as_str(),
                    latency_ms = start.elapsed().as_millis() as u64,
                    "item classified"
                );
                into_result(subscription_id, item, classification)
            }
            Ok(Err(e)) => {
                warn!(
                    classifier = %self.classifier.name(),
                    item = %item.id,
                    error = %e,
                    "classification failed, recording no match"
                );
                EvaluationResult::new(
                    subscription_id,
                    item,
                    Verdict::NoMatch,
                    Some(format!("classifier error: {}", e)),
                )
            }
            Err(_) => {
                warn!(
                    classifier = %self.classifier.name(),
                    item = %item.id,
                    timeout_ms = self.policy.timeout_ms,
                    "classification timed out"
                );
                EvaluationResult::timeout(subscription_id, item)
            }
        }
    }

    async fn classify_with_retries(
        &self,
        prompt: &Prompt,
        item: &ContentItem,
    ) -> Result<Classification> {
        let mut attempt = 0;

        loop {
            match self.classifier.classify(prompt, item).await {
                Ok(classification) => {
                    if attempt > 0 {
                        debug!(
                            classifier = %self.classifier.name(),
                            attempt,
                            "classification succeeded after retry"
                        );
                    }
                    return Ok(classification);
                }
                Err(err) => {
                    if !is_retryable(&err) || attempt >= self.policy.max_retries {
                        return Err(err);
                    }

                    let delay = self.policy.backoff(attempt);
                    warn!(
                        classifier = %self.classifier.name(),
                        attempt = attempt + 1,
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying classification after transient error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Determines whether a classifier error should be retried
pub fn is_retryable(err: &Error) -> bool {
    matches!(
        err,
        Error::ClassifierTransport(_) | Error::ClassifierTimeout | Error::Io(_)
    )
}

fn into_result(
    subscription_id: SubscriptionId,
    item: &ContentItem,
    classification: Classification,
) -> EvaluationResult {
    let result = EvaluationResult::new(
        subscription_id,
        item,
        classification.verdict,
        classification.rationale,
    );
    match classification.score {
        Some(score) => result.with_score(score),
        None => result,
    }
}
