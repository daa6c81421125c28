//! Ordered fallback over external recognition providers.
//!
//! Providers are tried strictly one after another. The chain stops at the
//! first result whose confidence reaches the acceptance threshold; failures
//! and misses only move it on to the next provider. When every provider is
//! exhausted the best result seen so far is returned.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use super::confidence::ConfidenceModel;
use super::domain::{ProviderError, RecognitionResult, ScoredMatch, Segment};
use super::traits::RecognitionProvider;

/// Upper bound for the random jitter added to each backoff.
const MAX_JITTER_MS: u64 = 250;

/// A provider together with its call policy.
pub struct ChainEntry {
    pub provider: Arc<dyn RecognitionProvider>,
    pub timeout: Duration,
    /// Retries after the first attempt, transient failures only
    pub retries: u32,
    /// Base delay before the first retry; doubles each time
    pub backoff: Duration,
}

impl ChainEntry {
    pub fn new(provider: Arc<dyn RecognitionProvider>, timeout: Duration, retries: u32) -> Self {
        Self {
            provider,
            timeout,
            retries,
            backoff: Duration::from_millis(500),
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Result of running the chain.
#[derive(Debug, Clone, Default)]
pub struct ChainOutcome {
    /// Highest-confidence match observed, accepted or not
    pub best: Option<ScoredMatch>,
    /// Whether `best` reached the threshold
    pub accepted: bool,
    /// Names of the providers that were actually called
    pub consulted: Vec<String>,
}

pub struct RecognitionChain {
    entries: Vec<ChainEntry>,
    model: Arc<ConfidenceModel>,
    acceptance_threshold: f64,
}

impl RecognitionChain {
    pub fn new(
        entries: Vec<ChainEntry>,
        model: Arc<ConfidenceModel>,
        acceptance_threshold: f64,
    ) -> Self {
        Self {
            entries,
            model,
            acceptance_threshold,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run providers in priority order until one is accepted.
    pub async fn recognize(&self, segment: &Segment) -> ChainOutcome {
        let mut outcome = ChainOutcome::default();

        for entry in &self.entries {
            let name = entry.provider.name().to_string();
            outcome.consulted.push(name.clone());

            let result = match call_with_retries(entry, segment).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(target: "chain", provider = %name, "Provider failed: {}", e);
                    continue;
                }
            };

            let Some(m) = result.into_match() else {
                tracing::debug!(target: "chain", provider = %name, "No match");
                continue;
            };

            let scored = self.model.score(m);
            tracing::debug!(
                target: "chain",
                provider = %name,
                confidence = scored.confidence,
                candidate = %scored.matched.candidate.label(),
                "Provider match"
            );

            let accepted = scored.confidence >= self.acceptance_threshold;
            let better = outcome
                .best
                .as_ref()
                .is_none_or(|best| scored.confidence > best.confidence);
            if better {
                outcome.best = Some(scored);
            }
            if accepted {
                outcome.accepted = true;
                return outcome;
            }
        }

        outcome
    }
}

/// One provider call with timeout and bounded retries.
async fn call_with_retries(
    entry: &ChainEntry,
    segment: &Segment,
) -> Result<RecognitionResult, ProviderError> {
    let mut attempt = 0u32;
    loop {
        let result = match tokio::time::timeout(entry.timeout, entry.provider.detect(segment)).await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(entry.timeout)),
        };

        match result {
            Err(e) if e.is_transient() && attempt < entry.retries => {
                attempt += 1;
                let delay = backoff_delay(entry.backoff, attempt);
                tracing::debug!(
                    target: "chain",
                    provider = entry.provider.name(),
                    attempt,
                    ?delay,
                    "Retrying after transient failure: {}",
                    e
                );
                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
    }
}

/// Exponential backoff with jitter; zero base disables waiting entirely.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    if base.is_zero() {
        return Duration::ZERO;
    }
    let exp = base.saturating_mul(1u32 << (attempt - 1).min(6));
    let jitter = rand::rng().random_range(0..=MAX_JITTER_MS);
    exp + Duration::from_millis(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::{Classification, MatchMethod, Signature};
    use crate::detection::traits::mocks::MockProvider;
    use chrono::Utc;

    fn segment() -> Segment {
        Segment {
            station_id: 1,
            captured_at: Utc::now(),
            classification: Classification::Music,
            signature: Signature::new("fp", vec![1, 2, 3]),
            span_secs: None,
            metadata: Default::default(),
            reference: None,
            clip_url: None,
        }
    }

    fn entry(provider: Arc<MockProvider>, timeout_ms: u64, retries: u32) -> ChainEntry {
        ChainEntry::new(provider, Duration::from_millis(timeout_ms), retries)
            .with_backoff(Duration::ZERO)
    }

    fn model() -> Arc<ConfidenceModel> {
        Arc::new(
            ConfidenceModel::new()
                .with_provider("first", 0.85)
                .with_provider("second", 0.80)
                .with_provider("third", 0.75),
        )
    }

    #[tokio::test]
    async fn test_stops_at_first_accepted_provider() {
        let first = Arc::new(MockProvider::matching("first", "Song", "Artist", 0.95));
        let second = Arc::new(MockProvider::matching("second", "Other", "Artist", 1.0));
        let chain = RecognitionChain::new(
            vec![entry(first.clone(), 1000, 0), entry(second.clone(), 1000, 0)],
            model(),
            0.8,
        );

        let outcome = chain.recognize(&segment()).await;

        assert!(outcome.accepted);
        let best = outcome.best.unwrap();
        assert!((best.confidence - 0.8075).abs() < 1e-9);
        assert_eq!(best.matched.method, MatchMethod::Provider("first".into()));
        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 0);
    }

    #[tokio::test]
    async fn test_falls_back_to_best_observed() {
        let first = Arc::new(MockProvider::matching("first", "Weak", "A", 0.5));
        let second = Arc::new(MockProvider::failing(
            "second",
            ProviderError::Api("bad key".into()),
        ));
        let third = Arc::new(MockProvider::matching("third", "Weaker", "B", 0.4));
        let chain = RecognitionChain::new(
            vec![
                entry(first.clone(), 1000, 0),
                entry(second.clone(), 1000, 2),
                entry(third.clone(), 1000, 0),
            ],
            model(),
            0.8,
        );

        let outcome = chain.recognize(&segment()).await;

        assert!(!outcome.accepted);
        let best = outcome.best.unwrap();
        assert_eq!(best.matched.candidate.title.as_deref(), Some("Weak"));
        // Non-transient errors are not retried
        assert_eq!(second.calls(), 1);
        assert_eq!(third.calls(), 1);
        assert_eq!(outcome.consulted, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let flaky = Arc::new(MockProvider::scripted(
            "first",
            vec![
                Err(ProviderError::Network("reset".into())),
                Err(ProviderError::RateLimited),
                Ok(RecognitionResult::matched(
                    Default::default(),
                    1.0,
                    MatchMethod::Provider("first".into()),
                )),
            ],
        ));
        let chain = RecognitionChain::new(vec![entry(flaky.clone(), 1000, 3)], model(), 0.8);

        let outcome = chain.recognize(&segment()).await;

        assert!(outcome.accepted);
        assert_eq!(flaky.calls(), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let down = Arc::new(MockProvider::failing(
            "first",
            ProviderError::Network("unreachable".into()),
        ));
        let chain = RecognitionChain::new(vec![entry(down.clone(), 1000, 3)], model(), 0.8);

        let outcome = chain.recognize(&segment()).await;

        assert!(outcome.best.is_none());
        assert_eq!(down.calls(), 4);
    }

    #[tokio::test]
    async fn test_all_providers_time_out() {
        let providers: Vec<Arc<MockProvider>> = ["first", "second", "third"]
            .into_iter()
            .map(|n| Arc::new(MockProvider::hanging(n)))
            .collect();
        let chain = RecognitionChain::new(
            providers.iter().map(|p| entry(p.clone(), 20, 1)).collect(),
            model(),
            0.8,
        );

        let outcome = chain.recognize(&segment()).await;

        assert!(outcome.best.is_none());
        assert!(!outcome.accepted);
        for p in &providers {
            assert_eq!(p.calls(), 2);
        }
    }

    #[tokio::test]
    async fn test_non_music_answer_moves_to_next_provider() {
        let first = Arc::new(MockProvider::scripted("first", vec![Ok(RecognitionResult::NonMusic)]));
        let second = Arc::new(MockProvider::matching("second", "Song", "Artist", 1.0));
        let chain = RecognitionChain::new(
            vec![entry(first.clone(), 1000, 2), entry(second.clone(), 1000, 0)],
            model(),
            0.8,
        );

        let outcome = chain.recognize(&segment()).await;

        assert!(outcome.accepted);
        let best = outcome.best.unwrap();
        assert_eq!(best.matched.method, MatchMethod::Provider("second".into()));
        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 1);
        assert_eq!(outcome.consulted, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_only_non_music_answers_give_no_candidate() {
        let providers: Vec<Arc<MockProvider>> = ["first", "second"]
            .into_iter()
            .map(|n| Arc::new(MockProvider::scripted(n, vec![Ok(RecognitionResult::NonMusic)])))
            .collect();
        let chain = RecognitionChain::new(
            providers.iter().map(|p| entry(p.clone(), 1000, 0)).collect(),
            model(),
            0.8,
        );

        let outcome = chain.recognize(&segment()).await;

        assert!(outcome.best.is_none());
        assert!(!outcome.accepted);
        assert_eq!(outcome.consulted.len(), 2);
    }

    #[test]
    fn test_backoff_grows() {
        assert_eq!(backoff_delay(Duration::ZERO, 3), Duration::ZERO);
        let base = Duration::from_millis(100);
        assert!(backoff_delay(base, 1) >= Duration::from_millis(100));
        assert!(backoff_delay(base, 3) >= Duration::from_millis(400));
    }
}
