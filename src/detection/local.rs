//! Local signature matching against the catalog's known signatures.

use std::sync::Arc;

use rayon::prelude::*;

use super::domain::{MatchMethod, RecognitionResult, Signature, TrackCandidate};
use super::similarity::similarity;
use super::traits::{SignatureStore, StoredSignature};
use crate::error::{Error, Result};

/// Compares incoming signatures with the [`SignatureStore`].
pub struct LocalMatcher {
    store: Arc<dyn SignatureStore>,
    /// Minimum similarity for an approximate match
    min_similarity: f64,
}

impl LocalMatcher {
    pub fn new(store: Arc<dyn SignatureStore>, min_similarity: f64) -> Self {
        Self {
            store,
            min_similarity: min_similarity.clamp(0.0, 1.0),
        }
    }

    /// Find the best stored signature for `signature`.
    ///
    /// Exact fingerprint equality wins outright; otherwise every stored
    /// signature is scored off the async runtime and the best one at or
    /// above the similarity floor is returned.
    pub async fn match_signature(&self, signature: &Signature) -> Result<RecognitionResult> {
        if !signature.is_valid() {
            return Err(Error::invalid_signature("empty fingerprint"));
        }

        if let Some(stored) = self.store.find_exact(&signature.fingerprint).await? {
            tracing::debug!(target: "local", track_id = stored.track_id, "Exact signature match");
            return Ok(RecognitionResult::matched(
                candidate_for(&stored),
                1.0,
                MatchMethod::LocalExact,
            ));
        }

        let candidates = self.store.candidates().await?;
        if candidates.is_empty() {
            return Ok(RecognitionResult::NoMatch);
        }

        let query = signature.clone();
        let best = tokio::task::spawn_blocking(move || best_candidate(&query, candidates))
            .await
            .map_err(|e| Error::TaskJoin(e.to_string()))?;

        match best {
            Some((stored, score)) if score >= self.min_similarity => {
                tracing::debug!(
                    target: "local",
                    track_id = stored.track_id,
                    score,
                    "Approximate signature match"
                );
                Ok(RecognitionResult::matched(
                    candidate_for(&stored),
                    score,
                    MatchMethod::LocalApproximate,
                ))
            }
            Some((_, score)) => {
                tracing::debug!(target: "local", score, "Best local score below floor");
                Ok(RecognitionResult::NoMatch)
            }
            None => Ok(RecognitionResult::NoMatch),
        }
    }
}

fn candidate_for(stored: &StoredSignature) -> TrackCandidate {
    TrackCandidate::known(stored.track_id, stored.title.clone(), stored.artist.clone())
}

/// Highest-scoring stored signature. Ties go to the lowest signature id.
fn best_candidate(
    query: &Signature,
    candidates: Vec<StoredSignature>,
) -> Option<(StoredSignature, f64)> {
    candidates
        .into_par_iter()
        .map(|stored| {
            let score = similarity(query, &stored.signature);
            (stored, score)
        })
        .max_by(|(a, sa), (b, sb)| {
            sa.partial_cmp(sb)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.id.cmp(&a.id))
        })
}
