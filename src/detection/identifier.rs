//! Exact matching by standard recording code carried in segment metadata.

use std::sync::Arc;

use super::domain::{MatchMethod, RecognitionResult, SegmentMetadata, TrackCandidate};
use super::isrc::normalize_isrc;
use super::traits::TrackCatalog;
use crate::error::Result;

pub struct IdentifierMatcher {
    catalog: Arc<dyn TrackCatalog>,
}

impl IdentifierMatcher {
    pub fn new(catalog: Arc<dyn TrackCatalog>) -> Self {
        Self { catalog }
    }

    /// Look up the catalog track for the segment's ISRC, if any.
    ///
    /// A malformed code is ignored as if absent.
    pub async fn match_metadata(&self, metadata: &SegmentMetadata) -> Result<RecognitionResult> {
        let Some(raw) = metadata.isrc.as_deref() else {
            return Ok(RecognitionResult::NoMatch);
        };

        let Some(isrc) = normalize_isrc(raw) else {
            tracing::debug!(target: "identifier", code = raw, "Ignoring malformed ISRC");
            return Ok(RecognitionResult::NoMatch);
        };

        match self.catalog.find_track_by_isrc(&isrc).await? {
            Some(track) => {
                tracing::debug!(target: "identifier", %isrc, track_id = track.id, "ISRC match");
                let candidate = TrackCandidate {
                    track_id: Some(track.id),
                    title: Some(track.title),
                    artist: metadata.artist.clone(),
                    album: track.album,
                    label: track.label,
                    isrc: Some(isrc),
                    ..Default::default()
                };
                Ok(RecognitionResult::matched(
                    candidate,
                    1.0,
                    MatchMethod::IdentifierMatch,
                ))
            }
            None => Ok(RecognitionResult::NoMatch),
        }
    }
}
