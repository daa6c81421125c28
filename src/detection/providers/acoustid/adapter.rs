//! Adapter layer: Convert AcoustID DTOs to recognition results
//!
//! This is the ONLY place where AcoustID DTO types are converted to domain
//! types.

use std::time::Duration;

use super::dto;
use crate::detection::domain::{MatchMethod, ProviderError, RecognitionResult, TrackCandidate};

/// AcoustID error code for exceeded request rate.
const RATE_LIMIT_CODE: i32 = 14;

/// Convert a lookup response into the best match it contains.
///
/// Results without recordings carry no track information and are skipped.
pub fn to_result(
    response: dto::LookupResponse,
    provider_name: &str,
) -> Result<RecognitionResult, ProviderError> {
    if response.status != "ok" {
        let error = response.error.unwrap_or(dto::ApiError {
            code: -1,
            message: "Unknown error".to_string(),
        });
        if error.code == RATE_LIMIT_CODE || error.message.to_lowercase().contains("rate limit") {
            return Err(ProviderError::RateLimited);
        }
        return Err(ProviderError::Api(error.message));
    }

    let best = response
        .results
        .into_iter()
        .filter_map(|result| {
            let score = result.score;
            result
                .recordings
                .into_iter()
                .find(|r| r.title.is_some())
                .map(|recording| (score, recording))
        })
        .max_by(|(a, _), (b, _)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    Ok(match best {
        Some((score, recording)) => RecognitionResult::matched(
            to_candidate(recording),
            f64::from(score),
            MatchMethod::Provider(provider_name.to_string()),
        ),
        None => RecognitionResult::NoMatch,
    })
}

fn to_candidate(recording: dto::Recording) -> TrackCandidate {
    let album = recording
        .releasegroups
        .iter()
        .find(|rg| rg.release_type.as_deref() == Some("Album"))
        .or_else(|| recording.releasegroups.first())
        .and_then(|rg| rg.title.clone());

    TrackCandidate {
        track_id: None,
        title: recording.title,
        artist: recording.artists.first().map(|a| a.name.clone()),
        album,
        label: None,
        isrc: None,
        duration: recording
            .duration
            .filter(|d| *d > 0.0)
            .map(|d| Duration::from_secs(d as u64)),
        external_id: Some(recording.id),
    }
}
