//! Adapter layer: Convert AudD DTOs to recognition results

use std::time::Duration;

use super::dto;
use crate::detection::domain::{MatchMethod, ProviderError, RecognitionResult, TrackCandidate};

/// Error codes AudD uses for exhausted request quotas.
const RATE_LIMIT_CODES: [i32; 2] = [901, 902];

/// AudD reports no score; a returned song is a full match.
const MATCH_SIMILARITY: f64 = 1.0;

pub fn to_result(
    response: dto::RecognizeResponse,
    provider_name: &str,
) -> Result<RecognitionResult, ProviderError> {
    if response.status != "success" {
        let error = response.error.unwrap_or(dto::ApiError {
            error_code: -1,
            error_message: "Unknown error".to_string(),
        });
        if RATE_LIMIT_CODES.contains(&error.error_code) {
            return Err(ProviderError::RateLimited);
        }
        return Err(ProviderError::Api(format!(
            "{} (code {})",
            error.error_message, error.error_code
        )));
    }

    let Some(song) = response.result.filter(|s| s.title.is_some()) else {
        return Ok(RecognitionResult::NoMatch);
    };

    let isrc = song
        .apple_music
        .as_ref()
        .and_then(|a| a.isrc.clone())
        .or_else(|| {
            song.spotify
                .as_ref()
                .and_then(|s| s.external_ids.as_ref())
                .and_then(|ids| ids.isrc.clone())
        });
    let duration_ms = song
        .apple_music
        .as_ref()
        .and_then(|a| a.duration_in_millis)
        .or_else(|| song.spotify.as_ref().and_then(|s| s.duration_ms));

    let candidate = TrackCandidate {
        track_id: None,
        title: song.title,
        artist: song.artist,
        album: song.album,
        label: song.label,
        isrc,
        duration: duration_ms.map(Duration::from_millis),
        external_id: song.song_link,
    };

    Ok(RecognitionResult::matched(
        candidate,
        MATCH_SIMILARITY,
        MatchMethod::Provider(provider_name.to_string()),
    ))
}
