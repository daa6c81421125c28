//! AudD API Data Transfer Objects
//!
//! Shapes of the `POST https://api.audd.io/` response when called with
//! `return=apple_music,spotify`. Do not use outside the audd module.
//!
//! API Reference: https://docs.audd.io/

use serde::Deserialize;

/// Top-level recognition response
#[derive(Debug, Clone, Deserialize)]
pub struct RecognizeResponse {
    /// "success" or "error"
    pub status: String,
    /// Null when nothing was recognized
    pub result: Option<SongResult>,
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub error_code: i32,
    pub error_message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SongResult {
    pub artist: Option<String>,
    pub title: Option<String>,
    pub album: Option<String>,
    pub label: Option<String>,
    pub song_link: Option<String>,
    pub apple_music: Option<AppleMusic>,
    pub spotify: Option<Spotify>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppleMusic {
    pub isrc: Option<String>,
    #[serde(rename = "durationInMillis")]
    pub duration_in_millis: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Spotify {
    pub external_ids: Option<ExternalIds>,
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExternalIds {
    pub isrc: Option<String>,
}

#[cfg(test)]
mod contract_tests {
    use super::*;

    #[test]
    fn test_parse_recognized_song() {
        let json = r#"{
            "status": "success",
            "result": {
                "artist": "Imagine Dragons",
                "title": "Warriors",
                "album": "Warriors",
                "release_date": "2014-09-18",
                "label": "Universal Music",
                "timecode": "00:40",
                "song_link": "https://lis.tn/Warriors",
                "apple_music": { "isrc": "USUM71414035", "durationInMillis": 170920 },
                "spotify": { "external_ids": { "isrc": "USUM71414035" }, "duration_ms": 170920 }
            }
        }"#;
        let response: RecognizeResponse = serde_json::from_str(json).unwrap();

        let song = response.result.unwrap();
        assert_eq!(song.title.as_deref(), Some("Warriors"));
        assert_eq!(song.label.as_deref(), Some("Universal Music"));
        assert_eq!(
            song.apple_music.unwrap().isrc.as_deref(),
            Some("USUM71414035")
        );
    }

    #[test]
    fn test_parse_no_result() {
        let json = r#"{ "status": "success", "result": null }"#;
        let response: RecognizeResponse = serde_json::from_str(json).unwrap();
        assert!(response.result.is_none());
    }

    #[test]
    fn test_parse_error() {
        let json = r#"{
            "status": "error",
            "error": { "error_code": 901, "error_message": "Recognition failed: api_token limit reached" },
            "request_params": {}
        }"#;
        let response: RecognizeResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.error.unwrap().error_code, 901);
    }
}
