//! Internal domain models for segment matching and detection.
//!
//! These types are OUR types - provider responses get converted into them
//! by adapters, and persistence rows are mapped to and from them in `db`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Auxiliary spectral descriptors extracted alongside a signature.
///
/// All values are expected in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SpectralDescriptors {
    pub bass_energy: f32,
    pub mid_energy: f32,
    pub high_energy: f32,
    pub rhythm_strength: f32,
}

/// Compact derived representation of an audio segment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Signature {
    /// Opaque fingerprint string (Chromaprint format); exact-match key
    pub fingerprint: String,
    /// Peak hashes used for approximate comparison
    #[serde(default)]
    pub peaks: Vec<u32>,
    /// Length of the audio the fingerprint was computed from
    #[serde(default)]
    pub duration_secs: u32,
    #[serde(default)]
    pub descriptors: Option<SpectralDescriptors>,
}

impl Signature {
    /// Create a signature from a fingerprint and its peak hashes.
    pub fn new(fingerprint: impl Into<String>, peaks: Vec<u32>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            peaks,
            ..Default::default()
        }
    }

    /// A signature is usable when it has a non-blank fingerprint.
    pub fn is_valid(&self) -> bool {
        !self.fingerprint.trim().is_empty()
    }
}

/// Classification tag attached by the capture collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Music,
    #[serde(alias = "non_music")]
    Speech,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Music => "music",
            Classification::Speech => "speech",
        }
    }
}

impl std::str::FromStr for Classification {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "music" => Classification::Music,
            _ => Classification::Speech,
        })
    }
}

/// Metadata that may accompany a segment (stream titles, ID3 in-band data).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentMetadata {
    #[serde(default)]
    pub isrc: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
}

/// A classified audio segment handed over by the capture collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub station_id: i64,
    pub captured_at: DateTime<Utc>,
    pub classification: Classification,
    /// Absent for most non-music segments
    #[serde(default)]
    pub signature: Signature,
    /// Audio span represented by this segment, if known
    #[serde(default)]
    pub span_secs: Option<u32>,
    #[serde(default)]
    pub metadata: SegmentMetadata,
    /// Reference to the raw capture (file name, object key)
    #[serde(default)]
    pub reference: Option<String>,
    /// Publicly reachable clip for providers that need audio
    #[serde(default)]
    pub clip_url: Option<String>,
}

/// How a detection was obtained. Also the stored method tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MatchMethod {
    LocalExact,
    LocalApproximate,
    IdentifierMatch,
    /// An external provider, by configured name
    Provider(String),
    Unknown,
}

impl MatchMethod {
    pub fn as_str(&self) -> &str {
        match self {
            MatchMethod::LocalExact => "local_exact",
            MatchMethod::LocalApproximate => "local_approximate",
            MatchMethod::IdentifierMatch => "identifier_match",
            MatchMethod::Provider(name) => name,
            MatchMethod::Unknown => "unknown",
        }
    }

    /// Whether the match came from the local signature store.
    pub fn is_local(&self) -> bool {
        matches!(self, MatchMethod::LocalExact | MatchMethod::LocalApproximate)
    }
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl From<&str> for MatchMethod {
    fn from(s: &str) -> Self {
        match s {
            "local_exact" => MatchMethod::LocalExact,
            "local_approximate" => MatchMethod::LocalApproximate,
            "identifier_match" => MatchMethod::IdentifierMatch,
            "unknown" | "" => MatchMethod::Unknown,
            other => MatchMethod::Provider(other.to_string()),
        }
    }
}

/// Track information carried by a match, before identity resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackCandidate {
    /// Canonical track id when the match came from our own catalog
    pub track_id: Option<i64>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub label: Option<String>,
    /// Standard recording code as reported (not yet validated)
    pub isrc: Option<String>,
    pub duration: Option<Duration>,
    /// Provider-side identifier (e.g. a MusicBrainz recording id)
    pub external_id: Option<String>,
}

impl TrackCandidate {
    /// Candidate pointing at a track we already know.
    pub fn known(track_id: i64, title: impl Into<String>, artist: Option<String>) -> Self {
        Self {
            track_id: Some(track_id),
            title: Some(title.into()),
            artist,
            ..Default::default()
        }
    }

    /// Short human-readable label for logs.
    pub fn label(&self) -> String {
        format!(
            "{} - {}",
            self.artist.as_deref().unwrap_or("?"),
            self.title.as_deref().unwrap_or("?")
        )
    }
}

/// A positive match from one stage of the hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub candidate: TrackCandidate,
    /// Raw similarity reported by the stage (0.0 - 1.0)
    pub similarity: f64,
    pub method: MatchMethod,
}

/// Outcome of a matching stage.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionResult {
    Matched(Match),
    NoMatch,
    NonMusic,
}

impl RecognitionResult {
    pub fn matched(candidate: TrackCandidate, similarity: f64, method: MatchMethod) -> Self {
        RecognitionResult::Matched(Match {
            candidate,
            similarity,
            method,
        })
    }

    pub fn into_match(self) -> Option<Match> {
        match self {
            RecognitionResult::Matched(m) => Some(m),
            _ => None,
        }
    }
}

/// A match together with its confidence under the trust model.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMatch {
    pub matched: Match,
    pub confidence: f64,
}

/// Record of one orchestrator cycle. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionEvent {
    /// Database id once appended
    pub id: Option<i64>,
    pub station_id: i64,
    pub track_id: Option<i64>,
    pub confidence: f64,
    pub method: MatchMethod,
    pub classification: Classification,
    pub detected_at: DateTime<Utc>,
    /// Audio span this detection stands for
    pub span: chrono::Duration,
    /// Whether confidence reached the acceptance threshold
    pub accepted: bool,
    pub segment_ref: Option<String>,
    pub candidate_title: Option<String>,
    pub candidate_artist: Option<String>,
}

impl DetectionEvent {
    /// Terminal event for a segment classified as speech/non-music.
    pub fn non_music(segment: &Segment, span: chrono::Duration) -> Self {
        Self {
            id: None,
            station_id: segment.station_id,
            track_id: None,
            confidence: 0.0,
            method: MatchMethod::Unknown,
            classification: Classification::Speech,
            detected_at: segment.captured_at,
            span,
            accepted: false,
            segment_ref: segment.reference.clone(),
            candidate_title: None,
            candidate_artist: None,
        }
    }

    /// Event for a music segment nothing could identify.
    pub fn unidentified(segment: &Segment, span: chrono::Duration) -> Self {
        Self {
            classification: Classification::Music,
            ..Self::non_music(segment, span)
        }
    }

    /// Whether this event carries an accepted, resolved track.
    pub fn identified_track(&self) -> Option<i64> {
        if self.accepted { self.track_id } else { None }
    }
}

/// Errors from an external recognition provider.
///
/// These never escape the recognition chain; each one only causes the
/// chain to move on to the next provider.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited - try again later")]
    RateLimited,

    #[error("API request failed: {0}")]
    Api(String),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Request not supported by provider: {0}")]
    Unsupported(String),
}

impl ProviderError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout(_) | ProviderError::Network(_) | ProviderError::RateLimited
        )
    }
}
