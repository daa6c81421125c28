//! Trait definitions for providers and persistence.
//!
//! These traits enable dependency injection and mocking for tests.
//! Production code uses the real provider clients and
//! [`SqliteStore`](crate::db::SqliteStore), while tests can substitute the
//! mock implementations in [`mocks`].

use async_trait::async_trait;

use super::domain::{DetectionEvent, RecognitionResult, Segment, Signature, ProviderError};
use crate::error::Result;
use crate::model::Track;
use crate::sessions::PlaySession;

/// An external recognition service.
///
/// The chain holds an ordered list of these and never looks at the
/// concrete type behind one.
#[async_trait]
pub trait RecognitionProvider: Send + Sync {
    /// Name used as the detection method tag.
    fn name(&self) -> &str;

    /// Try to identify the segment.
    ///
    /// Timeouts are applied by the caller.
    async fn detect(&self, segment: &Segment) -> std::result::Result<RecognitionResult, ProviderError>;
}

/// A signature known to belong to a catalog track.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSignature {
    pub id: i64,
    pub track_id: i64,
    pub title: String,
    pub artist: Option<String>,
    pub signature: Signature,
}

/// Read access to known signatures, plus learning new ones.
#[async_trait]
pub trait SignatureStore: Send + Sync {
    async fn find_exact(&self, fingerprint: &str) -> Result<Option<StoredSignature>>;

    async fn candidates(&self) -> Result<Vec<StoredSignature>>;

    /// Store a signature for a track. Returns false if it was already known.
    async fn insert_signature(&self, track_id: i64, signature: &Signature) -> Result<bool>;
}

/// Fields for a new canonical track.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewTrack {
    pub title: String,
    pub title_normalized: String,
    pub artist_id: Option<i64>,
    pub isrc: Option<String>,
    pub album: Option<String>,
    pub label: Option<String>,
    pub duration_secs: Option<i64>,
}

/// Track and artist lookups used by identity resolution.
#[async_trait]
pub trait TrackCatalog: Send + Sync {
    async fn track_exists(&self, track_id: i64) -> Result<bool>;

    async fn find_track_by_isrc(&self, isrc: &str) -> Result<Option<Track>>;

    async fn find_track_by_name(
        &self,
        title_normalized: &str,
        artist_id: Option<i64>,
    ) -> Result<Option<Track>>;

    async fn get_or_create_artist(&self, name: &str, name_normalized: &str) -> Result<i64>;

    /// Insert a track. Returns the existing id if the ISRC is already taken.
    async fn create_track(&self, track: &NewTrack) -> Result<i64>;

    async fn set_track_isrc(&self, track_id: i64, isrc: &str) -> Result<()>;
}

/// Append-only detection log.
#[async_trait]
pub trait DetectionSink: Send + Sync {
    async fn append_event(&self, event: &DetectionEvent) -> Result<i64>;
}

/// Persistence for play sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a session without an id, update it otherwise. Returns the id.
    async fn save_session(&self, session: &PlaySession) -> Result<i64>;
}

/// Consumer of finalized detections and sessions (rolling aggregates).
#[async_trait]
pub trait StatsSink: Send + Sync {
    async fn detection_recorded(&self, _event: &DetectionEvent) -> Result<()> {
        Ok(())
    }

    async fn session_closed(&self, session: &PlaySession) -> Result<()>;
}
