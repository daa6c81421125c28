//! Test utilities and fixtures for airtrack tests.
//!
//! # Example
//!
//! ```ignore
//! use airtrack::test_utils::{temp_db, mock_station};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let (pool, _dir) = temp_db().await;
//!     upsert_station(&pool, &mock_station(1)).await.unwrap();
//! }
//! ```

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use tempfile::TempDir;

use crate::config::StationConfig;
use crate::detection::domain::{Classification, DetectionEvent, MatchMethod, Segment, Signature};

/// Creates a temporary database for testing.
///
/// Keep the returned `TempDir` alive for the duration of the test; the
/// database is deleted when it is dropped. Migrations are run.
pub async fn temp_db() -> (SqlitePool, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = dir.path().join("test.db");
    let db_url = format!("sqlite:{}", db_path.display());

    let pool = crate::db::init_db(&db_url)
        .await
        .expect("Failed to initialize test database");

    (pool, dir)
}

/// An active station with a predictable name.
pub fn mock_station(id: i64) -> StationConfig {
    StationConfig {
        id,
        name: format!("Station {}", id),
        stream_url: Some(format!("http://stream.example/{}", id)),
        active: true,
    }
}

/// An accepted local-exact detection, or an unidentified one for `None`.
pub fn mock_event(station_id: i64, track_id: Option<i64>, at: DateTime<Utc>) -> DetectionEvent {
    DetectionEvent {
        id: None,
        station_id,
        track_id,
        confidence: if track_id.is_some() { 1.0 } else { 0.0 },
        method: if track_id.is_some() {
            MatchMethod::LocalExact
        } else {
            MatchMethod::Unknown
        },
        classification: Classification::Music,
        detected_at: at,
        span: chrono::Duration::seconds(10),
        accepted: track_id.is_some(),
        segment_ref: Some("seg.json".to_string()),
        candidate_title: None,
        candidate_artist: None,
    }
}

/// A music segment for `station_id` with the given fingerprint.
pub fn mock_segment(station_id: i64, fingerprint: &str, at: DateTime<Utc>) -> Segment {
    Segment {
        station_id,
        captured_at: at,
        classification: Classification::Music,
        signature: Signature::new(fingerprint, vec![1, 2, 3]),
        span_secs: None,
        metadata: Default::default(),
        reference: None,
        clip_url: None,
    }
}
