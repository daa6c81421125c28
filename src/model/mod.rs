//! Core catalog models.
//!
//! Defines the persisted entities: [`Track`] and [`Station`]. Artists are
//! only ever referenced by id.
//! Relationships are plain id foreign keys; there are no back-references.
//!
//! # Database Schema
//!
//! The models map to the following tables:
//! - `artists` - Artists keyed by normalized name
//! - `tracks` - Canonical recordings with play counters
//! - `stations` - Monitored broadcast sources

use sqlx::FromRow;

/// A canonical recording.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Track {
    /// Database ID (auto-generated)
    pub id: i64,
    /// Display title as first seen
    pub title: String,
    /// Deduplication key together with `artist_id`
    pub title_normalized: String,
    /// Foreign key to artists table
    pub artist_id: Option<i64>,
    /// Standard recording code (unique when present)
    pub isrc: Option<String>,
    pub album: Option<String>,
    pub label: Option<String>,
    /// Recording length in seconds
    pub duration_secs: Option<i64>,
    /// Number of closed play sessions
    pub play_count: i64,
    /// Sum of closed play session durations, in seconds
    pub total_play_secs: i64,
}

/// A monitored broadcast source.
#[derive(Debug, Clone, FromRow)]
pub struct Station {
    pub id: i64,
    pub name: String,
    pub stream_url: Option<String>,
    pub active: bool,
}
