//! AcoustID API Data Transfer Objects
//!
//! These types match what the AcoustID lookup endpoint returns with
//! `meta=recordings+releasegroups+compress`. Only the fields we read are
//! modelled. Do not use these types outside the acoustid module.
//!
//! API Reference: https://acoustid.org/webservice#lookup

use serde::Deserialize;

/// Top-level AcoustID lookup response
#[derive(Debug, Clone, Deserialize)]
pub struct LookupResponse {
    pub status: String,
    #[serde(default)]
    pub results: Vec<LookupResult>,
    /// Error info if status != "ok"
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub code: i32,
    pub message: String,
}

/// A single fingerprint match result
#[derive(Debug, Clone, Deserialize)]
pub struct LookupResult {
    /// AcoustID identifier
    pub id: String,
    /// Match confidence (0.0 to 1.0)
    pub score: f32,
    #[serde(default)]
    pub recordings: Vec<Recording>,
}

/// MusicBrainz recording info returned by AcoustID
#[derive(Debug, Clone, Deserialize)]
pub struct Recording {
    /// MusicBrainz recording ID
    pub id: String,
    pub title: Option<String>,
    /// Duration in seconds (API returns float, e.g. 353.0)
    pub duration: Option<f64>,
    #[serde(default)]
    pub artists: Vec<Artist>,
    #[serde(default)]
    pub releasegroups: Vec<ReleaseGroup>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
}

/// Release group (album grouping) a recording appears on
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseGroup {
    pub id: String,
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub release_type: Option<String>,
}

// ============================================================================
// CONTRACT TESTS
// If these fail, the API has changed and the DTOs need updating.
// ============================================================================
