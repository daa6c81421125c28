//! Stations, the detection log and play sessions.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqlitePool;

use crate::config::StationConfig;
use crate::detection::domain::{Classification, DetectionEvent, MatchMethod};
use crate::model::Station;
use crate::sessions::{PlaySession, SessionState};

/// Fixed-width RFC 3339 so stored timestamps sort lexically.
pub fn to_db_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp; a malformed value is a decode error.
fn from_db_time(s: &str) -> sqlx::Result<DateTime<Utc>> {
    s.parse()
        .map_err(|e: chrono::ParseError| sqlx::Error::Decode(format!("bad timestamp '{}': {}", s, e).into()))
}

// ============================================================================
// Database Row Types
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
struct PlaySessionRow {
    id: i64,
    station_id: i64,
    track_id: i64,
    started_at: String,
    ends_at: String,
    last_detection_at: String,
    detection_count: i64,
    state: String,
    anomaly: bool,
}

impl TryFrom<PlaySessionRow> for PlaySession {
    type Error = sqlx::Error;

    fn try_from(row: PlaySessionRow) -> sqlx::Result<Self> {
        Ok(PlaySession {
            id: Some(row.id),
            station_id: row.station_id,
            track_id: row.track_id,
            started_at: from_db_time(&row.started_at)?,
            ends_at: from_db_time(&row.ends_at)?,
            last_detection_at: from_db_time(&row.last_detection_at)?,
            detection_count: row.detection_count,
            state: row.state.parse().unwrap_or(SessionState::Closed),
            anomaly: row.anomaly,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DetectionEventRow {
    id: i64,
    station_id: i64,
    track_id: Option<i64>,
    confidence: f64,
    method: String,
    classification: String,
    detected_at: String,
    span_secs: i64,
    accepted: bool,
    segment_ref: Option<String>,
    candidate_title: Option<String>,
    candidate_artist: Option<String>,
}

impl TryFrom<DetectionEventRow> for DetectionEvent {
    type Error = sqlx::Error;

    fn try_from(row: DetectionEventRow) -> sqlx::Result<Self> {
        Ok(DetectionEvent {
            id: Some(row.id),
            station_id: row.station_id,
            track_id: row.track_id,
            confidence: row.confidence,
            method: MatchMethod::from(row.method.as_str()),
            classification: row.classification.parse().unwrap_or(Classification::Speech),
            detected_at: from_db_time(&row.detected_at)?,
            span: chrono::Duration::seconds(row.span_secs),
            accepted: row.accepted,
            segment_ref: row.segment_ref,
            candidate_title: row.candidate_title,
            candidate_artist: row.candidate_artist,
        })
    }
}

const SESSION_COLUMNS: &str = "id, station_id, track_id, started_at, ends_at, last_detection_at, \
                               detection_count, state, anomaly";

// ============================================================================
// Stations
// ============================================================================

/// Insert or update a station from configuration.
pub async fn upsert_station(pool: &SqlitePool, station: &StationConfig) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO stations (id, name, stream_url, active) VALUES (?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            stream_url = excluded.stream_url,
            active = excluded.active
        "#,
    )
    .bind(station.id)
    .bind(&station.name)
    .bind(&station.stream_url)
    .bind(station.active)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_stations(pool: &SqlitePool) -> sqlx::Result<Vec<Station>> {
    sqlx::query_as("SELECT id, name, stream_url, active FROM stations ORDER BY id")
        .fetch_all(pool)
        .await
}

// ============================================================================
// Detection events
// ============================================================================

pub async fn append_event(pool: &SqlitePool, event: &DetectionEvent) -> sqlx::Result<i64> {
    let row: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO detection_events (
            station_id, track_id, confidence, method, classification,
            detected_at, span_secs, accepted, segment_ref,
            candidate_title, candidate_artist
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(event.station_id)
    .bind(event.track_id)
    .bind(event.confidence)
    .bind(event.method.as_str())
    .bind(event.classification.as_str())
    .bind(to_db_time(event.detected_at))
    .bind(event.span.num_seconds())
    .bind(event.accepted)
    .bind(&event.segment_ref)
    .bind(&event.candidate_title)
    .bind(&event.candidate_artist)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

/// Most recent detection events of a station, newest first.
pub async fn recent_events(
    pool: &SqlitePool,
    station_id: i64,
    limit: i64,
) -> sqlx::Result<Vec<DetectionEvent>> {
    let rows: Vec<DetectionEventRow> = sqlx::query_as(
        r#"
        SELECT id, station_id, track_id, confidence, method, classification,
               detected_at, span_secs, accepted, segment_ref,
               candidate_title, candidate_artist
        FROM detection_events
        WHERE station_id = ?
        ORDER BY detected_at DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(station_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(DetectionEvent::try_from).collect()
}

// ============================================================================
// Play sessions
// ============================================================================

/// Insert a new session or update an existing one. Returns its id.
pub async fn save_session(pool: &SqlitePool, session: &PlaySession) -> sqlx::Result<i64> {
    match session.id {
        None => {
            let row: (i64,) = sqlx::query_as(
                r#"
                INSERT INTO play_sessions (
                    station_id, track_id, started_at, ends_at, last_detection_at,
                    detection_count, duration_secs, state, anomaly
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                RETURNING id
                "#,
            )
            .bind(session.station_id)
            .bind(session.track_id)
            .bind(to_db_time(session.started_at))
            .bind(to_db_time(session.ends_at))
            .bind(to_db_time(session.last_detection_at))
            .bind(session.detection_count)
            .bind(session.duration_secs())
            .bind(session.state.as_str())
            .bind(session.anomaly)
            .fetch_one(pool)
            .await?;
            Ok(row.0)
        }
        Some(id) => {
            sqlx::query(
                r#"
                UPDATE play_sessions SET
                    ends_at = ?, last_detection_at = ?, detection_count = ?,
                    duration_secs = ?, state = ?, anomaly = ?
                WHERE id = ?
                "#,
            )
            .bind(to_db_time(session.ends_at))
            .bind(to_db_time(session.last_detection_at))
            .bind(session.detection_count)
            .bind(session.duration_secs())
            .bind(session.state.as_str())
            .bind(session.anomaly)
            .bind(id)
            .execute(pool)
            .await?;
            Ok(id)
        }
    }
}

/// Sessions of a station, newest first.
pub async fn list_sessions(
    pool: &SqlitePool,
    station_id: i64,
    limit: i64,
) -> sqlx::Result<Vec<PlaySession>> {
    let sql = format!(
        "SELECT {} FROM play_sessions WHERE station_id = ? ORDER BY started_at DESC, id DESC LIMIT ?",
        SESSION_COLUMNS
    );
    let rows: Vec<PlaySessionRow> = sqlx::query_as(&sql)
        .bind(station_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    rows.into_iter().map(PlaySession::try_from).collect()
}

/// Close sessions left open by a previous run at their last detection.
///
/// Returns the sessions as closed.
pub async fn close_stale_sessions(pool: &SqlitePool) -> sqlx::Result<Vec<PlaySession>> {
    let sql = format!(
        "SELECT {} FROM play_sessions WHERE state = 'open' ORDER BY id",
        SESSION_COLUMNS
    );
    let rows: Vec<PlaySessionRow> = sqlx::query_as(&sql).fetch_all(pool).await?;

    let mut closed = Vec::with_capacity(rows.len());
    for row in rows {
        let mut session = PlaySession::try_from(row)?;
        session.ends_at = session.last_detection_at.max(session.started_at);
        session.state = SessionState::Closed;
        save_session(pool, &session).await?;
        closed.push(session);
    }
    Ok(closed)
}
