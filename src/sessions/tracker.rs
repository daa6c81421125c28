//! Merging detections into non-overlapping play sessions.
//!
//! The tracker is pure bookkeeping: it consumes detection events in capture
//! order and reports what changed. Persisting those changes is the job of
//! [`SessionRecorder`](super::SessionRecorder).

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::detection::domain::{Classification, DetectionEvent};

/// Lifecycle of a play session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Open => "open",
            SessionState::Closed => "closed",
        }
    }
}

impl std::str::FromStr for SessionState {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "open" => SessionState::Open,
            _ => SessionState::Closed,
        })
    }
}

/// One continuous airing of a track on a station.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaySession {
    /// Database id once persisted
    pub id: Option<i64>,
    pub station_id: i64,
    pub track_id: i64,
    pub started_at: DateTime<Utc>,
    /// Provisional while open, final once closed. Never before `started_at`.
    pub ends_at: DateTime<Utc>,
    pub last_detection_at: DateTime<Utc>,
    pub detection_count: i64,
    pub state: SessionState,
    /// Closed early because the next session overlapped it
    pub anomaly: bool,
}

impl PlaySession {
    fn open(event: &DetectionEvent, track_id: i64, at: DateTime<Utc>) -> Self {
        Self {
            id: None,
            station_id: event.station_id,
            track_id,
            started_at: at,
            ends_at: at + event.span.max(Duration::zero()),
            last_detection_at: at,
            detection_count: 1,
            state: SessionState::Open,
            anomaly: false,
        }
    }

    /// Whether both values describe the same airing, possibly at different
    /// points in its life.
    pub fn same_airing(&self, other: &PlaySession) -> bool {
        self.station_id == other.station_id
            && self.track_id == other.track_id
            && self.started_at == other.started_at
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    /// Accumulated airtime, never negative.
    pub fn duration(&self) -> Duration {
        (self.ends_at - self.started_at).max(Duration::zero())
    }

    pub fn duration_secs(&self) -> i64 {
        self.duration().num_seconds()
    }

    fn close_at(&mut self, at: DateTime<Utc>) {
        self.ends_at = at.clamp(self.started_at, self.ends_at.max(self.started_at));
        self.state = SessionState::Closed;
    }
}

/// Two sessions on one station would have overlapped.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlapAnomaly {
    pub station_id: i64,
    pub earlier_track_id: i64,
    pub later_track_id: i64,
    /// Where the earlier session would have ended
    pub provisional_end: DateTime<Utc>,
    /// Where it was cut instead
    pub boundary: DateTime<Utc>,
}

/// A change reported by the tracker.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Opened(PlaySession),
    Extended(PlaySession),
    Closed(PlaySession),
    Overlap(OverlapAnomaly),
}

#[derive(Debug, Default)]
struct StationSessions {
    open: Option<PlaySession>,
    /// Latest detection time seen, used to clamp out-of-order events
    last_seen: Option<DateTime<Utc>>,
}

/// Per-station session bookkeeping.
#[derive(Debug)]
pub struct PlaySessionTracker {
    continuity_window: Duration,
    stations: HashMap<i64, StationSessions>,
}

impl PlaySessionTracker {
    pub fn new(continuity_window: Duration) -> Self {
        Self {
            continuity_window,
            stations: HashMap::new(),
        }
    }

    pub fn open_session(&self, station_id: i64) -> Option<&PlaySession> {
        self.stations.get(&station_id).and_then(|s| s.open.as_ref())
    }

    /// Record the database id of `session` if it is still the open one.
    pub fn assign_id(&mut self, session: &PlaySession, id: i64) {
        if let Some(open) = self
            .stations
            .get_mut(&session.station_id)
            .and_then(|s| s.open.as_mut())
            .filter(|open| open.id.is_none() && open.same_airing(session))
        {
            open.id = Some(id);
        }
    }

    /// Apply one detection event.
    pub fn observe(&mut self, event: &DetectionEvent) -> Vec<SessionUpdate> {
        let window = self.continuity_window;
        let station = self.stations.entry(event.station_id).or_default();

        let mut at = event.detected_at;
        if let Some(last) = station.last_seen
            && at < last
        {
            tracing::warn!(
                target: "sessions",
                station = event.station_id,
                detected_at = %at,
                last_seen = %last,
                "Out-of-order detection, clamping to last seen"
            );
            at = last;
        }
        station.last_seen = Some(at);

        let mut updates = Vec::new();

        if event.classification == Classification::Speech {
            if let Some(mut session) = station.open.take() {
                session.close_at(at);
                updates.push(SessionUpdate::Closed(session));
            }
            return updates;
        }

        let Some(track_id) = event.identified_track() else {
            // Unaccepted music leaves the open session untouched
            return updates;
        };

        if let Some(open) = station.open.as_mut()
            && open.track_id == track_id
            && at - open.last_detection_at <= window
        {
            open.last_detection_at = at;
            open.ends_at = open.ends_at.max(at + event.span.max(Duration::zero()));
            open.detection_count += 1;
            updates.push(SessionUpdate::Extended(open.clone()));
            return updates;
        }

        if let Some(mut session) = station.open.take() {
            if at < session.ends_at {
                let anomaly = OverlapAnomaly {
                    station_id: event.station_id,
                    earlier_track_id: session.track_id,
                    later_track_id: track_id,
                    provisional_end: session.ends_at,
                    boundary: at,
                };
                tracing::warn!(
                    target: "sessions",
                    station = event.station_id,
                    earlier = session.track_id,
                    later = track_id,
                    provisional_end = %session.ends_at,
                    boundary = %at,
                    "Session overlap, closing earlier session at boundary"
                );
                session.anomaly = true;
                updates.push(SessionUpdate::Overlap(anomaly));
            }
            session.close_at(at);
            updates.push(SessionUpdate::Closed(session));
        }

        let session = PlaySession::open(event, track_id, at);
        updates.push(SessionUpdate::Opened(session.clone()));
        station.open = Some(session);
        updates
    }

    /// Close sessions whose continuity window elapsed before `now`.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Vec<SessionUpdate> {
        let window = self.continuity_window;
        let mut updates = Vec::new();
        for station in self.stations.values_mut() {
            let expired = station
                .open
                .as_ref()
                .is_some_and(|s| now - s.last_detection_at > window);
            if expired && let Some(mut session) = station.open.take() {
                let end = session.ends_at;
                session.close_at(end);
                updates.push(SessionUpdate::Closed(session));
            }
        }
        updates
    }

    /// Close every open session at its provisional end.
    pub fn close_all(&mut self) -> Vec<SessionUpdate> {
        self.stations
            .values_mut()
            .filter_map(|station| station.open.take())
            .map(|mut session| {
                let end = session.ends_at;
                session.close_at(end);
                SessionUpdate::Closed(session)
            })
            .collect()
    }
}
