//! Persists tracker updates and feeds the stats sink.
//!
//! Every session change becomes a snapshot queued for the store. Snapshots
//! are written oldest first; when a write fails the queue is kept and
//! retried on the next call, so the tracker and the store never drift
//! apart. A newer snapshot of the same airing replaces a queued one, which
//! keeps one airing to one row.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::tracker::{PlaySession, PlaySessionTracker, SessionUpdate};
use crate::detection::domain::DetectionEvent;
use crate::detection::traits::{SessionStore, StatsSink};
use crate::error::{Result, ResultExt};

/// Owns the tracker for all stations; driven by the single session task.
pub struct SessionRecorder {
    tracker: PlaySessionTracker,
    store: Arc<dyn SessionStore>,
    stats: Arc<dyn StatsSink>,
    /// Snapshots not yet in the store, oldest first
    unsaved: VecDeque<PlaySession>,
}

impl SessionRecorder {
    pub fn new(
        tracker: PlaySessionTracker,
        store: Arc<dyn SessionStore>,
        stats: Arc<dyn StatsSink>,
    ) -> Self {
        Self {
            tracker,
            store,
            stats,
            unsaved: VecDeque::new(),
        }
    }

    pub fn tracker(&self) -> &PlaySessionTracker {
        &self.tracker
    }

    /// Number of session snapshots waiting for a successful write.
    pub fn unsaved(&self) -> usize {
        self.unsaved.len()
    }

    /// Feed one detection event through the tracker.
    ///
    /// The event is always taken into the tracker. A store failure is
    /// returned, and the pending writes are retried on the next call.
    pub async fn record(&mut self, event: &DetectionEvent) -> Result<Vec<SessionUpdate>> {
        if let Err(e) = self.stats.detection_recorded(event).await {
            tracing::warn!(target: "stats", station = event.station_id, "Stats sink rejected detection: {}", e);
        }
        let updates = self.tracker.observe(event);
        self.apply(&updates).await?;
        Ok(updates)
    }

    /// Close sessions whose continuity window has elapsed.
    pub async fn sweep(&mut self, now: DateTime<Utc>) -> Result<Vec<SessionUpdate>> {
        let updates = self.tracker.expire(now);
        self.apply(&updates).await?;
        Ok(updates)
    }

    /// Close every open session, e.g. on shutdown.
    pub async fn close_all(&mut self) -> Result<Vec<SessionUpdate>> {
        let updates = self.tracker.close_all();
        self.apply(&updates).await?;
        Ok(updates)
    }

    async fn apply(&mut self, updates: &[SessionUpdate]) -> Result<()> {
        for update in updates {
            match update {
                SessionUpdate::Opened(session)
                | SessionUpdate::Extended(session)
                | SessionUpdate::Closed(session) => self.enqueue(session.clone()),
                SessionUpdate::Overlap(_) => {}
            }
        }
        self.flush().await
    }

    fn enqueue(&mut self, session: PlaySession) {
        match self.unsaved.iter_mut().find(|queued| queued.same_airing(&session)) {
            Some(queued) => {
                let id = queued.id.or(session.id);
                *queued = PlaySession { id, ..session };
            }
            None => self.unsaved.push_back(session),
        }
    }

    /// Write queued snapshots in order, stopping at the first failure.
    pub async fn flush(&mut self) -> Result<()> {
        while let Some(session) = self.unsaved.front().cloned() {
            let id = self
                .store
                .save_session(&session)
                .await
                .with_context(format!(
                    "saving play session for station {} ({} pending)",
                    session.station_id,
                    self.unsaved.len()
                ))?;
            self.unsaved.pop_front();

            if session.id.is_none() {
                self.tracker.assign_id(&session, id);
                tracing::debug!(
                    target: "sessions",
                    station = session.station_id,
                    track_id = session.track_id,
                    session_id = id,
                    "Session stored"
                );
            }

            if !session.is_open() {
                tracing::info!(
                    target: "sessions",
                    station = session.station_id,
                    track_id = session.track_id,
                    duration = %super::format_duration(session.duration_secs()),
                    detections = session.detection_count,
                    "Session closed"
                );
                let closed = PlaySession {
                    id: Some(id),
                    ..session
                };
                if let Err(e) = self.stats.session_closed(&closed).await {
                    tracing::warn!(target: "stats", track_id = closed.track_id, "Stats sink rejected session: {}", e);
                }
            }
        }
        Ok(())
    }
}
