//! Stats sinks besides the database one.

use std::sync::Arc;

use async_trait::async_trait;

use crate::detection::domain::DetectionEvent;
use crate::detection::traits::StatsSink;
use crate::error::Result;
use crate::sessions::{PlaySession, format_duration};

/// Logs finalized detections and sessions.
#[derive(Debug, Default)]
pub struct LoggingStatsSink;

#[async_trait]
impl StatsSink for LoggingStatsSink {
    async fn detection_recorded(&self, event: &DetectionEvent) -> Result<()> {
        tracing::debug!(
            target: "stats",
            station = event.station_id,
            track_id = ?event.track_id,
            method = %event.method,
            confidence = event.confidence,
            accepted = event.accepted,
            "Detection"
        );
        Ok(())
    }

    async fn session_closed(&self, session: &PlaySession) -> Result<()> {
        tracing::info!(
            target: "stats",
            station = session.station_id,
            track_id = session.track_id,
            started_at = %session.started_at,
            duration = %format_duration(session.duration_secs()),
            anomaly = session.anomaly,
            "Play finalized"
        );
        Ok(())
    }
}

/// Forwards to every inner sink; the first error is returned after all ran.
pub struct FanoutStatsSink {
    sinks: Vec<Arc<dyn StatsSink>>,
}

impl FanoutStatsSink {
    pub fn new(sinks: Vec<Arc<dyn StatsSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl StatsSink for FanoutStatsSink {
    async fn detection_recorded(&self, event: &DetectionEvent) -> Result<()> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.detection_recorded(event).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn session_closed(&self, session: &PlaySession) -> Result<()> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.session_closed(session).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::traits::mocks::MemoryStore;
    use crate::sessions::SessionState;

    #[tokio::test]
    async fn test_fanout_reaches_every_sink() {
        let a = Arc::new(MemoryStore::new());
        let b = Arc::new(MemoryStore::new());
        let sinks: Vec<Arc<dyn StatsSink>> = vec![a.clone(), Arc::new(LoggingStatsSink), b.clone()];
        let sink = FanoutStatsSink::new(sinks);

        let now = chrono::Utc::now();
        let session = PlaySession {
            id: Some(1),
            station_id: 1,
            track_id: 5,
            started_at: now,
            ends_at: now,
            last_detection_at: now,
            detection_count: 1,
            state: SessionState::Closed,
            anomaly: false,
        };
        sink.session_closed(&session).await.unwrap();

        assert_eq!(a.closed_sessions().len(), 1);
        assert_eq!(b.closed_sessions().len(), 1);
    }
}
