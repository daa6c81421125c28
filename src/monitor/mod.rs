//! Long-running monitor: one task per station plus one session task.
//!
//! Each station task wakes on a fixed interval, drains its pending segments
//! in capture order through a [`DetectionOrchestrator`] and hands the
//! resulting events over an mpsc channel to the session task, which owns
//! the [`SessionRecorder`] for all stations. A segment is acknowledged only
//! after the session task has taken its event.
//!
//! # Usage
//!
//! ```ignore
//! let monitor = Monitor::from_config(&config, store)?;
//! let handle = monitor.start(&[1, 2]);
//! handle.deactivate(2).await;
//! handle.shutdown().await;
//! ```

pub mod spool;
pub mod stats;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::interval;

use crate::config::Config;
use crate::db::{SqliteStore, activity};
use crate::detection::domain::DetectionEvent;
use crate::detection::orchestrator::{DetectionOrchestrator, OrchestratorSettings, Pipeline};
use crate::detection::providers::{build_chain, confidence_model};
use crate::detection::traits::StatsSink;
use crate::detection::{IdentifierMatcher, IdentityResolver, LocalMatcher};
use crate::error::Result;
use crate::sessions::{PlaySessionTracker, SessionRecorder};

pub use spool::{PendingSegment, SegmentSource, SpoolSource};
pub use stats::{FanoutStatsSink, LoggingStatsSink};

/// Capacity of the station -> session task channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// An event on its way to the session task.
struct Handoff {
    event: DetectionEvent,
    /// Answered once the recorder holds the event; true if its session
    /// changes are already stored
    taken: oneshot::Sender<bool>,
}

/// Commands that can be sent to a station task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationCommand {
    /// Drain pending segments now instead of waiting for the next tick
    Poll,
    /// Stop monitoring; an in-flight cycle is discarded
    Deactivate,
}

/// Timing of the monitor loops.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub cycle_interval: Duration,
    /// How often the session task expires stale sessions
    pub sweep_interval: Duration,
}

/// Everything needed to start monitoring.
pub struct Monitor {
    pipeline: Arc<Pipeline>,
    source: Arc<dyn SegmentSource>,
    recorder: SessionRecorder,
    settings: MonitorSettings,
}

impl Monitor {
    pub fn new(
        pipeline: Arc<Pipeline>,
        source: Arc<dyn SegmentSource>,
        recorder: SessionRecorder,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            pipeline,
            source,
            recorder,
            settings,
        }
    }

    /// Wire the SQLite store, configured providers and the spool together.
    pub fn from_config(config: &Config, store: Arc<SqliteStore>) -> Result<Self> {
        let detection = &config.detection;
        let model = Arc::new(confidence_model(&config.providers));
        let chain = build_chain(config, model.clone())?;
        if chain.is_empty() {
            tracing::warn!(target: "monitor", "No recognition providers configured, matching locally only");
        }

        let pipeline = Arc::new(Pipeline {
            local: LocalMatcher::new(store.clone(), detection.min_local_similarity),
            identifier: IdentifierMatcher::new(store.clone()),
            chain,
            resolver: IdentityResolver::new(store.clone()),
            model,
            signatures: store.clone(),
            sink: store.clone(),
            settings: OrchestratorSettings::from(detection),
        });

        let sinks: Vec<Arc<dyn StatsSink>> = vec![store.clone(), Arc::new(LoggingStatsSink)];
        let stats: Arc<dyn StatsSink> = Arc::new(FanoutStatsSink::new(sinks));
        let recorder = SessionRecorder::new(
            PlaySessionTracker::new(detection.continuity_window()),
            store,
            stats,
        );

        let settings = MonitorSettings {
            cycle_interval: detection.cycle_interval(),
            sweep_interval: Duration::from_secs(detection.continuity_window_secs.max(1)),
        };

        Ok(Self::new(
            pipeline,
            Arc::new(SpoolSource::new(&config.spool_dir)),
            recorder,
            settings,
        ))
    }

    /// Spawn the station tasks and the session task.
    pub fn start(self, station_ids: &[i64]) -> MonitorHandle {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut stations = HashMap::new();
        let mut tasks = Vec::new();
        for &station_id in station_ids {
            let (command_tx, command_rx) = mpsc::channel(8);
            let (active_tx, active_rx) = watch::channel(true);
            let task = StationTask {
                orchestrator: DetectionOrchestrator::new(station_id, self.pipeline.clone()),
                station_id,
                source: self.source.clone(),
                events: event_tx.clone(),
                active: active_rx,
            };
            tasks.push(tokio::spawn(task.run(
                command_rx,
                shutdown_rx.clone(),
                self.settings.cycle_interval,
            )));
            stations.insert(
                station_id,
                StationHandle {
                    commands: command_tx,
                    active: active_tx,
                },
            );
        }
        // The session task ends once every station task has dropped its sender
        drop(event_tx);

        // Segments still waiting in the spool may extend a session, so
        // expiry lags the wall clock by one cycle.
        let lag = chrono::Duration::from_std(self.settings.cycle_interval)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let session_task = tokio::spawn(session_loop(
            self.recorder,
            event_rx,
            self.settings.sweep_interval,
            lag,
        ));

        tracing::info!(target: "monitor", stations = station_ids.len(), "Monitor started");

        MonitorHandle {
            stations,
            shutdown: shutdown_tx,
            tasks,
            session_task,
        }
    }
}

struct StationHandle {
    commands: mpsc::Sender<StationCommand>,
    active: watch::Sender<bool>,
}

/// Control surface of a running monitor.
pub struct MonitorHandle {
    stations: HashMap<i64, StationHandle>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    session_task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Ask a station to drain its pending segments now.
    pub async fn poll(&self, station_id: i64) -> bool {
        match self.stations.get(&station_id) {
            Some(station) => station.commands.send(StationCommand::Poll).await.is_ok(),
            None => false,
        }
    }

    /// Stop monitoring a station. A cycle in flight finishes its calls but
    /// writes nothing.
    pub async fn deactivate(&self, station_id: i64) -> bool {
        let Some(station) = self.stations.get(&station_id) else {
            return false;
        };
        station.active.send_replace(false);
        tracing::info!(target: "monitor", station = station_id, "Deactivating station");
        station
            .commands
            .send(StationCommand::Deactivate)
            .await
            .is_ok()
    }

    /// Stop all stations, then close every open session.
    pub async fn shutdown(self) {
        tracing::info!(target: "monitor", "Shutting down");
        self.shutdown.send_replace(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(target: "monitor", "Station task failed: {}", e);
            }
        }
        if let Err(e) = self.session_task.await {
            tracing::error!(target: "monitor", "Session task failed: {}", e);
        }
        tracing::info!(target: "monitor", "Monitor stopped");
    }
}

struct StationTask {
    orchestrator: DetectionOrchestrator,
    station_id: i64,
    source: Arc<dyn SegmentSource>,
    events: mpsc::Sender<Handoff>,
    active: watch::Receiver<bool>,
}

impl StationTask {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<StationCommand>,
        mut shutdown: watch::Receiver<bool>,
        cycle_interval: Duration,
    ) {
        let mut timer = interval(cycle_interval);
        tracing::info!(target: "monitor", station = self.station_id, "Station task started");

        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(StationCommand::Poll) => self.drain().await,
                    Some(StationCommand::Deactivate) | None => break,
                },
                _ = shutdown.changed() => break,
                _ = timer.tick() => self.drain().await,
            }
            if !*self.active.borrow() {
                break;
            }
        }

        tracing::info!(target: "monitor", station = self.station_id, "Station task stopped");
    }

    /// Process pending segments in order until done or a cycle must be retried.
    async fn drain(&mut self) {
        let pending = match self.source.pending(self.station_id).await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(target: "monitor", station = self.station_id, "Failed to list segments: {}", e);
                return;
            }
        };

        for item in pending {
            if !*self.active.borrow() {
                return;
            }

            match self.orchestrator.process(&item.segment, &self.active).await {
                Ok(Some(event)) => {
                    if !self.hand_over(event).await {
                        tracing::warn!(
                            target: "monitor",
                            station = self.station_id,
                            segment = %item.key.display(),
                            "Session task gone, leaving segment pending"
                        );
                        return;
                    }
                    self.ack(&item).await;
                }
                // Deactivated mid-cycle; the segment stays pending
                Ok(None) => return,
                Err(e) if e.is_persistence() => {
                    tracing::error!(
                        target: "monitor",
                        station = self.station_id,
                        segment = %item.key.display(),
                        "Cycle aborted, will retry next tick: {}",
                        e
                    );
                    return;
                }
                Err(e) => {
                    tracing::warn!(
                        target: "monitor",
                        station = self.station_id,
                        segment = %item.key.display(),
                        "Discarding segment: {}",
                        e
                    );
                    self.ack(&item).await;
                }
            }
        }
    }

    /// Send an event to the session task and wait until it is taken.
    async fn hand_over(&self, event: DetectionEvent) -> bool {
        let (taken, reply) = oneshot::channel();
        if self.events.send(Handoff { event, taken }).await.is_err() {
            return false;
        }
        match reply.await {
            Ok(true) => true,
            Ok(false) => {
                tracing::debug!(target: "monitor", station = self.station_id, "Session write deferred");
                true
            }
            Err(_) => false,
        }
    }

    async fn ack(&self, item: &PendingSegment) {
        if let Err(e) = self.source.ack(item).await {
            tracing::error!(target: "monitor", station = self.station_id, "Failed to acknowledge segment: {}", e);
        }
    }
}

async fn session_loop(
    mut recorder: SessionRecorder,
    mut events: mpsc::Receiver<Handoff>,
    sweep_interval: Duration,
    lag: chrono::Duration,
) {
    let mut sweep = interval(sweep_interval);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(Handoff { event, taken }) => {
                    let stored = match recorder.record(&event).await {
                        Ok(_) => true,
                        Err(e) => {
                            tracing::error!(
                                target: "sessions",
                                station = event.station_id,
                                pending = recorder.unsaved(),
                                "Failed to store session, will retry: {}",
                                e
                            );
                            false
                        }
                    };
                    // The station task may have stopped waiting
                    let _ = taken.send(stored);
                }
                None => break,
            },
            _ = sweep.tick() => {
                if let Err(e) = recorder.sweep(Utc::now() - lag).await {
                    tracing::error!(target: "sessions", "Session sweep failed: {}", e);
                }
            }
        }
    }

    match recorder.close_all().await {
        Ok(updates) => {
            tracing::info!(target: "sessions", closed = updates.len(), "Closed open sessions on shutdown")
        }
        Err(e) => tracing::error!(
            target: "sessions",
            unsaved = recorder.unsaved(),
            "Failed to close sessions on shutdown: {}",
            e
        ),
    }
}

/// Close sessions a previous run left open and report them as finished plays.
pub async fn recover_sessions(store: &SqliteStore, stats: &dyn StatsSink) -> Result<usize> {
    let closed = activity::close_stale_sessions(store.pool()).await?;
    for session in &closed {
        if let Err(e) = stats.session_closed(session).await {
            tracing::warn!(target: "stats", track_id = session.track_id, "Stats sink rejected recovered session: {}", e);
        }
    }
    if !closed.is_empty() {
        tracing::info!(target: "monitor", count = closed.len(), "Closed sessions left open by a previous run");
    }
    Ok(closed.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::chain::RecognitionChain;
    use crate::detection::confidence::ConfidenceModel;
    use crate::detection::domain::Signature;
    use crate::detection::traits::mocks::MemoryStore;
    use std::path::Path;
    use std::sync::atomic::Ordering;

    fn monitor(store: Arc<MemoryStore>, spool: &Path) -> Monitor {
        let model = Arc::new(ConfidenceModel::new());
        let pipeline = Arc::new(Pipeline {
            local: LocalMatcher::new(store.clone(), 0.3),
            identifier: IdentifierMatcher::new(store.clone()),
            chain: RecognitionChain::new(Vec::new(), model.clone(), 0.8),
            resolver: IdentityResolver::new(store.clone()),
            model,
            signatures: store.clone(),
            sink: store.clone(),
            settings: OrchestratorSettings {
                acceptance_threshold: 0.8,
                nominal_span: chrono::Duration::seconds(10),
                learn_signatures: true,
            },
        });
        let recorder = SessionRecorder::new(
            PlaySessionTracker::new(chrono::Duration::seconds(15)),
            store.clone(),
            store,
        );
        Monitor::new(
            pipeline,
            Arc::new(SpoolSource::new(spool)),
            recorder,
            MonitorSettings {
                cycle_interval: Duration::from_secs(3600),
                sweep_interval: Duration::from_secs(3600),
            },
        )
    }

    fn write_segment(spool: &Path, station_id: i64, name: &str, fingerprint: &str, at: &str) {
        let dir = spool.join(station_id.to_string());
        std::fs::create_dir_all(&dir).unwrap();
        let json = format!(
            r#"{{"station_id": {}, "captured_at": "{}", "classification": "music",
                "signature": {{"fingerprint": "{}", "peaks": [1, 2, 3]}}}}"#,
            station_id, at, fingerprint
        );
        std::fs::write(dir.join(name), json).unwrap();
    }

    fn spool_is_empty(spool: &Path, station_id: i64) -> bool {
        std::fs::read_dir(spool.join(station_id.to_string()))
            .map(|mut d| d.next().is_none())
            .unwrap_or(true)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_segments_become_sessions() {
        let spool = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new().with_track(
            "Song",
            "Artist",
            Signature::new("fp-song", vec![1, 2, 3]),
        ));
        write_segment(spool.path(), 1, "0001.json", "fp-song", "2099-03-01T08:00:00Z");
        write_segment(spool.path(), 1, "0002.json", "fp-song", "2099-03-01T08:00:08Z");

        let handle = monitor(store.clone(), spool.path()).start(&[1]);
        wait_until(|| store.events().len() == 2).await;
        handle.shutdown().await;

        assert!(spool_is_empty(spool.path(), 1));
        let closed = store.closed_sessions();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].duration_secs(), 18);
        assert_eq!(closed[0].detection_count, 2);
    }

    #[tokio::test]
    async fn test_persistence_failure_leaves_segment_pending() {
        let spool = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        store.fail_appends.store(true, Ordering::SeqCst);
        write_segment(spool.path(), 1, "0001.json", "fp", "2099-03-01T08:00:00Z");

        let handle = monitor(store.clone(), spool.path()).start(&[1]);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!spool_is_empty(spool.path(), 1));
        assert!(store.events().is_empty());

        store.fail_appends.store(false, Ordering::SeqCst);
        assert!(handle.poll(1).await);
        wait_until(|| store.events().len() == 1).await;
        handle.shutdown().await;

        assert!(spool_is_empty(spool.path(), 1));
    }

    #[tokio::test]
    async fn test_session_store_failure_is_retried() {
        let spool = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new().with_track(
            "Song",
            "Artist",
            Signature::new("fp-song", vec![1, 2, 3]),
        ));
        store.fail_session_saves.store(usize::MAX, Ordering::SeqCst);
        write_segment(spool.path(), 1, "0001.json", "fp-song", "2099-03-01T08:00:00Z");
        write_segment(spool.path(), 1, "0002.json", "fp-song", "2099-03-01T08:00:08Z");

        let handle = monitor(store.clone(), spool.path()).start(&[1]);
        let spool_dir = spool.path().to_path_buf();
        wait_until(|| spool_is_empty(&spool_dir, 1)).await;
        assert_eq!(store.events().len(), 2);
        assert!(store.sessions().is_empty());

        store.fail_session_saves.store(0, Ordering::SeqCst);
        handle.shutdown().await;

        let sessions = store.sessions();
        assert_eq!(sessions.len(), 1);
        assert!(!sessions[0].is_open());
        assert_eq!(sessions[0].detection_count, 2);
        assert_eq!(store.closed_sessions().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_segment_is_discarded() {
        let spool = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        write_segment(spool.path(), 1, "0001.json", "", "2099-03-01T08:00:00Z");
        write_segment(spool.path(), 1, "0002.json", "fp", "2099-03-01T08:00:05Z");

        let handle = monitor(store.clone(), spool.path()).start(&[1]);
        wait_until(|| store.events().len() == 1).await;
        handle.shutdown().await;

        assert!(spool_is_empty(spool.path(), 1));
    }

    #[tokio::test]
    async fn test_deactivated_station_stops() {
        let spool = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());

        let handle = monitor(store.clone(), spool.path()).start(&[1, 2]);
        assert!(handle.deactivate(2).await);
        tokio::time::sleep(Duration::from_millis(50)).await;

        write_segment(spool.path(), 2, "0001.json", "fp", "2099-03-01T08:00:00Z");
        write_segment(spool.path(), 1, "0001.json", "fp", "2099-03-01T08:00:00Z");
        // The deactivated station's task is gone
        assert!(!handle.poll(2).await);
        assert!(handle.poll(1).await);
        wait_until(|| store.events().len() == 1).await;
        handle.shutdown().await;

        assert!(!spool_is_empty(spool.path(), 2));
    }

    #[tokio::test]
    async fn test_unknown_station_is_rejected() {
        let spool = tempfile::tempdir().unwrap();
        let handle = monitor(Arc::new(MemoryStore::new()), spool.path()).start(&[1]);
        assert!(!handle.poll(7).await);
        assert!(!handle.deactivate(7).await);
        handle.shutdown().await;
    }
}
