//! Per-station detection state machine.
//!
//! Each cycle takes one classified segment through the matching hierarchy
//! and produces exactly one [`DetectionEvent`]:
//!
//! ```text
//! Idle -> Classifying -> Matching -> Resolved
//!              |                 \-> Inconclusive
//!              \-> Inconclusive (non-music)
//! ```
//!
//! Stage errors never abort a cycle; only a failed write does.

use std::sync::Arc;

use tokio::sync::watch;

use super::chain::RecognitionChain;
use super::confidence::ConfidenceModel;
use super::domain::{Classification, DetectionEvent, RecognitionResult, ScoredMatch, Segment};
use super::identifier::IdentifierMatcher;
use super::local::LocalMatcher;
use super::resolver::IdentityResolver;
use super::traits::{DetectionSink, SignatureStore};
use crate::config::DetectionConfig;
use crate::error::{Error, Result, ResultExt};

/// Where a station is within its current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationState {
    Idle,
    Classifying,
    Matching,
    /// Last cycle ended with an accepted, resolved track
    Resolved,
    /// Last cycle ended without an accepted track
    Inconclusive,
}

impl StationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StationState::Idle => "idle",
            StationState::Classifying => "classifying",
            StationState::Matching => "matching",
            StationState::Resolved => "resolved",
            StationState::Inconclusive => "inconclusive",
        }
    }
}

/// Tuning shared by every station.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub acceptance_threshold: f64,
    pub nominal_span: chrono::Duration,
    pub learn_signatures: bool,
}

impl From<&DetectionConfig> for OrchestratorSettings {
    fn from(config: &DetectionConfig) -> Self {
        Self {
            acceptance_threshold: config.acceptance_threshold,
            nominal_span: config.nominal_span(),
            learn_signatures: config.learn_signatures,
        }
    }
}

/// Matching components shared by all station orchestrators.
pub struct Pipeline {
    pub local: LocalMatcher,
    pub identifier: IdentifierMatcher,
    pub chain: RecognitionChain,
    pub resolver: IdentityResolver,
    pub model: Arc<ConfidenceModel>,
    pub signatures: Arc<dyn SignatureStore>,
    pub sink: Arc<dyn DetectionSink>,
    pub settings: OrchestratorSettings,
}

/// Drives one station's segments through the [`Pipeline`].
pub struct DetectionOrchestrator {
    station_id: i64,
    state: StationState,
    pipeline: Arc<Pipeline>,
}

impl DetectionOrchestrator {
    pub fn new(station_id: i64, pipeline: Arc<Pipeline>) -> Self {
        Self {
            station_id,
            state: StationState::Idle,
            pipeline,
        }
    }

    pub fn state(&self) -> StationState {
        self.state
    }

    /// Run one detection cycle for `segment`.
    ///
    /// Returns `Ok(None)` when the station was deactivated while the cycle
    /// was in flight; nothing is written in that case. Any `Err` leaves the
    /// segment pending. Only errors for which [`Error::is_persistence`] holds
    /// are worth retrying.
    pub async fn process(
        &mut self,
        segment: &Segment,
        active: &watch::Receiver<bool>,
    ) -> Result<Option<DetectionEvent>> {
        let result = self.run_cycle(segment, active).await;
        if !matches!(result, Ok(Some(_))) {
            self.state = StationState::Idle;
        }
        result
    }

    async fn run_cycle(
        &mut self,
        segment: &Segment,
        active: &watch::Receiver<bool>,
    ) -> Result<Option<DetectionEvent>> {
        let p = self.pipeline.clone();
        self.state = StationState::Classifying;

        let span = segment
            .span_secs
            .map(|s| chrono::Duration::seconds(i64::from(s)))
            .unwrap_or(p.settings.nominal_span);

        if segment.classification == Classification::Speech {
            tracing::debug!(target: "orchestrator", station = self.station_id, "Non-music segment");
            if !is_active(active) {
                return Ok(self.discard());
            }
            let event = self.append(DetectionEvent::non_music(segment, span)).await?;
            self.state = StationState::Inconclusive;
            return Ok(Some(event));
        }

        // Speech needs no signature; music without one cannot be matched
        if !segment.signature.is_valid() {
            return Err(Error::invalid_signature(format!(
                "segment {} of station {} has an empty fingerprint",
                segment.reference.as_deref().unwrap_or("?"),
                self.station_id
            )));
        }

        self.state = StationState::Matching;
        let best = self.best_match(segment).await;
        let threshold = p.settings.acceptance_threshold;
        let accepted = best.as_ref().is_some_and(|b| b.confidence >= threshold);

        if !is_active(active) {
            return Ok(self.discard());
        }

        let Some(best) = best else {
            tracing::debug!(target: "orchestrator", station = self.station_id, "No candidate from any stage");
            let event = self.append(DetectionEvent::unidentified(segment, span)).await?;
            self.state = StationState::Inconclusive;
            return Ok(Some(event));
        };

        let mut event = DetectionEvent {
            track_id: best.matched.candidate.track_id,
            confidence: best.confidence,
            method: best.matched.method.clone(),
            candidate_title: best.matched.candidate.title.clone(),
            candidate_artist: best.matched.candidate.artist.clone(),
            accepted,
            ..DetectionEvent::unidentified(segment, span)
        };

        if accepted {
            match p.resolver.resolve(&best.matched.candidate).await {
                Ok(track_id) => event.track_id = Some(track_id),
                Err(e) if e.is_persistence() => return Err(e.context("resolving track identity")),
                Err(e) => {
                    tracing::warn!(
                        target: "orchestrator",
                        station = self.station_id,
                        candidate = %best.matched.candidate.label(),
                        "Accepted match could not be resolved: {}",
                        e
                    );
                    event.accepted = false;
                    event.track_id = None;
                }
            }
            if !is_active(active) {
                return Ok(self.discard());
            }
        }

        let event = self.append(event).await?;

        if let Some(track_id) = event.identified_track()
            && !event.method.is_local()
            && p.settings.learn_signatures
        {
            match p.signatures.insert_signature(track_id, &segment.signature).await {
                Ok(true) => {
                    tracing::debug!(target: "orchestrator", track_id, "Learned signature")
                }
                Ok(false) => {}
                Err(e) => tracing::warn!(
                    target: "orchestrator",
                    track_id,
                    "Failed to store learned signature: {}",
                    e
                ),
            }
        }

        self.state = if event.accepted {
            StationState::Resolved
        } else {
            StationState::Inconclusive
        };
        Ok(Some(event))
    }

    /// Walk local, identifier and external stages until one is accepted.
    async fn best_match(&self, segment: &Segment) -> Option<ScoredMatch> {
        let p = &self.pipeline;
        let threshold = p.settings.acceptance_threshold;
        let mut best: Option<ScoredMatch> = None;

        let local = p
            .local
            .match_signature(&segment.signature)
            .await
            .unwrap_or_else(|e| self.stage_failed("local", e));
        keep_best(&mut best, local, &p.model);
        if is_accepted(&best, threshold) {
            return best;
        }

        let identifier = p
            .identifier
            .match_metadata(&segment.metadata)
            .await
            .unwrap_or_else(|e| self.stage_failed("identifier", e));
        keep_best(&mut best, identifier, &p.model);
        if is_accepted(&best, threshold) || p.chain.is_empty() {
            return best;
        }

        let outcome = p.chain.recognize(segment).await;
        tracing::debug!(
            target: "orchestrator",
            station = self.station_id,
            consulted = ?outcome.consulted,
            accepted = outcome.accepted,
            "Recognition chain finished"
        );
        if let Some(external) = outcome.best
            && best
                .as_ref()
                .is_none_or(|b| external.confidence > b.confidence)
        {
            best = Some(external);
        }
        best
    }

    fn stage_failed(&self, stage: &str, error: Error) -> RecognitionResult {
        tracing::warn!(
            target: "orchestrator",
            station = self.station_id,
            stage,
            "Matching stage failed, treating as no match: {}",
            error
        );
        RecognitionResult::NoMatch
    }

    async fn append(&self, mut event: DetectionEvent) -> Result<DetectionEvent> {
        let id = self
            .pipeline
            .sink
            .append_event(&event)
            .await
            .with_context(format!("appending detection event for station {}", self.station_id))?;
        event.id = Some(id);
        Ok(event)
    }

    fn discard(&mut self) -> Option<DetectionEvent> {
        tracing::info!(
            target: "orchestrator",
            station = self.station_id,
            "Station deactivated mid-cycle, discarding result"
        );
        None
    }
}

fn is_active(active: &watch::Receiver<bool>) -> bool {
    *active.borrow()
}

fn is_accepted(best: &Option<ScoredMatch>, threshold: f64) -> bool {
    best.as_ref().is_some_and(|b| b.confidence >= threshold)
}

fn keep_best(best: &mut Option<ScoredMatch>, result: RecognitionResult, model: &ConfidenceModel) {
    let Some(m) = result.into_match() else {
        return;
    };
    let scored = model.score(m);
    if best
        .as_ref()
        .is_none_or(|b| scored.confidence > b.confidence)
    {
        *best = Some(scored);
    }
}
