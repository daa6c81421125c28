//! Detection core - turns classified segments into detection events.
//!
//! # Architecture
//!
//! - **Domain models** (`domain.rs`) - segments, signatures, matches, events
//! - **Matchers** - [`LocalMatcher`] (signature store), [`IdentifierMatcher`]
//!   (ISRC) and the external [`RecognitionChain`]
//! - **Confidence** (`confidence.rs`) - trust factors and the single
//!   confidence formula
//! - **Resolver** - maps any accepted match to one canonical track
//! - **Orchestrator** - per-station state machine tying it together
//! - **Providers** - AcoustID and AudD clients behind [`RecognitionProvider`]
//!
//! Persistence is reached only through the traits in `traits.rs`.

pub mod chain;
pub mod confidence;
pub mod domain;
pub mod identifier;
pub mod isrc;
pub mod local;
pub mod normalize;
pub mod orchestrator;
pub mod providers;
pub mod resolver;
pub mod similarity;
pub mod traits;

pub use chain::{ChainEntry, ChainOutcome, RecognitionChain};
pub use confidence::{ConfidenceModel, confidence};
pub use domain::{
    Classification, DetectionEvent, Match, MatchMethod, ProviderError, RecognitionResult,
    ScoredMatch, Segment, SegmentMetadata, Signature, SpectralDescriptors, TrackCandidate,
};
pub use identifier::IdentifierMatcher;
pub use isrc::{normalize_isrc, validate_isrc};
pub use local::LocalMatcher;
pub use orchestrator::{DetectionOrchestrator, OrchestratorSettings, Pipeline, StationState};
pub use resolver::IdentityResolver;
pub use traits::{
    DetectionSink, RecognitionProvider, SessionStore, SignatureStore, StatsSink, TrackCatalog,
};
