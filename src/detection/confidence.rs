//! Trust factors and the confidence formula.
//!
//! `confidence = clamp(similarity * trust_factor, 0, 1)` is the only way a
//! confidence is computed or compared against the acceptance threshold.

use std::collections::HashMap;

use super::domain::{Match, MatchMethod, ScoredMatch};

pub const LOCAL_EXACT_TRUST: f64 = 1.0;
pub const IDENTIFIER_TRUST: f64 = 1.0;
pub const LOCAL_APPROXIMATE_TRUST: f64 = 0.9;
pub const DEFAULT_TRUST: f64 = 0.7;

/// Default trust for providers, by position in the priority list.
const PROVIDER_TRUST_SCALE: [f64; 3] = [0.85, 0.80, 0.75];

/// Method tags that providers may not use as their name.
pub const RESERVED_METHOD_TAGS: [&str; 4] = [
    "local_exact",
    "local_approximate",
    "identifier_match",
    "unknown",
];

/// Default trust factor for the provider at `position`.
pub fn default_provider_trust(position: usize) -> f64 {
    PROVIDER_TRUST_SCALE
        .get(position)
        .copied()
        .unwrap_or(DEFAULT_TRUST)
}

/// Combine a similarity with a trust factor.
pub fn confidence(similarity: f64, trust_factor: f64) -> f64 {
    let c = similarity * trust_factor;
    if c.is_nan() { 0.0 } else { c.clamp(0.0, 1.0) }
}

/// Trust factors for every method the hierarchy can produce.
#[derive(Debug, Clone, Default)]
pub struct ConfidenceModel {
    provider_trust: HashMap<String, f64>,
}

impl ConfidenceModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the trust factor for a named provider.
    pub fn with_provider(mut self, name: impl Into<String>, trust_factor: f64) -> Self {
        self.provider_trust.insert(name.into(), trust_factor);
        self
    }

    pub fn trust_factor(&self, method: &MatchMethod) -> f64 {
        match method {
            MatchMethod::LocalExact => LOCAL_EXACT_TRUST,
            MatchMethod::IdentifierMatch => IDENTIFIER_TRUST,
            MatchMethod::LocalApproximate => LOCAL_APPROXIMATE_TRUST,
            MatchMethod::Provider(name) => self
                .provider_trust
                .get(name)
                .copied()
                .unwrap_or(DEFAULT_TRUST),
            MatchMethod::Unknown => DEFAULT_TRUST,
        }
    }

    pub fn confidence_of(&self, m: &Match) -> f64 {
        confidence(m.similarity, self.trust_factor(&m.method))
    }

    pub fn score(&self, m: Match) -> ScoredMatch {
        let confidence = self.confidence_of(&m);
        ScoredMatch {
            matched: m,
            confidence,
        }
    }
}
