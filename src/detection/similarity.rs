//! Signature comparison.
//!
//! The approximate score is the overlap of the two peak-hash sets (Jaccard
//! index), scaled by how close the spectral descriptors are when both sides
//! carry them. Boundary contracts:
//! - identical signatures score 1.0
//! - an empty/invalid signature on either side scores 0.0
//! - the score decreases as the peak sets diverge

use std::collections::HashSet;

use super::domain::{Signature, SpectralDescriptors};

/// Weight of the descriptor term in the combined score.
const DESCRIPTOR_WEIGHT: f64 = 0.2;

/// Similarity of two signatures in [0, 1].
pub fn similarity(a: &Signature, b: &Signature) -> f64 {
    if !a.is_valid() || !b.is_valid() {
        return 0.0;
    }
    if a.fingerprint == b.fingerprint {
        return 1.0;
    }

    let overlap = peak_overlap(&a.peaks, &b.peaks);
    match (&a.descriptors, &b.descriptors) {
        (Some(da), Some(db)) => {
            overlap * ((1.0 - DESCRIPTOR_WEIGHT) + DESCRIPTOR_WEIGHT * descriptor_closeness(da, db))
        }
        _ => overlap,
    }
}

/// Jaccard index of two peak-hash sets.
fn peak_overlap(a: &[u32], b: &[u32]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let a: HashSet<u32> = a.iter().copied().collect();
    let b: HashSet<u32> = b.iter().copied().collect();

    let shared = a.intersection(&b).count();
    let union = a.len() + b.len() - shared;
    shared as f64 / union as f64
}

/// 1.0 for identical descriptors, falling linearly with mean absolute difference.
fn descriptor_closeness(a: &SpectralDescriptors, b: &SpectralDescriptors) -> f64 {
    let diffs = [
        a.bass_energy - b.bass_energy,
        a.mid_energy - b.mid_energy,
        a.high_energy - b.high_energy,
        a.rhythm_strength - b.rhythm_strength,
    ];
    let mean = diffs.iter().map(|d| f64::from(d.abs())).sum::<f64>() / diffs.len() as f64;
    (1.0 - mean).clamp(0.0, 1.0)
}
