//! Corroboration scoring.
//!
//! Flags are grouped per provider and per detector. Each triggered detector
//! contributes one component, the normalized maximum severity of its flags;
//! components are averaged and the mean is bounded by the tier (number of
//! distinct detectors):
//!
//! ```text
//! final = min(max(mean(components), floor(tier)), ceiling(tier))
//! ```
//!
//! A single detector can never push a provider past 0.7 however extreme its
//! evidence; three or more independent detectors saturate at 1.0.

use std::collections::{BTreeMap, BTreeSet};

use claimwatch_core::constants::{
    CONSISTENCY_RATIO_THRESHOLD, REVENUE_ROBUST_Z_THRESHOLD, SPIKE_MULTIPLIER, tier_ceiling, tier_floor,
};
use claimwatch_core::{DetectorKind, Flag, ProviderId, SuspicionScore};
use tracing::debug;

use crate::normalize::normalize;

/// Combines flags into bounded per-provider suspicion scores.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringEngine {
    /// Reference severity per detector, indexed by [`DetectorKind::index`].
    references: [f64; 4],
}

impl Default for ScoringEngine {
    fn default() -> Self {
        let mut references = [0.0; 4];
        references[DetectorKind::VolumeImpossibility.index()] = 1.0;
        references[DetectorKind::RevenueOutlier.index()] = REVENUE_ROBUST_Z_THRESHOLD;
        references[DetectorKind::BillingSpike.index()] = SPIKE_MULTIPLIER;
        references[DetectorKind::SuspiciousConsistency.index()] = CONSISTENCY_RATIO_THRESHOLD;
        Self { references }
    }
}

impl ScoringEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the severity that normalizes to 0.5 for one detector.
    ///
    /// Keep this in step with the detector's firing threshold.
    pub fn with_reference(mut self, kind: DetectorKind, reference: f64) -> Self {
        self.references[kind.index()] = reference;
        self
    }

    pub fn reference(&self, kind: DetectorKind) -> f64 {
        self.references[kind.index()]
    }

    /// Score one provider from its flags. Flags for other providers are ignored.
    ///
    /// The result depends only on the set of detectors present and the
    /// maximum severity per detector, never on flag order or count.
    pub fn score_provider(&self, provider_id: &ProviderId, flags: &[Flag]) -> SuspicionScore {
        let mut peaks: BTreeMap<DetectorKind, f64> = BTreeMap::new();
        for flag in flags.iter().filter(|f| &f.provider_id == provider_id) {
            let peak = peaks.entry(flag.detector).or_insert(f64::NEG_INFINITY);
            *peak = peak.max(flag.severity);
        }
        self.score_peaks(provider_id.clone(), &peaks)
    }

    /// Score every provider that has at least one flag, ascending by id.
    pub fn score_all(&self, flags: &[Flag]) -> Vec<SuspicionScore> {
        let mut peaks: BTreeMap<&ProviderId, BTreeMap<DetectorKind, f64>> = BTreeMap::new();
        for flag in flags {
            let peak = peaks
                .entry(&flag.provider_id)
                .or_default()
                .entry(flag.detector)
                .or_insert(f64::NEG_INFINITY);
            *peak = peak.max(flag.severity);
        }

        peaks
            .into_iter()
            .map(|(id, per_detector)| self.score_peaks(id.clone(), &per_detector))
            .collect()
    }

    fn score_peaks(&self, provider_id: ProviderId, peaks: &BTreeMap<DetectorKind, f64>) -> SuspicionScore {
        if peaks.is_empty() {
            return SuspicionScore::zero(provider_id);
        }

        let tier = peaks.len();
        // BTreeMap order fixes the summation order.
        let total: f64 = peaks
            .iter()
            .map(|(kind, &severity)| normalize(severity, self.reference(*kind)))
            .sum();
        let combined = total / tier as f64;
        let score = combined.max(tier_floor(tier)).min(tier_ceiling(tier));

        debug!(provider = %provider_id, tier, combined, score, "scored provider");

        SuspicionScore {
            provider_id,
            score,
            tier,
            contributing_detectors: peaks.keys().copied().collect::<BTreeSet<_>>(),
        }
    }
}
