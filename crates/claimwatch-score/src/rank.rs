//! Ranked result builder.
//!
//! Keeps providers scoring at or above a threshold, orders them by score
//! descending, then tier descending, then provider id ascending, and
//! attaches the strongest evidence line from each contributing detector.

use std::cmp::{Ordering, Reverse};
use std::collections::BTreeMap;

use claimwatch_core::constants::{DEFAULT_SCORE_THRESHOLD, DEFAULT_TOP};
use claimwatch_core::{DetectorKind, Flag, ProviderId, ScanError, SuspicionScore};
use ordered_float::OrderedFloat;
use serde::Serialize;

/// One row of the ranked scan result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntry {
    /// 1-based position.
    pub rank: usize,
    pub provider_id: ProviderId,
    pub score: f64,
    pub tier: usize,
    pub contributing_detectors: Vec<DetectorKind>,
    pub flag_count: usize,
    /// Summary of the highest-severity flag per contributing detector, in detector order.
    pub top_evidence: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedResultBuilder {
    threshold: f64,
    top: usize,
}

impl Default for RankedResultBuilder {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SCORE_THRESHOLD,
            top: DEFAULT_TOP,
        }
    }
}

impl RankedResultBuilder {
    /// # Errors
    ///
    /// - [`ScanError::InvalidConfig`] if `threshold` is outside `[0, 1]`
    pub fn new(threshold: f64, top: usize) -> Result<Self, ScanError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ScanError::InvalidConfig(format!(
                "score threshold must be within [0, 1], got {threshold}"
            )));
        }
        Ok(Self { threshold, top })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn top(&self) -> usize {
        self.top
    }

    /// Every provider at or above the threshold, fully ordered, not truncated.
    pub fn build_all(&self, scores: &[SuspicionScore], flags: &[Flag]) -> Vec<RankedEntry> {
        let mut kept: Vec<&SuspicionScore> = scores
            .iter()
            .filter(|s| s.tier > 0 && s.score >= self.threshold)
            .collect();
        kept.sort_by(|a, b| ranking_order(a, b));

        let mut by_provider: BTreeMap<&ProviderId, Vec<&Flag>> = BTreeMap::new();
        for flag in flags {
            by_provider.entry(&flag.provider_id).or_default().push(flag);
        }

        kept.into_iter()
            .enumerate()
            .map(|(i, s)| {
                let own = by_provider.get(&s.provider_id).map(Vec::as_slice).unwrap_or_default();
                RankedEntry {
                    rank: i + 1,
                    provider_id: s.provider_id.clone(),
                    score: s.score,
                    tier: s.tier,
                    contributing_detectors: s.contributing_detectors.iter().copied().collect(),
                    flag_count: own.len(),
                    top_evidence: top_evidence(own),
                }
            })
            .collect()
    }

    /// The first `top` entries of [`build_all`](Self::build_all).
    pub fn build(&self, scores: &[SuspicionScore], flags: &[Flag]) -> Vec<RankedEntry> {
        let mut ranked = self.build_all(scores, flags);
        ranked.truncate(self.top);
        ranked
    }
}

/// Score descending, tier descending, provider id ascending.
fn ranking_order(a: &SuspicionScore, b: &SuspicionScore) -> Ordering {
    let key = |s: &SuspicionScore| (Reverse(OrderedFloat(s.score)), Reverse(s.tier));
    key(a).cmp(&key(b)).then_with(|| a.provider_id.cmp(&b.provider_id))
}

/// Strongest flag per detector; ties go to the earliest month.
fn top_evidence(flags: &[&Flag]) -> Vec<String> {
    let mut best: BTreeMap<DetectorKind, &Flag> = BTreeMap::new();
    for &flag in flags {
        best.entry(flag.detector)
            .and_modify(|cur| {
                let stronger = OrderedFloat(flag.severity)
                    .cmp(&OrderedFloat(cur.severity))
                    .then_with(|| cur.month.cmp(&flag.month));
                if stronger == Ordering::Greater {
                    *cur = flag;
                }
            })
            .or_insert(flag);
    }
    best.into_values().map(|f| f.evidence.summary.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ScoringEngine;
    use claimwatch_core::{Evidence, YearMonth};

    fn npi(seed: u32) -> ProviderId {
        ProviderId::parse(&format!("{seed:010}")).unwrap()
    }

    fn score(provider: u32, score: f64, tier: usize) -> SuspicionScore {
        SuspicionScore {
            provider_id: npi(provider),
            score,
            tier,
            contributing_detectors: DetectorKind::ALL.iter().copied().take(tier).collect(),
        }
    }

    fn flag(provider: u32, detector: DetectorKind, month: u32, severity: f64, summary: &str) -> Flag {
        Flag {
            detector,
            provider_id: npi(provider),
            month: Some(YearMonth::new(2024, month).unwrap()),
            severity,
            evidence: Evidence {
                summary: summary.to_string(),
                observed: severity,
                threshold: 1.0,
                basis: "test".to_string(),
            },
        }
    }

    #[test]
    fn threshold_out_of_range_is_rejected() {
        assert!(matches!(RankedResultBuilder::new(1.5, 10), Err(ScanError::InvalidConfig(_))));
        assert!(matches!(RankedResultBuilder::new(-0.1, 10), Err(ScanError::InvalidConfig(_))));
        assert!(matches!(RankedResultBuilder::new(f64::NAN, 10), Err(ScanError::InvalidConfig(_))));
        assert!(RankedResultBuilder::new(0.0, 10).is_ok());
        assert!(RankedResultBuilder::new(1.0, 10).is_ok());
    }

    #[test]
    fn sorts_by_score_then_tier_then_id() {
        let scores = vec![
            score(5, 0.7, 1),
            score(4, 0.9, 2),
            score(3, 0.7, 2),
            score(2, 0.7, 1),
            score(1, 1.0, 3),
        ];
        let ranked = RankedResultBuilder::default().build(&scores, &[]);
        let order: Vec<_> = ranked.iter().map(|e| e.provider_id.clone()).collect();
        assert_eq!(order, vec![npi(1), npi(4), npi(3), npi(2), npi(5)]);
        let ranks: Vec<_> = ranked.iter().map(|e| e.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn threshold_filters_inclusively() {
        let scores = vec![score(1, 0.3, 1), score(2, 0.29, 1), score(3, 0.0, 0)];
        let ranked = RankedResultBuilder::default().build(&scores, &[]);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].provider_id, npi(1));
    }

    #[test]
    fn zero_threshold_still_excludes_unflagged() {
        let scores = vec![score(1, 0.0, 0), score(2, 0.5, 1)];
        let ranked = RankedResultBuilder::new(0.0, 10).unwrap().build(&scores, &[]);
        assert_eq!(ranked.len(), 1);
    }

    #[test]
    fn truncates_to_top_but_build_all_does_not() {
        let scores: Vec<_> = (1..=10).map(|i| score(i, 0.5, 1)).collect();
        let builder = RankedResultBuilder::new(0.3, 3).unwrap();
        assert_eq!(builder.build(&scores, &[]).len(), 3);
        assert_eq!(builder.build_all(&scores, &[]).len(), 10);
    }

    #[test]
    fn evidence_picks_strongest_flag_per_detector() {
        let flags = vec![
            flag(1, DetectorKind::BillingSpike, 2, 6.0, "spike feb"),
            flag(1, DetectorKind::VolumeImpossibility, 1, 1.2, "volume jan"),
            flag(1, DetectorKind::BillingSpike, 5, 9.0, "spike may"),
            flag(1, DetectorKind::VolumeImpossibility, 3, 1.2, "volume mar"),
            flag(2, DetectorKind::RevenueOutlier, 1, 50.0, "someone else"),
        ];
        let scores = ScoringEngine::default().score_all(&flags);
        let ranked = RankedResultBuilder::default().build(&scores, &flags);
        let entry = ranked.iter().find(|e| e.provider_id == npi(1)).unwrap();
        assert_eq!(entry.flag_count, 4);
        assert_eq!(entry.top_evidence, vec!["volume jan", "spike may"]);
        assert_eq!(
            entry.contributing_detectors,
            vec![DetectorKind::VolumeImpossibility, DetectorKind::BillingSpike]
        );
    }

    #[test]
    fn entry_serializes_snake_case_detectors() {
        let flags = vec![flag(1, DetectorKind::BillingSpike, 2, 6.0, "spike")];
        let scores = ScoringEngine::default().score_all(&flags);
        let ranked = RankedResultBuilder::default().build(&scores, &flags);
        let json = serde_json::to_value(&ranked[0]).unwrap();
        assert_eq!(json["contributing_detectors"][0], "billing_spike");
        assert_eq!(json["provider_id"], "0000000001");
    }
}
