//! # claimwatch-detect: independent billing anomaly detectors.
//!
//! Each detector implements [`Detector`] and reads the aggregate store
//! without mutating anything, so all four can be evaluated in any order or
//! concurrently:
//! - **Volume impossibility**: more claims in one month than one provider can
//!   plausibly bill.
//! - **Revenue outlier**: per-claim revenue far above the peer median,
//!   measured in robust (MAD-based) z-scores.
//! - **Billing spike**: a month far above the provider's own mean of the
//!   other months.
//! - **Suspicious consistency**: nearly every billing row paid the identical
//!   amount.

pub mod consistency;
pub mod revenue;
pub mod spike;
pub mod volume;

use claimwatch_core::{Detector, PeerDistribution};

pub use consistency::SuspiciousConsistencyDetector;
pub use revenue::RevenueOutlierDetector;
pub use spike::BillingSpikeDetector;
pub use volume::VolumeImpossibilityDetector;

/// All four detectors with default thresholds.
///
/// `peers` must be computed once, before any detector runs.
pub fn standard_detectors(peers: PeerDistribution) -> Vec<Box<dyn Detector>> {
    vec![
        Box::new(VolumeImpossibilityDetector::default()),
        Box::new(RevenueOutlierDetector::new(peers)),
        Box::new(BillingSpikeDetector::default()),
        Box::new(SuspiciousConsistencyDetector::default()),
    ]
}


#[cfg(test)]
mod tests {
    use super::*;
    use claimwatch_core::DetectorKind;

    #[test]
    fn standard_detectors_cover_every_kind_once() {
        let kinds: Vec<DetectorKind> = standard_detectors(PeerDistribution::from_samples(&[]))
            .iter()
            .map(|d| d.kind())
            .collect();
        assert_eq!(kinds, DetectorKind::ALL.to_vec());
    }
}
