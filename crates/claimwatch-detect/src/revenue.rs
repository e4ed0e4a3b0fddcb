//! Revenue outlier: per-claim revenue far above the peer population.
//!
//! Uses robust z-scores `(x - median) / (1.4826 * MAD)` against a
//! [`PeerDistribution`] snapshot handed in at construction. Only the high
//! side is flagged.
//!
//! When the peer MAD is zero the z-score is undefined. Rather than flag the
//! whole population, the detector falls back to an absolute floor: a
//! provider fires only if its revenue exceeds the median by more than
//! `mad_floor` dollars per claim. A zero floor disables the fallback.
//! Fallback severity is reported on the z scale, `z_threshold * excess /
//! mad_floor`, so a provider just past the floor scores like one just past
//! the robust threshold.

use claimwatch_core::constants::{MAD_SCALE, REVENUE_MAD_FLOOR, REVENUE_ROBUST_Z_THRESHOLD};
use claimwatch_core::types::{format_count, format_dollars_f64};
use claimwatch_core::{
    AggregateStore, DetectError, Detector, DetectorKind, Evidence, Flag, PeerDistribution, ProviderId,
};
use tracing::{debug, warn};

/// How providers are compared against the peer snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Cutoff {
    /// Robust z-score against a non-degenerate distribution.
    Robust { bound: f64 },
    /// MAD is zero: absolute excess over the median.
    Floor { bound: f64 },
}

#[derive(Debug, Clone)]
pub struct RevenueOutlierDetector {
    peers: PeerDistribution,
    /// Robust z-score threshold (`k`).
    pub z_threshold: f64,
    /// Dollars per claim above the median that fire when MAD is zero.
    pub mad_floor: f64,
}

impl RevenueOutlierDetector {
    pub fn new(peers: PeerDistribution) -> Self {
        Self {
            peers,
            z_threshold: REVENUE_ROBUST_Z_THRESHOLD,
            mad_floor: REVENUE_MAD_FLOOR,
        }
    }

    pub fn with_z_threshold(mut self, k: f64) -> Self {
        self.z_threshold = k;
        self
    }

    pub fn with_mad_floor(mut self, floor: f64) -> Self {
        self.mad_floor = floor;
        self
    }

    pub fn peers(&self) -> &PeerDistribution {
        &self.peers
    }

    /// Robust cutoff, or [`DetectError::DegenerateDistribution`] when MAD is zero.
    fn robust_cutoff(&self) -> Result<Cutoff, DetectError> {
        if self.peers.is_degenerate() {
            return Err(DetectError::DegenerateDistribution {
                median: self.peers.median_revenue_per_claim,
            });
        }
        Ok(Cutoff::Robust {
            bound: self.peers.outlier_bound(self.z_threshold),
        })
    }

    fn judge(&self, cutoff: Cutoff, provider: &ProviderId, revenue: f64) -> Option<Flag> {
        let median = self.peers.median_revenue_per_claim;
        let n = format_count(self.peers.population_size as u64);
        let (bound, severity, summary, basis) = match cutoff {
            Cutoff::Robust { bound } => {
                let z = (revenue - median) / self.peers.scaled_mad();
                (
                    bound,
                    z,
                    format!(
                        "Paid {} per claim, robust z {z:.1} vs peer median {} (MAD {}, {n} providers)",
                        format_dollars_f64(revenue),
                        format_dollars_f64(median),
                        format_dollars_f64(self.peers.mad_revenue_per_claim),
                    ),
                    format!("peer median + {} x {MAD_SCALE} x MAD", self.z_threshold),
                )
            }
            Cutoff::Floor { bound } => {
                let excess = revenue - median;
                (
                    bound,
                    self.z_threshold * excess / self.mad_floor,
                    format!(
                        "Paid {} per claim, {} above a uniform peer median {} ({n} providers)",
                        format_dollars_f64(revenue),
                        format_dollars_f64(excess),
                        format_dollars_f64(median),
                    ),
                    format!("peer median + {} absolute floor (MAD is zero)", format_dollars_f64(self.mad_floor)),
                )
            }
        };

        (revenue > bound).then(|| Flag {
            detector: DetectorKind::RevenueOutlier,
            provider_id: provider.clone(),
            month: None,
            severity,
            evidence: Evidence {
                summary,
                observed: revenue,
                threshold: bound,
                basis,
            },
        })
    }
}

impl Detector for RevenueOutlierDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::RevenueOutlier
    }

    fn detect(&self, store: &dyn AggregateStore) -> Result<Vec<Flag>, DetectError> {
        if self.peers.population_size == 0 {
            debug!("revenue: empty peer population, nothing to compare");
            return Ok(Vec::new());
        }

        let cutoff = match self.robust_cutoff() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, floor = self.mad_floor, "revenue: falling back to absolute floor");
                if self.mad_floor <= 0.0 {
                    return Ok(Vec::new());
                }
                Cutoff::Floor {
                    bound: self.peers.median_revenue_per_claim + self.mad_floor,
                }
            }
        };

        let mut flags = Vec::new();
        for id in store.provider_ids()? {
            let Some(revenue) = store.aggregate(&id)?.and_then(|a| a.revenue_per_claim()) else {
                continue;
            };
            if let Some(flag) = self.judge(cutoff, &id, revenue) {
                debug!(provider = %id, revenue, severity = flag.severity, "revenue: outlier");
                flags.push(flag);
            }
        }

        Ok(flags)
    }
}
