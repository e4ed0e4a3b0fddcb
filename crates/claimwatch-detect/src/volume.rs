//! Volume impossibility: a provider billing more claims in one month than is
//! physically plausible.
//!
//! Purely local. Each provider-month is judged on its own claim count;
//! procedure rows of the same month are summed first.

use std::collections::BTreeMap;

use claimwatch_core::constants::{MAX_CLAIMS_PER_MONTH, VOLUME_SEVERITY_CAP};
use claimwatch_core::types::format_count;
use claimwatch_core::{AggregateStore, DetectError, Detector, DetectorKind, Evidence, Flag, YearMonth};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct VolumeImpossibilityDetector {
    /// Claims in one month above which the month is flagged.
    pub max_claims_per_month: u64,
    /// Upper bound on severity (the overshoot ratio).
    pub severity_cap: f64,
}

impl Default for VolumeImpossibilityDetector {
    fn default() -> Self {
        Self {
            max_claims_per_month: MAX_CLAIMS_PER_MONTH,
            severity_cap: VOLUME_SEVERITY_CAP,
        }
    }
}

impl Detector for VolumeImpossibilityDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::VolumeImpossibility
    }

    fn detect(&self, store: &dyn AggregateStore) -> Result<Vec<Flag>, DetectError> {
        let limit = self.max_claims_per_month.max(1);
        let mut flags = Vec::new();

        for id in store.provider_ids()? {
            let mut monthly: BTreeMap<YearMonth, u64> = BTreeMap::new();
            for r in store.provider_records(&id)? {
                let total = monthly.entry(r.month).or_default();
                *total = total.saturating_add(r.claim_count);
            }

            for (month, claims) in monthly {
                if claims <= limit {
                    continue;
                }
                let ratio = claims as f64 / limit as f64;
                debug!(provider = %id, %month, claims, "volume: month over limit");
                flags.push(Flag {
                    detector: self.kind(),
                    provider_id: id.clone(),
                    month: Some(month),
                    severity: ratio.min(self.severity_cap),
                    evidence: Evidence {
                        summary: format!(
                            "{} claims in {month} (max plausible: {})",
                            format_count(claims),
                            format_count(limit)
                        ),
                        observed: claims as f64,
                        threshold: limit as f64,
                        basis: "fixed monthly claim ceiling".to_string(),
                    },
                });
            }
        }

        Ok(flags)
    }
}
