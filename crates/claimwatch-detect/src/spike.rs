//! Billing spike: a month far above the provider's own history.
//!
//! Self-referential baseline. Each month is compared with the mean of the
//! provider's *other* months, so the spike never inflates its own baseline.
//! Providers with fewer than `min_months` months have no meaningful baseline
//! and are skipped.

use claimwatch_core::constants::{SPIKE_MIN_MONTHS, SPIKE_MULTIPLIER};
use claimwatch_core::types::{cents_to_dollars, format_dollars, format_dollars_f64};
use claimwatch_core::{AggregateStore, DetectError, Detector, DetectorKind, Evidence, Flag, ProviderAggregate};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct BillingSpikeDetector {
    /// A month at or above this multiple of its baseline fires.
    pub multiplier: f64,
    /// Months of history required; values below 2 are treated as 2.
    pub min_months: usize,
}

impl Default for BillingSpikeDetector {
    fn default() -> Self {
        Self {
            multiplier: SPIKE_MULTIPLIER,
            min_months: SPIKE_MIN_MONTHS,
        }
    }
}

impl BillingSpikeDetector {
    /// Flags for one provider's monthly history.
    ///
    /// # Errors
    ///
    /// - [`DetectError::InsufficientHistory`] if the provider has too few months
    pub fn evaluate(&self, agg: &ProviderAggregate) -> Result<Vec<Flag>, DetectError> {
        let need = self.min_months.max(2);
        let months = agg.monthly_paid.len();
        if months < need {
            return Err(DetectError::InsufficientHistory {
                provider: agg.provider_id.clone(),
                have: months,
                need,
            });
        }

        let total: u64 = agg.monthly_paid.iter().map(|(_, paid)| *paid).sum();
        let others = (months - 1) as f64;
        let mut flags = Vec::new();

        for &(month, paid) in &agg.monthly_paid {
            let baseline = cents_to_dollars(total - paid) / others;
            if baseline <= 0.0 {
                continue;
            }
            let ratio = cents_to_dollars(paid) / baseline;
            if ratio < self.multiplier {
                continue;
            }
            flags.push(Flag {
                detector: DetectorKind::BillingSpike,
                provider_id: agg.provider_id.clone(),
                month: Some(month),
                severity: ratio,
                evidence: Evidence {
                    summary: format!(
                        "Paid {} in {month}, {ratio:.1}x own mean {} of the other {} months",
                        format_dollars(paid),
                        format_dollars_f64(baseline),
                        months - 1
                    ),
                    observed: cents_to_dollars(paid),
                    threshold: self.multiplier * baseline,
                    basis: format!("{}x own mean of {} other months", self.multiplier, months - 1),
                },
            });
        }

        Ok(flags)
    }
}

impl Detector for BillingSpikeDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::BillingSpike
    }

    fn detect(&self, store: &dyn AggregateStore) -> Result<Vec<Flag>, DetectError> {
        let mut flags = Vec::new();
        for id in store.provider_ids()? {
            let Some(agg) = store.aggregate(&id)? else {
                continue;
            };
            match self.evaluate(&agg) {
                Ok(found) => flags.extend(found),
                Err(e @ DetectError::InsufficientHistory { .. }) => {
                    debug!(provider = %id, error = %e, "spike: skipped");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{npi, row};
    use claimwatch_core::MemoryStore;

    fn dollars(d: u64) -> u64 {
        d * 100
    }

    #[test]
    fn single_spike_month_among_twelve() {
        let mut rows: Vec<_> = (1..=11).map(|m| row(1, m, 20, dollars(10_000))).collect();
        rows.push(row(1, 12, 20, dollars(80_000)));
        let store = MemoryStore::new(rows);
        let flags = BillingSpikeDetector::default().detect(&store).unwrap();
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].month.unwrap().to_string(), "2024-12");
        assert!((flags[0].severity - 8.0).abs() < 1e-9);
        assert_eq!(
            flags[0].evidence.summary,
            "Paid $80,000.00 in 2024-12, 8.0x own mean $10,000.00 of the other 11 months"
        );
    }

    #[test]
    fn single_month_provider_is_insufficient() {
        let store = MemoryStore::new(vec![row(1, 1, 20, dollars(1_000_000))]);
        let agg = store.aggregate(&npi(1)).unwrap().unwrap();
        let det = BillingSpikeDetector::default();
        assert_eq!(
            det.evaluate(&agg),
            Err(DetectError::InsufficientHistory { provider: npi(1), have: 1, need: 2 })
        );
        assert!(det.detect(&store).unwrap().is_empty());
    }

    #[test]
    fn two_months_compare_against_each_other() {
        let store = MemoryStore::new(vec![row(1, 1, 1, dollars(100)), row(1, 2, 1, dollars(500))]);
        let flags = BillingSpikeDetector::default().detect(&store).unwrap();
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].severity, 5.0);
    }

    #[test]
    fn just_below_multiplier_does_not_fire() {
        let store = MemoryStore::new(vec![row(1, 1, 1, dollars(100)), row(1, 2, 1, 49_999)]);
        assert!(BillingSpikeDetector::default().detect(&store).unwrap().is_empty());
    }

    #[test]
    fn zero_baseline_months_are_skipped() {
        let store = MemoryStore::new(vec![
            row(1, 1, 1, 0),
            row(1, 2, 1, 0),
            row(1, 3, 1, dollars(5_000)),
        ]);
        assert!(BillingSpikeDetector::default().detect(&store).unwrap().is_empty());
    }

    #[test]
    fn steady_provider_is_clean() {
        let rows: Vec<_> = (1..=6).map(|m| row(1, m, 30, dollars(5_000))).collect();
        let store = MemoryStore::new(rows);
        assert!(BillingSpikeDetector::default().detect(&store).unwrap().is_empty());
    }

    #[test]
    fn min_months_is_configurable() {
        let rows: Vec<_> = vec![row(1, 1, 1, dollars(100)), row(1, 2, 1, dollars(100)), row(1, 3, 1, dollars(5_000))];
        let store = MemoryStore::new(rows);
        let strict = BillingSpikeDetector { min_months: 4, ..Default::default() };
        assert!(strict.detect(&store).unwrap().is_empty());
        assert_eq!(BillingSpikeDetector::default().detect(&store).unwrap().len(), 1);
    }

    #[test]
    fn one_provider_short_history_does_not_block_others() {
        let mut rows = vec![row(1, 1, 1, dollars(1_000_000))];
        rows.extend((1..=5).map(|m| row(2, m, 1, dollars(100))));
        rows.push(row(2, 6, 1, dollars(2_000)));
        let store = MemoryStore::new(rows);
        let flags = BillingSpikeDetector::default().detect(&store).unwrap();
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].provider_id, npi(2));
    }
}
