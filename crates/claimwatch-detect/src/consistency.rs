//! Suspicious consistency: nearly every billing row paid the identical amount.
//!
//! Copy-paste billing shows up as one paid amount dominating a provider's
//! rows. Rows are counted as they appeared in the source extract, before any
//! summing by month and procedure. Zero-paid rows are ignored.

use claimwatch_core::constants::{CONSISTENCY_MIN_ROWS, CONSISTENCY_RATIO_THRESHOLD};
use claimwatch_core::types::format_dollars;
use claimwatch_core::{
    AggregateStore, DetectError, Detector, DetectorKind, Evidence, Flag, ProviderId,
};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct SuspiciousConsistencyDetector {
    /// Modal-amount share above which the provider fires.
    pub ratio_threshold: f64,
    /// Non-zero rows required before evaluation.
    pub min_rows: usize,
}

impl Default for SuspiciousConsistencyDetector {
    fn default() -> Self {
        Self {
            ratio_threshold: CONSISTENCY_RATIO_THRESHOLD,
            min_rows: CONSISTENCY_MIN_ROWS,
        }
    }
}

/// The most frequent non-zero paid amount, its row count, and the non-zero total.
///
/// `counts` holds `(amount, rows)` pairs ascending by amount, so ties go to
/// the smaller amount.
fn modal_amount(counts: &[(u64, u64)]) -> Option<(u64, u64, u64)> {
    let mut total = 0u64;
    let mut best: Option<(u64, u64)> = None;
    for &(amount, count) in counts.iter().filter(|c| c.0 > 0 && c.1 > 0) {
        total = total.saturating_add(count);
        if best.is_none_or(|(_, c)| count > c) {
            best = Some((amount, count));
        }
    }
    best.map(|(amount, count)| (amount, count, total))
}

impl SuspiciousConsistencyDetector {
    /// Flag for one provider's paid amount frequencies, if its billing is
    /// suspiciously uniform.
    ///
    /// `counts` holds `(paid cents, rows)` pairs as returned by
    /// [`AggregateStore::paid_amount_counts`].
    ///
    /// # Errors
    ///
    /// - [`DetectError::InsufficientHistory`] if fewer than `min_rows` rows are non-zero
    pub fn evaluate(&self, provider: &ProviderId, counts: &[(u64, u64)]) -> Result<Option<Flag>, DetectError> {
        let need = self.min_rows.max(1);
        let (amount, count, total) = match modal_amount(counts) {
            Some(m) if m.2 >= need as u64 => m,
            other => {
                return Err(DetectError::InsufficientHistory {
                    provider: provider.clone(),
                    have: other.map_or(0, |m| usize::try_from(m.2).unwrap_or(usize::MAX)),
                    need,
                });
            }
        };

        let ratio = count as f64 / total as f64;
        if ratio <= self.ratio_threshold {
            return Ok(None);
        }

        Ok(Some(Flag {
            detector: DetectorKind::SuspiciousConsistency,
            provider_id: provider.clone(),
            month: None,
            severity: ratio,
            evidence: Evidence {
                summary: format!(
                    "{:.0}% of {total} billing rows paid the identical amount {}",
                    ratio * 100.0,
                    format_dollars(amount)
                ),
                observed: ratio,
                threshold: self.ratio_threshold,
                basis: "share of non-zero rows at the modal paid amount".to_string(),
            },
        }))
    }
}

impl Detector for SuspiciousConsistencyDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::SuspiciousConsistency
    }

    fn detect(&self, store: &dyn AggregateStore) -> Result<Vec<Flag>, DetectError> {
        let mut flags = Vec::new();
        for id in store.provider_ids()? {
            let counts = store.paid_amount_counts(&id)?;
            match self.evaluate(&id, &counts) {
                Ok(Some(flag)) => flags.push(flag),
                Ok(None) => {}
                Err(e @ DetectError::InsufficientHistory { .. }) => {
                    debug!(provider = %id, error = %e, "consistency: skipped");
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
    use claimwatch_core::{MemoryStore, ProviderMonthRecord};

    /// `same` rows at $500.00 followed by `rows - same` distinct amounts.
    fn provider_rows(provider: u32, rows: u32, same: u32) -> Vec<ProviderMonthRecord> {
        (0..rows)
            .map(|i| {
                let paid = if i < same { 50_000 } else { 60_000 + u64::from(i) * 137 };
                row(provider, i % 12 + 1, 3, paid)
            })
            .collect()
    }

    #[test]
    fn nineteen_of_twenty_identical_fires() {
        let store = MemoryStore::new(provider_rows(1, 20, 19));
        let flags = SuspiciousConsistencyDetector::default().detect(&store).unwrap();
        assert_eq!(flags.len(), 1);
        assert!((flags[0].severity - 0.95).abs() < 1e-12);
        assert_eq!(
            flags[0].evidence.summary,
            "95% of 20 billing rows paid the identical amount $500.00"
        );
    }

    #[test]
    fn seventeen_of_twenty_does_not_fire() {
        let store = MemoryStore::new(provider_rows(1, 20, 17));
        assert!(SuspiciousConsistencyDetector::default().detect(&store).unwrap().is_empty());
    }

    #[test]
    fn exactly_at_threshold_does_not_fire() {
        let store = MemoryStore::new(provider_rows(1, 20, 18));
        assert!(SuspiciousConsistencyDetector::default().detect(&store).unwrap().is_empty());
    }

    #[test]
    fn too_few_rows_is_insufficient() {
        let store = MemoryStore::new(provider_rows(1, 4, 4));
        let counts = store.paid_amount_counts(&npi(1)).unwrap();
        let det = SuspiciousConsistencyDetector::default();
        assert_eq!(
            det.evaluate(&npi(1), &counts),
            Err(DetectError::InsufficientHistory { provider: npi(1), have: 4, need: 5 })
        );
    }

    #[test]
    fn zero_paid_rows_are_ignored() {
        let mut rows = provider_rows(1, 5, 5);
        rows.extend((0..20).map(|i| row(1, i % 12 + 1, 1, 0)));
        let store = MemoryStore::new(rows);
        let flags = SuspiciousConsistencyDetector::default().detect(&store).unwrap();
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].severity, 1.0);
    }

    #[test]
    fn all_zero_rows_report_zero_history() {
        let det = SuspiciousConsistencyDetector::default();
        assert_eq!(
            det.evaluate(&npi(1), &[(0, 6)]),
            Err(DetectError::InsufficientHistory { provider: npi(1), have: 0, need: 5 })
        );
    }

    #[test]
    fn tie_breaks_toward_smaller_amount() {
        let store = MemoryStore::new(vec![row(1, 1, 1, 300), row(1, 2, 1, 100), row(1, 3, 1, 300), row(1, 4, 1, 100)]);
        let counts = store.paid_amount_counts(&npi(1)).unwrap();
        assert_eq!(modal_amount(&counts), Some((100, 2, 4)));
    }

    #[test]
    fn source_row_counts_outweigh_summed_months() {
        // Twelve summed months, each with a distinct total, but the extract
        // behind them had 19 of 20 rows paid exactly $500.00.
        let store = MemoryStore::new(provider_rows(1, 12, 0))
            .with_paid_amount_counts(vec![(npi(1), 50_000, 19), (npi(1), 61_000, 1)]);
        let flags = SuspiciousConsistencyDetector::default().detect(&store).unwrap();
        assert_eq!(flags.len(), 1);
        assert!((flags[0].severity - 0.95).abs() < 1e-12);
        assert!(flags[0].evidence.summary.starts_with("95% of 20 billing rows"));
    }

    #[test]
    fn varied_provider_is_clean() {
        let rows: Vec<_> = (1..=12).map(|m| row(1, m, 10, 1_000 * u64::from(m))).collect();
        let store = MemoryStore::new(rows);
        assert!(SuspiciousConsistencyDetector::default().detect(&store).unwrap().is_empty());
    }
}
