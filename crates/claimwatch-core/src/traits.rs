//! Trait interfaces for Claimwatch.
//!
//! These traits define the contracts between crates:
//! - [`AggregateStore`]: read-only billing aggregates ([`MemoryStore`](crate::MemoryStore) implements it)
//! - [`Detector`]: one independent anomaly detection method (claimwatch-detect implements)

use std::collections::BTreeMap;

use crate::error::{DataLoadError, DetectError};
use crate::types::{DetectorKind, Flag, ProviderAggregate, ProviderId, ProviderMonthRecord};

/// Read-only view of the billing aggregates.
///
/// Implementations hold an immutable snapshot for the lifetime of a scan.
/// Every method may fail with [`DataLoadError`] when the backing data cannot
/// be read; such failures are fatal to the run.
pub trait AggregateStore: Send + Sync {
    /// All provider ids, ascending.
    fn provider_ids(&self) -> Result<Vec<ProviderId>, DataLoadError>;

    /// Billing rows for one provider, ordered by month. Empty if unknown.
    fn provider_records(&self, provider: &ProviderId) -> Result<Vec<ProviderMonthRecord>, DataLoadError>;

    /// Whether the provider appears in the store.
    ///
    /// Default implementation delegates to [`provider_records`](Self::provider_records).
    fn contains_provider(&self, provider: &ProviderId) -> Result<bool, DataLoadError> {
        Ok(!self.provider_records(provider)?.is_empty())
    }

    /// Totals for one provider. Returns `None` if unknown.
    ///
    /// Default implementation aggregates [`provider_records`](Self::provider_records).
    fn aggregate(&self, provider: &ProviderId) -> Result<Option<ProviderAggregate>, DataLoadError> {
        let records = self.provider_records(provider)?;
        Ok(ProviderAggregate::from_records(provider, &records))
    }

    /// How many source billing rows carried each paid amount (cents), ascending by amount.
    ///
    /// Counts rows as they appeared in the extract, before rows sharing a
    /// provider, month, and procedure were summed. Default implementation
    /// counts each of [`provider_records`](Self::provider_records) once.
    fn paid_amount_counts(&self, provider: &ProviderId) -> Result<Vec<(u64, u64)>, DataLoadError> {
        let mut counts: BTreeMap<u64, u64> = BTreeMap::new();
        for r in self.provider_records(provider)? {
            *counts.entry(r.paid_cents).or_default() += 1;
        }
        Ok(counts.into_iter().collect())
    }

    /// Per-claim revenue for every provider with at least one claim, ascending by id.
    ///
    /// This is the `peer_revenue_distribution` table.
    fn peer_revenue(&self) -> Result<Vec<(ProviderId, f64)>, DataLoadError> {
        let mut out = Vec::new();
        for id in self.provider_ids()? {
            if let Some(rpc) = self.aggregate(&id)?.and_then(|a| a.revenue_per_claim()) {
                out.push((id, rpc));
            }
        }
        Ok(out)
    }
}

/// One statistically distinct anomaly detection method.
///
/// Detectors are pure over the store: they share no mutable state and may
/// run in any order or concurrently. Per-provider conditions such as
/// insufficient history are handled inside `detect`; only store failures are
/// returned.
pub trait Detector: Send + Sync {
    /// Which method this is. Every flag returned carries this kind.
    fn kind(&self) -> DetectorKind;

    /// Evaluate every provider in the store and return the flags raised.
    fn detect(&self, store: &dyn AggregateStore) -> Result<Vec<Flag>, DetectError>;
}
