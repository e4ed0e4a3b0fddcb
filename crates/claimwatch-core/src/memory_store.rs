//! In-memory aggregate store.
//!
//! Provides [`MemoryStore`], an immutable snapshot of billing rows indexed by
//! provider. Loaders in claimwatch-engine build one from CSV; tests build one
//! directly from synthetic rows.
//!
//! Per-provider aggregates are computed once at construction so detectors
//! and the profile path read the same numbers.

use std::collections::BTreeMap;

use crate::error::DataLoadError;
use crate::traits::AggregateStore;
use crate::types::{ProviderAggregate, ProviderId, ProviderMonthRecord};

/// Immutable billing snapshot keyed by provider.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: BTreeMap<ProviderId, Vec<ProviderMonthRecord>>,
    aggregates: BTreeMap<ProviderId, ProviderAggregate>,
    /// Externally supplied `peer_revenue_distribution` table, if any.
    peer_override: Option<Vec<(ProviderId, f64)>>,
    /// Source-row paid amount frequencies, when rows were summed before indexing.
    paid_counts: Option<BTreeMap<ProviderId, Vec<(u64, u64)>>>,
}

impl MemoryStore {
    /// Index `records` by provider. Rows are ordered by month, then procedure code.
    pub fn new(records: Vec<ProviderMonthRecord>) -> Self {
        let mut by_provider: BTreeMap<ProviderId, Vec<ProviderMonthRecord>> = BTreeMap::new();
        for r in records {
            by_provider.entry(r.provider_id.clone()).or_default().push(r);
        }

        let mut aggregates = BTreeMap::new();
        for (id, rows) in by_provider.iter_mut() {
            rows.sort_by(|a, b| {
                a.month
                    .cmp(&b.month)
                    .then_with(|| a.procedure_code.cmp(&b.procedure_code))
            });
            if let Some(agg) = ProviderAggregate::from_records(id, rows) {
                aggregates.insert(id.clone(), agg);
            }
        }

        Self {
            records: by_provider,
            aggregates,
            peer_override: None,
            paid_counts: None,
        }
    }

    /// Replace the store-derived peer revenue samples with an external table.
    ///
    /// Entries are sorted by provider id; non-finite or negative revenues are dropped.
    pub fn with_peer_revenue(mut self, mut peers: Vec<(ProviderId, f64)>) -> Self {
        peers.retain(|(_, v)| v.is_finite() && *v >= 0.0);
        peers.sort_by(|a, b| a.0.cmp(&b.0));
        self.peer_override = Some(peers);
        self
    }

    /// Attach the per-row paid amount frequencies of the source extract as
    /// `(provider, paid cents, row count)` entries.
    ///
    /// Replaces the counts derived from the indexed rows for every provider;
    /// providers absent from the table report no rows. Duplicate entries are
    /// summed.
    pub fn with_paid_amount_counts(mut self, counts: Vec<(ProviderId, u64, u64)>) -> Self {
        let mut table: BTreeMap<ProviderId, BTreeMap<u64, u64>> = BTreeMap::new();
        for (id, amount, rows) in counts.into_iter().filter(|c| c.2 > 0) {
            let n = table.entry(id).or_default().entry(amount).or_default();
            *n = n.saturating_add(rows);
        }
        self.paid_counts = Some(
            table
                .into_iter()
                .map(|(id, amounts)| (id, amounts.into_iter().collect()))
                .collect(),
        );
        self
    }

    pub fn provider_count(&self) -> usize {
        self.records.len()
    }

    pub fn record_count(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl AggregateStore for MemoryStore {
    fn provider_ids(&self) -> Result<Vec<ProviderId>, DataLoadError> {
        Ok(self.records.keys().cloned().collect())
    }

    fn provider_records(&self, provider: &ProviderId) -> Result<Vec<ProviderMonthRecord>, DataLoadError> {
        Ok(self.records.get(provider).cloned().unwrap_or_default())
    }

    fn contains_provider(&self, provider: &ProviderId) -> Result<bool, DataLoadError> {
        Ok(self.records.contains_key(provider))
    }

    fn aggregate(&self, provider: &ProviderId) -> Result<Option<ProviderAggregate>, DataLoadError> {
        Ok(self.aggregates.get(provider).cloned())
    }

    fn paid_amount_counts(&self, provider: &ProviderId) -> Result<Vec<(u64, u64)>, DataLoadError> {
        if let Some(table) = &self.paid_counts {
            return Ok(table.get(provider).cloned().unwrap_or_default());
        }
        let mut counts: BTreeMap<u64, u64> = BTreeMap::new();
        for r in self.records.get(provider).into_iter().flatten() {
            *counts.entry(r.paid_cents).or_default() += 1;
        }
        Ok(counts.into_iter().collect())
    }

    fn peer_revenue(&self) -> Result<Vec<(ProviderId, f64)>, DataLoadError> {
        if let Some(peers) = &self.peer_override {
            return Ok(peers.clone());
        }
        Ok(self
            .aggregates
            .iter()
            .filter_map(|(id, agg)| agg.revenue_per_claim().map(|v| (id.clone(), v)))
            .collect())
    }
}
