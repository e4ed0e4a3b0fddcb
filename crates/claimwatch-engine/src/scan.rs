//! Scan pipeline.
//!
//! One run: snapshot the peer distribution, evaluate every detector in
//! parallel over the shared store, score, rank. Detectors are independent;
//! a detector that fails for any reason other than the store is logged and
//! its flags are dropped, while a store failure aborts the run.

use std::collections::BTreeMap;
use std::io::Write;

use claimwatch_core::{
    AggregateStore, DataLoadError, DetectError, Detector, Flag, PeerDistribution, ProviderId, ScanError,
    SuspicionScore,
};
use claimwatch_score::RankedEntry;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{error, info};

use crate::config::ScanConfig;

/// Everything one scan produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanReport {
    pub distribution: PeerDistribution,
    /// Every flag, ordered by provider, then detector, then month.
    pub flags: Vec<Flag>,
    /// One score per provider in the store, ascending by id.
    pub scores: Vec<SuspicionScore>,
    /// Every provider at or above the threshold, ranked. Not truncated.
    pub ranked: Vec<RankedEntry>,
    /// How many ranked entries to present.
    pub top: usize,
}

impl ScanReport {
    /// The first `top` ranked entries.
    pub fn top_ranked(&self) -> &[RankedEntry] {
        &self.ranked[..self.top.min(self.ranked.len())]
    }

    pub fn flags_for<'a>(&'a self, provider: &'a ProviderId) -> impl Iterator<Item = &'a Flag> {
        self.flags.iter().filter(move |f| &f.provider_id == provider)
    }

    pub fn score_for(&self, provider: &ProviderId) -> Option<&SuspicionScore> {
        self.scores
            .binary_search_by(|s| s.provider_id.cmp(provider))
            .ok()
            .map(|i| &self.scores[i])
    }
}

/// Peer distribution from the store's `peer_revenue` table.
pub fn peer_distribution(store: &dyn AggregateStore) -> Result<PeerDistribution, DataLoadError> {
    let samples: Vec<f64> = store.peer_revenue()?.into_iter().map(|(_, v)| v).collect();
    Ok(PeerDistribution::from_samples(&samples))
}

/// Canonical flag order: provider, detector, month.
pub(crate) fn sort_flags(flags: &mut [Flag]) {
    flags.sort_by(|a, b| {
        a.provider_id
            .cmp(&b.provider_id)
            .then_with(|| a.detector.cmp(&b.detector))
            .then_with(|| a.month.cmp(&b.month))
    });
}

/// Run every detector in parallel and merge their flags.
///
/// Only a store failure is returned; any other detector error drops that
/// detector's flags and the rest proceed.
pub fn run_detectors(
    store: &dyn AggregateStore,
    detectors: &[Box<dyn Detector>],
) -> Result<Vec<Flag>, DataLoadError> {
    let outcomes: Vec<_> = detectors
        .par_iter()
        .map(|d| (d.kind(), d.detect(store)))
        .collect();

    let mut flags = Vec::new();
    for (kind, outcome) in outcomes {
        match outcome {
            Ok(found) => {
                info!(detector = %kind, flags = found.len(), "detector finished");
                flags.extend(found);
            }
            Err(DetectError::Store(e)) => return Err(e),
            Err(e) => {
                error!(detector = %kind, error = %e, "detector failed, its flags are dropped");
            }
        }
    }
    sort_flags(&mut flags);
    Ok(flags)
}

pub struct Scanner {
    config: ScanConfig,
}

impl Scanner {
    /// # Errors
    ///
    /// - [`ScanError::InvalidConfig`] if the configuration does not validate
    pub fn new(config: ScanConfig) -> Result<Self, ScanError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Full scan with the configured detectors.
    pub fn run(&self, store: &dyn AggregateStore) -> Result<ScanReport, ScanError> {
        let distribution = peer_distribution(store)?;
        info!(
            median = distribution.median_revenue_per_claim,
            mad = distribution.mad_revenue_per_claim,
            population = distribution.population_size,
            "peer distribution computed"
        );
        let detectors = self.config.detectors(distribution.clone());
        self.run_with(store, distribution, &detectors)
    }

    /// Scan with an explicit distribution and detector set.
    pub fn run_with(
        &self,
        store: &dyn AggregateStore,
        distribution: PeerDistribution,
        detectors: &[Box<dyn Detector>],
    ) -> Result<ScanReport, ScanError> {
        let rank_builder = self.config.rank_builder()?;
        let flags = run_detectors(store, detectors)?;

        let mut flagged: BTreeMap<_, _> = self
            .config
            .scoring_engine()
            .score_all(&flags)
            .into_iter()
            .map(|s| (s.provider_id.clone(), s))
            .collect();
        let scores: Vec<SuspicionScore> = store
            .provider_ids()?
            .into_iter()
            .map(|id| flagged.remove(&id).unwrap_or_else(|| SuspicionScore::zero(id)))
            .collect();

        let ranked = rank_builder.build_all(&scores, &flags);
        info!(
            providers = scores.len(),
            flags = flags.len(),
            ranked = ranked.len(),
            threshold = rank_builder.threshold(),
            "scan complete"
        );

        Ok(ScanReport {
            distribution,
            flags,
            scores,
            ranked,
            top: rank_builder.top(),
        })
    }
}

#[derive(Debug, Serialize)]
struct ScanCsvRow<'a> {
    rank: usize,
    provider_id: &'a str,
    score: String,
    tier: usize,
    num_flags: usize,
    detectors: String,
}

/// Write ranked entries as `rank, provider_id, score, tier, num_flags, detectors`.
pub fn write_scan_csv<W: Write>(entries: &[RankedEntry], writer: W) -> Result<(), DataLoadError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for e in entries {
        let detectors: Vec<&str> = e.contributing_detectors.iter().map(|d| d.as_str()).collect();
        wtr.serialize(ScanCsvRow {
            rank: e.rank,
            provider_id: e.provider_id.as_str(),
            score: format!("{:.3}", e.score),
            tier: e.tier,
            num_flags: e.flag_count,
            detectors: detectors.join(", "),
        })
        .map_err(|err| DataLoadError::Io(err.to_string()))?;
    }
    wtr.flush().map_err(|err| DataLoadError::Io(err.to_string()))
}
