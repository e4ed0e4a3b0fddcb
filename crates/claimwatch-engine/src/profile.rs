//! Profile assembly: everything known about one provider, as a dossier.
//!
//! The dossier carries typed facts and evidence strings only. Rendering is
//! left to the consumer; [`ProviderDossier`]'s `Display` is the terminal
//! summary the binary prints.

use std::collections::BTreeMap;
use std::fmt;

use claimwatch_core::constants::DOSSIER_TOP_PROCEDURES;
use claimwatch_core::stats::percentile_rank;
use claimwatch_core::types::{cents_to_dollars, format_count, format_dollars_f64};
use claimwatch_core::{
    AggregateStore, DataLoadError, Flag, PeerDistribution, ProfileError, ProviderAggregate, ProviderId,
    ProviderMonthRecord, ScanError, SuspicionScore, YearMonth,
};
use serde::Serialize;
use tracing::info;

use crate::config::ScanConfig;
use crate::scan::{ScanReport, peer_distribution, run_detectors};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcedureSummary {
    pub procedure_code: String,
    pub claim_count: u64,
    pub paid: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthPaid {
    pub month: YearMonth,
    pub paid: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaimsSummary {
    pub total_paid: f64,
    pub total_claims: u64,
    pub total_beneficiaries: u64,
    pub months_active: usize,
    pub avg_monthly_paid: f64,
    pub avg_paid_per_claim: Option<f64>,
    pub first_month: YearMonth,
    pub last_month: YearMonth,
    pub largest_month: MonthPaid,
    /// Highest paid first, ties by code.
    pub top_procedures: Vec<ProcedureSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeerComparison {
    pub revenue_per_claim: Option<f64>,
    pub peer_median: f64,
    pub peer_mad: f64,
    pub population_size: usize,
    /// Percent of peers at or below this provider, one decimal.
    pub percentile: Option<f64>,
    /// `None` when the peer MAD is zero or the provider has no claims.
    pub robust_z: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEntry {
    pub month: YearMonth,
    pub claim_count: u64,
    pub beneficiary_count: u64,
    pub paid: f64,
}

/// Everything known about one provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderDossier {
    pub provider_id: ProviderId,
    pub claims_summary: ClaimsSummary,
    pub peer_comparison: PeerComparison,
    pub timeline: Vec<TimelineEntry>,
    /// Ordered by detector, then month.
    pub flags: Vec<Flag>,
    pub score: SuspicionScore,
}

/// Store view restricted to one provider. Peer revenue still covers everyone.
struct ProviderScope<'a> {
    inner: &'a dyn AggregateStore,
    provider: &'a ProviderId,
}

impl AggregateStore for ProviderScope<'_> {
    fn provider_ids(&self) -> Result<Vec<ProviderId>, DataLoadError> {
        Ok(vec![self.provider.clone()])
    }

    fn provider_records(&self, provider: &ProviderId) -> Result<Vec<ProviderMonthRecord>, DataLoadError> {
        if provider == self.provider {
            self.inner.provider_records(provider)
        } else {
            Ok(Vec::new())
        }
    }

    fn aggregate(&self, provider: &ProviderId) -> Result<Option<ProviderAggregate>, DataLoadError> {
        if provider == self.provider {
            self.inner.aggregate(provider)
        } else {
            Ok(None)
        }
    }

    fn paid_amount_counts(&self, provider: &ProviderId) -> Result<Vec<(u64, u64)>, DataLoadError> {
        if provider == self.provider {
            self.inner.paid_amount_counts(provider)
        } else {
            Ok(Vec::new())
        }
    }

    fn peer_revenue(&self) -> Result<Vec<(ProviderId, f64)>, DataLoadError> {
        self.inner.peer_revenue()
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

fn summarize_claims(agg: &ProviderAggregate, records: &[ProviderMonthRecord]) -> ClaimsSummary {
    let (largest_month, largest_paid) = agg
        .monthly_paid
        .iter()
        .copied()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
        .unwrap_or((agg.first_month, 0));

    let mut by_code: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
    for r in records {
        if let Some(code) = r.procedure_code.as_deref() {
            let entry = by_code.entry(code).or_default();
            entry.0 = entry.0.saturating_add(r.claim_count);
            entry.1 = entry.1.saturating_add(r.paid_cents);
        }
    }
    let mut procedures: Vec<_> = by_code.into_iter().collect();
    // Stable sort keeps code order among equal amounts.
    procedures.sort_by(|a, b| b.1.1.cmp(&a.1.1));
    let top_procedures = procedures
        .into_iter()
        .take(DOSSIER_TOP_PROCEDURES)
        .map(|(code, (claims, paid))| ProcedureSummary {
            procedure_code: code.to_string(),
            claim_count: claims,
            paid: cents_to_dollars(paid),
        })
        .collect();

    ClaimsSummary {
        total_paid: cents_to_dollars(agg.total_paid_cents),
        total_claims: agg.total_claims,
        total_beneficiaries: agg.total_beneficiaries,
        months_active: agg.months_active,
        avg_monthly_paid: agg.avg_monthly_paid,
        avg_paid_per_claim: agg.revenue_per_claim(),
        first_month: agg.first_month,
        last_month: agg.last_month,
        largest_month: MonthPaid {
            month: largest_month,
            paid: cents_to_dollars(largest_paid),
        },
        top_procedures,
    }
}

fn compare_to_peers(agg: &ProviderAggregate, peers: &PeerDistribution, samples: &[f64]) -> PeerComparison {
    let revenue = agg.revenue_per_claim();
    PeerComparison {
        revenue_per_claim: revenue,
        peer_median: peers.median_revenue_per_claim,
        peer_mad: peers.mad_revenue_per_claim,
        population_size: peers.population_size,
        percentile: revenue.map(|v| round_to(percentile_rank(samples, v), 1)),
        robust_z: revenue.and_then(|v| peers.robust_z(v)).map(|z| round_to(z, 2)),
    }
}

fn build_timeline(records: &[ProviderMonthRecord]) -> Vec<TimelineEntry> {
    let mut months: BTreeMap<YearMonth, (u64, u64, u64)> = BTreeMap::new();
    for r in records {
        let m = months.entry(r.month).or_default();
        m.0 = m.0.saturating_add(r.claim_count);
        m.1 = m.1.saturating_add(r.beneficiary_count);
        m.2 = m.2.saturating_add(r.paid_cents);
    }
    months
        .into_iter()
        .map(|(month, (claims, benes, paid))| TimelineEntry {
            month,
            claim_count: claims,
            beneficiary_count: benes,
            paid: cents_to_dollars(paid),
        })
        .collect()
}

/// Builds [`ProviderDossier`]s.
pub struct ProfileAssembler {
    config: ScanConfig,
}

impl ProfileAssembler {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    /// Build a dossier, running the detectors for this provider only.
    ///
    /// The peer distribution is still computed from the whole store.
    ///
    /// # Errors
    ///
    /// - [`ProfileError::UnknownProvider`] (as [`ScanError::Profile`]) before any detector runs
    /// - [`ScanError::Store`] if the store cannot be read
    pub fn assemble(&self, store: &dyn AggregateStore, provider: &ProviderId) -> Result<ProviderDossier, ScanError> {
        self.config.validate()?;
        if !store.contains_provider(provider)? {
            return Err(ProfileError::UnknownProvider(provider.clone()).into());
        }

        let distribution = peer_distribution(store)?;
        let scope = ProviderScope { inner: store, provider };
        let flags = run_detectors(&scope, &self.config.detectors(distribution.clone()))?;
        let score = self.config.scoring_engine().score_provider(provider, &flags);

        self.build(store, provider, &distribution, flags, score)
            .map_err(ScanError::from)
    }

    /// Build a dossier from a finished scan, without re-running detectors.
    pub fn assemble_from_report(
        &self,
        store: &dyn AggregateStore,
        report: &ScanReport,
        provider: &ProviderId,
    ) -> Result<ProviderDossier, ProfileError> {
        if !store.contains_provider(provider)? {
            return Err(ProfileError::UnknownProvider(provider.clone()));
        }
        let flags: Vec<Flag> = report.flags_for(provider).cloned().collect();
        let score = report
            .score_for(provider)
            .cloned()
            .unwrap_or_else(|| SuspicionScore::zero(provider.clone()));
        self.build(store, provider, &report.distribution, flags, score)
    }

    fn build(
        &self,
        store: &dyn AggregateStore,
        provider: &ProviderId,
        distribution: &PeerDistribution,
        mut flags: Vec<Flag>,
        score: SuspicionScore,
    ) -> Result<ProviderDossier, ProfileError> {
        let records = store.provider_records(provider)?;
        let agg = store
            .aggregate(provider)?
            .ok_or_else(|| ProfileError::UnknownProvider(provider.clone()))?;
        let samples: Vec<f64> = store.peer_revenue()?.into_iter().map(|(_, v)| v).collect();

        flags.sort_by(|a, b| a.detector.cmp(&b.detector).then_with(|| a.month.cmp(&b.month)));

        let dossier = ProviderDossier {
            provider_id: provider.clone(),
            claims_summary: summarize_claims(&agg, &records),
            peer_comparison: compare_to_peers(&agg, distribution, &samples),
            timeline: build_timeline(&records),
            flags,
            score,
        };
        info!(
            provider = %provider,
            flags = dossier.flags.len(),
            score = dossier.score.score,
            "dossier assembled"
        );
        Ok(dossier)
    }
}

impl fmt::Display for ProviderDossier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        let s = &self.claims_summary;
        writeln!(f, "{rule}")?;
        writeln!(f, "Provider NPI: {}", self.provider_id)?;
        writeln!(f, "Total Claims: {}", format_count(s.total_claims))?;
        writeln!(f, "Total Paid: {}", format_dollars_f64(s.total_paid))?;
        writeln!(f, "Date Range: {} to {}", s.first_month, s.last_month)?;
        writeln!(
            f,
            "Suspicion Score: {:.0}% (tier {})",
            self.score.score * 100.0,
            self.score.tier
        )?;

        if !self.flags.is_empty() {
            writeln!(f)?;
            writeln!(f, "Red Flags ({}):", self.flags.len())?;
            for flag in &self.flags {
                writeln!(f, "  - [{}] {}", flag.detector, flag.evidence.summary)?;
            }
        }

        if let Some(p) = self.peer_comparison.percentile {
            writeln!(f)?;
            writeln!(
                f,
                "Peer Ranking: {p}th percentile of {} providers (median {} per claim)",
                format_count(self.peer_comparison.population_size as u64),
                format_dollars_f64(self.peer_comparison.peer_median)
            )?;
        }
        if let Some(top) = s.top_procedures.first() {
            writeln!(
                f,
                "Top Procedure: {} ({})",
                top.procedure_code,
                format_dollars_f64(top.paid)
            )?;
        }
        write!(f, "{rule}")
    }
}
