//! Synthetic provider populations.
//!
//! Quiet providers bill a slowly varying amount at a per-claim rate between
//! $40 and $50, which trips none of the detectors. Each planted provider
//! carries exactly the anomaly its name says.

use claimwatch_core::{MemoryStore, ProviderId, ProviderMonthRecord, YearMonth};

/// Seed offset for the quiet population, so planted seeds below it never collide.
pub const QUIET_BASE: u32 = 10_000;

/// Ten-digit NPI from a seed.
pub fn npi(seed: u32) -> ProviderId {
    ProviderId::parse(&format!("{:010}", 1_000_000_000u64 + u64::from(seed))).expect("seeded NPI is ten digits")
}

/// Month `i`, counting from January 2024 and rolling into later years.
pub fn month(i: u32) -> YearMonth {
    let zero = i.saturating_sub(1);
    YearMonth::new(2024 + (zero / 12) as i32, zero % 12 + 1).expect("valid month")
}

pub fn record(seed: u32, m: u32, claims: u64, paid_cents: u64) -> ProviderMonthRecord {
    record_with_code(seed, m, "99213", claims, paid_cents)
}

pub fn record_with_code(seed: u32, m: u32, code: &str, claims: u64, paid_cents: u64) -> ProviderMonthRecord {
    ProviderMonthRecord {
        provider_id: npi(seed),
        month: month(m),
        claim_count: claims,
        beneficiary_count: claims / 3,
        paid_cents,
        procedure_code: Some(code.to_string()),
    }
}

/// A provider with `months` unremarkable months.
///
/// Every month's paid amount is distinct, so consistency never fires.
pub fn quiet_provider(seed: u32, months: u32) -> Vec<ProviderMonthRecord> {
    let per_claim = 4_000 + u64::from(seed % 50) * 20;
    (1..=months)
        .map(|m| {
            let claims = 20 + u64::from(m % 5);
            record(seed, m, claims, claims * per_claim + u64::from(m) * 137)
        })
        .collect()
}

/// `count` quiet providers with six months each.
pub fn quiet_population(count: u32) -> Vec<ProviderMonthRecord> {
    (0..count).flat_map(|i| quiet_provider(QUIET_BASE + i, 6)).collect()
}

/// A quiet population of 200 plus the planted records.
pub fn store_with(planted: Vec<ProviderMonthRecord>) -> MemoryStore {
    let mut rows = quiet_population(200);
    rows.extend(planted);
    MemoryStore::new(rows)
}

/// One month of 2,000 claims at an ordinary per-claim rate.
pub fn volume_offender(seed: u32) -> Vec<ProviderMonthRecord> {
    vec![record(seed, 1, 2_000, 2_000 * 4_500)]
}

/// Eleven months near $10,000 and a twelfth at $80,000.
pub fn spike_offender(seed: u32) -> Vec<ProviderMonthRecord> {
    let mut rows: Vec<_> = (1..=11)
        .map(|m| record(seed, m, 222, 1_000_000 + u64::from(m) * 1_234))
        .collect();
    rows.push(record(seed, 12, 1_400, 8_000_000));
    rows
}

/// Twenty non-zero rows, `matching` of them at exactly $500.00.
pub fn consistency_provider(seed: u32, matching: u32) -> Vec<ProviderMonthRecord> {
    (1..=20)
        .map(|m| {
            let paid = if m <= matching {
                50_000
            } else {
                47_000 + u64::from(m - matching) * 1_300
            };
            record(seed, m, 10, paid)
        })
        .collect()
}

/// Volume, spike, and consistency in one provider.
///
/// Ten months of $5,000.00 over 100 claims, then one month of 2,000 claims
/// paid $60,000.00. Per-claim revenue lands below the peer median.
pub fn triple_offender(seed: u32) -> Vec<ProviderMonthRecord> {
    let mut rows: Vec<_> = (1..=10).map(|m| record(seed, m, 100, 500_000)).collect();
    rows.push(record(seed, 11, 2_000, 6_000_000));
    rows
}

/// Single-month provider billing `per_claim` dollars on 100 claims.
pub fn revenue_provider(seed: u32, per_claim: f64) -> Vec<ProviderMonthRecord> {
    let paid_cents = (per_claim * 100.0 * 100.0).round() as u64;
    vec![record(seed, 1, 100, paid_cents)]
}
