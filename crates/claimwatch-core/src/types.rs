//! Core data model: provider identifiers, months, billing rows, flags, and scores.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::constants::{CENTS_PER_DOLLAR, NPI_WIDTH};
use crate::error::DataLoadError;

// ---------------------------------------------------------------------------
// ProviderId
// ---------------------------------------------------------------------------

/// National Provider Identifier: exactly ten ASCII digits.
///
/// Equal width means lexicographic order is also numeric order.
///
/// # Examples
///
/// ```
/// use claimwatch_core::types::ProviderId;
/// let id = ProviderId::parse(" 1234567890 ").unwrap();
/// assert_eq!(id.as_str(), "1234567890");
/// assert!(ProviderId::parse("12345").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProviderId(String);

impl ProviderId {
    pub fn parse(raw: &str) -> Result<Self, DataLoadError> {
        let trimmed = raw.trim();
        if trimmed.len() != NPI_WIDTH || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DataLoadError::InvalidProviderId(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ProviderId {
    type Err = DataLoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ProviderId {
    type Error = DataLoadError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ProviderId> for String {
    fn from(id: ProviderId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// YearMonth
// ---------------------------------------------------------------------------

/// A calendar month. Ordered chronologically, displayed as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    /// Build a month, rejecting month numbers outside `1..=12`.
    pub fn new(year: i32, month: u32) -> Result<Self, DataLoadError> {
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(|d| Self { year: d.year(), month: d.month() })
            .ok_or_else(|| DataLoadError::InvalidMonth(format!("{year}-{month}")))
    }

    /// Parse `YYYY-MM`, `YYYY-MM-DD`, or a full timestamp; anything after the
    /// month is ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use claimwatch_core::types::YearMonth;
    /// let a = YearMonth::parse("2024-03").unwrap();
    /// let b = YearMonth::parse("2024-03-01T00:00:00").unwrap();
    /// assert_eq!(a, b);
    /// assert_eq!(a.to_string(), "2024-03");
    /// ```
    pub fn parse(raw: &str) -> Result<Self, DataLoadError> {
        let s = raw.trim();
        let invalid = || DataLoadError::InvalidMonth(raw.to_string());
        let prefix = s.get(..7).ok_or_else(invalid)?;
        if s.len() > 7 && !s[7..].starts_with('-') {
            return Err(invalid());
        }
        let date = NaiveDate::parse_from_str(&format!("{prefix}-01"), "%Y-%m-%d")
            .map_err(|_| invalid())?;
        Ok(Self { year: date.year(), month: date.month() })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = DataLoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for YearMonth {
    type Error = DataLoadError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<YearMonth> for String {
    fn from(m: YearMonth) -> Self {
        m.to_string()
    }
}

// ---------------------------------------------------------------------------
// Money
// ---------------------------------------------------------------------------

/// Parse a non-negative decimal dollar amount into cents.
///
/// Plain decimals are parsed exactly, rounding half-up past the second
/// fractional digit. Other finite non-negative float syntax (e.g. `1.5e3`)
/// is accepted as a fallback.
///
/// # Examples
///
/// ```
/// use claimwatch_core::types::parse_cents;
/// assert_eq!(parse_cents("500.00").unwrap(), 50_000);
/// assert_eq!(parse_cents("99.999").unwrap(), 10_000);
/// assert_eq!(parse_cents("12").unwrap(), 1_200);
/// assert!(parse_cents("-1.00").is_err());
/// ```
pub fn parse_cents(raw: &str) -> Result<u64, DataLoadError> {
    let s = raw.trim();
    let invalid = || DataLoadError::InvalidAmount(raw.to_string());
    if s.is_empty() || s.starts_with('-') {
        return Err(invalid());
    }

    let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
    let is_plain = !(whole.is_empty() && frac.is_empty())
        && whole.bytes().all(|b| b.is_ascii_digit())
        && frac.bytes().all(|b| b.is_ascii_digit());

    if !is_plain {
        let value: f64 = s.parse().map_err(|_| invalid())?;
        if !value.is_finite() || value < 0.0 {
            return Err(invalid());
        }
        return Ok((value * CENTS_PER_DOLLAR as f64).round() as u64);
    }

    let whole: u64 = if whole.is_empty() { 0 } else { whole.parse().map_err(|_| invalid())? };
    let mut digits = frac.bytes().map(|b| u64::from(b - b'0'));
    let tenths = digits.next().unwrap_or(0);
    let hundredths = digits.next().unwrap_or(0);
    let round_up = u64::from(digits.next().is_some_and(|d| d >= 5));

    whole
        .checked_mul(CENTS_PER_DOLLAR)
        .and_then(|c| c.checked_add(tenths * 10 + hundredths + round_up))
        .ok_or_else(invalid)
}

/// Cents as fractional dollars.
pub fn cents_to_dollars(cents: u64) -> f64 {
    cents as f64 / CENTS_PER_DOLLAR as f64
}

/// Render an integer with thousands separators.
///
/// # Examples
///
/// ```
/// use claimwatch_core::types::format_count;
/// assert_eq!(format_count(5000), "5,000");
/// assert_eq!(format_count(999), "999");
/// ```
pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

/// Render cents as `$1,234.56`.
///
/// # Examples
///
/// ```
/// use claimwatch_core::types::format_dollars;
/// assert_eq!(format_dollars(123_456_789), "$1,234,567.89");
/// assert_eq!(format_dollars(5), "$0.05");
/// ```
pub fn format_dollars(cents: u64) -> String {
    format!(
        "${}.{:02}",
        format_count(cents / CENTS_PER_DOLLAR),
        cents % CENTS_PER_DOLLAR
    )
}

/// Render fractional dollars as `$1,234.56`, rounding to the cent.
pub fn format_dollars_f64(dollars: f64) -> String {
    if !dollars.is_finite() || dollars < 0.0 {
        return format!("${dollars:.2}");
    }
    format_dollars((dollars * CENTS_PER_DOLLAR as f64).round() as u64)
}

// ---------------------------------------------------------------------------
// Billing rows and aggregates
// ---------------------------------------------------------------------------

/// One billing row: a provider's activity in one month, optionally for one procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderMonthRecord {
    pub provider_id: ProviderId,
    pub month: YearMonth,
    pub claim_count: u64,
    pub beneficiary_count: u64,
    pub paid_cents: u64,
    pub procedure_code: Option<String>,
}

/// Per-provider totals derived from that provider's billing rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderAggregate {
    pub provider_id: ProviderId,
    pub total_paid_cents: u64,
    pub total_claims: u64,
    pub total_beneficiaries: u64,
    pub months_active: usize,
    /// Mean paid per active month, in dollars.
    pub avg_monthly_paid: f64,
    pub first_month: YearMonth,
    pub last_month: YearMonth,
    /// Chronological per-month paid totals; rows sharing a month are summed.
    pub monthly_paid: Vec<(YearMonth, u64)>,
}

impl ProviderAggregate {
    /// Aggregate a provider's rows. Returns `None` for an empty slice.
    ///
    /// Rows belonging to other providers are ignored.
    pub fn from_records(provider_id: &ProviderId, records: &[ProviderMonthRecord]) -> Option<Self> {
        let mut monthly: Vec<(YearMonth, u64)> = Vec::new();
        let mut total_paid_cents = 0u64;
        let mut total_claims = 0u64;
        let mut total_beneficiaries = 0u64;

        let mut own: Vec<&ProviderMonthRecord> =
            records.iter().filter(|r| &r.provider_id == provider_id).collect();
        if own.is_empty() {
            return None;
        }
        own.sort_by_key(|r| r.month);

        for r in own {
            total_paid_cents = total_paid_cents.saturating_add(r.paid_cents);
            total_claims = total_claims.saturating_add(r.claim_count);
            total_beneficiaries = total_beneficiaries.saturating_add(r.beneficiary_count);
            match monthly.last_mut() {
                Some((m, paid)) if *m == r.month => *paid = paid.saturating_add(r.paid_cents),
                _ => monthly.push((r.month, r.paid_cents)),
            }
        }

        let months_active = monthly.len();
        let first_month = monthly.first()?.0;
        let last_month = monthly.last()?.0;

        Some(Self {
            provider_id: provider_id.clone(),
            total_paid_cents,
            total_claims,
            total_beneficiaries,
            months_active,
            avg_monthly_paid: cents_to_dollars(total_paid_cents) / months_active as f64,
            first_month,
            last_month,
            monthly_paid: monthly,
        })
    }

    /// Paid dollars per claim, or `None` when the provider billed no claims.
    pub fn revenue_per_claim(&self) -> Option<f64> {
        (self.total_claims > 0)
            .then(|| cents_to_dollars(self.total_paid_cents) / self.total_claims as f64)
    }
}

// ---------------------------------------------------------------------------
// Flags and scores
// ---------------------------------------------------------------------------

/// The four independent detection methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    VolumeImpossibility,
    RevenueOutlier,
    BillingSpike,
    SuspiciousConsistency,
}

impl DetectorKind {
    pub const ALL: [DetectorKind; 4] = [
        DetectorKind::VolumeImpossibility,
        DetectorKind::RevenueOutlier,
        DetectorKind::BillingSpike,
        DetectorKind::SuspiciousConsistency,
    ];

    /// Stable snake_case identifier used in exports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VolumeImpossibility => "volume_impossibility",
            Self::RevenueOutlier => "revenue_outlier",
            Self::BillingSpike => "billing_spike",
            Self::SuspiciousConsistency => "suspicious_consistency",
        }
    }

    /// Position in [`DetectorKind::ALL`].
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-readable facts backing a flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evidence {
    /// One-line statement of what was observed.
    pub summary: String,
    pub observed: f64,
    pub threshold: f64,
    /// What `observed` was compared against.
    pub basis: String,
}

/// One piece of anomaly evidence raised by one detector against one provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Flag {
    pub detector: DetectorKind,
    pub provider_id: ProviderId,
    /// Set for month-scoped detectors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<YearMonth>,
    /// Detector-defined scale; higher is stronger evidence.
    pub severity: f64,
    pub evidence: Evidence,
}

/// Corroboration-bounded suspicion for one provider.
///
/// # Invariants
///
/// * `tier == contributing_detectors.len()`
/// * `0.0 <= score <= tier_ceiling(tier)`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuspicionScore {
    pub provider_id: ProviderId,
    pub score: f64,
    pub tier: usize,
    pub contributing_detectors: BTreeSet<DetectorKind>,
}

impl SuspicionScore {
    /// Score for a provider no detector flagged.
    pub fn zero(provider_id: ProviderId) -> Self {
        Self {
            provider_id,
            score: 0.0,
            tier: 0,
            contributing_detectors: BTreeSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn id(s: &str) -> ProviderId {
        ProviderId::parse(s).unwrap()
    }

    fn record(npi: &str, month: &str, claims: u64, paid_cents: u64) -> ProviderMonthRecord {
        ProviderMonthRecord {
            provider_id: id(npi),
            month: YearMonth::parse(month).unwrap(),
            claim_count: claims,
            beneficiary_count: claims / 2,
            paid_cents,
            procedure_code: None,
        }
    }

    // --- ProviderId ---

    #[test]
    fn provider_id_rejects_wrong_width() {
        assert!(ProviderId::parse("123456789").is_err());
        assert!(ProviderId::parse("12345678901").is_err());
    }

    #[test]
    fn provider_id_rejects_non_digits() {
        assert_eq!(
            ProviderId::parse("12345abcde"),
            Err(DataLoadError::InvalidProviderId("12345abcde".into()))
        );
    }

    #[test]
    fn provider_id_orders_numerically() {
        assert!(id("0999999999") < id("1000000000"));
    }

    #[test]
    fn provider_id_serde_validates() {
        let ok: ProviderId = serde_json::from_str("\"2000000002\"").unwrap();
        assert_eq!(ok.as_str(), "2000000002");
        assert!(serde_json::from_str::<ProviderId>("\"nope\"").is_err());
    }

    // --- YearMonth ---

    #[test]
    fn month_parses_date_forms() {
        let m = YearMonth::parse("2024-07-01").unwrap();
        assert_eq!((m.year(), m.month()), (2024, 7));
    }

    #[test]
    fn month_rejects_garbage() {
        assert!(YearMonth::parse("2024").is_err());
        assert!(YearMonth::parse("2024-13").is_err());
        assert!(YearMonth::parse("2024-0101").is_err());
        assert!(YearMonth::new(2024, 0).is_err());
    }

    #[test]
    fn month_orders_chronologically() {
        assert!(YearMonth::parse("2023-12").unwrap() < YearMonth::parse("2024-01").unwrap());
    }

    // --- money ---

    #[test]
    fn cents_parse_edge_forms() {
        assert_eq!(parse_cents(".5").unwrap(), 50);
        assert_eq!(parse_cents("7.").unwrap(), 700);
        assert_eq!(parse_cents("0.004").unwrap(), 0);
        assert_eq!(parse_cents("0.005").unwrap(), 1);
        assert_eq!(parse_cents("1.5e3").unwrap(), 150_000);
        assert!(parse_cents("").is_err());
        assert!(parse_cents("abc").is_err());
        assert!(parse_cents(".").is_err());
    }

    #[test]
    fn format_dollars_groups_thousands() {
        assert_eq!(format_dollars(100_000), "$1,000.00");
        assert_eq!(format_dollars(99_999), "$999.99");
        assert_eq!(format_dollars(0), "$0.00");
    }

    // --- ProviderAggregate ---

    #[test]
    fn aggregate_sums_rows_of_same_month() {
        let rows = vec![
            record("1000000001", "2024-02", 10, 1_000),
            record("1000000001", "2024-01", 5, 500),
            record("1000000001", "2024-02", 20, 2_000),
            record("2000000002", "2024-01", 99, 99_999),
        ];
        let agg = ProviderAggregate::from_records(&id("1000000001"), &rows).unwrap();
        assert_eq!(agg.total_claims, 35);
        assert_eq!(agg.total_paid_cents, 3_500);
        assert_eq!(agg.months_active, 2);
        assert_eq!(agg.first_month.to_string(), "2024-01");
        assert_eq!(agg.last_month.to_string(), "2024-02");
        assert_eq!(agg.monthly_paid[1].1, 3_000);
        assert!((agg.avg_monthly_paid - 17.5).abs() < 1e-9);
    }

    #[test]
    fn aggregate_of_absent_provider_is_none() {
        let rows = vec![record("1000000001", "2024-01", 1, 100)];
        assert!(ProviderAggregate::from_records(&id("3000000003"), &rows).is_none());
    }

    #[test]
    fn revenue_per_claim_none_without_claims() {
        let rows = vec![record("1000000001", "2024-01", 0, 100)];
        let agg = ProviderAggregate::from_records(&id("1000000001"), &rows).unwrap();
        assert_eq!(agg.revenue_per_claim(), None);
    }

    #[test]
    fn detector_kind_serializes_snake_case() {
        let json = serde_json::to_string(&DetectorKind::BillingSpike).unwrap();
        assert_eq!(json, "\"billing_spike\"");
        for (i, kind) in DetectorKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    proptest! {
        #[test]
        fn cents_roundtrip_through_format(c in 0u64..10_000_000_000u64) {
            let rendered = format_dollars(c).replace(['$', ','], "");
            prop_assert_eq!(parse_cents(&rendered).unwrap(), c);
        }
    }
}
