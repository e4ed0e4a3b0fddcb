//! Detection and scoring constants. Monetary values in cents (1 USD = 100 cents).

/// Cents per dollar.
pub const CENTS_PER_DOLLAR: u64 = 100;

/// Number of ASCII digits in a National Provider Identifier.
pub const NPI_WIDTH: usize = 10;

// ---------------------------------------------------------------------------
// Volume impossibility
// ---------------------------------------------------------------------------

/// Maximum plausible claims billed by one provider in one month.
pub const MAX_CLAIMS_PER_MONTH: u64 = 1500;

/// Cap on the overshoot ratio used as volume severity.
pub const VOLUME_SEVERITY_CAP: f64 = 3.0;

// ---------------------------------------------------------------------------
// Revenue outlier
// ---------------------------------------------------------------------------

/// Rescales MAD to be comparable to a standard deviation under normality.
pub const MAD_SCALE: f64 = 1.4826;

/// Robust z-score above which per-claim revenue is an outlier.
pub const REVENUE_ROBUST_Z_THRESHOLD: f64 = 3.5;

/// Absolute per-claim excess over the median (dollars) that still flags a
/// provider when the peer MAD is zero.
pub const REVENUE_MAD_FLOOR: f64 = 250.0;

// ---------------------------------------------------------------------------
// Billing spike
// ---------------------------------------------------------------------------

/// A month at or above this multiple of the provider's own mean is a spike.
pub const SPIKE_MULTIPLIER: f64 = 5.0;

/// Months of history required before any month is evaluated.
pub const SPIKE_MIN_MONTHS: usize = 2;

// ---------------------------------------------------------------------------
// Suspicious consistency
// ---------------------------------------------------------------------------

/// Share of rows carrying the modal paid amount above which billing is suspicious.
pub const CONSISTENCY_RATIO_THRESHOLD: f64 = 0.90;

/// Non-zero rows required before consistency is evaluated.
pub const CONSISTENCY_MIN_ROWS: usize = 5;

// ---------------------------------------------------------------------------
// Scoring and ranking
// ---------------------------------------------------------------------------

/// Score ceiling for a provider flagged by exactly one detector.
pub const CEILING_TIER_1: f64 = 0.7;

/// Score ceiling for a provider flagged by exactly two detectors.
pub const CEILING_TIER_2: f64 = 0.9;

/// Score ceiling (and floor) for three or more corroborating detectors.
pub const CEILING_TIER_3: f64 = 1.0;

/// Default minimum score for a provider to appear in ranked output.
pub const DEFAULT_SCORE_THRESHOLD: f64 = 0.3;

/// Default number of ranked providers returned by a scan.
pub const DEFAULT_TOP: usize = 50;

/// Number of procedures listed in a dossier's claims summary.
pub const DOSSIER_TOP_PROCEDURES: usize = 10;

/// Upper score bound for a given tier (count of distinct detectors).
///
/// # Examples
///
/// ```
/// use claimwatch_core::constants::tier_ceiling;
/// assert_eq!(tier_ceiling(0), 0.0);
/// assert_eq!(tier_ceiling(1), 0.7);
/// assert_eq!(tier_ceiling(2), 0.9);
/// assert_eq!(tier_ceiling(4), 1.0);
/// ```
pub fn tier_ceiling(tier: usize) -> f64 {
    match tier {
        0 => 0.0,
        1 => CEILING_TIER_1,
        2 => CEILING_TIER_2,
        _ => CEILING_TIER_3,
    }
}

/// Lower score bound for a given tier.
///
/// Three or more independent detectors saturate the score; fewer leave the
/// combined component score unconstrained from below.
pub fn tier_floor(tier: usize) -> f64 {
    match tier {
        0..=2 => 0.0,
        _ => CEILING_TIER_3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceilings_increase_with_tier() {
        for t in 1..6 {
            assert!(tier_ceiling(t) >= tier_ceiling(t - 1), "ceiling dropped at tier {t}");
        }
    }

    #[test]
    fn floor_never_exceeds_ceiling() {
        for t in 0..6 {
            assert!(tier_floor(t) <= tier_ceiling(t));
        }
    }

    #[test]
    fn floor_saturates_only_at_three() {
        assert_eq!(tier_floor(2), 0.0);
        assert_eq!(tier_floor(3), 1.0);
    }
}
