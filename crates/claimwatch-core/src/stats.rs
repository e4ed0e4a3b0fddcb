//! Robust statistics over per-claim revenue samples.
//!
//! Pure computation. Non-finite samples are discarded before any statistic is
//! taken so a single malformed aggregate cannot poison the peer snapshot.

use ordered_float::OrderedFloat;
use serde::Serialize;

use crate::constants::MAD_SCALE;

/// Sort finite values ascending.
fn sorted_finite(values: &[f64]) -> Vec<f64> {
    let mut v: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    v.sort_by_key(|x| OrderedFloat(*x));
    v
}

/// Median of an already sorted slice; mean of the two middle values for even lengths.
fn median_sorted(sorted: &[f64]) -> Option<f64> {
    let n = sorted.len();
    match n {
        0 => None,
        _ if n % 2 == 1 => Some(sorted[n / 2]),
        _ => Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0),
    }
}

/// Median of the finite values, or `None` if there are none.
///
/// # Examples
///
/// ```
/// use claimwatch_core::stats::median;
/// assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
/// assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
/// assert_eq!(median(&[]), None);
/// ```
pub fn median(values: &[f64]) -> Option<f64> {
    median_sorted(&sorted_finite(values))
}

/// Unscaled median absolute deviation from the median.
///
/// # Examples
///
/// ```
/// use claimwatch_core::stats::median_absolute_deviation;
/// assert_eq!(median_absolute_deviation(&[1.0, 1.0, 2.0, 2.0, 4.0, 6.0, 9.0]), Some(1.0));
/// ```
pub fn median_absolute_deviation(values: &[f64]) -> Option<f64> {
    let center = median(values)?;
    let deviations: Vec<f64> = values
        .iter()
        .filter(|x| x.is_finite())
        .map(|x| (x - center).abs())
        .collect();
    median(&deviations)
}

/// Percent of `population` at or below `value`, in `[0, 100]`.
///
/// Returns `0.0` for an empty population.
pub fn percentile_rank(population: &[f64], value: f64) -> f64 {
    let finite: Vec<f64> = population.iter().copied().filter(|x| x.is_finite()).collect();
    if finite.is_empty() {
        return 0.0;
    }
    let at_or_below = finite.iter().filter(|&&x| x <= value).count();
    at_or_below as f64 / finite.len() as f64 * 100.0
}

/// Cross-provider snapshot of per-claim revenue.
///
/// Computed once per run and passed explicitly to whatever needs it; it is
/// never recomputed while a scan is in progress.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeerDistribution {
    pub median_revenue_per_claim: f64,
    /// Unscaled MAD. Multiply by [`MAD_SCALE`] for a standard-deviation analogue.
    pub mad_revenue_per_claim: f64,
    pub population_size: usize,
}

impl PeerDistribution {
    /// Build the snapshot from per-provider revenue samples.
    ///
    /// An empty population yields zeros with `population_size == 0`.
    pub fn from_samples(samples: &[f64]) -> Self {
        let sorted = sorted_finite(samples);
        let center = median_sorted(&sorted).unwrap_or(0.0);
        let mad = median_absolute_deviation(&sorted).unwrap_or(0.0);
        Self {
            median_revenue_per_claim: center,
            mad_revenue_per_claim: mad,
            population_size: sorted.len(),
        }
    }

    /// Whether the MAD is zero, making robust z-scores undefined.
    pub fn is_degenerate(&self) -> bool {
        self.mad_revenue_per_claim <= 0.0
    }

    /// MAD rescaled to be comparable to a standard deviation under normality.
    pub fn scaled_mad(&self) -> f64 {
        MAD_SCALE * self.mad_revenue_per_claim
    }

    /// Robust z-score of `value`; `None` when the distribution is degenerate.
    ///
    /// # Examples
    ///
    /// ```
    /// use claimwatch_core::stats::PeerDistribution;
    /// let peers = PeerDistribution::from_samples(&[8.0, 9.0, 10.0, 11.0, 12.0]);
    /// assert_eq!(peers.median_revenue_per_claim, 10.0);
    /// assert_eq!(peers.mad_revenue_per_claim, 1.0);
    /// assert!(peers.robust_z(10.0).unwrap().abs() < 1e-12);
    /// ```
    pub fn robust_z(&self, value: f64) -> Option<f64> {
        (!self.is_degenerate()).then(|| (value - self.median_revenue_per_claim) / self.scaled_mad())
    }

    /// Revenue above which a provider's robust z exceeds `k`.
    pub fn outlier_bound(&self, k: f64) -> f64 {
        self.median_revenue_per_claim + k * self.scaled_mad()
    }
}
