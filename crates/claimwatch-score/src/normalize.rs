//! Severity normalization via a sigmoid lookup table.
//!
//! Detector severities live on different scales (overshoot ratio, robust
//! z-score, spike multiple, share of rows). Each is mapped into `[0, 1]`
//! relative to a reference severity, normally the detector's own firing
//! threshold:
//!
//! ```text
//! normalize(s, r) = sigmoid(4 * (s / r - 1))
//! ```
//!
//! so a flag exactly at threshold maps to 0.5 and the curve saturates
//! smoothly above it. The sigmoid is read from a fixed table with linear
//! interpolation, which keeps scores identical across platforms and libm
//! versions.
//!
//! The table covers `sigmoid(x)` for `x = 0.0, 0.5, 1.0, ..., 8.0` (17 entries).
//! Negative inputs use `sigmoid(-x) = 1 - sigmoid(x)`. Beyond `x = 8` the
//! output saturates at the table maximum.

/// Slope applied to the relative overshoot `s / r - 1`.
pub const NORMALIZE_SLOPE: f64 = 4.0;

/// Distance between table entries in sigmoid input units.
const TABLE_STEP: f64 = 0.5;

/// `sigmoid(x)` for `x = 0.0, 0.5, 1.0, ..., 8.0`.
const SIGMOID_TABLE: [f64; 17] = [
    0.500_000_000_0, // sigmoid(0.0)
    0.622_459_331_2, // sigmoid(0.5)
    0.731_058_578_6, // sigmoid(1.0)
    0.817_574_476_2, // sigmoid(1.5)
    0.880_797_078_0, // sigmoid(2.0)
    0.924_141_820_0, // sigmoid(2.5)
    0.952_574_126_8, // sigmoid(3.0)
    0.970_687_769_2, // sigmoid(3.5)
    0.982_013_790_0, // sigmoid(4.0)
    0.989_013_057_4, // sigmoid(4.5)
    0.993_307_149_1, // sigmoid(5.0)
    0.995_929_862_3, // sigmoid(5.5)
    0.997_527_376_8, // sigmoid(6.0)
    0.998_498_883_2, // sigmoid(6.5)
    0.999_088_948_8, // sigmoid(7.0)
    0.999_447_221_3, // sigmoid(7.5)
    0.999_664_649_9, // sigmoid(8.0)
];

/// `sigmoid(x)` for `x >= 0`, interpolated from the table.
///
/// Returns a value in `[SIGMOID_TABLE[0], SIGMOID_TABLE[last]]`.
fn sigmoid_positive(x: f64) -> f64 {
    let last = SIGMOID_TABLE.len() - 1;
    let pos = x / TABLE_STEP;
    if pos >= last as f64 {
        return SIGMOID_TABLE[last];
    }
    let index = pos.floor() as usize;
    let frac = pos - index as f64;
    let lo = SIGMOID_TABLE[index];
    let hi = SIGMOID_TABLE[index + 1];
    lo + (hi - lo) * frac
}

/// Table-driven logistic function over the whole real line.
///
/// NaN maps to the midpoint.
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        sigmoid_positive(x)
    } else if x < 0.0 {
        1.0 - sigmoid_positive(-x)
    } else {
        SIGMOID_TABLE[0]
    }
}

/// Map a detector severity into `[0, 1]` relative to `reference`.
///
/// A non-positive reference is treated as 1.0.
///
/// # Examples
///
/// ```
/// use claimwatch_score::normalize::normalize;
/// assert_eq!(normalize(3.5, 3.5), 0.5);
/// assert!(normalize(7.0, 3.5) > 0.98);
/// assert!(normalize(0.0, 3.5) < 0.02);
/// ```
pub fn normalize(severity: f64, reference: f64) -> f64 {
    let reference = if reference > 0.0 { reference } else { 1.0 };
    sigmoid(NORMALIZE_SLOPE * (severity / reference - 1.0))
}
