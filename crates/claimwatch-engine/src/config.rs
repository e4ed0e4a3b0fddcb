//! Scan configuration.
//!
//! [`ScanConfig`] is layered, lowest precedence first:
//! 1. built-in defaults (every section is `#[serde(default)]`)
//! 2. a TOML file: `--config <path>`, else `<config_dir>/claimwatch/config.toml` when present
//! 3. `CLAIMWATCH_<SECTION>__<KEY>` environment variables, e.g. `CLAIMWATCH_RANK__THRESHOLD=0.5`
//! 4. command-line flags, applied by the binary before [`ScanConfig::validate`]

use std::path::{Path, PathBuf};

use claimwatch_core::constants::{
    CONSISTENCY_MIN_ROWS, CONSISTENCY_RATIO_THRESHOLD, DEFAULT_SCORE_THRESHOLD, DEFAULT_TOP,
    MAX_CLAIMS_PER_MONTH, REVENUE_MAD_FLOOR, REVENUE_ROBUST_Z_THRESHOLD, SPIKE_MIN_MONTHS,
    SPIKE_MULTIPLIER, VOLUME_SEVERITY_CAP,
};
use claimwatch_core::{Detector, DetectorKind, PeerDistribution, ScanError};
use claimwatch_detect::{
    BillingSpikeDetector, RevenueOutlierDetector, SuspiciousConsistencyDetector, VolumeImpossibilityDetector,
};
use claimwatch_score::{RankedResultBuilder, ScoringEngine};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "CLAIMWATCH";

/// Complete configuration for a scan or profile run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub rank: RankConfig,
    pub volume: VolumeConfig,
    pub revenue: RevenueConfig,
    pub spike: SpikeConfig,
    pub consistency: ConsistencyConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankConfig {
    /// Minimum score for a provider to be ranked, within `[0, 1]`.
    pub threshold: f64,
    /// Providers shown after ranking.
    pub top: usize,
}

impl Default for RankConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SCORE_THRESHOLD,
            top: DEFAULT_TOP,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    pub max_claims_per_month: u64,
    pub severity_cap: f64,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            max_claims_per_month: MAX_CLAIMS_PER_MONTH,
            severity_cap: VOLUME_SEVERITY_CAP,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RevenueConfig {
    /// Robust z-score threshold.
    pub z_threshold: f64,
    /// Dollars per claim above the median that fire when the peer MAD is zero.
    pub mad_floor: f64,
}

impl Default for RevenueConfig {
    fn default() -> Self {
        Self {
            z_threshold: REVENUE_ROBUST_Z_THRESHOLD,
            mad_floor: REVENUE_MAD_FLOOR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpikeConfig {
    pub multiplier: f64,
    pub min_months: usize,
}

impl Default for SpikeConfig {
    fn default() -> Self {
        Self {
            multiplier: SPIKE_MULTIPLIER,
            min_months: SPIKE_MIN_MONTHS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyConfig {
    pub ratio_threshold: f64,
    pub min_rows: usize,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            ratio_threshold: CONSISTENCY_RATIO_THRESHOLD,
            min_rows: CONSISTENCY_MIN_ROWS,
        }
    }
}

fn invalid(msg: impl Into<String>) -> ScanError {
    ScanError::InvalidConfig(msg.into())
}

impl ScanConfig {
    /// `<config_dir>/claimwatch/config.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("claimwatch").join("config.toml"))
    }

    /// Load defaults, then the TOML file, then the environment, and validate.
    ///
    /// An explicit `path` must exist; the default path is optional.
    ///
    /// # Errors
    ///
    /// - [`ScanError::InvalidConfig`] if a source cannot be read or parsed, or validation fails
    pub fn load(path: Option<&Path>) -> Result<Self, ScanError> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                debug!(path = %p.display(), "loading config file");
                builder = builder.add_source(File::from(p).format(FileFormat::Toml).required(true));
            }
            None => {
                if let Some(p) = Self::default_path() {
                    builder = builder.add_source(File::from(p).format(FileFormat::Toml).required(false));
                }
            }
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let cfg: ScanConfig = builder
            .build()
            .and_then(Config::try_deserialize::<ScanConfig>)
            .map_err(|e| invalid(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML document over the defaults, without file or environment layers.
    ///
    /// # Errors
    ///
    /// - [`ScanError::InvalidConfig`] if the document is malformed or validation fails
    pub fn from_toml_str(toml: &str) -> Result<Self, ScanError> {
        let cfg: ScanConfig = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .and_then(Config::try_deserialize::<ScanConfig>)
            .map_err(|e| invalid(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values no detector or ranking step can use.
    pub fn validate(&self) -> Result<(), ScanError> {
        let r = &self.rank;
        if !(0.0..=1.0).contains(&r.threshold) {
            return Err(invalid(format!("rank.threshold must be within [0, 1], got {}", r.threshold)));
        }
        if r.top == 0 {
            return Err(invalid("rank.top must be at least 1"));
        }

        let v = &self.volume;
        if v.max_claims_per_month == 0 {
            return Err(invalid("volume.max_claims_per_month must be at least 1"));
        }
        if !(v.severity_cap.is_finite() && v.severity_cap >= 1.0) {
            return Err(invalid(format!("volume.severity_cap must be >= 1, got {}", v.severity_cap)));
        }

        let rev = &self.revenue;
        if !(rev.z_threshold.is_finite() && rev.z_threshold > 0.0) {
            return Err(invalid(format!("revenue.z_threshold must be positive, got {}", rev.z_threshold)));
        }
        if !(rev.mad_floor.is_finite() && rev.mad_floor >= 0.0) {
            return Err(invalid(format!("revenue.mad_floor must be non-negative, got {}", rev.mad_floor)));
        }

        let s = &self.spike;
        if !(s.multiplier.is_finite() && s.multiplier > 1.0) {
            return Err(invalid(format!("spike.multiplier must be greater than 1, got {}", s.multiplier)));
        }
        if s.min_months < 2 {
            return Err(invalid(format!("spike.min_months must be at least 2, got {}", s.min_months)));
        }

        let c = &self.consistency;
        if !(c.ratio_threshold > 0.0 && c.ratio_threshold < 1.0) {
            return Err(invalid(format!(
                "consistency.ratio_threshold must be within (0, 1), got {}",
                c.ratio_threshold
            )));
        }
        if c.min_rows == 0 {
            return Err(invalid("consistency.min_rows must be at least 1"));
        }

        Ok(())
    }

    /// The four detectors, in [`DetectorKind::ALL`] order. `peers` goes to the revenue detector.
    pub fn detectors(&self, peers: PeerDistribution) -> Vec<Box<dyn Detector>> {
        vec![
            Box::new(VolumeImpossibilityDetector {
                max_claims_per_month: self.volume.max_claims_per_month,
                severity_cap: self.volume.severity_cap,
            }),
            Box::new(
                RevenueOutlierDetector::new(peers)
                    .with_z_threshold(self.revenue.z_threshold)
                    .with_mad_floor(self.revenue.mad_floor),
            ),
            Box::new(BillingSpikeDetector {
                multiplier: self.spike.multiplier,
                min_months: self.spike.min_months,
            }),
            Box::new(SuspiciousConsistencyDetector {
                ratio_threshold: self.consistency.ratio_threshold,
                min_rows: self.consistency.min_rows,
            }),
        ]
    }

    /// Scoring engine whose reference severities track the configured thresholds.
    pub fn scoring_engine(&self) -> ScoringEngine {
        ScoringEngine::default()
            .with_reference(DetectorKind::RevenueOutlier, self.revenue.z_threshold)
            .with_reference(DetectorKind::BillingSpike, self.spike.multiplier)
            .with_reference(DetectorKind::SuspiciousConsistency, self.consistency.ratio_threshold)
    }

    pub fn rank_builder(&self) -> Result<RankedResultBuilder, ScanError> {
        RankedResultBuilder::new(self.rank.threshold, self.rank.top)
    }
}
