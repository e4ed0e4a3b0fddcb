//! # claimwatch-score: corroboration scoring and ranking.
//!
//! Turns the flags raised by independent detectors into one bounded
//! suspicion score per provider and builds the ranked scan result.
//!
//! Scores are pure functions of each provider's flag set: the same flags in
//! any order produce bit-identical scores.

pub mod engine;
pub mod normalize;
pub mod rank;

pub use engine::ScoringEngine;
pub use rank::{RankedEntry, RankedResultBuilder};
