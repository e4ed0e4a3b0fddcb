//! # claimwatch-core
//! Foundation types, statistics, and traits for Claimwatch.

pub mod constants;
pub mod error;
pub mod memory_store;
pub mod stats;
pub mod traits;
pub mod types;

pub use error::{DataLoadError, DetectError, ProfileError, ScanError};
pub use memory_store::MemoryStore;
pub use stats::PeerDistribution;
pub use traits::{AggregateStore, Detector};
pub use types::{
    DetectorKind, Evidence, Flag, ProviderAggregate, ProviderId, ProviderMonthRecord,
    SuspicionScore, YearMonth,
};
