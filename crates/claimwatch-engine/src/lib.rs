//! # claimwatch-engine: runs Claimwatch end to end.
//!
//! Loads billing aggregates from CSV into a [`MemoryStore`](claimwatch_core::MemoryStore),
//! layers configuration, runs the scan pipeline, and assembles provider
//! dossiers.

pub mod config;
pub mod loader;
pub mod profile;
pub mod scan;

pub use crate::config::ScanConfig;
pub use loader::{load_peer_revenue, load_store, paid_counts_path, preprocess, PreprocessSummary};
pub use profile::{ProfileAssembler, ProviderDossier};
pub use scan::{write_scan_csv, ScanReport, Scanner};
