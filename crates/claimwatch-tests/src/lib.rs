//! Scenario and property tests for Claimwatch.
//!
//! Fixtures in [`helpers`] build synthetic provider populations with one
//! planted anomaly each; the integration tests under `tests/` run the full
//! scan over them and check which detectors fire, how scores respect the
//! corroboration ceilings, and that output is reproducible.

pub mod helpers;
