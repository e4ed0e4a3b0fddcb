//! Error types for Claimwatch.
use thiserror::Error;

use crate::types::ProviderId;

/// The aggregate store could not be read or held malformed data. Fatal to a run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataLoadError {
    #[error("io: {0}")] Io(String),
    #[error("csv at line {line}: {message}")] Csv { line: u64, message: String },
    #[error("missing column: {0}")] MissingColumn(String),
    #[error("invalid provider id: {0:?}")] InvalidProviderId(String),
    #[error("invalid month: {0:?}")] InvalidMonth(String),
    #[error("invalid amount: {0:?}")] InvalidAmount(String),
    #[error("invalid count: {0:?}")] InvalidCount(String),
    #[error("empty dataset")] Empty,
}

/// Failures raised while a single detector evaluates the store.
///
/// `DegenerateDistribution` and `InsufficientHistory` are recovered inside the
/// detector that raises them; only `Store` escapes a detector run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectError {
    #[error("degenerate peer distribution: MAD is zero (median {median})")] DegenerateDistribution { median: f64 },
    #[error("insufficient history for {provider}: have {have}, need {need}")] InsufficientHistory { provider: ProviderId, have: usize, need: usize },
    #[error(transparent)] Store(#[from] DataLoadError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    #[error("unknown provider: {0}")] UnknownProvider(ProviderId),
    #[error(transparent)] Store(#[from] DataLoadError),
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error(transparent)] Store(#[from] DataLoadError),
    #[error(transparent)] Profile(#[from] ProfileError),
    #[error("invalid config: {0}")] InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_converts_into_scan_error() {
        let err: ScanError = DataLoadError::Empty.into();
        assert!(matches!(err, ScanError::Store(DataLoadError::Empty)));
    }

    #[test]
    fn unknown_provider_message_names_the_npi() {
        let id = ProviderId::parse("1234567890").unwrap();
        let msg = ProfileError::UnknownProvider(id).to_string();
        assert_eq!(msg, "unknown provider: 1234567890");
    }

    #[test]
    fn insufficient_history_message() {
        let err = DetectError::InsufficientHistory {
            provider: ProviderId::parse("1000000001").unwrap(),
            have: 1,
            need: 2,
        };
        assert_eq!(err.to_string(), "insufficient history for 1000000001: have 1, need 2");
    }
}
