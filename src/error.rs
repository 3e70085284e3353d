//! Unified error handling for ride history operations.
//!
//! "Not applicable" outcomes (no open ride, tracking disabled) are not errors;
//! they come back as `Ok(false)` / `Ok(None)`. `HistoryError` is reserved for
//! storage failures and invalid input.

use thiserror::Error;

/// Error type for ride history operations.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// SQLite storage failure
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Record could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Waypoint snapshot failed validation
    #[error("invalid points snapshot: {message}")]
    InvalidSnapshot { message: String },

    /// Action string did not normalize to delivered/skipped
    #[error("unknown point action '{0}'")]
    UnknownAction(String),

    /// Configuration values are inconsistent
    #[error("configuration error: {message}")]
    Config { message: String },

    /// A previous holder of the engine lock panicked
    #[error("history engine lock poisoned")]
    LockPoisoned,
}

/// Result type alias for ride history operations.
pub type Result<T> = std::result::Result<T, HistoryError>;

impl HistoryError {
    pub(crate) fn invalid_snapshot(message: impl Into<String>) -> Self {
        HistoryError::InvalidSnapshot {
            message: message.into(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        HistoryError::Config {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HistoryError::UnknownAction("maybe".to_string());
        assert!(err.to_string().contains("maybe"));

        let err = HistoryError::invalid_snapshot("duplicate pointId 'p1'");
        assert!(err.to_string().contains("p1"));
    }

    #[test]
    fn test_json_error_converts() {
        let parse: std::result::Result<Vec<u32>, _> = serde_json::from_str("not json");
        let err: HistoryError = parse.unwrap_err().into();
        assert!(matches!(err, HistoryError::Serialization(_)));
    }
}
