// =============================================================================
// Error taxonomy
// =============================================================================
//
// Per-symbol errors exclude one symbol from a run. Store errors are split into
// retryable and terminal. Run errors abort the whole run without publishing.
// =============================================================================

use thiserror::Error;

/// Why a single symbol was left out of a run.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SymbolError {
    #[error("insufficient data: {have} candles, need {need}")]
    InsufficientData { have: usize, need: usize },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("fetch failed for {symbol}: {reason}")]
    FetchFailure { symbol: String, reason: String },
}

impl SymbolError {
    /// Short machine-readable tag used in run reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InsufficientData { .. } => "InsufficientData",
            Self::InvalidInput(_) => "InvalidInput",
            Self::FetchFailure { .. } => "FetchFailure",
        }
    }
}

/// Error reported by a table / baseline / watchdog store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Rate limiting, 5xx, timeouts: safe to retry.
    #[error("transient store error: {0}")]
    Transient(String),

    #[error("fatal store error: {0}")]
    Fatal(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut => {
                Self::Transient(err.to_string())
            }
            _ => Self::Fatal(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Fatal(format!("serialisation: {err}"))
    }
}

/// Publishing gave up; the previously published table is untouched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PublishError {
    #[error("persistence failed after {attempts} attempt(s): {last_error}")]
    PersistenceFatal { attempts: u32, last_error: StoreError },
}

/// Whole-run failure. Nothing was published.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("run produced zero valid rows out of {attempted} symbol(s)")]
    EmptyResult { attempted: usize },

    #[error(transparent)]
    Persistence(#[from] PublishError),

    #[error("watchlist unavailable: {0}")]
    Watchlist(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_timeouts_are_transient() {
        let err: StoreError = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow disk").into();
        assert!(err.is_transient());
    }

    #[test]
    fn io_permission_denied_is_fatal() {
        let err: StoreError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into();
        assert!(!err.is_transient());
    }

    #[test]
    fn symbol_error_kinds() {
        assert_eq!(
            SymbolError::InsufficientData { have: 10, need: 60 }.kind(),
            "InsufficientData"
        );
        assert_eq!(SymbolError::InvalidInput("x".into()).kind(), "InvalidInput");
        let fetch = SymbolError::FetchFailure {
            symbol: "INFY".into(),
            reason: "timeout".into(),
        };
        assert_eq!(fetch.kind(), "FetchFailure");
        assert!(fetch.to_string().contains("INFY"));
    }
}
