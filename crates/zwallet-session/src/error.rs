//! Error types for session operations

use zwallet_core::{ErrorCategory, TxId, TxState};

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caller violated an API precondition
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// No transaction with this id is tracked
    #[error("Unknown transaction: {0}")]
    UnknownTransaction(TxId),

    /// The lifecycle does not allow this move
    #[error("Transaction {id}: cannot move from {from} to {to}")]
    InvalidTransition {
        /// Transaction
        id: TxId,
        /// Current state
        from: TxState,
        /// Requested state
        to: TxState,
    },

    /// Session has been shut down
    #[error("Session closed")]
    Closed,

    /// Logging could not be installed
    #[error("Logging error: {0}")]
    Logging(String),

    /// Core model error
    #[error("Core error: {0}")]
    Core(#[from] zwallet_core::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Params(#[from] zwallet_params::Error),
}

impl Error {
    /// Get error category for logging/metrics
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Precondition(_) | Error::Closed | Error::Logging(_) => {
                ErrorCategory::Internal
            }
            Error::UnknownTransaction(_) | Error::InvalidTransition { .. } => {
                ErrorCategory::Transaction
            }
            Error::Core(e) => e.category(),
            Error::Params(_) => ErrorCategory::Config,
        }
    }

    /// The transaction was cancelled while this operation was underway
    pub fn is_cancelled_race(&self) -> bool {
        matches!(
            self,
            Error::InvalidTransition {
                from: TxState::Cancelled,
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            Error::Precondition("x".to_string()).category(),
            ErrorCategory::Internal
        );
        assert_eq!(
            Error::UnknownTransaction(TxId(3)).category(),
            ErrorCategory::Transaction
        );
        let core = zwallet_core::Error::InvalidRange("bad".to_string());
        assert_eq!(Error::from(core).category(), ErrorCategory::Sync);
    }

    #[test]
    fn test_cancelled_race_detection() {
        let raced = Error::InvalidTransition {
            id: TxId(1),
            from: TxState::Cancelled,
            to: TxState::Created,
        };
        assert!(raced.is_cancelled_race());
        assert!(raced.to_string().contains("cancelled"));
    }
}
