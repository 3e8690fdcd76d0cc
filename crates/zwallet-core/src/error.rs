//! Error types for zwallet core
//!
//! Two families live here. [`Error`] covers construction and precondition
//! failures of the data model. [`SendError`] is the send-outcome taxonomy:
//! it travels as a value inside failed transaction states and is never
//! raised across the public send API.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Core errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Balance violates `total >= available`
    #[error("Invalid balance: {0}")]
    InvalidBalance(String),

    /// Block range or progress marker out of order
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// Invalid amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Address could not be encoded or decoded
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Invalid memo
    #[error("Invalid memo: {0}")]
    InvalidMemo(String),

    /// Caller violated an API precondition
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Parameter/config error
    #[error("Params error: {0}")]
    Params(#[from] zwallet_params::Error),
}

impl Error {
    /// Get error category for logging/metrics
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidBalance(_) | Error::InvalidAmount(_) => ErrorCategory::Amount,
            Error::InvalidRange(_) => ErrorCategory::Sync,
            Error::InvalidAddress(_) => ErrorCategory::Address,
            Error::InvalidMemo(_) => ErrorCategory::Memo,
            Error::Precondition(_) => ErrorCategory::Internal,
            Error::Params(_) => ErrorCategory::Config,
        }
    }
}

/// Why a send did not reach, or stay on, the happy path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum SendError {
    /// Recipient is not a valid shielded or transparent address
    #[error("Invalid recipient: {address}")]
    InvalidRecipient {
        /// Offending input
        address: String,
    },

    /// Amount below one zatoshi or below the dust threshold
    #[error("Amount {amount} is below the minimum of {minimum}")]
    AmountBelowDust {
        /// Requested amount
        amount: u64,
        /// Smallest accepted amount
        minimum: u64,
    },

    /// Memo does not fit
    #[error("Memo is {length} bytes, maximum is {max}")]
    MemoTooLong {
        /// Memo length in bytes
        length: usize,
        /// Limit in bytes
        max: usize,
    },

    /// Amount plus fee exceeds spendable balance, or the balance is unknown
    #[error("Insufficient funds: need {required}, have {available:?}")]
    InsufficientFunds {
        /// Amount plus fee
        required: u64,
        /// Spendable balance, if known
        available: Option<u64>,
    },

    /// Engine failed to build the transaction
    #[error("Encoding failed ({code:?}): {message}")]
    EncodingFailed {
        /// Engine error code
        code: Option<i32>,
        /// Engine error message
        message: String,
    },

    /// Network rejected the transaction
    #[error("Submission failed ({code:?}): {message}")]
    SubmissionFailed {
        /// Engine error code
        code: Option<i32>,
        /// Engine error message
        message: String,
    },

    /// User cancelled before submission
    #[error("Cancelled by user")]
    CancelledByUser,

    /// Cancel arrived after the network acknowledged the submission
    #[error("Transaction already submitted and cannot be cancelled")]
    CancelAfterSubmitRejected,
}

impl SendError {
    /// User-correctable validation failures that the UI renders inline
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            SendError::InvalidRecipient { .. }
                | SendError::AmountBelowDust { .. }
                | SendError::MemoTooLong { .. }
                | SendError::InsufficientFunds { .. }
        )
    }

    /// Engine/network failures that must also be reported as non-fatal errors
    pub fn is_engine_error(&self) -> bool {
        matches!(
            self,
            SendError::EncodingFailed { .. } | SendError::SubmissionFailed { .. }
        )
    }

    /// Engine error code, when one was reported
    pub fn code(&self) -> Option<i32> {
        match self {
            SendError::EncodingFailed { code, .. } | SendError::SubmissionFailed { code, .. } => {
                *code
            }
            _ => None,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            SendError::InvalidRecipient { .. } => {
                "Please enter a valid address.".to_string()
            }
            SendError::AmountBelowDust { minimum, .. } => format!(
                "Please enter a larger amount. The minimum is {} ZEC.",
                crate::balance::format_zec(*minimum, 1, 8)
            ),
            SendError::MemoTooLong { max, .. } => {
                format!("Memo must be at most {} bytes.", max)
            }
            SendError::InsufficientFunds { available: None, .. } => {
                "Unable to determine your available funds. Please wait for sync to finish."
                    .to_string()
            }
            SendError::InsufficientFunds { .. } => {
                "You don't have enough funds for this transaction, including the network fee."
                    .to_string()
            }
            SendError::EncodingFailed { .. } => {
                "The transaction could not be created. Please try again.".to_string()
            }
            SendError::SubmissionFailed { .. } => {
                "The transaction could not be submitted to the network. Please try again."
                    .to_string()
            }
            SendError::CancelledByUser => "The transaction was cancelled.".to_string(),
            SendError::CancelAfterSubmitRejected => {
                "The transaction was already sent and can no longer be cancelled.".to_string()
            }
        }
    }

    /// Get error category for logging/metrics
    pub fn category(&self) -> ErrorCategory {
        match self {
            SendError::InvalidRecipient { .. } => ErrorCategory::Address,
            SendError::AmountBelowDust { .. } | SendError::InsufficientFunds { .. } => {
                ErrorCategory::Amount
            }
            SendError::MemoTooLong { .. } => ErrorCategory::Memo,
            SendError::EncodingFailed { .. } | SendError::SubmissionFailed { .. } => {
                ErrorCategory::Transaction
            }
            SendError::CancelledByUser | SendError::CancelAfterSubmitRejected => {
                ErrorCategory::Cancellation
            }
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Amount-related errors
    Amount,
    /// Address-related errors
    Address,
    /// Memo-related errors
    Memo,
    /// Engine/network transaction errors
    Transaction,
    /// Cancellation outcomes
    Cancellation,
    /// Sync/progress errors
    Sync,
    /// Configuration errors
    Config,
    /// Internal/system errors
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Amount => write!(f, "Amount"),
            ErrorCategory::Address => write!(f, "Address"),
            ErrorCategory::Memo => write!(f, "Memo"),
            ErrorCategory::Transaction => write!(f, "Transaction"),
            ErrorCategory::Cancellation => write!(f, "Cancellation"),
            ErrorCategory::Sync => write!(f, "Sync"),
            ErrorCategory::Config => write!(f, "Config"),
            ErrorCategory::Internal => write!(f, "Internal"),
        }
    }
}
