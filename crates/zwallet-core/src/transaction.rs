//! Outbound transaction model and lifecycle states

use crate::balance::Pool;
use crate::error::SendError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Locally assigned transaction identifier, never reused within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxId(pub u64);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of an outbound transaction.
///
/// ```text
/// Creating -> Created | FailedEncoding
/// Created  -> Submitted | FailedSubmit | Cancelled
/// Creating -> Cancelled
/// Submitted -> Mined | FailedSubmit
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxState {
    /// Send requested, transaction being built
    Creating,
    /// Built and ready for submission
    Created,
    /// Build failed (terminal)
    FailedEncoding,
    /// Cancelled before submission (terminal)
    Cancelled,
    /// Accepted by the network layer
    Submitted,
    /// Rejected by the network layer (terminal)
    FailedSubmit,
    /// Included in a block (terminal)
    Mined,
}

impl TxState {
    /// Monotonic rank; an update may only move a transaction to a higher rank
    pub fn rank(&self) -> u8 {
        match self {
            TxState::Creating => 0,
            TxState::Created | TxState::FailedEncoding => 1,
            TxState::Cancelled => 2,
            TxState::Submitted | TxState::FailedSubmit => 3,
            TxState::Mined => 4,
        }
    }

    /// No further local transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TxState::FailedEncoding | TxState::FailedSubmit | TxState::Cancelled | TxState::Mined
        )
    }

    /// Whether the local state machine allows `self -> next`
    pub fn can_transition_to(&self, next: TxState) -> bool {
        use TxState::*;
        matches!(
            (self, next),
            (Creating, Created)
                | (Creating, FailedEncoding)
                | (Creating, Cancelled)
                | (Created, Submitted)
                | (Created, FailedSubmit)
                | (Created, Cancelled)
                | (Submitted, FailedSubmit)
                | (Submitted, Mined)
        )
    }

    /// Get display name
    pub fn name(&self) -> &'static str {
        match self {
            TxState::Creating => "creating",
            TxState::Created => "created",
            TxState::FailedEncoding => "failed_encoding",
            TxState::Cancelled => "cancelled",
            TxState::Submitted => "submitted",
            TxState::FailedSubmit => "failed_submit",
            TxState::Mined => "mined",
        }
    }
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where the funds go
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    /// External address
    Address(String),
    /// Another pool of this wallet (shielding)
    InternalPool(Pool),
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recipient::Address(address) => f.write_str(address),
            Recipient::InternalPool(pool) => write!(f, "internal:{}", pool),
        }
    }
}

/// Outbound transaction tracked from creation to a terminal state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransaction {
    /// Local identifier
    pub id: TxId,
    /// Destination
    pub recipient: Recipient,
    /// Amount in zatoshi
    pub amount: u64,
    /// Memo bytes as they will be encoded
    pub memo: Vec<u8>,
    /// Lifecycle state
    pub state: TxState,
    /// Failure details for failed or cancelled states
    pub failure: Option<SendError>,
    /// Height of the block that mined the transaction
    pub mined_height: Option<u64>,
    /// Block time of the mining block, if the engine reported it
    pub mined_at: Option<DateTime<Utc>>,
    /// When the send was requested
    pub created_at: DateTime<Utc>,
}

impl PendingTransaction {
    /// Still being built
    pub fn is_creating(&self) -> bool {
        self.state == TxState::Creating
    }

    /// Built, not yet submitted
    pub fn is_created(&self) -> bool {
        self.state == TxState::Created
    }

    /// Accepted by the network (mined or not)
    pub fn is_submit_success(&self) -> bool {
        matches!(self.state, TxState::Submitted | TxState::Mined)
    }

    /// Included in a block
    pub fn is_mined(&self) -> bool {
        self.state == TxState::Mined && self.mined_height.map_or(false, |h| h > 0)
    }

    /// Build failed
    pub fn is_failed_encoding(&self) -> bool {
        self.state == TxState::FailedEncoding
    }

    /// Submission failed
    pub fn is_failed_submit(&self) -> bool {
        self.state == TxState::FailedSubmit
    }

    /// Cancelled by the user
    pub fn is_cancelled(&self) -> bool {
        self.state == TxState::Cancelled
    }

    /// Any failure state
    pub fn is_failure(&self) -> bool {
        self.is_failed_encoding() || self.is_failed_submit()
    }

    /// No further local transitions
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Submitted and waiting for a block
    pub fn is_unmined(&self) -> bool {
        self.state == TxState::Submitted && self.mined_height.is_none()
    }

    /// Engine error code, if any
    pub fn error_code(&self) -> Option<i32> {
        self.failure.as_ref().and_then(SendError::code)
    }

    /// Failure message, if any
    pub fn error_message(&self) -> Option<String> {
        self.failure.as_ref().map(|f| match f {
            SendError::EncodingFailed { message, .. }
            | SendError::SubmissionFailed { message, .. } => message.clone(),
            other => other.to_string(),
        })
    }
}

/// State report for one transaction as seen by the wallet engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxUpdate {
    /// Transaction the report refers to
    pub id: TxId,
    /// Engine-side state
    pub state: TxState,
    /// Failure details, for failure states
    pub failure: Option<SendError>,
    /// Mining height, once mined
    pub mined_height: Option<u64>,
    /// Block time, once mined
    pub mined_at: Option<DateTime<Utc>>,
}

impl TxUpdate {
    /// Plain state report
    pub fn new(id: TxId, state: TxState) -> Self {
        Self {
            id,
            state,
            failure: None,
            mined_height: None,
            mined_at: None,
        }
    }

    /// Mined report
    pub fn mined(id: TxId, height: u64, at: Option<DateTime<Utc>>) -> Self {
        Self {
            id,
            state: TxState::Mined,
            failure: None,
            mined_height: Some(height),
            mined_at: at,
        }
    }
}

/// Transaction built by the engine and ready to hand to the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedTransaction {
    /// Local identifier
    pub id: TxId,
    /// Network transaction id, internal byte order
    pub txid: [u8; 32],
    /// Serialized transaction
    pub raw: Vec<u8>,
}

impl EncodedTransaction {
    /// Transaction id as shown by explorers (byte-reversed hex)
    pub fn txid_hex(&self) -> String {
        let mut reversed = self.txid;
        reversed.reverse();
        hex::encode(reversed)
    }
}
