//! Collaborators the session talks to
//!
//! The wallet engine owns keys, notes and the network connection. The
//! session sees it through two seams: [`WalletFeeds`] for the push streams
//! it observes, and [`TransactionEngine`] for the calls it makes while
//! sending. Time comes from a [`Clock`] so tests can drive it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use zwallet_core::{
    Balance, EncodedTransaction, PendingTransaction, Pool, ProcessorInfo, SpendingKey, SyncStatus,
    TxId, TxUpdate,
};

/// A feed item that could not be produced
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Feed error: {message}")]
pub struct FeedError {
    /// What went wrong
    pub message: String,
}

impl FeedError {
    /// Create a feed error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Push stream from the engine
pub type Feed<T> = BoxStream<'static, std::result::Result<T, FeedError>>;

/// Observable state published by the wallet engine
pub trait WalletFeeds: Send + Sync {
    /// Sync status
    fn status(&self) -> Feed<SyncStatus>;

    /// Block processor ranges and chain tip
    fn processor_info(&self) -> Feed<ProcessorInfo>;

    /// Balance of one pool
    fn balances(&self, pool: Pool) -> Feed<Balance>;

    /// Engine view of outbound transactions
    fn pending_transactions(&self) -> Feed<Vec<TxUpdate>>;
}

/// Engine failure with an optional numeric code
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Engine failure ({code:?}): {message}")]
pub struct EngineFailure {
    /// Engine error code
    pub code: Option<i32>,
    /// Engine error message
    pub message: String,
}

impl EngineFailure {
    /// Create a failure
    pub fn new(code: Option<i32>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Transaction building and submission
#[async_trait]
pub trait TransactionEngine: Send + Sync {
    /// Build and sign `tx`
    async fn encode(
        &self,
        key: &SpendingKey,
        tx: &PendingTransaction,
    ) -> std::result::Result<EncodedTransaction, EngineFailure>;

    /// Hand an encoded transaction to the network
    async fn submit(&self, tx: &EncodedTransaction) -> std::result::Result<(), EngineFailure>;

    /// Drop any engine-side state for a cancelled transaction. Returns
    /// whether the engine still knew about it.
    async fn cancel(&self, id: TxId) -> bool;
}

/// Time source
pub trait Clock: Send + Sync {
    /// Current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
