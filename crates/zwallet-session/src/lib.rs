//! Wallet session core
//!
//! Combines the engine's push streams into one screen snapshot, owns the
//! lifecycle of outbound transactions and turns lifecycle timestamps into
//! latency metrics.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod combiner;
pub mod correlator;
pub mod engine;
pub mod error;
pub mod logging;
pub mod report;
pub mod send;
pub mod session;
#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;
pub mod tracker;

pub use combiner::{SnapshotPolicy, Source, SourceUpdate, StreamCombiner, UiSnapshot};
pub use correlator::{IntervalMetric, MetricCorrelator, MetricKey, TimeMilestone};
pub use engine::{
    Clock, EngineFailure, Feed, FeedError, SystemClock, TransactionEngine, WalletFeeds,
};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use report::{
    FunnelStep, Issue, MetricsSink, RecordingSink, Report, TracingSink, TxAction,
};
pub use send::{SendFlow, SendStream};
pub use session::{SessionDeps, WalletSession};
pub use tracker::{
    CancelOutcome, TransactionLifecycleTracker, Transition, TxDraft, UpdateOutcome,
};
