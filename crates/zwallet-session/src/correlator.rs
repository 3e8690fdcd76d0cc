//! Pairs lifecycle milestones into interval metrics
//!
//! Each transaction passes a fixed chain of milestones (initialized,
//! created, submitted, mined). The correlator remembers when each one was
//! reached, keyed by `(TxId, MetricKey)`, and reports the time between
//! neighbouring milestones exactly once.
//!
//! A metric is emitted on `record_end` only if the matching start is still
//! present. The start is then consumed and the end milestone becomes the
//! start of the next pair. Later starts for a consumed key are ignored, so a
//! replayed transition cannot produce a second metric.

use crate::report::{MetricsSink, Report};
use crate::tracker::Transition;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use zwallet_core::{TxId, TxState};

/// Lifecycle milestone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum MetricKey {
    /// Send requested
    TxInitialized,
    /// Transaction built
    TxCreated,
    /// Accepted by the network layer
    TxSubmitted,
    /// Included in a block
    TxMined,
}

impl MetricKey {
    /// Milestones in chain order
    pub const CHAIN: [MetricKey; 4] = [
        MetricKey::TxInitialized,
        MetricKey::TxCreated,
        MetricKey::TxSubmitted,
        MetricKey::TxMined,
    ];

    /// Telemetry key
    pub fn key(&self) -> &'static str {
        match self {
            MetricKey::TxInitialized => "metric.tx.initialized",
            MetricKey::TxCreated => "metric.tx.created",
            MetricKey::TxSubmitted => "metric.tx.submitted",
            MetricKey::TxMined => "metric.tx.mined",
        }
    }

    /// Human-readable description of the interval ending here
    pub fn description(&self) -> &'static str {
        match self {
            MetricKey::TxInitialized => "Transaction Initialized",
            MetricKey::TxCreated => "Transaction Created",
            MetricKey::TxSubmitted => "Transaction Submitted",
            MetricKey::TxMined => "Transaction Mined",
        }
    }

    /// Last milestone of the chain
    pub fn is_final(&self) -> bool {
        matches!(self, MetricKey::TxMined)
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Time a transaction reached a milestone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeMilestone {
    /// Milestone
    pub key: MetricKey,
    /// Transaction
    pub tx: TxId,
    /// When it was reached
    pub at: DateTime<Utc>,
}

/// Duration between two milestones of one transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntervalMetric {
    /// Transaction
    pub tx: TxId,
    /// Opening milestone
    pub start: MetricKey,
    /// Closing milestone; names the metric
    pub end: MetricKey,
    /// When the opening milestone was reached
    pub started_at: DateTime<Utc>,
    /// When the closing milestone was reached
    pub ended_at: DateTime<Utc>,
}

impl IntervalMetric {
    /// Elapsed time
    pub fn elapsed(&self) -> Duration {
        self.ended_at - self.started_at
    }

    /// Elapsed time in milliseconds
    pub fn elapsed_ms(&self) -> i64 {
        self.elapsed().num_milliseconds()
    }
}

#[derive(Debug, Default)]
struct CorrelatorInner {
    milestones: HashMap<(TxId, MetricKey), DateTime<Utc>>,
    consumed: HashSet<(TxId, MetricKey)>,
}

impl CorrelatorInner {
    fn store(&mut self, key: MetricKey, tx: TxId, at: DateTime<Utc>) -> bool {
        if self.consumed.contains(&(tx, key)) || self.milestones.contains_key(&(tx, key)) {
            return false;
        }
        self.milestones.insert((tx, key), at);
        true
    }
}

/// Milestone store and interval reporter
pub struct MetricCorrelator {
    inner: Mutex<CorrelatorInner>,
    sink: Arc<dyn MetricsSink>,
}

impl MetricCorrelator {
    /// Create a correlator reporting to `sink`
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            inner: Mutex::new(CorrelatorInner::default()),
            sink,
        }
    }

    /// Remember that `tx` reached `key` at `at`. The first write wins; a
    /// start whose pair was already reported is ignored. Returns whether the
    /// milestone was stored.
    pub fn record_start(&self, key: MetricKey, tx: TxId, at: DateTime<Utc>) -> bool {
        let stored = self.inner.lock().store(key, tx, at);
        if !stored {
            debug!(
                event = "milestone_ignored",
                tx_id = %tx,
                key = %key,
                "Milestone already recorded or consumed"
            );
        }
        stored
    }

    /// Close the interval `start -> end` for `tx`.
    ///
    /// Reports and returns the metric when the start milestone is present.
    /// A missing start is logged and yields nothing; so does a non-positive
    /// interval, which still consumes the start.
    pub fn record_end(
        &self,
        start: MetricKey,
        end: MetricKey,
        tx: TxId,
        at: DateTime<Utc>,
    ) -> Option<IntervalMetric> {
        let metric = {
            let mut inner = self.inner.lock();

            if inner.consumed.contains(&(tx, start)) {
                debug!(
                    event = "metric_duplicate",
                    tx_id = %tx,
                    start = %start,
                    end = %end,
                    "Interval already reported"
                );
                return None;
            }

            let Some(started_at) = inner.milestones.remove(&(tx, start)) else {
                warn!(
                    event = "metric_missing_start",
                    tx_id = %tx,
                    start = %start,
                    end = %end,
                    "No start milestone for interval, metric dropped"
                );
                return None;
            };
            inner.consumed.insert((tx, start));

            if end.is_final() {
                inner.milestones.retain(|(id, _), _| *id != tx);
            } else {
                inner.store(end, tx, at);
            }

            IntervalMetric {
                tx,
                start,
                end,
                started_at,
                ended_at: at,
            }
        };

        if metric.elapsed() <= Duration::zero() {
            warn!(
                event = "metric_non_positive",
                tx_id = %tx,
                end = %end,
                elapsed_ms = metric.elapsed_ms(),
                "Interval is not positive, metric suppressed"
            );
            return None;
        }

        self.sink.report(Report::Metric(metric.clone()));
        Some(metric)
    }

    /// Feed a lifecycle transition. Returns the metric it closed, if any.
    pub fn on_transition(&self, transition: &Transition) -> Option<IntervalMetric> {
        let tx = transition.id;
        let at = transition.at;
        let metric = match transition.to {
            TxState::Creating => {
                self.record_start(MetricKey::TxInitialized, tx, at);
                None
            }
            TxState::Created => self.record_end(MetricKey::TxInitialized, MetricKey::TxCreated, tx, at),
            TxState::Submitted => {
                self.record_end(MetricKey::TxCreated, MetricKey::TxSubmitted, tx, at)
            }
            TxState::Mined => self.record_end(MetricKey::TxSubmitted, MetricKey::TxMined, tx, at),
            TxState::FailedEncoding | TxState::Cancelled | TxState::FailedSubmit => None,
        };
        if transition.to.is_terminal() {
            self.prune(tx);
        }
        metric
    }

    /// Drop unpaired milestones of a transaction that reached a terminal state
    pub fn prune(&self, tx: TxId) {
        let mut inner = self.inner.lock();
        let before = inner.milestones.len();
        inner.milestones.retain(|(id, _), _| *id != tx);
        let dropped = before - inner.milestones.len();
        if dropped > 0 {
            debug!(event = "milestones_pruned", tx_id = %tx, dropped, "Pruned milestones");
        }
    }

    /// Drop everything known about a transaction that is no longer tracked
    pub fn forget(&self, tx: TxId) {
        let mut inner = self.inner.lock();
        inner.milestones.retain(|(id, _), _| *id != tx);
        inner.consumed.retain(|(id, _)| *id != tx);
    }

    /// Stored milestone, if any
    pub fn milestone(&self, tx: TxId, key: MetricKey) -> Option<TimeMilestone> {
        self.inner
            .lock()
            .milestones
            .get(&(tx, key))
            .map(|at| TimeMilestone { key, tx, at: *at })
    }

    /// Whether the interval opened by `key` was already closed
    pub fn is_consumed(&self, tx: TxId, key: MetricKey) -> bool {
        self.inner.lock().consumed.contains(&(tx, key))
    }

    /// Number of stored milestones
    pub fn milestone_count(&self) -> usize {
        self.inner.lock().milestones.len()
    }
}
