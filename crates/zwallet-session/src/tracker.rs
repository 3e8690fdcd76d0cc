//! Outbound transaction lifecycle tracking
//!
//! The tracker is the single owner of every in-flight transaction. Local
//! steps of a send (created, submit started, submitted, failed) and engine
//! reports from the pending-transactions feed both go through it, under one
//! lock, so a cancel racing a submit is decided in one place.
//!
//! Engine reports are applied by state rank: a report may only move a
//! transaction forward. The one exception is a local `Cancelled` that the
//! network contradicts with `Submitted` or `Mined`; the network wins.
//!
//! Terminal transactions stay listed until the consumer acknowledges them,
//! or, for mined ones, until they reach the confirmation threshold.

use crate::engine::Clock;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use zwallet_core::{
    ConfirmationPolicy, ConfirmationStatus, PendingTransaction, Recipient, SendError, TxId,
    TxState, TxUpdate,
};
use zwallet_params::SessionConfig;

/// What a new send carries into the tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxDraft {
    /// Destination
    pub recipient: Recipient,
    /// Amount in zatoshi
    pub amount: u64,
    /// Encoded memo bytes
    pub memo: Vec<u8>,
}

/// A state change of one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    /// Transaction
    pub id: TxId,
    /// Previous state; `None` when the transaction was just created
    pub from: Option<TxState>,
    /// New state
    pub to: TxState,
    /// When the change was recorded
    pub at: DateTime<Utc>,
}

/// Result of a cancel request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Cancelled before submission
    Cancelled(Transition),
    /// Too late: submission started or finished
    Rejected(SendError),
    /// Already in a terminal state that submission never reached
    AlreadyFinished(TxState),
    /// No such transaction
    Unknown,
}

impl CancelOutcome {
    /// The transaction is now cancelled because of this request
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CancelOutcome::Cancelled(_))
    }
}

/// Result of applying an engine report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The report moved the transaction
    Applied(Transition),
    /// The report would not move the transaction forward
    Stale {
        /// State kept
        current: TxState,
        /// State reported
        reported: TxState,
    },
    /// Mined report below the minimum confirmation count; wait for the next one
    Deferred {
        /// Confirmations at the current chain height
        confirmations: u32,
    },
    /// Report is malformed (e.g. mined without a height)
    Invalid,
    /// No such transaction
    Unknown,
}

#[derive(Debug)]
struct Entry {
    tx: PendingTransaction,
    submit_in_flight: bool,
    /// Mined report held back until the chain tip catches up
    deferred_mined: Option<(u64, Option<DateTime<Utc>>)>,
}

#[derive(Debug, Default)]
struct TrackerInner {
    next_id: u64,
    txs: BTreeMap<TxId, Entry>,
    chain_height: Option<u64>,
}

impl TrackerInner {
    fn snapshot(&self) -> Vec<PendingTransaction> {
        self.txs.values().map(|e| e.tx.clone()).collect()
    }
}

struct Shared {
    inner: Mutex<TrackerInner>,
    list: watch::Sender<Vec<PendingTransaction>>,
    transitions: broadcast::Sender<Transition>,
    clock: Arc<dyn Clock>,
    policy: ConfirmationPolicy,
    min_mined: u32,
}

/// Owner of in-flight transactions
#[derive(Clone)]
pub struct TransactionLifecycleTracker {
    shared: Arc<Shared>,
}

impl TransactionLifecycleTracker {
    /// Create an empty tracker
    pub fn new(config: &SessionConfig, clock: Arc<dyn Clock>) -> Self {
        let (list, _) = watch::channel(Vec::new());
        let (transitions, _) = broadcast::channel(config.transition_capacity.max(1));
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(TrackerInner {
                    next_id: 1,
                    ..Default::default()
                }),
                list,
                transitions,
                clock,
                policy: ConfirmationPolicy::from_config(config),
                min_mined: config.confirmations.min_mined,
            }),
        }
    }

    /// Confirmation policy in use
    pub fn policy(&self) -> &ConfirmationPolicy {
        &self.shared.policy
    }

    // Called with the lock held so subscribers see changes in commit order
    fn publish(&self, inner: &TrackerInner, transition: Option<&Transition>) {
        self.shared.list.send_replace(inner.snapshot());
        if let Some(transition) = transition {
            // No subscribers is fine
            let _ = self.shared.transitions.send(*transition);
        }
    }

    fn log_transition(transition: &Transition) {
        info!(
            event = "tx_transition",
            tx_id = %transition.id,
            from = transition.from.map(|s| s.name()).unwrap_or("none"),
            to = transition.to.name(),
            "Transaction state changed"
        );
    }

    /// Start tracking a new send in `Creating`
    pub fn begin(&self, draft: TxDraft) -> (PendingTransaction, Transition) {
        let now = self.shared.clock.now();
        let mut inner = self.shared.inner.lock();
        let id = TxId(inner.next_id);
        inner.next_id += 1;

        let tx = PendingTransaction {
            id,
            recipient: draft.recipient,
            amount: draft.amount,
            memo: draft.memo,
            state: TxState::Creating,
            failure: None,
            mined_height: None,
            mined_at: None,
            created_at: now,
        };
        inner.txs.insert(
            id,
            Entry {
                tx: tx.clone(),
                submit_in_flight: false,
                deferred_mined: None,
            },
        );

        let transition = Transition {
            id,
            from: None,
            to: TxState::Creating,
            at: now,
        };
        Self::log_transition(&transition);
        self.publish(&inner, Some(&transition));
        (tx, transition)
    }

    fn advance(
        &self,
        id: TxId,
        to: TxState,
        update: impl FnOnce(&mut Entry),
    ) -> Result<Transition> {
        let now = self.shared.clock.now();
        let mut inner = self.shared.inner.lock();
        let entry = inner
            .txs
            .get_mut(&id)
            .ok_or(Error::UnknownTransaction(id))?;
        let from = entry.tx.state;
        if !from.can_transition_to(to) {
            return Err(Error::InvalidTransition { id, from, to });
        }
        entry.tx.state = to;
        update(entry);

        let transition = Transition {
            id,
            from: Some(from),
            to,
            at: now,
        };
        Self::log_transition(&transition);
        self.publish(&inner, Some(&transition));
        Ok(transition)
    }

    /// Encoding succeeded
    pub fn mark_created(&self, id: TxId) -> Result<Transition> {
        self.advance(id, TxState::Created, |_| {})
    }

    /// Validation or encoding failed
    pub fn mark_failed_encoding(&self, id: TxId, error: SendError) -> Result<Transition> {
        self.advance(id, TxState::FailedEncoding, |entry| {
            entry.tx.failure = Some(error);
        })
    }

    /// Claim the right to submit. From here on a cancel is rejected.
    pub fn begin_submit(&self, id: TxId) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        let entry = inner
            .txs
            .get_mut(&id)
            .ok_or(Error::UnknownTransaction(id))?;
        if entry.tx.state != TxState::Created {
            return Err(Error::InvalidTransition {
                id,
                from: entry.tx.state,
                to: TxState::Submitted,
            });
        }
        if entry.submit_in_flight {
            return Err(Error::Precondition(format!(
                "submission of transaction {} already in flight",
                id
            )));
        }
        entry.submit_in_flight = true;
        debug!(event = "tx_submit_started", tx_id = %id, "Submission started");
        Ok(())
    }

    /// The network accepted the transaction
    pub fn mark_submitted(&self, id: TxId) -> Result<Transition> {
        self.advance(id, TxState::Submitted, |entry| {
            entry.submit_in_flight = false;
        })
    }

    /// The network rejected the transaction
    pub fn mark_failed_submit(
        &self,
        id: TxId,
        code: Option<i32>,
        message: impl Into<String>,
    ) -> Result<Transition> {
        let failure = SendError::SubmissionFailed {
            code,
            message: message.into(),
        };
        self.advance(id, TxState::FailedSubmit, |entry| {
            entry.submit_in_flight = false;
            entry.tx.failure = Some(failure);
        })
    }

    /// The transaction was seen in a block
    pub fn mark_mined(
        &self,
        id: TxId,
        height: u64,
        mined_at: Option<DateTime<Utc>>,
    ) -> UpdateOutcome {
        self.apply_update(&TxUpdate::mined(id, height, mined_at))
    }

    /// User cancel. Decided under the tracker lock against any submission
    /// in progress.
    pub fn cancel(&self, id: TxId) -> CancelOutcome {
        let now = self.shared.clock.now();
        let mut inner = self.shared.inner.lock();
        let Some(entry) = inner.txs.get_mut(&id) else {
            warn!(event = "tx_cancel_unknown", tx_id = %id, "Cancel for unknown transaction");
            return CancelOutcome::Unknown;
        };

        let from = entry.tx.state;
        match from {
            TxState::Creating => {}
            TxState::Created if !entry.submit_in_flight => {}
            TxState::Created | TxState::Submitted | TxState::FailedSubmit | TxState::Mined => {
                info!(
                    event = "tx_cancel_rejected",
                    tx_id = %id,
                    state = from.name(),
                    "Cancel rejected, submission already started"
                );
                return CancelOutcome::Rejected(SendError::CancelAfterSubmitRejected);
            }
            TxState::Cancelled | TxState::FailedEncoding => {
                return CancelOutcome::AlreadyFinished(from);
            }
        }

        entry.tx.state = TxState::Cancelled;
        entry.tx.failure = Some(SendError::CancelledByUser);
        let transition = Transition {
            id,
            from: Some(from),
            to: TxState::Cancelled,
            at: now,
        };
        Self::log_transition(&transition);
        self.publish(&inner, Some(&transition));
        CancelOutcome::Cancelled(transition)
    }

    /// Apply one engine report
    pub fn apply_update(&self, update: &TxUpdate) -> UpdateOutcome {
        let now = self.shared.clock.now();
        let mut inner = self.shared.inner.lock();
        let chain_height = inner.chain_height;
        let Some(entry) = inner.txs.get_mut(&update.id) else {
            warn!(
                event = "tx_update_unknown",
                tx_id = %update.id,
                state = update.state.name(),
                "Update for unknown transaction ignored"
            );
            return UpdateOutcome::Unknown;
        };

        let current = entry.tx.state;
        let reported = update.state;

        let supersedes_cancel =
            current == TxState::Cancelled && matches!(reported, TxState::Submitted | TxState::Mined);
        let moves_forward = !current.is_terminal()
            && (reported.rank() > current.rank() || current.can_transition_to(reported));
        if !(supersedes_cancel || moves_forward) {
            debug!(
                event = "tx_update_stale",
                tx_id = %update.id,
                current = current.name(),
                reported = reported.name(),
                "Stale update discarded"
            );
            return UpdateOutcome::Stale { current, reported };
        }

        if reported == TxState::Mined {
            let Some(height) = update.mined_height.filter(|h| *h > 0) else {
                warn!(
                    event = "tx_update_invalid",
                    tx_id = %update.id,
                    "Mined update without a height ignored"
                );
                return UpdateOutcome::Invalid;
            };
            if let Some(chain_height) = chain_height {
                let confirmations = ConfirmationPolicy::confirmations(height, chain_height);
                if confirmations < self.shared.min_mined {
                    debug!(
                        event = "tx_mined_deferred",
                        tx_id = %update.id,
                        confirmations,
                        "Mined report below minimum confirmations"
                    );
                    entry.deferred_mined = Some((height, update.mined_at));
                    return UpdateOutcome::Deferred { confirmations };
                }
            }
            entry.tx.mined_height = Some(height);
            entry.tx.mined_at = update.mined_at.or(Some(now));
            entry.deferred_mined = None;
        }

        if supersedes_cancel {
            warn!(
                event = "tx_cancel_superseded",
                tx_id = %update.id,
                reported = reported.name(),
                "Network reports a cancelled transaction as sent"
            );
            entry.tx.failure = None;
        }

        match reported {
            TxState::FailedEncoding => {
                entry.tx.failure = Some(update.failure.clone().unwrap_or(
                    SendError::EncodingFailed {
                        code: None,
                        message: "encoding failed".to_string(),
                    },
                ));
            }
            TxState::FailedSubmit => {
                entry.tx.failure = Some(update.failure.clone().unwrap_or(
                    SendError::SubmissionFailed {
                        code: None,
                        message: "submission failed".to_string(),
                    },
                ));
            }
            TxState::Cancelled => {
                entry.tx.failure = Some(SendError::CancelledByUser);
            }
            _ => {}
        }
        entry.tx.state = reported;
        entry.submit_in_flight = false;

        let transition = Transition {
            id: update.id,
            from: Some(current),
            to: reported,
            at: now,
        };
        Self::log_transition(&transition);
        self.publish(&inner, Some(&transition));
        UpdateOutcome::Applied(transition)
    }

    /// Apply a full engine list in order; returns the transitions it caused
    pub fn reconcile(&self, updates: &[TxUpdate]) -> Vec<Transition> {
        updates
            .iter()
            .filter_map(|update| match self.apply_update(update) {
                UpdateOutcome::Applied(transition) => Some(transition),
                _ => None,
            })
            .collect()
    }

    /// Record the latest chain tip and apply any deferred mined reports it
    /// now confirms; returns the transitions that caused
    pub fn set_chain_height(&self, height: u64) -> Vec<Transition> {
        let ready: Vec<TxUpdate> = {
            let mut inner = self.shared.inner.lock();
            if inner.chain_height == Some(height) {
                return Vec::new();
            }
            debug!(event = "chain_height", height, "Chain height updated");
            inner.chain_height = Some(height);
            let min_mined = self.shared.min_mined;
            inner
                .txs
                .values_mut()
                .filter_map(|entry| {
                    let (mined_height, mined_at) = entry.deferred_mined?;
                    if ConfirmationPolicy::confirmations(mined_height, height) < min_mined {
                        return None;
                    }
                    entry.deferred_mined = None;
                    Some(TxUpdate::mined(entry.tx.id, mined_height, mined_at))
                })
                .collect()
        };
        // Re-checked against the current state like any engine report
        self.reconcile(&ready)
    }

    /// Latest known chain tip
    pub fn chain_height(&self) -> Option<u64> {
        self.shared.inner.lock().chain_height
    }

    /// Stop listing a terminal transaction
    pub fn acknowledge(&self, id: TxId) -> Result<PendingTransaction> {
        let mut inner = self.shared.inner.lock();
        let state = inner
            .txs
            .get(&id)
            .map(|e| e.tx.state)
            .ok_or(Error::UnknownTransaction(id))?;
        if !state.is_terminal() {
            return Err(Error::Precondition(format!(
                "transaction {} is still {}",
                id, state
            )));
        }
        let entry = inner.txs.remove(&id).ok_or(Error::UnknownTransaction(id))?;
        debug!(event = "tx_acknowledged", tx_id = %id, "Transaction acknowledged");
        self.publish(&inner, None);
        Ok(entry.tx)
    }

    /// Remove mined transactions that are now confirmed, by count or by age
    pub fn settle_confirmed(&self, now: DateTime<Utc>) -> Vec<(PendingTransaction, ConfirmationStatus)> {
        let mut inner = self.shared.inner.lock();
        let chain_height = inner.chain_height;
        let settled: Vec<(TxId, ConfirmationStatus)> = inner
            .txs
            .values()
            .filter(|e| e.tx.is_mined())
            .filter_map(|e| {
                let status = self.shared.policy.evaluate(
                    e.tx.mined_height,
                    e.tx.mined_at,
                    chain_height,
                    now,
                );
                status.is_confirmed().then_some((e.tx.id, status))
            })
            .collect();
        if settled.is_empty() {
            return Vec::new();
        }

        let removed: Vec<(PendingTransaction, ConfirmationStatus)> = settled
            .into_iter()
            .filter_map(|(id, status)| inner.txs.remove(&id).map(|e| (e.tx, status)))
            .collect();
        for (tx, status) in &removed {
            info!(
                event = "tx_settled",
                tx_id = %tx.id,
                mined_height = tx.mined_height.unwrap_or(0),
                by_age = matches!(status, ConfirmationStatus::ConfirmedByAge),
                "Transaction confirmed"
            );
        }
        self.publish(&inner, None);
        removed
    }

    /// Confirmation status of a tracked transaction
    pub fn confirmation(&self, id: TxId, now: DateTime<Utc>) -> Option<ConfirmationStatus> {
        let inner = self.shared.inner.lock();
        let entry = inner.txs.get(&id)?;
        if !entry.tx.is_mined() {
            return Some(ConfirmationStatus::Pending);
        }
        Some(self.shared.policy.evaluate(
            entry.tx.mined_height,
            entry.tx.mined_at,
            inner.chain_height,
            now,
        ))
    }

    /// Current copy of a transaction
    pub fn get(&self, id: TxId) -> Option<PendingTransaction> {
        self.shared.inner.lock().txs.get(&id).map(|e| e.tx.clone())
    }

    /// All listed transactions, by id
    pub fn in_flight(&self) -> Vec<PendingTransaction> {
        self.shared.inner.lock().snapshot()
    }

    /// Watch the listed transactions
    pub fn subscribe_list(&self) -> watch::Receiver<Vec<PendingTransaction>> {
        self.shared.list.subscribe()
    }

    /// Receive every transition from now on
    pub fn subscribe_transitions(&self) -> broadcast::Receiver<Transition> {
        self.shared.transitions.subscribe()
    }
}
