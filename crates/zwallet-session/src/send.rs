//! Send flow: validate, encode, submit
//!
//! A send is registered with the tracker immediately and then driven on its
//! own task, so it completes even if the caller drops the returned stream.
//! Validation and engine failures end the transaction in a failed state;
//! they are values in the stream, never errors from [`SendFlow::send`].

use crate::correlator::MetricCorrelator;
use crate::engine::TransactionEngine;
use crate::report::{FunnelStep, Issue, MetricsSink, Report, TxAction};
use crate::tracker::{TransactionLifecycleTracker, Transition, TxDraft};
use crate::{Error, Result};
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use zwallet_core::{
    detect_issues, validate_send, AddressValidator, PendingTransaction, SendError, SendLimits,
    SendRequest, SpendingKey, TxId, TxState,
};

/// Updates of one transaction, ending with its final state.
///
/// A local cancel is not final: the network may still report the
/// transaction as sent, so the stream stays open after `Cancelled` until
/// that happens or the transaction is acknowledged.
pub type SendStream = BoxStream<'static, PendingTransaction>;

/// Runs sends against the engine and reports their progress
#[derive(Clone)]
pub struct SendFlow {
    tracker: TransactionLifecycleTracker,
    correlator: Arc<MetricCorrelator>,
    sink: Arc<dyn MetricsSink>,
    engine: Arc<dyn TransactionEngine>,
    validator: Arc<dyn AddressValidator>,
    limits: SendLimits,
}

impl SendFlow {
    /// Create a send flow
    pub fn new(
        tracker: TransactionLifecycleTracker,
        correlator: Arc<MetricCorrelator>,
        sink: Arc<dyn MetricsSink>,
        engine: Arc<dyn TransactionEngine>,
        validator: Arc<dyn AddressValidator>,
        limits: SendLimits,
    ) -> Self {
        Self {
            tracker,
            correlator,
            sink,
            engine,
            validator,
            limits,
        }
    }

    fn funnel(&self, step: FunnelStep) {
        self.sink.report(Report::Funnel(step));
    }

    /// Record a transition with the correlator and the send funnel
    pub fn observe(&self, transition: &Transition) {
        self.correlator.on_transition(transition);

        let tx = self.tracker.get(transition.id);
        let failure = tx.as_ref().and_then(|tx| tx.failure.clone());
        let (code, message) = match &failure {
            Some(SendError::EncodingFailed { code, message })
            | Some(SendError::SubmissionFailed { code, message }) => (*code, message.clone()),
            Some(other) => (None, other.to_string()),
            None => (None, "None".to_string()),
        };

        match transition.to {
            TxState::Creating => self.funnel(FunnelStep::Creating),
            TxState::Created => self.funnel(FunnelStep::Created { id: transition.id }),
            TxState::Submitted => self.funnel(FunnelStep::Submitted),
            TxState::Mined => {
                let height = tx.and_then(|tx| tx.mined_height).unwrap_or(0);
                self.funnel(FunnelStep::Mined { height });
            }
            TxState::Cancelled => self.funnel(FunnelStep::Cancelled),
            TxState::FailedEncoding => {
                self.funnel(FunnelStep::ErrorEncoding {
                    code,
                    message: message.clone(),
                });
                if failure.as_ref().map_or(false, SendError::is_engine_error) {
                    self.sink.report(Report::TxError {
                        action: TxAction::Encode,
                        code,
                        message,
                    });
                }
            }
            TxState::FailedSubmit => {
                self.funnel(FunnelStep::ErrorSubmitting {
                    code,
                    message: message.clone(),
                });
                self.sink.report(Report::TxError {
                    action: TxAction::Submit,
                    code,
                    message,
                });
            }
        }
    }

    /// Start a send.
    ///
    /// `available` is the spendable balance of the pool the funds come
    /// from, if known. Errors only on caller misuse: an empty spending key,
    /// or a reply-to memo without a sender address.
    pub fn send(
        &self,
        key: SpendingKey,
        request: SendRequest,
        available: Option<u64>,
    ) -> Result<SendStream> {
        self.funnel(FunnelStep::SendSelected);
        if key.is_empty() {
            self.funnel(FunnelStep::ErrorNotFound);
            return Err(Error::Precondition("spending key not found".to_string()));
        }
        self.funnel(FunnelStep::SpendingKeyFound);

        let memo = request.memo_to_send().map_err(|e| match e {
            zwallet_core::Error::Precondition(message) => Error::Precondition(message),
            other => Error::Core(other),
        })?;

        for issue in detect_issues(&request, &memo, &self.limits) {
            self.sink.report(Report::Issue(Issue::UserInput(issue)));
        }

        let transitions = self.tracker.subscribe_transitions();
        let (tx, transition) = self.tracker.begin(TxDraft {
            recipient: request.recipient.clone(),
            amount: request.amount,
            memo: memo.as_bytes().to_vec(),
        });
        self.observe(&transition);
        info!(
            event = "send_started",
            tx_id = %tx.id,
            amount = tx.amount,
            recipient = %tx.recipient,
            "Send started"
        );

        let flow = self.clone();
        let driven = tx.clone();
        tokio::spawn(async move {
            flow.drive(key, driven, request, memo, available).await;
        });

        Ok(self.updates(tx, transitions))
    }

    /// Stream of `tx` as the tracker changes it, ending at a final state or
    /// when the transaction is no longer tracked
    fn updates(
        &self,
        tx: PendingTransaction,
        transitions: broadcast::Receiver<Transition>,
    ) -> SendStream {
        let tracker = self.tracker.clone();
        let list = tracker.subscribe_list();
        let id = tx.id;
        let first = tx.clone();
        let rest = stream::unfold(
            (transitions, list, Some(tx.state), is_final(&tx)),
            move |(mut transitions, mut list, last, done)| {
                let tracker = tracker.clone();
                async move {
                    if done {
                        return None;
                    }
                    loop {
                        let received = tokio::select! {
                            received = transitions.recv() => received,
                            changed = list.changed() => {
                                // Acknowledged or settled
                                if changed.is_err() || tracker.get(id).is_none() {
                                    return None;
                                }
                                continue;
                            }
                        };
                        let state = match received {
                            Ok(transition) if transition.id != id => continue,
                            Ok(transition) => Some(transition.to),
                            // Missed some; catch up from the tracker
                            Err(broadcast::error::RecvError::Lagged(_)) => None,
                            Err(broadcast::error::RecvError::Closed) => return None,
                        };
                        let mut current = tracker.get(id)?;
                        // The tracker may already be further along than this transition
                        if let Some(state) = state.filter(|s| *s != current.state) {
                            current.state = state;
                            if !state.is_terminal() {
                                current.failure = None;
                            }
                        }
                        if Some(current.state) == last {
                            continue;
                        }
                        let done = is_final(&current);
                        let state = current.state;
                        return Some((current, (transitions, list, Some(state), done)));
                    }
                }
            },
        );
        stream::once(async move { first }).chain(rest).boxed()
    }

    async fn drive(
        &self,
        key: SpendingKey,
        tx: PendingTransaction,
        request: SendRequest,
        memo: String,
        available: Option<u64>,
    ) {
        let id = tx.id;

        let validated =
            validate_send(&request, &memo, available, &self.limits, self.validator.as_ref()).await;
        if let Err(error) = validated {
            info!(
                event = "send_invalid",
                tx_id = %id,
                reason = %error,
                "Send rejected by validation"
            );
            self.fail_encoding(id, error);
            return;
        }

        let encoded = match self.engine.encode(&key, &tx).await {
            Ok(encoded) => encoded,
            Err(failure) => {
                warn!(
                    event = "send_encode_failed",
                    tx_id = %id,
                    code = failure.code.unwrap_or(-1),
                    error = %failure.message,
                    "Encoding failed"
                );
                self.fail_encoding(
                    id,
                    SendError::EncodingFailed {
                        code: failure.code,
                        message: failure.message,
                    },
                );
                return;
            }
        };

        match self.tracker.mark_created(id) {
            Ok(transition) => self.observe(&transition),
            Err(err) => {
                self.abandon(id, err).await;
                return;
            }
        }

        if let Err(err) = self.tracker.begin_submit(id) {
            self.abandon(id, err).await;
            return;
        }

        match self.engine.submit(&encoded).await {
            Ok(()) => match self.tracker.mark_submitted(id) {
                Ok(transition) => {
                    info!(
                        event = "send_submitted",
                        tx_id = %id,
                        txid = %encoded.txid_hex(),
                        "Transaction submitted"
                    );
                    self.observe(&transition);
                }
                // The engine feed got there first
                Err(err) => debug!(event = "send_submit_superseded", tx_id = %id, error = %err),
            },
            Err(failure) => {
                warn!(
                    event = "send_submit_failed",
                    tx_id = %id,
                    code = failure.code.unwrap_or(-1),
                    error = %failure.message,
                    "Submission failed"
                );
                match self
                    .tracker
                    .mark_failed_submit(id, failure.code, failure.message)
                {
                    Ok(transition) => self.observe(&transition),
                    Err(err) => debug!(event = "send_submit_superseded", tx_id = %id, error = %err),
                }
            }
        }
    }

    fn fail_encoding(&self, id: TxId, error: SendError) {
        match self.tracker.mark_failed_encoding(id, error) {
            Ok(transition) => self.observe(&transition),
            Err(err) => debug!(event = "send_fail_superseded", tx_id = %id, error = %err),
        }
    }

    // Stop driving a send that was cancelled (or otherwise moved) underneath us
    async fn abandon(&self, id: TxId, err: Error) {
        if err.is_cancelled_race() {
            info!(event = "send_abandoned", tx_id = %id, "Send cancelled before submission");
            self.engine.cancel(id).await;
        } else {
            debug!(event = "send_abandoned", tx_id = %id, error = %err, "Send no longer ours to drive");
        }
    }
}

/// Terminal and beyond any network correction
fn is_final(tx: &PendingTransaction) -> bool {
    tx.is_terminal() && tx.state != TxState::Cancelled
}
