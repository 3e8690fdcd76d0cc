//! Wallet session
//!
//! Wires the combiner, tracker, correlator and send flow to one engine and
//! keeps the tracker reconciled with the engine's view of outbound
//! transactions.

use crate::combiner::{SnapshotPolicy, Source, SourceUpdate, StreamCombiner, UiSnapshot};
use crate::correlator::MetricCorrelator;
use crate::engine::{Clock, Feed, TransactionEngine, WalletFeeds};
use crate::report::{Issue, MetricsSink, Report};
use crate::send::{SendFlow, SendStream};
use crate::tracker::{CancelOutcome, TransactionLifecycleTracker};
use crate::Result;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;
use zwallet_core::{
    AddressValidator, AmountEntry, ConfirmationStatus, PendingTransaction, Recipient,
    SendLimits, SendRequest, SpendingKey, TxId, TxUpdate,
};
use zwallet_params::SessionConfig;

/// Collaborators a session runs against
pub struct SessionDeps {
    /// Engine push streams
    pub feeds: Arc<dyn WalletFeeds>,
    /// Transaction building and submission
    pub engine: Arc<dyn TransactionEngine>,
    /// Address classification
    pub validator: Arc<dyn AddressValidator>,
    /// Metric, funnel and issue destination
    pub sink: Arc<dyn MetricsSink>,
    /// Time source
    pub clock: Arc<dyn Clock>,
}

/// Parts shared with the reconcile task
#[derive(Clone)]
struct Core {
    tracker: TransactionLifecycleTracker,
    correlator: Arc<MetricCorrelator>,
    flow: SendFlow,
    sink: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
}

impl Core {
    fn reconcile(&self, updates: &[TxUpdate]) {
        for transition in self.tracker.reconcile(updates) {
            self.flow.observe(&transition);
        }
    }

    fn chain_height(&self, height: u64) {
        for transition in self.tracker.set_chain_height(height) {
            self.flow.observe(&transition);
        }
    }

    fn settle(&self) -> Vec<(PendingTransaction, ConfirmationStatus)> {
        let settled = self.tracker.settle_confirmed(self.clock.now());
        for (tx, status) in &settled {
            self.correlator.forget(tx.id);
            if *status == ConfirmationStatus::ConfirmedByAge {
                self.sink.report(Report::Issue(Issue::ConfirmedByAge {
                    id: tx.id,
                    mined_height: tx.mined_height.unwrap_or(0),
                }));
            }
        }
        settled
    }
}

/// One wallet screen's worth of state
pub struct WalletSession {
    id: Uuid,
    core: Core,
    engine: Arc<dyn TransactionEngine>,
    combiner: StreamCombiner,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl WalletSession {
    /// Validate `config` and start the session. Must be called inside a
    /// tokio runtime.
    pub fn start(config: SessionConfig, deps: SessionDeps) -> Result<Self> {
        config.validate()?;
        let id = Uuid::new_v4();

        let tracker = TransactionLifecycleTracker::new(&config, deps.clock.clone());
        let correlator = Arc::new(MetricCorrelator::new(deps.sink.clone()));
        let flow = SendFlow::new(
            tracker.clone(),
            correlator.clone(),
            deps.sink.clone(),
            deps.engine.clone(),
            deps.validator.clone(),
            SendLimits::from_config(&config),
        );
        let core = Core {
            tracker: tracker.clone(),
            correlator,
            flow,
            sink: deps.sink.clone(),
            clock: deps.clock.clone(),
        };

        let combiner = StreamCombiner::spawn(
            deps.feeds.as_ref(),
            tracker.subscribe_list(),
            SnapshotPolicy::from_config(&config),
            AmountEntry::default(),
        );

        let (shutdown, shutdown_rx) = watch::channel(false);
        let tick = Duration::from_secs(config.network_params().expected_block_interval_secs.max(1));
        let task = tokio::spawn(reconcile_loop(
            core.clone(),
            deps.feeds.pending_transactions(),
            combiner.subscribe(),
            combiner.failure_sender(),
            shutdown_rx,
            tick,
        ));

        info!(
            event = "session_started",
            session_id = %id,
            network = config.network_params().name,
            required_confirmations = config.confirmations.required,
            "Wallet session started"
        );

        Ok(Self {
            id,
            core,
            engine: deps.engine,
            combiner,
            shutdown,
            task: Some(task),
        })
    }

    /// Session id, for log correlation
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Receiver of the latest screen snapshot
    pub fn snapshots(&self) -> watch::Receiver<UiSnapshot> {
        self.combiner.subscribe()
    }

    /// Copy of the latest screen snapshot
    pub fn latest(&self) -> UiSnapshot {
        self.combiner.latest()
    }

    /// Start a send funded from the pool the recipient implies
    pub fn send(&self, key: SpendingKey, request: SendRequest) -> Result<SendStream> {
        let snapshot = self.combiner.latest();
        let available = match &request.recipient {
            Recipient::InternalPool(_) => snapshot.transparent.map(|b| b.available()),
            Recipient::Address(_) => snapshot.sapling.map(|b| b.available()),
        };
        self.core.flow.send(key, request, available)
    }

    /// Cancel a send that has not been submitted
    pub async fn cancel(&self, id: TxId) -> CancelOutcome {
        let outcome = self.core.tracker.cancel(id);
        if let CancelOutcome::Cancelled(transition) = &outcome {
            self.core.flow.observe(transition);
            let known = self.engine.cancel(id).await;
            debug!(event = "engine_cancel", tx_id = %id, known, "Engine notified of cancel");
        }
        outcome
    }

    /// Dismiss a finished transaction from the list
    pub fn acknowledge(&self, id: TxId) -> Result<PendingTransaction> {
        let tx = self.core.tracker.acknowledge(id)?;
        self.core.correlator.forget(id);
        Ok(tx)
    }

    /// Push a keypad character into the amount being typed
    pub fn type_char(&self, c: char) {
        self.combiner.type_char(c);
    }

    /// Confirmation status of a tracked transaction
    pub fn confirmation(&self, id: TxId) -> Option<ConfirmationStatus> {
        self.core.tracker.confirmation(id, self.core.clock.now())
    }

    /// Remove confirmed transactions now rather than on the next tick
    pub fn settle_confirmed(&self) -> Vec<(PendingTransaction, ConfirmationStatus)> {
        self.core.settle()
    }

    /// Transaction tracker
    pub fn tracker(&self) -> &TransactionLifecycleTracker {
        &self.core.tracker
    }

    /// Metric correlator
    pub fn correlator(&self) -> &MetricCorrelator {
        &self.core.correlator
    }

    /// Stop background tasks and wait for them
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        info!(event = "session_stopped", session_id = %self.id, "Wallet session stopped");
        // Dropping the combiner aborts it if it is still running
    }
}

impl Drop for WalletSession {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn reconcile_loop(
    core: Core,
    mut pending: Feed<Vec<TxUpdate>>,
    mut snapshots: watch::Receiver<UiSnapshot>,
    failures: mpsc::UnboundedSender<SourceUpdate>,
    mut shutdown: watch::Receiver<bool>,
    tick: Duration,
) {
    let mut pending_open = true;
    let mut snapshots_open = true;
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            next = pending.next(), if pending_open => match next {
                Some(Ok(updates)) => core.reconcile(&updates),
                Some(Err(e)) => {
                    warn!(
                        event = "pending_feed_failed",
                        error = %e,
                        "Pending transaction feed failed, keeping local state"
                    );
                    let _ = failures.send(SourceUpdate::Failed(Source::Pending, e.message.clone()));
                    pending_open = false;
                }
                None => pending_open = false,
            },
            changed = snapshots.changed(), if snapshots_open => {
                if changed.is_err() {
                    snapshots_open = false;
                    continue;
                }
                let height = snapshots.borrow_and_update().processor_info.network_height;
                if let Some(height) = height {
                    core.chain_height(height);
                }
                core.settle();
            }
            _ = ticker.tick() => {
                core.settle();
            }
        }
    }
    debug!(event = "reconcile_stopped", "Reconcile loop stopped");
}
