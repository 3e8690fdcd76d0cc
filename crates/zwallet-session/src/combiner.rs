//! Joins the wallet feeds into one UI snapshot
//!
//! Every source (sync status, processor info, the three pool balances, the
//! tracker's transaction list and the typed amount) is tagged as a
//! [`SourceUpdate`] and folded into a [`UiSnapshot`] that keeps the last value
//! of each. A new snapshot is published on a `watch` channel after every
//! emission, so slow readers only ever see the newest one.
//!
//! A source that errors keeps its last good value, is listed in
//! [`UiSnapshot::failed_sources`], and is not polled again. The one exception
//! is [`Source::Pending`]: it is flagged when the engine's transaction feed
//! fails, but the tracker list keeps flowing because local sends still
//! change it.

use crate::engine::{Feed, WalletFeeds};
use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use zwallet_core::{
    AmountEntry, Balance, BalanceSummary, ConfirmationPolicy, Key, PendingTransaction, Pool,
    ProcessorInfo, SyncStatus, TxState,
};
use zwallet_params::{ProgressWeights, SessionConfig};

/// Input the snapshot is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Source {
    /// Sync status feed
    Status,
    /// Processor info feed
    ProcessorInfo,
    /// Balance feed of one pool
    Balance(Pool),
    /// Tracker transaction list
    Pending,
    /// Typed amount
    Amount,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Status => write!(f, "status"),
            Source::ProcessorInfo => write!(f, "processor_info"),
            Source::Balance(pool) => write!(f, "balance.{}", pool),
            Source::Pending => write!(f, "pending"),
            Source::Amount => write!(f, "amount"),
        }
    }
}

/// One emission from one source
#[derive(Debug, Clone, PartialEq)]
pub enum SourceUpdate {
    /// New sync status
    Status(SyncStatus),
    /// New processor info
    ProcessorInfo(ProcessorInfo),
    /// New balance for a pool
    Balance(Pool, Balance),
    /// New transaction list
    Pending(Vec<PendingTransaction>),
    /// New typed amount text
    Amount(String),
    /// The source failed and will not emit again
    Failed(Source, String),
}

impl SourceUpdate {
    /// Source this update came from
    pub fn source(&self) -> Source {
        match self {
            SourceUpdate::Status(_) => Source::Status,
            SourceUpdate::ProcessorInfo(_) => Source::ProcessorInfo,
            SourceUpdate::Balance(pool, _) => Source::Balance(*pool),
            SourceUpdate::Pending(_) => Source::Pending,
            SourceUpdate::Amount(_) => Source::Amount,
            SourceUpdate::Failed(source, _) => *source,
        }
    }
}

/// Thresholds used by the derived snapshot fields
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotPolicy {
    /// Fixed fee; spendable funds must exceed it
    pub miners_fee: u64,
    /// Transparent balance at which auto-shielding is offered
    pub autoshield_threshold: u64,
    /// Download/scan weighting of the total progress
    pub weights: ProgressWeights,
    /// Confirmations required to settle
    pub required_confirmations: u32,
}

impl SnapshotPolicy {
    /// Policy from session config
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            miners_fee: config.miners_fee,
            autoshield_threshold: config.autoshield_threshold,
            weights: config.progress,
            required_confirmations: config.confirmations.required,
        }
    }
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

/// Everything the wallet screen renders, from the latest value of each source
#[derive(Debug, Clone, PartialEq)]
pub struct UiSnapshot {
    /// Sync status
    pub status: SyncStatus,
    /// Processor ranges and chain tip
    pub processor_info: ProcessorInfo,
    /// Orchard balance, once reported
    pub orchard: Option<Balance>,
    /// Sapling balance, once reported
    pub sapling: Option<Balance>,
    /// Transparent balance, once reported
    pub transparent: Option<Balance>,
    /// Tracked outbound transactions
    pub pending: Vec<PendingTransaction>,
    /// Amount as typed
    pub typed_amount: String,
    /// Sources that failed; their values are the last good ones
    pub failed_sources: BTreeSet<Source>,
    /// Thresholds for the derived fields
    pub policy: SnapshotPolicy,
}

impl UiSnapshot {
    /// Placeholder shown before any source has emitted
    pub fn initial(policy: SnapshotPolicy, typed_amount: impl Into<String>) -> Self {
        Self {
            status: SyncStatus::Disconnected,
            processor_info: ProcessorInfo::default(),
            orchard: None,
            sapling: None,
            transparent: None,
            pending: Vec::new(),
            typed_amount: typed_amount.into(),
            failed_sources: BTreeSet::new(),
            policy,
        }
    }

    /// Fold one update in. Returns whether anything changed.
    pub fn apply(&mut self, update: SourceUpdate) -> bool {
        let source = update.source();
        let tracker_list = matches!(update, SourceUpdate::Pending(_));
        if !tracker_list && self.failed_sources.contains(&source) {
            return false;
        }
        match update {
            SourceUpdate::Status(status) => replace(&mut self.status, status),
            SourceUpdate::ProcessorInfo(info) => replace(&mut self.processor_info, info),
            SourceUpdate::Balance(pool, balance) => {
                replace(self.balance_slot(pool), Some(balance))
            }
            SourceUpdate::Pending(pending) => replace(&mut self.pending, pending),
            SourceUpdate::Amount(amount) => replace(&mut self.typed_amount, amount),
            SourceUpdate::Failed(source, _) => self.failed_sources.insert(source),
        }
    }

    fn balance_slot(&mut self, pool: Pool) -> &mut Option<Balance> {
        match pool {
            Pool::Orchard => &mut self.orchard,
            Pool::Sapling => &mut self.sapling,
            Pool::Transparent => &mut self.transparent,
        }
    }

    /// Latest balance of a pool
    pub fn balance(&self, pool: Pool) -> Option<&Balance> {
        match pool {
            Pool::Orchard => self.orchard.as_ref(),
            Pool::Sapling => self.sapling.as_ref(),
            Pool::Transparent => self.transparent.as_ref(),
        }
    }

    /// Spendable sapling funds cover more than the fee
    pub fn has_spendable_funds(&self) -> bool {
        self.sapling
            .map_or(false, |b| b.available() > self.policy.miners_fee)
    }

    /// Synced with the chain tip
    pub fn is_synced(&self) -> bool {
        self.status.is_synced()
    }

    /// Sends are allowed
    pub fn is_send_enabled(&self) -> bool {
        self.is_synced() && self.has_spendable_funds()
    }

    /// Any sapling funds, spendable or pending
    pub fn has_sapling_balance(&self) -> bool {
        self.sapling.map_or(false, |b| b.total() > 0)
    }

    /// Enough transparent funds to offer shielding
    pub fn has_autoshield_funds(&self) -> bool {
        self.transparent
            .map_or(false, |b| b.available() >= self.policy.autoshield_threshold)
    }

    /// Download percentage
    pub fn download_progress(&self) -> u8 {
        self.processor_info.download_percent()
    }

    /// Scan percentage
    pub fn scan_progress(&self) -> u8 {
        self.processor_info.scan_percent()
    }

    /// Weighted download and scan percentage in `[0, 100]`
    pub fn total_progress(&self) -> f32 {
        let weights = self.policy.weights;
        let total = weights.download * self.download_progress() as f32
            + weights.scan * self.scan_progress() as f32;
        total.clamp(0.0, 100.0)
    }

    /// Submitted transactions not yet seen in a block
    pub fn unmined_pending_count(&self) -> usize {
        self.pending.iter().filter(|tx| tx.is_unmined()).count()
    }

    /// Transactions still being built or submitted
    pub fn sending_count(&self) -> usize {
        self.pending
            .iter()
            .filter(|tx| matches!(tx.state, TxState::Creating | TxState::Created))
            .count()
    }

    /// Confirmations still needed by each mined transaction, largest first.
    /// Empty when the chain height is unknown.
    pub fn remaining_confirmations(&self) -> Vec<u32> {
        let Some(chain_height) = self.processor_info.network_height else {
            return Vec::new();
        };
        let required = self.policy.required_confirmations;
        let mut remaining: Vec<u32> = self
            .pending
            .iter()
            .filter_map(|tx| tx.mined_height.filter(|h| *h > 0))
            .map(|height| {
                required.saturating_sub(ConfirmationPolicy::confirmations(height, chain_height))
            })
            .filter(|r| *r > 0)
            .collect();
        remaining.sort_unstable_by(|a, b| b.cmp(a));
        remaining
    }

    /// Padded shielded/transparent/total summary
    pub fn balance_summary(&self) -> BalanceSummary {
        BalanceSummary::new(self.sapling.as_ref(), self.transparent.as_ref())
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

/// Tag a feed's items and stop it at the first error
fn tagged<T, F>(source: Source, feed: Feed<T>, wrap: F) -> BoxStream<'static, SourceUpdate>
where
    T: Send + 'static,
    F: Fn(T) -> SourceUpdate + Send + 'static,
{
    feed.scan(false, move |failed, item| {
        if *failed {
            return futures::future::ready(None);
        }
        let update = match item {
            Ok(value) => wrap(value),
            Err(err) => {
                *failed = true;
                SourceUpdate::Failed(source, err.message)
            }
        };
        futures::future::ready(Some(update))
    })
    .boxed()
}

/// Current value then every change of a watch channel
fn watch_stream<T>(mut rx: watch::Receiver<T>) -> BoxStream<'static, T>
where
    T: Clone + Send + Sync + 'static,
{
    let first = rx.borrow_and_update().clone();
    stream::once(async move { first })
        .chain(stream::unfold(rx, |mut rx| async move {
            rx.changed().await.ok()?;
            let value = rx.borrow_and_update().clone();
            Some((value, rx))
        }))
        .boxed()
}

/// Fold key presses into amount text
fn amount_stream(
    keys: mpsc::UnboundedReceiver<Key>,
    entry: AmountEntry,
) -> BoxStream<'static, SourceUpdate> {
    stream::unfold((keys, entry), |(mut keys, mut entry)| async move {
        let key = keys.recv().await?;
        entry.apply(key);
        let text = entry.as_str().to_string();
        Some((SourceUpdate::Amount(text), (keys, entry)))
    })
    .boxed()
}

/// Failures reported from outside the combined feeds
fn failure_stream(failures: mpsc::UnboundedReceiver<SourceUpdate>) -> BoxStream<'static, SourceUpdate> {
    stream::unfold(failures, |mut failures| async move {
        let update = failures.recv().await?;
        Some((update, failures))
    })
    .boxed()
}

/// Background task joining the feeds into [`UiSnapshot`]s
pub struct StreamCombiner {
    snapshots: watch::Receiver<UiSnapshot>,
    keys: mpsc::UnboundedSender<Key>,
    failures: mpsc::UnboundedSender<SourceUpdate>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl StreamCombiner {
    /// Subscribe to the feeds and start combining. Must be called inside a
    /// tokio runtime.
    pub fn spawn(
        feeds: &dyn WalletFeeds,
        pending: watch::Receiver<Vec<PendingTransaction>>,
        policy: SnapshotPolicy,
        amount: AmountEntry,
    ) -> Self {
        let mut sources: Vec<BoxStream<'static, SourceUpdate>> = vec![
            tagged(Source::Status, feeds.status(), SourceUpdate::Status),
            tagged(
                Source::ProcessorInfo,
                feeds.processor_info(),
                SourceUpdate::ProcessorInfo,
            ),
        ];
        for pool in Pool::ALL {
            sources.push(tagged(
                Source::Balance(pool),
                feeds.balances(pool),
                move |balance| SourceUpdate::Balance(pool, balance),
            ));
        }
        sources.push(watch_stream(pending).map(SourceUpdate::Pending).boxed());

        let (keys, key_rx) = mpsc::unbounded_channel();
        sources.push(amount_stream(key_rx, amount.clone()));

        let (failures, failure_rx) = mpsc::unbounded_channel();
        sources.push(failure_stream(failure_rx));

        let initial = UiSnapshot::initial(policy, amount.as_str());
        let (snapshot_tx, snapshots) = watch::channel(initial.clone());
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut merged = stream::select_all(sources);
            let mut state = initial;
            info!(event = "combiner_started", "Stream combiner started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    next = merged.next() => {
                        let Some(update) = next else { break };
                        if let SourceUpdate::Failed(source, message) = &update {
                            warn!(
                                event = "source_failed",
                                source = %source,
                                error = %message,
                                "Source failed, keeping last value"
                            );
                        }
                        if state.apply(update) {
                            snapshot_tx.send_replace(state.clone());
                        }
                    }
                }
            }
            debug!(event = "combiner_stopped", "Stream combiner stopped");
        });

        Self {
            snapshots,
            keys,
            failures,
            shutdown,
            task: Some(task),
        }
    }

    /// Receiver of the latest snapshot
    pub fn subscribe(&self) -> watch::Receiver<UiSnapshot> {
        self.snapshots.clone()
    }

    /// Copy of the latest snapshot
    pub fn latest(&self) -> UiSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Push a typed character into the amount source; non-key characters
    /// are ignored
    pub fn type_char(&self, c: char) {
        if let Some(key) = Key::from_char(c) {
            // Fails only after shutdown
            let _ = self.keys.send(key);
        }
    }

    /// Flag `source` as failed from outside its feed, e.g. when the engine
    /// feed behind the tracker list errors
    pub fn report_failure(&self, source: Source, message: impl Into<String>) {
        // Fails only after shutdown
        let _ = self.failures.send(SourceUpdate::Failed(source, message.into()));
    }

    pub(crate) fn failure_sender(&self) -> mpsc::UnboundedSender<SourceUpdate> {
        self.failures.clone()
    }

    /// Stop the task and wait for it to finish
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for StreamCombiner {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
