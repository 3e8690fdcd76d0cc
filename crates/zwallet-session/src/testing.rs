//! Scripted collaborators for tests and the send harness

use crate::engine::{Clock, EngineFailure, Feed, FeedError, TransactionEngine, WalletFeeds};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::time::Duration as StdDuration;
use tokio::sync::{mpsc, watch};
use zwallet_core::{
    Balance, EncodedTransaction, PendingTransaction, Pool, ProcessorInfo, SpendingKey, SyncStatus,
    TxId, TxUpdate,
};

/// Clock that only moves when told to, or by a fixed step per reading
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    step: Option<Duration>,
}

impl ManualClock {
    /// Clock stopped at `at`
    pub fn at(at: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(at),
            step: None,
        }
    }

    /// Clock that moves `step` forward after every reading
    pub fn ticking(step: Duration) -> Self {
        Self {
            step: Some(step),
            ..Self::default()
        }
    }

    /// Jump to `at`
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }

    /// Move forward by `by`
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        // 2023-11-14T22:13:20Z
        Self::at(DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let mut now = self.now.lock();
        let current = *now;
        if let Some(step) = self.step {
            *now += step;
        }
        current
    }
}

/// One scripted feed. The first subscriber gets every pushed item; later
/// subscribers get a stream that never yields.
pub struct FeedChannel<T> {
    tx: Mutex<Option<mpsc::UnboundedSender<Result<T, FeedError>>>>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Result<T, FeedError>>>>,
}

impl<T: Send + 'static> FeedChannel<T> {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
        }
    }

    fn send(&self, item: Result<T, FeedError>) {
        if let Some(tx) = self.tx.lock().as_ref() {
            let _ = tx.send(item);
        }
    }

    /// Emit a value
    pub fn push(&self, value: T) {
        self.send(Ok(value));
    }

    /// Emit an error
    pub fn fail(&self, message: impl Into<String>) {
        self.send(Err(FeedError::new(message)));
    }

    /// End the feed
    pub fn close(&self) {
        self.tx.lock().take();
    }

    fn stream(&self) -> Feed<T> {
        match self.rx.lock().take() {
            Some(rx) => stream::unfold(rx, |mut rx| async move {
                let item = rx.recv().await?;
                Some((item, rx))
            })
            .boxed(),
            None => stream::pending().boxed(),
        }
    }
}

/// Feeds driven by the test
pub struct ScriptedFeeds {
    /// Sync status feed
    pub status: FeedChannel<SyncStatus>,
    /// Processor info feed
    pub processor_info: FeedChannel<ProcessorInfo>,
    /// Orchard balance feed
    pub orchard: FeedChannel<Balance>,
    /// Sapling balance feed
    pub sapling: FeedChannel<Balance>,
    /// Transparent balance feed
    pub transparent: FeedChannel<Balance>,
    /// Engine view of outbound transactions
    pub pending: FeedChannel<Vec<TxUpdate>>,
}

impl ScriptedFeeds {
    /// Feeds with nothing pushed yet
    pub fn new() -> Self {
        Self {
            status: FeedChannel::new(),
            processor_info: FeedChannel::new(),
            orchard: FeedChannel::new(),
            sapling: FeedChannel::new(),
            transparent: FeedChannel::new(),
            pending: FeedChannel::new(),
        }
    }

    /// Balance feed of `pool`
    pub fn balance(&self, pool: Pool) -> &FeedChannel<Balance> {
        match pool {
            Pool::Orchard => &self.orchard,
            Pool::Sapling => &self.sapling,
            Pool::Transparent => &self.transparent,
        }
    }
}

impl Default for ScriptedFeeds {
    fn default() -> Self {
        Self::new()
    }
}

impl WalletFeeds for ScriptedFeeds {
    fn status(&self) -> Feed<SyncStatus> {
        self.status.stream()
    }

    fn processor_info(&self) -> Feed<ProcessorInfo> {
        self.processor_info.stream()
    }

    fn balances(&self, pool: Pool) -> Feed<Balance> {
        self.balance(pool).stream()
    }

    fn pending_transactions(&self) -> Feed<Vec<TxUpdate>> {
        self.pending.stream()
    }
}

/// Call made to a [`ScriptedEngine`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCall {
    /// `encode`
    Encode(TxId),
    /// `submit`
    Submit(TxId),
    /// `cancel`
    Cancel(TxId),
}

/// Blocks callers while held
struct Gate {
    held: watch::Sender<bool>,
}

impl Gate {
    fn new() -> Self {
        let (held, _) = watch::channel(false);
        Self { held }
    }

    fn set(&self, held: bool) {
        self.held.send_replace(held);
    }

    async fn pass(&self) {
        let mut rx = self.held.subscribe();
        // Sender lives as long as the gate
        let _ = rx.wait_for(|held| !*held).await;
    }
}

/// Engine whose outcomes the test picks
pub struct ScriptedEngine {
    encode_failure: Mutex<Option<EngineFailure>>,
    submit_failure: Mutex<Option<EngineFailure>>,
    delay: Mutex<Option<StdDuration>>,
    encode_gate: Gate,
    submit_gate: Gate,
    calls: Mutex<Vec<EngineCall>>,
}

impl ScriptedEngine {
    /// Engine that encodes and submits successfully
    pub fn new() -> Self {
        Self {
            encode_failure: Mutex::new(None),
            submit_failure: Mutex::new(None),
            delay: Mutex::new(None),
            encode_gate: Gate::new(),
            submit_gate: Gate::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fail every encode with this error
    pub fn fail_encode(&self, code: Option<i32>, message: &str) {
        *self.encode_failure.lock() = Some(EngineFailure::new(code, message));
    }

    /// Fail every submit with this error
    pub fn fail_submit(&self, code: Option<i32>, message: &str) {
        *self.submit_failure.lock() = Some(EngineFailure::new(code, message));
    }

    /// Sleep this long inside each encode and submit
    pub fn set_delay(&self, delay: StdDuration) {
        *self.delay.lock() = Some(delay);
    }

    /// Make encode wait until [`ScriptedEngine::release_encode`]
    pub fn hold_encode(&self) {
        self.encode_gate.set(true);
    }

    /// Let held and future encodes through
    pub fn release_encode(&self) {
        self.encode_gate.set(false);
    }

    /// Make submit wait until [`ScriptedEngine::release_submit`]
    pub fn hold_submit(&self) {
        self.submit_gate.set(true);
    }

    /// Let held and future submits through
    pub fn release_submit(&self) {
        self.submit_gate.set(false);
    }

    /// Calls so far, in order
    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    /// Whether `call` was made
    pub fn was_called(&self, call: EngineCall) -> bool {
        self.calls.lock().contains(&call)
    }

    async fn pause(&self) {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransactionEngine for ScriptedEngine {
    async fn encode(
        &self,
        _key: &SpendingKey,
        tx: &PendingTransaction,
    ) -> Result<EncodedTransaction, EngineFailure> {
        self.calls.lock().push(EngineCall::Encode(tx.id));
        self.encode_gate.pass().await;
        self.pause().await;
        let failure = self.encode_failure.lock().clone();
        if let Some(failure) = failure {
            return Err(failure);
        }
        let mut txid = [0u8; 32];
        txid[..8].copy_from_slice(&tx.id.0.to_le_bytes());
        Ok(EncodedTransaction {
            id: tx.id,
            txid,
            raw: tx.memo.clone(),
        })
    }

    async fn submit(&self, tx: &EncodedTransaction) -> Result<(), EngineFailure> {
        self.calls.lock().push(EngineCall::Submit(tx.id));
        self.submit_gate.pass().await;
        self.pause().await;
        let failure = self.submit_failure.lock().clone();
        match failure {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    async fn cancel(&self, id: TxId) -> bool {
        let mut calls = self.calls.lock();
        let known = calls.contains(&EngineCall::Encode(id));
        calls.push(EngineCall::Cancel(id));
        known
    }
}
