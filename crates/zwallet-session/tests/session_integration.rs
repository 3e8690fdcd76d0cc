//! End-to-end tests of a wallet session against scripted feeds and engine

use chrono::Duration as ChronoDuration;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use zwallet_core::{
    encode_sapling_address, Balance, ConfirmationStatus, NetworkAddressValidator,
    PendingTransaction, Pool, ProcessorInfo, SendError, SendRequest, SpendingKey, TxId, TxState,
    TxUpdate, SAPLING_ADDRESS_LEN,
};
use zwallet_params::{NetworkType, SessionConfig};
use zwallet_session::testing::{EngineCall, ManualClock, ScriptedEngine, ScriptedFeeds};
use zwallet_session::{
    CancelOutcome, Clock, Error, FunnelStep, Issue, MetricKey, RecordingSink, Report, SendStream,
    SessionDeps, Source, TxAction, UiSnapshot, WalletSession,
};

const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    session: WalletSession,
    feeds: Arc<ScriptedFeeds>,
    engine: Arc<ScriptedEngine>,
    sink: Arc<RecordingSink>,
    clock: Arc<ManualClock>,
}

fn start() -> Harness {
    let feeds = Arc::new(ScriptedFeeds::new());
    let engine = Arc::new(ScriptedEngine::new());
    let sink = Arc::new(RecordingSink::new());
    let clock = Arc::new(ManualClock::ticking(ChronoDuration::milliseconds(250)));
    let session = WalletSession::start(
        SessionConfig::for_network(NetworkType::Regtest),
        SessionDeps {
            feeds: feeds.clone(),
            engine: engine.clone(),
            validator: Arc::new(NetworkAddressValidator::new(NetworkType::Regtest)),
            sink: sink.clone(),
            clock: clock.clone(),
        },
    )
    .unwrap();
    Harness {
        session,
        feeds,
        engine,
        sink,
        clock,
    }
}

fn zaddr() -> String {
    encode_sapling_address(NetworkType::Regtest, &[7u8; SAPLING_ADDRESS_LEN]).unwrap()
}

fn key() -> SpendingKey {
    SpendingKey::new("secret-extended-key-regtest1test".to_string(), 0)
}

async fn wait_for(session: &WalletSession, pred: impl FnMut(&UiSnapshot) -> bool) {
    let mut rx = session.snapshots();
    tokio::time::timeout(WAIT, rx.wait_for(pred))
        .await
        .expect("snapshot condition not reached")
        .expect("combiner stopped");
}

async fn fund(h: &Harness, sapling: u64) {
    h.feeds.sapling.push(Balance::spendable(sapling));
    wait_for(&h.session, |s| s.sapling.is_some()).await;
}

async fn collect(stream: SendStream) -> Vec<PendingTransaction> {
    tokio::time::timeout(WAIT, stream.collect::<Vec<_>>())
        .await
        .expect("send did not finish")
}

async fn next(stream: &mut SendStream) -> PendingTransaction {
    tokio::time::timeout(WAIT, stream.next())
        .await
        .expect("no update")
        .expect("stream ended")
}

async fn drive_to(stream: &mut SendStream, state: TxState) -> Vec<PendingTransaction> {
    let mut seen = Vec::new();
    loop {
        let tx = next(stream).await;
        let reached = tx.state == state;
        seen.push(tx);
        if reached {
            return seen;
        }
    }
}

async fn until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached");
}

fn states(updates: &[PendingTransaction]) -> Vec<TxState> {
    updates.iter().map(|tx| tx.state).collect()
}

#[tokio::test]
async fn test_send_happy_path_reports_funnel_and_metrics() {
    let h = start();
    fund(&h, 1_000_000).await;

    let mut stream = h
        .session
        .send(key(), SendRequest::to_address(zaddr(), 50_000))
        .unwrap();
    let updates = drive_to(&mut stream, TxState::Submitted).await;
    assert_eq!(
        states(&updates),
        vec![TxState::Creating, TxState::Created, TxState::Submitted]
    );
    let id = updates[0].id;

    // Reports follow the state change
    until(|| h.sink.funnel().len() == 5).await;
    let funnel = h.sink.funnel();
    assert_eq!(
        funnel,
        vec![
            FunnelStep::SendSelected,
            FunnelStep::SpendingKeyFound,
            FunnelStep::Creating,
            FunnelStep::Created { id },
            FunnelStep::Submitted,
        ]
    );
    let ends: Vec<MetricKey> = h.sink.metrics().iter().map(|m| m.end).collect();
    assert_eq!(ends, vec![MetricKey::TxCreated, MetricKey::TxSubmitted]);
    assert!(h.sink.metrics().iter().all(|m| m.elapsed_ms() > 0));
    assert_eq!(
        h.engine.calls(),
        vec![EngineCall::Encode(id), EngineCall::Submit(id)]
    );
}

#[tokio::test]
async fn test_amount_below_dust_fails_without_submitting() {
    let h = start();
    fund(&h, 1_000_000).await;

    let stream = h
        .session
        .send(key(), SendRequest::to_address(zaddr(), 5_000))
        .unwrap();
    let updates = collect(stream).await;
    let last = updates.last().unwrap();
    assert_eq!(last.state, TxState::FailedEncoding);
    assert_eq!(
        last.failure,
        Some(SendError::AmountBelowDust {
            amount: 5_000,
            minimum: 10_000
        })
    );
    assert!(!updates.iter().any(|tx| tx.state == TxState::Submitted));
    until(|| {
        h.sink
            .funnel()
            .iter()
            .any(|s| matches!(s, FunnelStep::ErrorEncoding { .. }))
    })
    .await;
    assert!(h.engine.calls().is_empty());
    assert!(h
        .sink
        .metrics()
        .iter()
        .all(|m| m.end != MetricKey::TxSubmitted));
    assert!(h
        .sink
        .funnel()
        .iter()
        .any(|s| matches!(s, FunnelStep::ErrorEncoding { .. })));
    // Validation failures are not engine errors
    assert!(!h
        .sink
        .reports()
        .iter()
        .any(|r| matches!(r, Report::TxError { .. })));
}

#[tokio::test]
async fn test_unknown_balance_is_insufficient() {
    let h = start();

    let stream = h
        .session
        .send(key(), SendRequest::to_address(zaddr(), 50_000))
        .unwrap();
    let updates = collect(stream).await;
    assert_eq!(
        updates.last().unwrap().failure,
        Some(SendError::InsufficientFunds {
            required: 60_000,
            available: None
        })
    );
}

#[tokio::test]
async fn test_cancel_after_submit_started_is_rejected() {
    let h = start();
    fund(&h, 1_000_000).await;
    h.engine.hold_submit();

    let mut stream = h
        .session
        .send(key(), SendRequest::to_address(zaddr(), 50_000))
        .unwrap();
    let id = TxId(1);
    until(|| h.engine.was_called(EngineCall::Submit(id))).await;

    let outcome = h.session.cancel(id).await;
    assert_eq!(
        outcome,
        CancelOutcome::Rejected(SendError::CancelAfterSubmitRejected)
    );

    h.engine.release_submit();
    let updates = drive_to(&mut stream, TxState::Submitted).await;
    assert!(!updates.iter().any(|tx| tx.state == TxState::Cancelled));
    assert!(!h.engine.was_called(EngineCall::Cancel(id)));
}

#[tokio::test]
async fn test_cancel_while_encoding_stops_the_send() {
    let h = start();
    fund(&h, 1_000_000).await;
    h.engine.hold_encode();

    let mut stream = h
        .session
        .send(key(), SendRequest::to_address(zaddr(), 50_000))
        .unwrap();
    let first = next(&mut stream).await;
    assert_eq!(first.state, TxState::Creating);
    until(|| h.engine.was_called(EngineCall::Encode(first.id))).await;

    let outcome = h.session.cancel(first.id).await;
    assert!(outcome.is_cancelled());
    let cancelled = next(&mut stream).await;
    assert_eq!(cancelled.state, TxState::Cancelled);
    assert_eq!(cancelled.failure, Some(SendError::CancelledByUser));

    h.engine.release_encode();
    until(|| {
        h.engine
            .calls()
            .iter()
            .filter(|c| **c == EngineCall::Cancel(first.id))
            .count()
            == 2
    })
    .await;
    assert!(!h.engine.was_called(EngineCall::Submit(first.id)));
    assert_eq!(
        h.session.tracker().get(first.id).map(|tx| tx.state),
        Some(TxState::Cancelled)
    );
    assert!(h.sink.funnel().contains(&FunnelStep::Cancelled));

    // The stream stays open until the cancelled send is dismissed
    h.session.acknowledge(first.id).unwrap();
    let ended = tokio::time::timeout(WAIT, stream.next()).await.unwrap();
    assert!(ended.is_none());
}

#[tokio::test]
async fn test_network_report_overrides_local_cancel_on_the_stream() {
    let h = start();
    fund(&h, 1_000_000).await;
    h.engine.hold_encode();

    let mut stream = h
        .session
        .send(key(), SendRequest::to_address(zaddr(), 50_000))
        .unwrap();
    let id = next(&mut stream).await.id;
    until(|| h.engine.was_called(EngineCall::Encode(id))).await;
    assert!(h.session.cancel(id).await.is_cancelled());
    assert_eq!(next(&mut stream).await.state, TxState::Cancelled);

    // The engine had already broadcast it
    h.feeds.pending.push(vec![TxUpdate::new(id, TxState::Submitted)]);
    let submitted = next(&mut stream).await;
    assert_eq!(submitted.state, TxState::Submitted);
    assert_eq!(submitted.failure, None);

    h.feeds.pending.push(vec![TxUpdate::mined(id, 100, None)]);
    let mined = next(&mut stream).await;
    assert_eq!(mined.state, TxState::Mined);
    assert_eq!(mined.mined_height, Some(100));
    let ended = tokio::time::timeout(WAIT, stream.next()).await.unwrap();
    assert!(ended.is_none());
    h.engine.release_encode();
}

#[tokio::test]
async fn test_engine_failures_are_reported_as_tx_errors() {
    let h = start();
    fund(&h, 1_000_000).await;
    h.engine.fail_encode(Some(7), "no spendable notes");

    let updates = collect(
        h.session
            .send(key(), SendRequest::to_address(zaddr(), 50_000))
            .unwrap(),
    )
    .await;
    let last = updates.last().unwrap();
    assert_eq!(last.state, TxState::FailedEncoding);
    assert_eq!(last.error_code(), Some(7));
    until(|| {
        h.sink.reports().contains(&Report::TxError {
            action: TxAction::Encode,
            code: Some(7),
            message: "no spendable notes".to_string(),
        })
    })
    .await;

    let h2 = start();
    fund(&h2, 1_000_000).await;
    h2.engine.fail_submit(Some(-26), "dust");
    let updates = collect(
        h2.session
            .send(key(), SendRequest::to_address(zaddr(), 50_000))
            .unwrap(),
    )
    .await;
    assert_eq!(updates.last().unwrap().state, TxState::FailedSubmit);
    until(|| h2.sink.reports().iter().any(|r| matches!(r, Report::TxError { .. }))).await;
    assert!(h2.sink.funnel().contains(&FunnelStep::ErrorSubmitting {
        code: Some(-26),
        message: "dust".to_string(),
    }));
    assert!(h2.sink.reports().contains(&Report::TxError {
        action: TxAction::Submit,
        code: Some(-26),
        message: "dust".to_string(),
    }));
}

#[tokio::test]
async fn test_missing_key_and_reply_to_preconditions() {
    let h = start();

    let err = h
        .session
        .send(
            SpendingKey::new(String::new(), 0),
            SendRequest::to_address(zaddr(), 50_000),
        )
        .err()
        .unwrap();
    assert!(matches!(err, Error::Precondition(_)));
    assert_eq!(
        h.sink.funnel(),
        vec![FunnelStep::SendSelected, FunnelStep::ErrorNotFound]
    );

    let err = h
        .session
        .send(
            key(),
            SendRequest::to_address(zaddr(), 50_000)
                .with_memo("hi")
                .with_reply_to(""),
        )
        .err()
        .unwrap();
    assert!(matches!(err, Error::Precondition(_)));
    assert!(h.session.tracker().in_flight().is_empty());
}

#[tokio::test]
async fn test_user_input_issues_are_reported() {
    let h = start();
    fund(&h, 1_000_000).await;

    let own = zaddr();
    let request = SendRequest::to_address(own.clone(), 50_000).with_reply_to(own);
    let mut stream = h.session.send(key(), request).unwrap();
    drive_to(&mut stream, TxState::Submitted).await;
    assert!(h
        .sink
        .issues()
        .iter()
        .any(|i| i.key() == "issue.self.send"));
}

#[tokio::test]
async fn test_mined_transaction_confirms_and_settles() {
    let h = start();
    fund(&h, 1_000_000).await;
    let mut stream = h
        .session
        .send(key(), SendRequest::to_address(zaddr(), 50_000))
        .unwrap();
    let id = drive_to(&mut stream, TxState::Submitted).await[0].id;

    h.feeds.processor_info.push(ProcessorInfo {
        network_height: Some(105),
        ..Default::default()
    });
    wait_for(&h.session, |s| s.processor_info.network_height == Some(105)).await;
    until(|| h.session.tracker().chain_height() == Some(105)).await;

    h.feeds.pending.push(vec![TxUpdate::mined(id, 100, None)]);
    let mined = next(&mut stream).await;
    assert_eq!(mined.state, TxState::Mined);
    assert_eq!(mined.mined_height, Some(100));
    assert!(stream.next().await.is_none());
    assert_eq!(
        h.session.confirmation(id),
        Some(ConfirmationStatus::Confirming {
            confirmations: 6,
            remaining: 4
        })
    );
    wait_for(&h.session, |s| s.remaining_confirmations() == vec![4]).await;
    until(|| h.sink.funnel().contains(&FunnelStep::Mined { height: 100 })).await;
    assert!(h
        .sink
        .metrics()
        .iter()
        .any(|m| m.end == MetricKey::TxMined));

    // Replaying the report changes nothing
    h.feeds.pending.push(vec![TxUpdate::mined(id, 100, None)]);

    h.feeds.processor_info.push(ProcessorInfo {
        network_height: Some(109),
        ..Default::default()
    });
    wait_for(&h.session, |s| s.pending.is_empty()).await;
    assert!(h.session.tracker().get(id).is_none());
    let mined_metrics = h
        .sink
        .metrics()
        .iter()
        .filter(|m| m.end == MetricKey::TxMined)
        .count();
    assert_eq!(mined_metrics, 1);
}

#[tokio::test]
async fn test_mined_report_ahead_of_tip_applies_when_tip_advances() {
    let h = start();
    fund(&h, 1_000_000).await;
    let mut stream = h
        .session
        .send(key(), SendRequest::to_address(zaddr(), 50_000))
        .unwrap();
    let id = drive_to(&mut stream, TxState::Submitted).await[0].id;

    h.feeds.processor_info.push(ProcessorInfo {
        network_height: Some(99),
        ..Default::default()
    });
    until(|| h.session.tracker().chain_height() == Some(99)).await;

    // Mined above the known tip; held back rather than applied
    h.feeds.pending.push(vec![TxUpdate::mined(id, 100, None)]);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        h.session.tracker().get(id).map(|tx| tx.state),
        Some(TxState::Submitted)
    );

    // No new engine report; the tip alone releases it
    h.feeds.processor_info.push(ProcessorInfo {
        network_height: Some(101),
        ..Default::default()
    });
    let mined = next(&mut stream).await;
    assert_eq!(mined.state, TxState::Mined);
    assert_eq!(mined.mined_height, Some(100));
    until(|| h.sink.funnel().contains(&FunnelStep::Mined { height: 100 })).await;
    until(|| {
        h.sink
            .metrics()
            .iter()
            .any(|m| m.end == MetricKey::TxMined)
    })
    .await;
}

#[tokio::test]
async fn test_confirmed_by_age_without_chain_height() {
    let h = start();
    fund(&h, 1_000_000).await;
    let mut stream = h
        .session
        .send(key(), SendRequest::to_address(zaddr(), 50_000))
        .unwrap();
    let id = drive_to(&mut stream, TxState::Submitted).await[0].id;

    let mined_at = h.clock.now();
    h.feeds.pending.push(vec![TxUpdate::mined(id, 100, Some(mined_at))]);
    until(|| h.session.tracker().get(id).map_or(false, |tx| tx.is_mined())).await;

    // Regtest falls back after 25 one-second blocks
    h.clock.advance(ChronoDuration::seconds(30));
    h.session.settle_confirmed();
    until(|| h.session.tracker().get(id).is_none()).await;
    assert!(h.sink.issues().contains(&Issue::ConfirmedByAge {
        id,
        mined_height: 100
    }));
}

#[tokio::test]
async fn test_failed_feed_keeps_last_value() {
    let h = start();
    h.feeds.sapling.push(Balance::spendable(70_000));
    h.feeds.sapling.fail("lightwalletd unreachable");
    h.feeds.sapling.push(Balance::spendable(90_000));
    h.feeds.transparent.push(Balance::spendable(5_000));

    wait_for(&h.session, |s| {
        s.failed_sources.contains(&Source::Balance(Pool::Sapling)) && s.transparent.is_some()
    })
    .await;
    let snapshot = h.session.latest();
    assert_eq!(snapshot.sapling, Some(Balance::spendable(70_000)));
    assert_eq!(snapshot.transparent, Some(Balance::spendable(5_000)));
}

#[tokio::test]
async fn test_failed_engine_feed_is_flagged_but_sends_still_show() {
    let h = start();
    fund(&h, 1_000_000).await;
    h.feeds.pending.fail("engine gone");
    wait_for(&h.session, |s| s.failed_sources.contains(&Source::Pending)).await;

    let mut stream = h
        .session
        .send(key(), SendRequest::to_address(zaddr(), 50_000))
        .unwrap();
    let id = drive_to(&mut stream, TxState::Submitted).await[0].id;
    wait_for(&h.session, |s| {
        s.failed_sources.contains(&Source::Pending)
            && s.pending.iter().any(|tx| tx.id == id && tx.state == TxState::Submitted)
    })
    .await;
}

#[tokio::test]
async fn test_typed_amount_reaches_snapshot() {
    let h = start();
    for c in "1.50".chars() {
        h.session.type_char(c);
    }
    h.session.type_char('x');
    wait_for(&h.session, |s| s.typed_amount == "1.50").await;
}

#[tokio::test]
async fn test_acknowledge_dismisses_failed_send() {
    let h = start();
    let updates = collect(
        h.session
            .send(key(), SendRequest::to_address("not-an-address", 50_000))
            .unwrap(),
    )
    .await;
    let last = updates.last().unwrap().clone();
    assert!(matches!(
        last.failure,
        Some(SendError::InvalidRecipient { .. })
    ));
    wait_for(&h.session, |s| s.pending.len() == 1).await;

    let dismissed = h.session.acknowledge(last.id).unwrap();
    assert_eq!(dismissed.id, last.id);
    wait_for(&h.session, |s| s.pending.is_empty()).await;
    assert!(matches!(
        h.session.acknowledge(last.id),
        Err(Error::UnknownTransaction(_))
    ));
}

#[tokio::test]
async fn test_shutdown_stops_session() {
    let h = start();
    assert!(!h.session.id().is_nil());
    tokio::time::timeout(WAIT, h.session.shutdown())
        .await
        .expect("shutdown hung");
}
