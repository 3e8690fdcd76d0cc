//! CLI send harness for exercising a wallet session offline
//!
//! Drives a session against scripted feeds and a scripted engine:
//! - Sync progress as the screen would show it
//! - A send from request through confirmation
//! - Engine failures and late cancels

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use zwallet_core::{
    encode_sapling_address, Balance, NetworkAddressValidator, ProcessorInfo, ScanProgress,
    SendRequest, SpendingKey, SyncStatus, TxState, TxUpdate, SAPLING_ADDRESS_LEN,
};
use zwallet_params::{NetworkType, SessionConfig};
use zwallet_session::testing::{ScriptedEngine, ScriptedFeeds};
use zwallet_session::{init_logging, SessionDeps, SystemClock, TracingSink, WalletSession};

#[derive(Parser)]
#[command(name = "send-harness")]
#[command(about = "Wallet session send/sync harness", long_about = None)]
struct Cli {
    /// Session config (JSON); regtest defaults when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a download and scan and show combined progress
    Sync {
        /// First block
        #[arg(short, long, default_value = "1000")]
        start: u64,

        /// Number of blocks
        #[arg(short, long, default_value = "2000")]
        blocks: u64,

        /// Blocks per progress step
        #[arg(long, default_value = "100")]
        step: u64,

        /// Delay between steps in milliseconds
        #[arg(long, default_value = "20")]
        step_ms: u64,
    },

    /// Send, then mine and confirm the transaction
    Send {
        /// Recipient; a well-formed address for the network when omitted
        #[arg(short, long)]
        recipient: Option<String>,

        /// Amount in zatoshi
        #[arg(short, long, default_value = "50000")]
        amount: u64,

        /// Memo text
        #[arg(short, long, default_value = "")]
        memo: String,

        /// Spendable sapling balance in zatoshi
        #[arg(long, default_value = "1000000")]
        balance: u64,

        /// Fail encoding with this engine code
        #[arg(long)]
        fail_encode: Option<i32>,

        /// Fail submission with this engine code
        #[arg(long)]
        fail_submit: Option<i32>,

        /// Engine latency in milliseconds
        #[arg(long, default_value = "200")]
        latency_ms: u64,

        /// Delay between mined blocks in milliseconds
        #[arg(long, default_value = "100")]
        block_ms: u64,
    },

    /// Try to cancel a send after submission has started
    LateCancel {
        /// Amount in zatoshi
        #[arg(short, long, default_value = "50000")]
        amount: u64,
    },
}

struct Scripted {
    session: WalletSession,
    feeds: Arc<ScriptedFeeds>,
    engine: Arc<ScriptedEngine>,
    config: SessionConfig,
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<SessionConfig> {
    match path {
        Some(path) => SessionConfig::load(&path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(SessionConfig::for_network(NetworkType::Regtest)),
    }
}

fn start(config: SessionConfig) -> anyhow::Result<Scripted> {
    let feeds = Arc::new(ScriptedFeeds::new());
    let engine = Arc::new(ScriptedEngine::new());
    let session = WalletSession::start(
        config.clone(),
        SessionDeps {
            feeds: feeds.clone(),
            engine: engine.clone(),
            validator: Arc::new(NetworkAddressValidator::new(config.network)),
            sink: Arc::new(TracingSink),
            clock: Arc::new(SystemClock),
        },
    )?;
    Ok(Scripted {
        session,
        feeds,
        engine,
        config,
    })
}

fn bar(len: u64, template: &str) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(template)?
            .progress_chars("=>-"),
    );
    Ok(pb)
}

fn placeholder_address(config: &SessionConfig) -> anyhow::Result<String> {
    Ok(encode_sapling_address(config.network, &[0x5a; SAPLING_ADDRESS_LEN])?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config)?;
    init_logging(&config.logging)?;

    match cli.command {
        Commands::Sync {
            start: first,
            blocks,
            step,
            step_ms,
        } => {
            run_sync(config, first, blocks, step, step_ms).await?;
        }
        Commands::Send {
            recipient,
            amount,
            memo,
            balance,
            fail_encode,
            fail_submit,
            latency_ms,
            block_ms,
        } => {
            let recipient = match recipient {
                Some(recipient) => recipient,
                None => placeholder_address(&config)?,
            };
            let scripted = start(config)?;
            scripted.engine.set_delay(Duration::from_millis(latency_ms));
            if let Some(code) = fail_encode {
                scripted.engine.fail_encode(Some(code), "scripted encode failure");
            }
            if let Some(code) = fail_submit {
                scripted.engine.fail_submit(Some(code), "scripted submit failure");
            }
            let request = SendRequest::to_address(recipient, amount).with_memo(memo);
            run_send(scripted, request, balance, block_ms).await?;
        }
        Commands::LateCancel { amount } => {
            run_late_cancel(config, amount).await?;
        }
    }

    Ok(())
}

async fn run_sync(
    config: SessionConfig,
    first: u64,
    blocks: u64,
    step: u64,
    step_ms: u64,
) -> anyhow::Result<()> {
    if step == 0 {
        bail!("step must be non-zero");
    }
    let scripted = start(config)?;
    let mut snapshots = scripted.session.snapshots();
    let last = first + blocks;
    info!("Replaying sync of blocks {}..{}", first, last);

    let pb = bar(100, "[{elapsed_precise}] {bar:40.cyan/blue} {pos}% {msg}")?;
    let pb_clone = pb.clone();
    let progress_task = tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            pb_clone.set_position(snapshot.total_progress().round() as u64);
            pb_clone.set_message(format!(
                "{} (download {}%, scan {}%)",
                snapshot.status.name(),
                snapshot.download_progress(),
                snapshot.scan_progress()
            ));
            if snapshot.is_synced() {
                break;
            }
        }
    });

    let feeds = &scripted.feeds;
    feeds.status.push(SyncStatus::Downloading);
    let mut downloaded = first;
    while downloaded < last {
        downloaded = (downloaded + step).min(last);
        feeds.processor_info.push(ProcessorInfo {
            download: Some(ScanProgress::new(first, last, downloaded)?),
            scan: None,
            network_height: Some(last),
        });
        tokio::time::sleep(Duration::from_millis(step_ms)).await;
    }

    feeds.status.push(SyncStatus::Scanning);
    let mut scanned = first;
    while scanned < last {
        scanned = (scanned + step).min(last);
        feeds.processor_info.push(ProcessorInfo {
            download: Some(ScanProgress::new(first, last, last)?),
            scan: Some(ScanProgress::new(first, last, scanned)?),
            network_height: Some(last),
        });
        tokio::time::sleep(Duration::from_millis(step_ms)).await;
    }
    feeds.status.push(SyncStatus::Synced);

    tokio::time::timeout(Duration::from_secs(5), progress_task)
        .await
        .context("progress did not reach synced")??;
    pb.finish_with_message("Synced");
    scripted.session.shutdown().await;
    Ok(())
}

async fn run_send(
    scripted: Scripted,
    request: SendRequest,
    balance: u64,
    block_ms: u64,
) -> anyhow::Result<()> {
    let Scripted {
        session,
        feeds,
        config,
        ..
    } = scripted;
    let tip = config.network_params().sapling_activation_height + 1_000;

    feeds.status.push(SyncStatus::Synced);
    feeds.sapling.push(Balance::spendable(balance));
    feeds.processor_info.push(ProcessorInfo {
        network_height: Some(tip),
        ..Default::default()
    });
    let mut snapshots = session.snapshots();
    tokio::time::timeout(
        Duration::from_secs(5),
        snapshots.wait_for(|s| s.is_send_enabled() && s.processor_info.network_height.is_some()),
    )
    .await
    .context("wallet never became ready to send")??;

    info!("Sending {} zatoshi to {}", request.amount, request.recipient);
    let key = SpendingKey::new("secret-extended-key-harness".to_string(), 0);
    let mut updates = session.send(key, request)?;

    let pb = ProgressBar::new_spinner();
    pb.enable_steady_tick(Duration::from_millis(100));
    let mut last = None;
    while let Some(tx) = updates.next().await {
        pb.set_message(format!("tx {} {}", tx.id, tx.state));
        last = Some(tx.clone());
        if tx.state == TxState::Submitted {
            break;
        }
    }
    let Some(tx) = last else {
        bail!("send produced no updates");
    };
    if tx.is_failure() {
        pb.finish_with_message(format!("tx {} {}", tx.id, tx.state));
        warn!(
            "Send failed: {}",
            tx.failure
                .as_ref()
                .map(|f| f.user_message())
                .unwrap_or_default()
        );
        session.shutdown().await;
        return Ok(());
    }

    // Mine at the tip, then grow the chain until it settles
    let mined_height = tip;
    feeds.pending.push(vec![TxUpdate::mined(tx.id, mined_height, None)]);
    let mut height = mined_height + 1;
    let required = u64::from(config.confirmations.required);
    while session.tracker().get(tx.id).is_some() && height < mined_height + required + 5 {
        feeds.processor_info.push(ProcessorInfo {
            network_height: Some(height),
            ..Default::default()
        });
        tokio::time::sleep(Duration::from_millis(block_ms)).await;
        if let Some(status) = session.confirmation(tx.id) {
            pb.set_message(format!("tx {} {}", tx.id, status));
        }
        height += 1;
    }

    match session.tracker().get(tx.id) {
        None => {
            pb.finish_with_message(format!("tx {} confirmed", tx.id));
            info!("Transaction {} confirmed at height {}", tx.id, height);
        }
        Some(tx) => {
            pb.finish_with_message(format!("tx {} {}", tx.id, tx.state));
            warn!("Transaction {} still {} at height {}", tx.id, tx.state, height);
        }
    }
    session.shutdown().await;
    Ok(())
}

async fn run_late_cancel(config: SessionConfig, amount: u64) -> anyhow::Result<()> {
    let recipient = placeholder_address(&config)?;
    let scripted = start(config)?;
    scripted.feeds.sapling.push(Balance::spendable(amount * 10));
    let mut snapshots = scripted.session.snapshots();
    tokio::time::timeout(Duration::from_secs(5), snapshots.wait_for(|s| s.sapling.is_some()))
        .await
        .context("balance never arrived")??;

    scripted.engine.hold_submit();
    let key = SpendingKey::new("secret-extended-key-harness".to_string(), 0);
    let mut updates = scripted
        .session
        .send(key, SendRequest::to_address(recipient, amount))?;
    let first = updates.next().await.context("send produced no updates")?;

    // Wait for the driver to reach the engine's submit
    let calls_submit = |engine: &ScriptedEngine| {
        engine
            .calls()
            .iter()
            .any(|c| matches!(c, zwallet_session::testing::EngineCall::Submit(_)))
    };
    let mut waited = 0;
    while !calls_submit(&scripted.engine) {
        if waited > 5_000 {
            bail!("submit never started");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += 10;
    }

    let outcome = scripted.session.cancel(first.id).await;
    info!("Cancel of tx {} during submission: {:?}", first.id, outcome);
    scripted.engine.release_submit();
    while let Some(tx) = updates.next().await {
        info!("tx {} {}", tx.id, tx.state);
        if tx.state == TxState::Submitted {
            break;
        }
    }
    scripted.session.shutdown().await;
    Ok(())
}
