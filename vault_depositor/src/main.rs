use std::{io::Write, sync::Arc};

use anyhow::{bail, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use deposit_flow::{
    DepositOrchestrator, DepositOutcome, InMemoryTransactionManager, OrderbookCalldataProvider,
    TransactionManager,
};
use deposit_store_redis::RedisTransactionManager;

use crate::{cfg::Cfg, eth_client::RpcAllowance, terminal::TerminalPresenter};

mod cfg;
mod eth_client;
mod terminal;

#[tokio::main]
async fn main() -> Result<()> {
    // Logging: controlled via RUST_LOG, e.g. RUST_LOG=info,deposit_flow=debug
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cfg = Cfg::parse();
    let intent = cfg.intent();

    let (errors, mut error_rx) = mpsc::unbounded_channel::<String>();
    let toasts = tokio::spawn(async move {
        while let Some(message) = error_rx.recv().await {
            eprintln!("❌ {message}");
        }
    });

    let in_memory = Arc::new(InMemoryTransactionManager::new());
    let manager: Arc<dyn TransactionManager> = match &cfg.redis_url {
        Some(url) => {
            info!("recording transactions in redis");
            Arc::new(RedisTransactionManager::new(url)?)
        }
        None => in_memory.clone(),
    };

    let orchestrator = DepositOrchestrator::new(
        Arc::new(OrderbookCalldataProvider::new(RpcAllowance)),
        Arc::new(TerminalPresenter::new()),
        manager,
        Arc::new(errors),
    );

    let outcome = orchestrator.initiate_deposit(&intent).await;

    // Dropping the orchestrator closes the error channel.
    drop(orchestrator);
    toasts.await?;

    report(outcome, &in_memory, &mut std::io::stdout())
}

/// Prints every transaction recorded in memory, then the outcome. Records go
/// first so an approval submitted before a failed deposit is still shown.
fn report(
    outcome: Result<DepositOutcome>,
    in_memory: &InMemoryTransactionManager,
    out: &mut impl Write,
) -> Result<()> {
    for record in in_memory.records()? {
        writeln!(out, "Recorded {:?}: {} (chain {})", record.kind, record.tx_hash, record.chain_id)?;
    }

    match outcome? {
        DepositOutcome::Submitted { approval, deposit } => {
            if let Some(approval) = approval {
                writeln!(out, "Approval: {approval}")?;
            }
            writeln!(out, "Deposit: {deposit}")?;
        }
        DepositOutcome::Aborted(message) => bail!("deposit aborted: {message}"),
        other => info!("deposit not submitted: {:?}", other),
    }
    Ok(())
}
