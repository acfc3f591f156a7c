use std::sync::Arc;

use anyhow::Context as _;
use parley_billing::LedgerClient;
use parley_config::Config;
use parley_spend_queue::{ConnectivityMonitor, ReplayOutcome, SpendQueue};

use crate::args::SpendCommand;

/// Run a spend-queue command against the configured ledger
///
/// The queue is opened offline so nothing replays behind the command's
/// back; replays happen only where the command asks for them.
pub async fn run(config: &Config, command: SpendCommand) -> anyhow::Result<()> {
    let queue_config = config
        .spend_queue
        .as_ref()
        .context("a [spend_queue] section is required for spend commands")?;
    let ledger_config = config
        .ledger
        .as_ref()
        .context("a [ledger] section is required for spend commands")?;

    let ledger = Arc::new(LedgerClient::new(ledger_config)?);
    let queue = SpendQueue::from_config(queue_config, ledger, ConnectivityMonitor::new(false));

    let result = execute(&queue, command).await;
    queue.close().await;
    result
}

async fn execute(queue: &SpendQueue, command: SpendCommand) -> anyhow::Result<()> {
    match command {
        SpendCommand::Queue { amount, offline } => {
            let spend = queue.queue_spend(amount).await?;
            println!("queued {} credits as {}", spend.amount, spend.id);

            if !offline {
                report(queue.process_queue().await?);
            }
        }
        SpendCommand::Status => {
            let pending = queue.pending().await?;
            for spend in &pending {
                println!(
                    "{}  {:>8} credits  retries {}",
                    spend.id, spend.amount, spend.retry_count
                );
            }
            println!(
                "{} queued, {} credits total",
                pending.len(),
                queue.queued_amount().await?
            );
        }
        SpendCommand::Replay => report(queue.process_queue().await?),
    }

    Ok(())
}

fn report(outcome: ReplayOutcome) {
    match outcome {
        ReplayOutcome::AlreadyRunning => println!("a replay is already running"),
        ReplayOutcome::Completed {
            replayed,
            dropped,
            pending,
        } => println!("replayed {replayed}, dropped {dropped}, {pending} still queued"),
    }
}
