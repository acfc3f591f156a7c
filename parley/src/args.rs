use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Parley chat gateway
#[derive(Debug, Parser)]
#[command(name = "parley", about = "Metered streaming chat gateway with offline spend replay")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "parley.toml", env = "PARLEY_CONFIG")]
    pub config: PathBuf,

    /// Override the listen address
    #[arg(long, env = "PARLEY_LISTEN")]
    pub listen: Option<SocketAddr>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the gateway (default)
    Serve,
    /// Manage the local offline spend queue
    #[command(subcommand)]
    Spend(SpendCommand),
}

#[derive(Debug, Subcommand)]
pub enum SpendCommand {
    /// Persist a spend and replay the queue unless `--offline`
    Queue {
        /// Credits to spend
        amount: u64,
        /// Only persist; do not contact the ledger
        #[arg(long)]
        offline: bool,
    },
    /// Show queued spends and their total
    Status,
    /// Replay queued spends against the ledger
    Replay,
}
