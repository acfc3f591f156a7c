#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

mod circuit;
pub mod client;
pub mod cost;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod meter;
pub mod types;

pub use client::LedgerClient;
pub use error::BillingError;
pub use ledger::Ledger;
pub use memory::MemoryLedger;
pub use meter::{FinalUsage, MeterConfig, MeterSession, StreamMeter};
pub use types::{SpendReceipt, SpendRequest, SpendStatus, SpendTransaction};
