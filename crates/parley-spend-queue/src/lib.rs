#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

mod connectivity;
mod error;
pub mod queue;
pub mod store;

pub use connectivity::ConnectivityMonitor;
pub use error::QueueError;
pub use queue::{QueuedSpend, ReplayOutcome, SpendQueue};
pub use store::{FileSpendStore, MemorySpendStore, SpendStore};
