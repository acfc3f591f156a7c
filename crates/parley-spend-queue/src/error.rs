/// Durable storage failures
///
/// Ledger failures during replay are retried and logged, never returned.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("spend queue I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("spend queue file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}
