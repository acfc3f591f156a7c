//! Offline spend queue
//!
//! Spends are persisted before any ledger call and replayed oldest first.
//! A replay pass stops at the first failure so later spends never land
//! ahead of an earlier one that is still retrying; a spend that has failed
//! `max_retries` times is dropped with an error log.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parley_billing::{Ledger, SpendRequest};
use parley_config::SpendQueueConfig;
use parley_telemetry::metrics::{BillingMetrics, DebitSource};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::connectivity::ConnectivityMonitor;
use crate::error::QueueError;
use crate::store::{FileSpendStore, SpendStore};

/// Spend waiting for the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedSpend {
    /// Also the ledger idempotency key, so a replay whose acknowledgement
    /// was lost cannot debit twice
    pub id: Uuid,
    pub amount: u64,
    /// Unix milliseconds
    pub timestamp_created: i64,
    pub retry_count: u32,
}

impl QueuedSpend {
    pub fn new(amount: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            amount,
            timestamp_created: jiff::Timestamp::now().as_millisecond(),
            retry_count: 0,
        }
    }
}

/// Result of a [`SpendQueue::process_queue`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// Another replay was in progress; it runs one more pass on our behalf
    AlreadyRunning,
    Completed {
        replayed: usize,
        dropped: usize,
        /// Spends still queued after the pass
        pending: usize,
    },
}

struct Inner {
    store: Arc<dyn SpendStore>,
    ledger: Arc<dyn Ledger>,
    user_id: String,
    max_retries: u32,
    connectivity: ConnectivityMonitor,
    replaying: AtomicBool,
    /// Set by every trigger; the replay holding the flight consumes it
    rerun: AtomicBool,
    /// Serializes read-modify-write cycles on the store
    store_lock: Mutex<()>,
}

/// Clears the single-flight flag when a pass ends
struct ReplayGuard<'a>(&'a AtomicBool);

impl<'a> ReplayGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ReplayGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Inner {
    async fn load(&self) -> Result<Vec<QueuedSpend>, QueueError> {
        let _guard = self.store_lock.lock().await;
        self.store.load().await
    }

    async fn modify(&self, change: impl FnOnce(&mut Vec<QueuedSpend>) + Send) -> Result<(), QueueError> {
        let _guard = self.store_lock.lock().await;
        let mut spends = self.store.load().await?;
        change(&mut spends);
        self.store.save(&spends).await
    }

    /// Replay until no trigger is outstanding
    ///
    /// A trigger that arrives while a pass is running is not lost: the
    /// running replay sees `rerun` and makes another pass once the current
    /// one ends. Only one pass ever runs at a time.
    async fn process_queue(&self) -> Result<ReplayOutcome, QueueError> {
        self.rerun.store(true, Ordering::Release);

        let (mut replayed, mut dropped) = (0, 0);
        let mut first = true;

        loop {
            let Some(flight) = ReplayGuard::acquire(&self.replaying) else {
                if first {
                    tracing::debug!("spend replay already running; queued another pass");
                    return Ok(ReplayOutcome::AlreadyRunning);
                }
                // Another caller took over the outstanding trigger
                break;
            };
            first = false;

            while self.rerun.swap(false, Ordering::AcqRel) {
                self.replay_pass(&mut replayed, &mut dropped).await?;
            }
            drop(flight);

            // A trigger may have landed between the last swap and the release
            if !self.rerun.load(Ordering::Acquire) {
                break;
            }
        }

        let pending = self.load().await?.len();
        Ok(ReplayOutcome::Completed {
            replayed,
            dropped,
            pending,
        })
    }

    /// One oldest-first pass; stops at the first spend that fails and is
    /// still within its retry budget
    async fn replay_pass(&self, replayed: &mut usize, dropped: &mut usize) -> Result<(), QueueError> {
        let metrics = BillingMetrics::global();

        while let Some(head) = self.load().await?.into_iter().next() {
            let request = SpendRequest::new(self.user_id.clone(), head.amount, head.id.to_string())
                .with_description("offline spend")
                .with_metadata("queued_at_ms", head.timestamp_created);

            match self.ledger.spend(&request).await {
                Ok(receipt) => {
                    self.modify(|spends| spends.retain(|s| s.id != head.id)).await?;
                    metrics.record_debit(head.amount, DebitSource::Replay);
                    *replayed += 1;
                    tracing::info!(
                        id = %head.id,
                        amount = head.amount,
                        remaining = receipt.remaining,
                        "queued spend replayed"
                    );
                }
                Err(e) => {
                    let retry_count = head.retry_count + 1;

                    if retry_count >= self.max_retries {
                        self.modify(|spends| spends.retain(|s| s.id != head.id)).await?;
                        metrics.record_dropped_spend();
                        *dropped += 1;
                        tracing::error!(
                            id = %head.id,
                            amount = head.amount,
                            retry_count,
                            error = %e,
                            "dropping queued spend after exhausting retries"
                        );
                        continue;
                    }

                    self.modify(|spends| {
                        if let Some(spend) = spends.iter_mut().find(|s| s.id == head.id) {
                            spend.retry_count = retry_count;
                        }
                    })
                    .await?;
                    tracing::warn!(
                        id = %head.id,
                        amount = head.amount,
                        retry_count,
                        error = %e,
                        "queued spend replay failed"
                    );
                    break;
                }
            }
        }

        Ok(())
    }

    async fn replay_logged(&self) {
        if let Err(e) = self.process_queue().await {
            tracing::error!(error = %e, "spend replay aborted");
        }
    }
}

/// Durable, ordered queue of spends awaiting the ledger
///
/// Owns a background task that replays the queue whenever connectivity
/// comes back. Construct with [`open`] and shut down with [`close`].
///
/// [`open`]: SpendQueue::open
/// [`close`]: SpendQueue::close
pub struct SpendQueue {
    inner: Arc<Inner>,
    shutdown: CancellationToken,
    watcher: Option<JoinHandle<()>>,
}

impl SpendQueue {
    /// Open the queue and start watching connectivity
    ///
    /// Replays immediately when already online, which picks up spends
    /// left over from a previous run.
    pub fn open(
        store: Arc<dyn SpendStore>,
        ledger: Arc<dyn Ledger>,
        user_id: impl Into<String>,
        connectivity: ConnectivityMonitor,
        max_retries: u32,
    ) -> Self {
        let receiver = connectivity.subscribe();
        let inner = Arc::new(Inner {
            store,
            ledger,
            user_id: user_id.into(),
            max_retries: max_retries.max(1),
            connectivity,
            replaying: AtomicBool::new(false),
            rerun: AtomicBool::new(false),
            store_lock: Mutex::new(()),
        });

        let shutdown = CancellationToken::new();
        let watcher = tokio::spawn(watch_connectivity(Arc::clone(&inner), receiver, shutdown.clone()));

        Self {
            inner,
            shutdown,
            watcher: Some(watcher),
        }
    }

    /// Open a file-backed queue from configuration
    pub fn from_config(config: &SpendQueueConfig, ledger: Arc<dyn Ledger>, connectivity: ConnectivityMonitor) -> Self {
        Self::open(
            Arc::new(FileSpendStore::new(&config.path)),
            ledger,
            config.user_id.clone(),
            connectivity,
            config.max_retries,
        )
    }

    /// Persist a spend, then replay the queue if online
    ///
    /// Only storage failures are returned; ledger failures leave the spend
    /// queued for a later replay.
    pub async fn queue_spend(&self, amount: u64) -> Result<QueuedSpend, QueueError> {
        let spend = QueuedSpend::new(amount);
        let queued = spend.clone();
        self.inner.modify(move |spends| spends.push(queued)).await?;

        tracing::info!(id = %spend.id, amount, "spend queued");

        if self.inner.connectivity.is_online() {
            self.inner.replay_logged().await;
        }

        Ok(spend)
    }

    /// Replay queued spends in order; single-flight, concurrent calls coalesce into one more pass
    pub async fn process_queue(&self) -> Result<ReplayOutcome, QueueError> {
        self.inner.process_queue().await
    }

    /// Sum of queued amounts, read from durable storage
    pub async fn queued_amount(&self) -> Result<u64, QueueError> {
        Ok(self.inner.load().await?.iter().map(|s| s.amount).sum())
    }

    /// Queued spends, oldest first
    pub async fn pending(&self) -> Result<Vec<QueuedSpend>, QueueError> {
        self.inner.load().await
    }

    /// Stop the connectivity watcher; a replay in progress finishes first
    pub async fn close(mut self) {
        self.shutdown.cancel();
        if let Some(watcher) = self.watcher.take()
            && let Err(e) = watcher.await
        {
            tracing::warn!(error = %e, "spend queue watcher failed");
        }
    }
}

impl Drop for SpendQueue {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn watch_connectivity(inner: Arc<Inner>, mut receiver: watch::Receiver<bool>, shutdown: CancellationToken) {
    if *receiver.borrow_and_update() {
        inner.replay_logged().await;
    }

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            changed = receiver.changed() => {
                if changed.is_err() {
                    break;
                }
                if *receiver.borrow_and_update() {
                    tracing::info!("connectivity restored; replaying queued spends");
                    inner.replay_logged().await;
                }
            }
        }
    }
}
