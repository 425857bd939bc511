//! EventTracker: follows the chain head, processes logs of confirmed blocks, and restarts itself
//! on failure until stopped.
//!
//! Flow: supervisor loop -> catch-up once -> [HeadPoller] -> `track_block` per head. A sequential
//! head is appended to the [BlockWindow] and the confirmed prefix is processed; any other head
//! triggers a resync that rebuilds the window from the provider in batches.

use crate::config::TrackerConfig;
use crate::error::TrackerError;
use crate::poller::{cancellable, HeadPoller};
use crate::provider::BlockProvider;
use crate::store::EventStore;
use crate::subscriber::EventSubscriber;
use crate::types::{BlockHeader, BlockNumber, Log};
use crate::window::{BlockWindow, SyncStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, OnceCell};
use tokio_util::sync::CancellationToken;

/// Supervisor state. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Idle,
    CatchingUp,
    Polling,
    Stopped,
}

/// Dropping the tracker cancels the supervisor, same as [EventTracker::stop].
pub struct EventTracker {
    inner: Arc<Inner>,
    cancel: CancellationToken,
    started: AtomicBool,
    state_rx: watch::Receiver<TrackerState>,
}

struct Inner {
    config: TrackerConfig,
    provider: Arc<dyn BlockProvider>,
    store: Arc<dyn EventStore>,
    subscriber: Arc<dyn EventSubscriber>,
    window: Mutex<BlockWindow>,
    synced_on_start: OnceCell<()>,
    state: watch::Sender<TrackerState>,
}

impl EventTracker {
    /// Seeds the window from `max(start_block - 1, stored watermark)`.
    pub async fn new(
        config: TrackerConfig,
        provider: Arc<dyn BlockProvider>,
        store: Arc<dyn EventStore>,
        subscriber: Arc<dyn EventSubscriber>,
    ) -> Result<Self, TrackerError> {
        config.validate()?;
        let stored = store.last_processed_block().await?;
        let last_processed = config.effective_last_processed(stored);
        tracing::debug!(stored, last_processed, "loaded last processed block");
        let (state, state_rx) = watch::channel(TrackerState::Idle);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                provider,
                store,
                subscriber,
                window: Mutex::new(BlockWindow::new(last_processed)),
                synced_on_start: OnceCell::new(),
                state,
            }),
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
            state_rx,
        })
    }

    /// Spawn the supervisor on the current tokio runtime and return immediately.
    /// Calling it again is a no-op.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let config = &self.inner.config;
        tracing::info!(
            rpc_endpoint = %config.rpc_endpoint,
            start_block = config.start_block,
            num_block_confirmations = config.num_block_confirmations,
            poll_interval = ?config.poll_interval,
            sync_batch_size = config.sync_batch_size,
            max_backlog_size = config.max_backlog_size,
            log_filter = ?config.log_filter,
            "starting event tracker"
        );
        let inner = Arc::clone(&self.inner);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            inner.supervise(cancel).await;
        });
    }

    /// Signal shutdown. Does not wait; watch [EventTracker::state] for [TrackerState::Stopped].
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> watch::Receiver<TrackerState> {
        self.state_rx.clone()
    }

    pub async fn last_processed_block(&self) -> u64 {
        self.inner.window.lock().await.last_processed()
    }

    pub async fn last_cached_block(&self) -> u64 {
        self.inner.window.lock().await.last_cached()
    }

    /// Startup catch-up against the latest head. Runs to success at most once per tracker;
    /// concurrent callers wait for the running attempt.
    pub async fn sync_on_start(&self) -> Result<(), TrackerError> {
        self.inner.sync_on_start_once(&self.cancel).await
    }

    /// Feed one head, as the poller does. Useful when heads come from an external source.
    pub async fn track_block(&self, block: BlockHeader) -> Result<(), TrackerError> {
        self.inner.track_block(block, &self.cancel).await
    }
}

impl Drop for EventTracker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Inner {
    fn set_state(&self, state: TrackerState) {
        self.state.send_replace(state);
    }

    async fn supervise(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            let err = match self.run_once(&cancel).await {
                Ok(()) => None,
                Err(e) if e.is_cancelled() => break,
                Err(e) => Some(e),
            };
            self.set_state(TrackerState::Idle);
            if let Some(e) = err {
                tracing::error!(reason = %e, backoff = ?self.config.retry_backoff, "event tracker failed, restarting");
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.retry_backoff) => {}
            }
        }
        self.set_state(TrackerState::Stopped);
        tracing::info!("event tracker stopped");
    }

    async fn run_once(&self, cancel: &CancellationToken) -> Result<(), TrackerError> {
        self.set_state(TrackerState::CatchingUp);
        if let Err(e) = self.sync_on_start_once(cancel).await {
            tracing::debug!(reason = %e, "syncing up on start failed");
            return Err(e);
        }

        self.set_state(TrackerState::Polling);
        let poller = HeadPoller::new(Arc::clone(&self.provider), self.config.poll_interval);
        poller
            .track(cancel, move |block| self.track_block(block, cancel))
            .await
    }

    async fn sync_on_start_once(&self, cancel: &CancellationToken) -> Result<(), TrackerError> {
        self.synced_on_start
            .get_or_try_init(|| self.sync_on_start(cancel))
            .await?;
        Ok(())
    }

    async fn sync_on_start(&self, cancel: &CancellationToken) -> Result<(), TrackerError> {
        tracing::info!("syncing up on start");
        let latest = cancellable(
            cancel,
            self.provider.get_block_by_number(BlockNumber::Latest),
        )
        .await?
        .ok_or_else(|| TrackerError::Rpc("latest block not returned".into()))?;

        let mut window = self.window.lock().await;
        if window.classify(&latest) == SyncStatus::Sequential {
            tracing::info!(latest_block = latest.number, "everything synced up on start");
            return Ok(());
        }
        self.resync(&mut window, latest, cancel).await
    }

    async fn track_block(
        &self,
        block: BlockHeader,
        cancel: &CancellationToken,
    ) -> Result<(), TrackerError> {
        let mut window = self.window.lock().await;
        match window.classify(&block) {
            SyncStatus::Sequential => {
                window.append(block)?;
                self.process_logs(&mut window, cancel).await
            }
            // missed blocks or a reorg: drop pending state and rebuild it
            SyncStatus::OutOfSync => self.resync(&mut window, block, cancel).await,
        }
    }

    /// Rebuild the window from the provider up to `latest`, processing confirmed logs per batch.
    /// The caller holds the window lock for the whole call.
    async fn resync(
        &self,
        window: &mut BlockWindow,
        latest: BlockHeader,
        cancel: &CancellationToken,
    ) -> Result<(), TrackerError> {
        let last_processed = window.last_processed();
        tracing::info!(
            last_processed_block = last_processed,
            latest_block = latest.number,
            "getting new state, since some blocks were missed"
        );

        let mut start_block = last_processed + 1;
        let backlog_floor = latest.number.saturating_sub(self.config.max_backlog_size);
        if backlog_floor > last_processed {
            tracing::warn!(
                last_processed_block = last_processed,
                start_block = backlog_floor,
                max_backlog_size = self.config.max_backlog_size,
                "backlog too large, skipping older blocks"
            );
            start_block = backlog_floor;
        }
        if latest.number < start_block {
            tracing::warn!(
                last_processed_block = last_processed,
                latest_block = latest.number,
                "latest block is behind the last processed block"
            );
        }

        window.reset(start_block - 1);

        // `latest` is already known; only the blocks below it are fetched.
        let mut batch_start = start_block;
        while batch_start < latest.number {
            let batch_end = batch_start
                .saturating_add(self.config.sync_batch_size)
                .min(latest.number);
            tracing::info!(
                from_block = batch_start,
                to_block = batch_end - 1,
                "getting new state for block batch"
            );
            for number in batch_start..batch_end {
                let block = cancellable(
                    cancel,
                    self.provider.get_block_by_number(BlockNumber::Number(number)),
                )
                .await
                .and_then(|b| b.ok_or(TrackerError::BlockNotFound(number)));
                let block = match block {
                    Ok(b) => b,
                    Err(e) => {
                        if !e.is_cancelled() {
                            tracing::error!(
                                from_block = batch_start,
                                to_block = batch_end - 1,
                                current_block = number,
                                reason = %e,
                                "getting new state for block batch failed on rpc call"
                            );
                        }
                        return Err(e);
                    }
                };
                window.append(block)?;
            }
            self.process_logs(window, cancel).await?;
            batch_start = batch_end;
        }

        let latest_number = latest.number;
        window.append(latest)?;
        if let Err(e) = self.process_logs(window, cancel).await {
            if !e.is_cancelled() {
                tracing::error!(
                    last_processed_block = last_processed,
                    latest_block = latest_number,
                    reason = %e,
                    "getting new state failed"
                );
            }
            return Err(e);
        }

        tracing::info!(
            last_processed_block = window.last_processed(),
            latest_block = latest_number,
            "getting new state finished"
        );
        Ok(())
    }

    /// Fetch, filter, forward and persist logs of the confirmed prefix, then evict it.
    /// On any failure the range stays cached and is retried on the next pass.
    async fn process_logs(
        &self,
        window: &mut BlockWindow,
        cancel: &CancellationToken,
    ) -> Result<(), TrackerError> {
        let Some((from_block, to_block)) =
            window.confirmed_range(self.config.num_block_confirmations)
        else {
            tracing::debug!("no confirmed blocks, nothing to process");
            return Ok(());
        };

        let query = self.config.log_filter.query(from_block, to_block);
        let logs = match cancellable(cancel, self.provider.get_logs(&query)).await {
            Ok(logs) => logs,
            Err(e) => {
                if !e.is_cancelled() {
                    tracing::error!(from_block, to_block, reason = %e, "process logs failed on getting logs from rpc");
                }
                return Err(e);
            }
        };

        let filtered: Vec<Log> = logs
            .into_iter()
            .filter(|log| self.config.log_filter.accepts(log))
            .collect();
        for log in &filtered {
            self.subscriber.add_log(log);
        }

        // Logs first: a crash before the watermark write re-processes the range
        // and the store upserts, so nothing is lost.
        if let Err(e) = self.store.insert_logs(&filtered).await {
            tracing::error!(from_block, to_block, reason = %e, "process logs failed on saving logs to store");
            return Err(e.into());
        }
        if let Err(e) = self.store.insert_last_processed_block(to_block).await {
            tracing::error!(from_block, to_block, reason = %e, "process logs failed on saving last processed block");
            return Err(e.into());
        }

        window.evict(from_block, to_block)?;
        tracing::debug!(
            from_block,
            to_block,
            num_logs = filtered.len(),
            "processing logs for blocks finished"
        );
        Ok(())
    }
}
