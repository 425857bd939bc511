//! Head poller: asks the provider for the latest block every interval and hands each new head
//! to a callback, one at a time.

use crate::error::TrackerError;
use crate::provider::BlockProvider;
use crate::types::{BlockHeader, BlockNumber};
use alloy::primitives::B256;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Run `fut` unless `cancel` fires first, in which case the in-flight call is dropped.
pub(crate) async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, TrackerError>
where
    F: Future<Output = Result<T, TrackerError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TrackerError::Cancelled),
        res = fut => res,
    }
}

pub struct HeadPoller {
    provider: Arc<dyn BlockProvider>,
    interval: Duration,
}

impl HeadPoller {
    pub fn new(provider: Arc<dyn BlockProvider>, interval: Duration) -> Self {
        Self { provider, interval }
    }

    /// Poll until cancelled or until `on_block` fails.
    ///
    /// The callback sees a head only when its hash differs from the previous one, and the next
    /// poll does not start before the callback returns. Always returns an error:
    /// [TrackerError::Cancelled] on shutdown, otherwise the provider or callback failure.
    pub async fn track<F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut on_block: F,
    ) -> Result<(), TrackerError>
    where
        F: FnMut(BlockHeader) -> Fut,
        Fut: Future<Output = Result<(), TrackerError>>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_hash: Option<B256> = None;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TrackerError::Cancelled),
                _ = ticker.tick() => {}
            }
            let head = cancellable(
                cancel,
                self.provider.get_block_by_number(BlockNumber::Latest),
            )
            .await?;
            let Some(head) = head else {
                tracing::warn!("latest block not returned by provider");
                continue;
            };
            if last_hash == Some(head.hash) {
                continue;
            }
            last_hash = Some(head.hash);
            tracing::trace!(number = head.number, hash = %head.hash, "new head");
            on_block(head).await?;
        }
    }
}
