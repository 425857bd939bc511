//! Downstream consumer of accepted logs.
//!
//! Delivery is fire-and-forget and at-least-once: a range that fails to persist is re-fetched
//! and its logs are forwarded again, so subscribers must tolerate duplicates.

use crate::types::Log;
use tokio::sync::broadcast;

pub trait EventSubscriber: Send + Sync {
    /// Called once per accepted log, in the order the provider returned them. Must not block.
    fn add_log(&self, log: &Log);
}

/// Fan out to every live receiver; logs are dropped when nobody is subscribed.
impl EventSubscriber for broadcast::Sender<Log> {
    fn add_log(&self, log: &Log) {
        let _ = self.send(log.clone());
    }
}

impl<F> EventSubscriber for F
where
    F: Fn(&Log) + Send + Sync,
{
    fn add_log(&self, log: &Log) {
        self(log)
    }
}
