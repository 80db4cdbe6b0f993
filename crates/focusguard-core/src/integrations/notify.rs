//! Built-in notification sinks.

use tokio::sync::broadcast;
use tracing::{debug, info};

use super::traits::NotificationSink;
use crate::events::Event;

/// Logs every event. The default sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, event: &Event) {
        match event {
            Event::ShieldWarning {
                session_id,
                remaining_secs,
                ..
            } => debug!(%session_id, remaining_secs, "shield warning"),
            other => info!(
                session_id = %other.session_id(),
                kind = other.kind(),
                "focus event"
            ),
        }
    }
}

/// Fans events out to any number of subscribers (UI layers, tests).
///
/// Sending with no live receivers, or to a lagging one, is not an error.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<Event>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl NotificationSink for BroadcastSink {
    fn notify(&self, event: &Event) {
        let _ = self.tx.send(event.clone());
    }
}

/// Forward to several sinks in order.
pub struct FanoutSink {
    sinks: Vec<std::sync::Arc<dyn NotificationSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<std::sync::Arc<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }
}

impl NotificationSink for FanoutSink {
    fn notify(&self, event: &Event) {
        for sink in &self.sinks {
            sink.notify(event);
        }
    }
}
