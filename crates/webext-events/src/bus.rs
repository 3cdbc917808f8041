//! Event bus for broadcasting bridge events to subscribers.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, trace, warn};
use webext_core::ExtensionId;

use crate::event::BridgeEvent;

/// Default channel capacity for the event bus.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Event bus for broadcasting bridge events.
///
/// Clones share the same channel. Events are delivered in publish order; a
/// receiver that falls more than `capacity` events behind skips the oldest.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Arc<BridgeEvent>>,
    capacity: usize,
}

impl EventBus {
    /// Create an event bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create an event bus with the given capacity (at least 1).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    /// Publish an event. Returns the number of receivers it reached.
    pub fn publish(&self, event: BridgeEvent) -> usize {
        let event = Arc::new(event);
        if let Ok(count) = self.sender.send(Arc::clone(&event)) {
            debug!(
                event_type = event.event_type(),
                extension_id = %event.extension_id(),
                receiver_count = count,
                "Event published"
            );
            count
        } else {
            trace!(event_type = event.event_type(), "No receivers for event");
            0
        }
    }

    /// Subscribe to every event.
    #[must_use]
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe(), None)
    }

    /// Subscribe to events concerning one extension.
    #[must_use]
    pub fn subscribe_extension(&self, extension_id: ExtensionId) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe(), Some(extension_id))
    }

    /// Number of live receivers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver for events from the [`EventBus`].
pub struct EventReceiver {
    receiver: broadcast::Receiver<Arc<BridgeEvent>>,
    extension_filter: Option<ExtensionId>,
}

impl EventReceiver {
    fn new(
        receiver: broadcast::Receiver<Arc<BridgeEvent>>,
        extension_filter: Option<ExtensionId>,
    ) -> Self {
        Self {
            receiver,
            extension_filter,
        }
    }

    fn matches(&self, event: &BridgeEvent) -> bool {
        self.extension_filter
            .as_ref()
            .is_none_or(|id| event.extension_id() == id)
    }

    /// Receive the next matching event.
    ///
    /// Returns `None` once every sender is dropped. Lagged events are skipped
    /// with a warning.
    pub async fn recv(&mut self) -> Option<Arc<BridgeEvent>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(event);
                    }
                },
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(skipped = count, "Event receiver lagged, events dropped");
                },
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Receive the next matching event without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<BridgeEvent>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(event);
                    }
                },
                Err(broadcast::error::TryRecvError::Lagged(count)) => {
                    warn!(skipped = count, "Event receiver lagged, events dropped");
                },
                Err(
                    broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed,
                ) => return None,
            }
        }
    }

    /// Drain every event currently buffered.
    pub fn drain(&mut self) -> Vec<Arc<BridgeEvent>> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventMetadata;

    fn enabled(id: &str) -> BridgeEvent {
        BridgeEvent::PackageEnabled {
            metadata: EventMetadata::new("test"),
            extension_id: ExtensionId::new(id).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_publish_and_receive() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();
        assert_eq!(bus.publish(enabled("a")), 1);
        let event = receiver.recv().await.unwrap();
        assert_eq!(event.event_type(), "package_enabled");
    }

    #[tokio::test]
    async fn test_no_subscribers() {
        let bus = EventBus::with_capacity(4);
        assert_eq!(bus.capacity(), 4);
        assert_eq!(bus.publish(enabled("a")), 0);
    }

    #[tokio::test]
    async fn test_extension_filter() {
        let bus = EventBus::new();
        let mut only_b = bus.subscribe_extension(ExtensionId::new("b").unwrap());
        bus.publish(enabled("a"));
        bus.publish(enabled("b"));
        let event = only_b.try_recv().unwrap();
        assert_eq!(event.extension_id().as_str(), "b");
        assert!(only_b.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_clones_share_channel() {
        let bus = EventBus::new();
        let clone = bus.clone();
        let mut receiver = bus.subscribe();
        clone.publish(enabled("a"));
        clone.publish(enabled("b"));
        assert_eq!(receiver.drain().len(), 2);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_lagged_receiver_keeps_newest() {
        let bus = EventBus::with_capacity(2);
        let mut receiver = bus.subscribe();
        for id in ["a", "b", "c"] {
            bus.publish(enabled(id));
        }
        let ids: Vec<String> = receiver
            .drain()
            .iter()
            .map(|e| e.extension_id().to_string())
            .collect();
        assert_eq!(ids, vec!["b", "c"]);
    }
}
