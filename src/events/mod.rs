//! Event system for room lifecycle notifications
//!
//! Broadcasts room changes to monitoring WebSocket clients and any other
//! in-process subscriber.

pub mod types;

pub use types::RoomEvent;

use tokio::sync::broadcast;

/// Event channel capacity (ring buffer size)
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Event bus for broadcasting room events
///
/// Built on a tokio broadcast channel; a subscriber that falls more than
/// [`EVENT_CHANNEL_CAPACITY`] events behind receives `Lagged`.
pub struct EventBus {
    tx: broadcast::Sender<RoomEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish an event to all subscribers
    ///
    /// With no active subscribers the event is dropped.
    pub fn publish(&self, event: RoomEvent) {
        let name = event.event_name();
        if let Ok(receivers) = self.tx.send(event) {
            tracing::trace!("Published {} to {} subscriber(s)", name, receivers);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(RoomEvent::RoomClosed {
            room: "r1".to_string(),
            reason: "stopped".to_string(),
        });

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, RoomEvent::RoomClosed { .. }));
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(RoomEvent::ViewerLeft {
            room: "r1".to_string(),
            viewer: "v1".to_string(),
            viewers: 0,
        });

        assert!(matches!(rx1.recv().await.unwrap(), RoomEvent::ViewerLeft { .. }));
        assert!(matches!(rx2.recv().await.unwrap(), RoomEvent::ViewerLeft { .. }));
    }

    #[test]
    fn test_no_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);

        bus.publish(RoomEvent::Error {
            message: "nobody listening".to_string(),
        });
    }
}
