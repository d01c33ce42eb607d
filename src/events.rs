//! Event bus for distributing alert lifecycle events to subscribers.

use tokio::sync::broadcast;

use crate::models::AlertEvent;

/// Default broadcast channel capacity; a subscriber lagging beyond this
/// many undelivered events is dropped rather than blocking the publisher.
pub const DEFAULT_CAPACITY: usize = 1000;

/// In-process publish/subscribe channel for alert events.
///
/// Delivery is asynchronous relative to the publisher and preserves
/// per-subscriber ordering. Subscribers receive only events published after
/// they subscribed; there is no replay of history.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AlertEvent>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Publishing with no subscribers is a no-op, not an error.
    pub fn publish(&self, event: AlertEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to events published from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.sender.subscribe()
    }

    /// Number of currently attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Alert, Location};

    fn created_event(lat: f64) -> AlertEvent {
        AlertEvent::Created(Alert::new(
            None,
            Location {
                latitude: lat,
                longitude: 0.0,
                accuracy: None,
            },
            None,
        ))
    }

    #[tokio::test]
    async fn test_subscriber_sees_events_in_publish_order() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(created_event(1.0));
        bus.publish(created_event(2.0));
        bus.publish(created_event(3.0));

        for expected in [1.0, 2.0, 3.0] {
            match rx.recv().await.unwrap() {
                AlertEvent::Created(alert) => {
                    assert_eq!(alert.location.latitude, expected)
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_no_replay_for_late_subscriber() {
        let bus = EventBus::default();
        bus.publish(created_event(1.0));

        let mut rx = bus.subscribe();
        bus.publish(created_event(2.0));

        match rx.recv().await.unwrap() {
            AlertEvent::Created(alert) => assert_eq!(alert.location.latitude, 2.0),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::default();
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(created_event(1.0));
    }
}
