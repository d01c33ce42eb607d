//! Registry of connected viewer sessions.
//!
//! Each live WebSocket connection registers here and is handed its own
//! subscription to the event bus. The registry never pushes the current
//! alert list on registration; catch-up is the API layer's snapshot read,
//! kept separate from live delta delivery.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::events::EventBus;
use crate::models::AlertEvent;

/// Bookkeeping for one connected session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub connected_at: DateTime<Utc>,
}

/// Tracks currently-connected viewer sessions and their event subscriptions.
#[derive(Clone)]
pub struct ConnectionRegistry {
    bus: EventBus,
    sessions: Arc<RwLock<HashMap<Uuid, SessionInfo>>>,
}

impl ConnectionRegistry {
    /// Create a registry fanning out from the given bus.
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a new viewer session, subscribing it to the event bus.
    ///
    /// The subscription is live from the moment this returns, so a caller
    /// that reads its snapshot afterwards cannot miss an event published
    /// in between.
    pub async fn register(&self) -> (Uuid, broadcast::Receiver<AlertEvent>) {
        let id = Uuid::new_v4();
        let receiver = self.bus.subscribe();

        let mut sessions = self.sessions.write().await;
        sessions.insert(
            id,
            SessionInfo {
                connected_at: Utc::now(),
            },
        );
        debug!("Viewer session {} connected ({} active)", id, sessions.len());

        (id, receiver)
    }

    /// Remove a session. Safe to call repeatedly or with an unknown id.
    pub async fn unregister(&self, id: Uuid) {
        let mut sessions = self.sessions.write().await;
        if let Some(info) = sessions.remove(&id) {
            debug!(
                "Viewer session {} disconnected after {}s ({} active)",
                id,
                (Utc::now() - info.connected_at).num_seconds(),
                sessions.len()
            );
        }
    }

    /// Number of currently registered sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Alert, Location};

    #[tokio::test]
    async fn test_register_and_unregister() {
        let registry = ConnectionRegistry::new(EventBus::default());

        let (id_a, _rx_a) = registry.register().await;
        let (id_b, _rx_b) = registry.register().await;
        assert_ne!(id_a, id_b);
        assert_eq!(registry.session_count().await, 2);

        registry.unregister(id_a).await;
        assert_eq!(registry.session_count().await, 1);

        // Idempotent, including for ids never registered.
        registry.unregister(id_a).await;
        registry.unregister(Uuid::new_v4()).await;
        assert_eq!(registry.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_registered_session_receives_events() {
        let bus = EventBus::default();
        let registry = ConnectionRegistry::new(bus.clone());
        let (_id, mut rx) = registry.register().await;

        let alert = Alert::new(
            None,
            Location {
                latitude: 10.0,
                longitude: 20.0,
                accuracy: None,
            },
            None,
        );
        bus.publish(AlertEvent::Created(alert.clone()));

        match rx.recv().await.unwrap() {
            AlertEvent::Created(received) => assert_eq!(received.id, alert.id),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
