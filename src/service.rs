//! Alert service: validation, lifecycle enforcement, persistence, fan-out.
//!
//! The only component with write access to the store. Every successful
//! mutation publishes exactly one event, and only after the write has been
//! durably persisted; a store failure never produces an event.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::error::AlertError;
use crate::events::EventBus;
use crate::lifecycle;
use crate::models::{Alert, AlertEvent, AlertStatus, Location, NewAlert};
use crate::storage::Storage;

/// Orchestrates the alert store, lifecycle rules, and event bus.
#[derive(Clone)]
pub struct AlertService {
    storage: Storage,
    bus: EventBus,
    /// Per-alert write locks: check-then-act sequences racing on the same
    /// id are serialized, while distinct ids proceed in parallel. Entries
    /// are evicted once the last writer on an id releases its lock.
    write_locks: Arc<RwLock<HashMap<String, Arc<Mutex<()>>>>>,
}

impl AlertService {
    /// Create a service over the given store and bus.
    pub fn new(storage: Storage, bus: EventBus) -> Self {
        Self {
            storage,
            bus,
            write_locks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn write_lock(&self, id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.write_locks.write().await;
        locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Evict the map entry for an id once no other writer holds it.
    /// Callers release their own clone first, so a strong count of 1 means
    /// the map holds the only remaining reference.
    async fn release_write_lock(&self, id: &str) {
        let mut locks = self.write_locks.write().await;
        if locks.get(id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(id);
        }
    }

    /// Accept a new SOS submission: validate coordinates, apply defaults,
    /// persist, then broadcast the created alert.
    pub async fn submit(&self, input: NewAlert) -> Result<Alert, AlertError> {
        let (latitude, longitude) = match (input.latitude, input.longitude) {
            (Some(lat), Some(lng)) => (lat, lng),
            _ => {
                return Err(AlertError::Validation(
                    "Location coordinates are required".to_string(),
                ))
            }
        };

        let location = Location {
            latitude,
            longitude,
            accuracy: Some(input.accuracy.unwrap_or(0.0)),
        };
        location.validate()?;

        let alert = Alert::new(input.user_name, location, input.message);
        self.storage.create(&alert).await?;

        info!("SOS alert {} created by {}", alert.id, alert.user_name);
        self.bus.publish(AlertEvent::Created(alert.clone()));

        Ok(alert)
    }

    /// Move an alert to a new status if the transition is legal, then
    /// broadcast the updated record.
    pub async fn change_status(
        &self,
        id: &str,
        requested: AlertStatus,
    ) -> Result<Alert, AlertError> {
        let lock = self.write_lock(id).await;
        let result: Result<Alert, AlertError> = async {
            let _guard = lock.lock().await;

            let current = self.storage.get(id).await?;
            lifecycle::check_transition(current.status, requested)?;

            let updated = self.storage.update_status(id, requested).await?;

            info!("Alert {} moved {} -> {}", id, current.status, requested);
            self.bus.publish(AlertEvent::Updated(updated.clone()));

            Ok(updated)
        }
        .await;

        drop(lock);
        self.release_write_lock(id).await;
        result
    }

    /// Delete a resolved alert and broadcast its removal.
    pub async fn remove(&self, id: &str) -> Result<(), AlertError> {
        let lock = self.write_lock(id).await;
        let result: Result<(), AlertError> = async {
            let _guard = lock.lock().await;

            let current = self.storage.get(id).await?;
            if !lifecycle::can_delete(current.status) {
                return Err(AlertError::InvalidState(
                    "Only resolved alerts can be deleted".to_string(),
                ));
            }

            self.storage.delete(id).await?;

            info!("Alert {} deleted", id);
            self.bus.publish(AlertEvent::Deleted(id.to_string()));
            Ok(())
        }
        .await;

        drop(lock);
        self.release_write_lock(id).await;
        result
    }

    /// All alerts, most recent first. The snapshot half of the catch-up
    /// protocol.
    pub async fn list_all(&self) -> Result<Vec<Alert>, AlertError> {
        self.storage.list().await
    }

    /// Fetch a single alert.
    pub async fn get(&self, id: &str) -> Result<Alert, AlertError> {
        self.storage.get(id).await
    }
}
