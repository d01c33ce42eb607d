//! SQLite storage layer for alert persistence.
//!
//! The store is a dumb persistence layer: it knows nothing about legal
//! status transitions or the resolved-only delete rule. Those checks happen
//! in the service before any call lands here.

use anyhow::Result;
use chrono::DateTime;
use sqlx::{sqlite::SqlitePool, Row};
use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::error::AlertError;
use crate::models::{Alert, AlertStatus, Location};

/// Storage manager for alert records.
#[derive(Clone)]
pub struct Storage {
    pool: Arc<SqlitePool>,
    op_timeout: Duration,
}

impl Storage {
    /// Open (or create) the database at the given path.
    pub async fn new(db_path: &Path, op_timeout: Duration) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
        let pool = SqlitePool::connect(&db_url).await?;

        Ok(Self {
            pool: Arc::new(pool),
            op_timeout,
        })
    }

    /// Initialize the database schema.
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS alerts (
                id TEXT PRIMARY KEY,
                user_name TEXT NOT NULL,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                accuracy REAL,
                message TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&*self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_alerts_status ON alerts(status)")
            .execute(&*self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_alerts_created_at ON alerts(created_at)")
            .execute(&*self.pool)
            .await?;

        Ok(())
    }

    /// Run a store operation with a bounded timeout, so a wedged database
    /// surfaces as `StoreUnavailable` instead of hanging the caller.
    async fn bounded<T, F>(&self, fut: F) -> Result<T, AlertError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(AlertError::StoreUnavailable(e.to_string())),
            Err(_) => Err(AlertError::StoreUnavailable(format!(
                "operation timed out after {:?}",
                self.op_timeout
            ))),
        }
    }

    /// Persist a new alert record.
    ///
    /// Coordinates are re-checked here so the store cannot be handed an
    /// alert outside valid geographic ranges.
    pub async fn create(&self, alert: &Alert) -> Result<(), AlertError> {
        alert.location.validate()?;

        self.bounded(
            sqlx::query(
                r#"
                INSERT INTO alerts (
                    id, user_name, latitude, longitude, accuracy,
                    message, status, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&alert.id)
            .bind(&alert.user_name)
            .bind(alert.location.latitude)
            .bind(alert.location.longitude)
            .bind(alert.location.accuracy)
            .bind(&alert.message)
            .bind(alert.status.to_string())
            .bind(alert.created_at.to_rfc3339())
            .execute(&*self.pool),
        )
        .await?;

        Ok(())
    }

    /// Fetch a single alert by id.
    pub async fn get(&self, id: &str) -> Result<Alert, AlertError> {
        let row = self
            .bounded(
                sqlx::query("SELECT * FROM alerts WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&*self.pool),
            )
            .await?;

        match row {
            Some(row) => row_to_alert(&row),
            None => Err(AlertError::NotFound),
        }
    }

    /// List all alerts, most recent first. The ordering is a user-facing
    /// contract; rowid breaks ties between identical timestamps.
    pub async fn list(&self) -> Result<Vec<Alert>, AlertError> {
        let rows = self
            .bounded(
                sqlx::query("SELECT * FROM alerts ORDER BY created_at DESC, rowid DESC")
                    .fetch_all(&*self.pool),
            )
            .await?;

        rows.iter().map(row_to_alert).collect()
    }

    /// Overwrite an alert's status. Performs no transition check.
    pub async fn update_status(
        &self,
        id: &str,
        status: AlertStatus,
    ) -> Result<Alert, AlertError> {
        let result = self
            .bounded(
                sqlx::query("UPDATE alerts SET status = ? WHERE id = ?")
                    .bind(status.to_string())
                    .bind(id)
                    .execute(&*self.pool),
            )
            .await?;

        if result.rows_affected() == 0 {
            return Err(AlertError::NotFound);
        }

        self.get(id).await
    }

    /// Close the underlying pool so subsequent operations fail.
    #[cfg(test)]
    pub(crate) async fn close(&self) {
        self.pool.close().await;
    }

    /// Remove an alert record.
    pub async fn delete(&self, id: &str) -> Result<(), AlertError> {
        let result = self
            .bounded(
                sqlx::query("DELETE FROM alerts WHERE id = ?")
                    .bind(id)
                    .execute(&*self.pool),
            )
            .await?;

        if result.rows_affected() == 0 {
            return Err(AlertError::NotFound);
        }

        Ok(())
    }
}

fn row_to_alert(row: &sqlx::sqlite::SqliteRow) -> Result<Alert, AlertError> {
    let status_str: String = row.get("status");
    let status = AlertStatus::from_str(&status_str)
        .map_err(|_| AlertError::StoreUnavailable(format!("corrupt status '{status_str}'")))?;

    let created_at_str: String = row.get("created_at");
    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map_err(|e| AlertError::StoreUnavailable(format!("corrupt timestamp: {e}")))?
        .with_timezone(&chrono::Utc);

    Ok(Alert {
        id: row.get("id"),
        user_name: row.get("user_name"),
        location: Location {
            latitude: row.get("latitude"),
            longitude: row.get("longitude"),
            accuracy: row.get("accuracy"),
        },
        message: row.get("message"),
        status,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    async fn test_storage() -> (Storage, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(&dir.path().join("alerts.db"), Duration::from_secs(5))
            .await
            .unwrap();
        storage.initialize().await.unwrap();
        (storage, dir)
    }

    fn sample_alert(lat: f64, lng: f64) -> Alert {
        Alert::new(
            Some("Test User".to_string()),
            Location {
                latitude: lat,
                longitude: lng,
                accuracy: Some(12.5),
            },
            Some("stuck on the trail".to_string()),
        )
    }

    #[tokio::test]
    async fn test_create_and_get_roundtrip() {
        let (storage, _dir) = test_storage().await;
        let alert = sample_alert(40.0, -74.0);

        storage.create(&alert).await.unwrap();
        let fetched = storage.get(&alert.id).await.unwrap();

        assert_eq!(fetched.id, alert.id);
        assert_eq!(fetched.user_name, "Test User");
        assert_eq!(fetched.location.latitude, 40.0);
        assert_eq!(fetched.location.accuracy, Some(12.5));
        assert_eq!(fetched.status, AlertStatus::Active);
        assert_eq!(fetched.created_at, alert.created_at);
    }

    #[tokio::test]
    async fn test_create_rejects_out_of_range_coordinates() {
        let (storage, _dir) = test_storage().await;
        let alert = sample_alert(95.0, 10.0);

        let err = storage.create(&alert).await.unwrap_err();
        assert!(matches!(err, AlertError::Validation(_)));
        assert!(storage.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_unknown_id() {
        let (storage, _dir) = test_storage().await;
        let err = storage.get("no-such-id").await.unwrap_err();
        assert!(matches!(err, AlertError::NotFound));
    }

    #[tokio::test]
    async fn test_list_newest_first_regardless_of_insertion_order() {
        let (storage, _dir) = test_storage().await;

        // Insert out of chronological order.
        let mut middle = sample_alert(1.0, 1.0);
        middle.created_at = Utc.with_ymd_and_hms(2024, 6, 2, 12, 0, 0).unwrap();
        let mut oldest = sample_alert(2.0, 2.0);
        oldest.created_at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let mut newest = sample_alert(3.0, 3.0);
        newest.created_at = Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap();

        storage.create(&middle).await.unwrap();
        storage.create(&oldest).await.unwrap();
        storage.create(&newest).await.unwrap();

        let listed = storage.list().await.unwrap();
        let ids: Vec<_> = listed.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec![&newest.id, &middle.id, &oldest.id]);
    }

    #[tokio::test]
    async fn test_update_status_persists() {
        let (storage, _dir) = test_storage().await;
        let alert = sample_alert(40.0, -74.0);
        storage.create(&alert).await.unwrap();

        let updated = storage
            .update_status(&alert.id, AlertStatus::Acknowledged)
            .await
            .unwrap();
        assert_eq!(updated.status, AlertStatus::Acknowledged);
        // created_at unchanged by a status write
        assert_eq!(updated.created_at, alert.created_at);

        let fetched = storage.get(&alert.id).await.unwrap();
        assert_eq!(fetched.status, AlertStatus::Acknowledged);
    }

    #[tokio::test]
    async fn test_update_status_unknown_id() {
        let (storage, _dir) = test_storage().await;
        let err = storage
            .update_status("missing", AlertStatus::Resolved)
            .await
            .unwrap_err();
        assert!(matches!(err, AlertError::NotFound));
    }

    #[tokio::test]
    async fn test_bounded_maps_timeout_to_store_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(&dir.path().join("alerts.db"), Duration::from_millis(10))
            .await
            .unwrap();

        let err = storage
            .bounded(std::future::pending::<Result<(), sqlx::Error>>())
            .await
            .unwrap_err();
        assert!(matches!(err, AlertError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_bounded_maps_database_errors_to_store_unavailable() {
        let (storage, _dir) = test_storage().await;

        let err = storage
            .bounded(std::future::ready(Err::<(), sqlx::Error>(
                sqlx::Error::PoolClosed,
            )))
            .await
            .unwrap_err();
        assert!(matches!(err, AlertError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_operations_on_closed_pool_fail_with_store_unavailable() {
        let (storage, _dir) = test_storage().await;
        let alert = sample_alert(1.0, 1.0);
        storage.create(&alert).await.unwrap();

        storage.close().await;

        assert!(matches!(
            storage.get(&alert.id).await,
            Err(AlertError::StoreUnavailable(_))
        ));
        assert!(matches!(
            storage.list().await,
            Err(AlertError::StoreUnavailable(_))
        ));
        assert!(matches!(
            storage.create(&sample_alert(2.0, 2.0)).await,
            Err(AlertError::StoreUnavailable(_))
        ));
        assert!(matches!(
            storage.update_status(&alert.id, AlertStatus::Resolved).await,
            Err(AlertError::StoreUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_removes_record() {
        let (storage, _dir) = test_storage().await;
        let alert = sample_alert(40.0, -74.0);
        storage.create(&alert).await.unwrap();

        storage.delete(&alert.id).await.unwrap();
        assert!(matches!(
            storage.get(&alert.id).await,
            Err(AlertError::NotFound)
        ));
        assert!(matches!(
            storage.delete(&alert.id).await,
            Err(AlertError::NotFound)
        ));
    }
}
