//! Data models for SOS alerts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AlertError;

/// Default name recorded when a submission carries no user name.
pub const DEFAULT_USER_NAME: &str = "Anonymous User";

/// Default message recorded when a submission carries no message.
pub const DEFAULT_MESSAGE: &str = "Emergency! Need assistance!";

/// Triage status of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertStatus::Active => write!(f, "active"),
            AlertStatus::Acknowledged => write!(f, "acknowledged"),
            AlertStatus::Resolved => write!(f, "resolved"),
        }
    }
}

impl std::str::FromStr for AlertStatus {
    type Err = AlertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AlertStatus::Active),
            "acknowledged" => Ok(AlertStatus::Acknowledged),
            "resolved" => Ok(AlertStatus::Resolved),
            _ => Err(AlertError::Validation("Invalid status value".to_string())),
        }
    }
}

/// Geographic position reported with an alert.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

impl Location {
    /// Reject coordinates outside valid geographic ranges.
    pub fn validate(&self) -> Result<(), AlertError> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(AlertError::Validation(format!(
                "Latitude {} out of range (-90..90)",
                self.latitude
            )));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(AlertError::Validation(format!(
                "Longitude {} out of range (-180..180)",
                self.longitude
            )));
        }
        Ok(())
    }
}

/// An SOS alert as persisted and pushed to viewers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub user_name: String,
    pub location: Location,
    pub message: String,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    /// Build a new alert from a submission, assigning id and timestamp
    /// and filling in the default name and message.
    pub fn new(user_name: Option<String>, location: Location, message: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_name: user_name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_USER_NAME.to_string()),
            location,
            message: message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_MESSAGE.to_string()),
            status: AlertStatus::Active,
            created_at: Utc::now(),
        }
    }
}

/// Incoming alert submission. Coordinates are optional here so a missing
/// field surfaces as a validation error rather than a deserialization error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAlert {
    pub user_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub accuracy: Option<f64>,
    pub message: Option<String>,
}

/// Lifecycle event broadcast to every connected viewer session.
#[derive(Debug, Clone)]
pub enum AlertEvent {
    Created(Alert),
    Updated(Alert),
    Deleted(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_alert_defaults() {
        let location = Location {
            latitude: 40.0,
            longitude: -74.0,
            accuracy: None,
        };
        let alert = Alert::new(None, location, None);

        assert_eq!(alert.user_name, DEFAULT_USER_NAME);
        assert_eq!(alert.message, DEFAULT_MESSAGE);
        assert_eq!(alert.status, AlertStatus::Active);
        assert!(uuid::Uuid::parse_str(&alert.id).is_ok());
    }

    #[test]
    fn test_blank_name_gets_default() {
        let location = Location {
            latitude: 0.0,
            longitude: 0.0,
            accuracy: None,
        };
        let alert = Alert::new(Some("   ".to_string()), location, Some("help".to_string()));
        assert_eq!(alert.user_name, DEFAULT_USER_NAME);
        assert_eq!(alert.message, "help");
    }

    #[test]
    fn test_location_validation() {
        let ok = Location {
            latitude: 89.9,
            longitude: -179.9,
            accuracy: Some(5.0),
        };
        assert!(ok.validate().is_ok());

        let bad_lat = Location {
            latitude: 91.0,
            longitude: 0.0,
            accuracy: None,
        };
        assert!(bad_lat.validate().is_err());

        let bad_lng = Location {
            latitude: 0.0,
            longitude: -180.5,
            accuracy: None,
        };
        assert!(bad_lng.validate().is_err());
    }

    #[test]
    fn test_wire_field_names() {
        let alert = Alert::new(
            None,
            Location {
                latitude: 1.0,
                longitude: 2.0,
                accuracy: None,
            },
            None,
        );
        let json = serde_json::to_value(&alert).unwrap();

        assert!(json.get("userName").is_some());
        assert!(json.get("createdAt").is_some());
        assert_eq!(json["status"], "active");
        assert_eq!(json["location"]["latitude"], 1.0);
        // accuracy omitted when absent
        assert!(json["location"].get("accuracy").is_none());
    }
}
