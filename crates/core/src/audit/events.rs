use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audit event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    // System events
    ServiceStarted {
        version: String,
        config_hash: String,
    },
    ServiceStopped {
        reason: String,
    },

    // Parcel intake
    /// An uploaded image was measured (not yet stored as a parcel).
    ParcelMeasured {
        user_id: String,
        image_name: String,
        external_id: String,
        volume: f64,
    },
    /// A confirmed parcel was allocated into a batch.
    ParcelConfirmed {
        parcel_id: i64,
        batch_id: i64,
        user_id: String,
        external_id: String,
        volume: f64,
        size_class: String,
    },
    ParcelDeleted {
        parcel_id: i64,
        batch_id: i64,
        user_id: String,
        volume: f64,
    },

    // Batch lifecycle
    BatchCreated {
        batch_id: i64,
        name: String,
        size_class: String,
        max_volume: f64,
        /// `auto`, `successor` or `manual`.
        origin: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },
    /// The batch crossed its full threshold.
    BatchFull {
        batch_id: i64,
        current_volume: f64,
        max_volume: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        successor_batch_id: Option<i64>,
    },
    VehicleAssigned {
        batch_id: i64,
        vehicle_id: i64,
        user_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        released_vehicle_id: Option<i64>,
        /// The vehicle is smaller than the current load.
        over_capacity: bool,
    },
    VehicleReleased {
        batch_id: i64,
        vehicle_id: i64,
        user_id: String,
    },
    BatchEdited {
        batch_id: i64,
        user_id: String,
        name: String,
        max_volume: f64,
    },
    BatchDispatched {
        batch_id: i64,
        user_id: String,
        load_percent: f64,
        low_load: bool,
    },
    MissionStarted {
        batch_id: i64,
        vehicle_id: i64,
        driver: String,
    },
    MissionCompleted {
        batch_id: i64,
        vehicle_id: i64,
        driver: String,
    },
    /// Admin closed the batch directly.
    BatchFinalized {
        batch_id: i64,
        user_id: String,
        previous_status: String,
    },
    BatchDeleted {
        batch_id: i64,
        user_id: String,
        previous_status: String,
        parcels_removed: usize,
    },

    // Vehicle registry
    VehicleCreated {
        vehicle_id: i64,
        user_id: String,
        vehicle_uid: String,
        plate_number: String,
    },
    VehicleUpdated {
        vehicle_id: i64,
        user_id: String,
        status: String,
    },
    VehicleDeleted {
        vehicle_id: i64,
        user_id: String,
        plate_number: String,
    },
}

impl AuditEvent {
    /// Returns the event type as a string for storage
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ServiceStarted { .. } => "service_started",
            Self::ServiceStopped { .. } => "service_stopped",
            Self::ParcelMeasured { .. } => "parcel_measured",
            Self::ParcelConfirmed { .. } => "parcel_confirmed",
            Self::ParcelDeleted { .. } => "parcel_deleted",
            Self::BatchCreated { .. } => "batch_created",
            Self::BatchFull { .. } => "batch_full",
            Self::VehicleAssigned { .. } => "vehicle_assigned",
            Self::VehicleReleased { .. } => "vehicle_released",
            Self::BatchEdited { .. } => "batch_edited",
            Self::BatchDispatched { .. } => "batch_dispatched",
            Self::MissionStarted { .. } => "mission_started",
            Self::MissionCompleted { .. } => "mission_completed",
            Self::BatchFinalized { .. } => "batch_finalized",
            Self::BatchDeleted { .. } => "batch_deleted",
            Self::VehicleCreated { .. } => "vehicle_created",
            Self::VehicleUpdated { .. } => "vehicle_updated",
            Self::VehicleDeleted { .. } => "vehicle_deleted",
        }
    }

    /// The batch this event concerns, if any
    pub fn batch_id(&self) -> Option<i64> {
        match self {
            Self::ParcelConfirmed { batch_id, .. }
            | Self::ParcelDeleted { batch_id, .. }
            | Self::BatchCreated { batch_id, .. }
            | Self::BatchFull { batch_id, .. }
            | Self::VehicleAssigned { batch_id, .. }
            | Self::VehicleReleased { batch_id, .. }
            | Self::BatchEdited { batch_id, .. }
            | Self::BatchDispatched { batch_id, .. }
            | Self::MissionStarted { batch_id, .. }
            | Self::MissionCompleted { batch_id, .. }
            | Self::BatchFinalized { batch_id, .. }
            | Self::BatchDeleted { batch_id, .. } => Some(*batch_id),
            _ => None,
        }
    }

    /// The user who triggered this event, if any
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::ParcelMeasured { user_id, .. }
            | Self::ParcelConfirmed { user_id, .. }
            | Self::ParcelDeleted { user_id, .. }
            | Self::VehicleAssigned { user_id, .. }
            | Self::VehicleReleased { user_id, .. }
            | Self::BatchEdited { user_id, .. }
            | Self::BatchDispatched { user_id, .. }
            | Self::BatchFinalized { user_id, .. }
            | Self::BatchDeleted { user_id, .. }
            | Self::VehicleCreated { user_id, .. }
            | Self::VehicleUpdated { user_id, .. }
            | Self::VehicleDeleted { user_id, .. } => Some(user_id),
            Self::BatchCreated { user_id, .. } => user_id.as_deref(),
            Self::MissionStarted { driver, .. } | Self::MissionCompleted { driver, .. } => {
                Some(driver)
            }
            _ => None,
        }
    }
}

/// A stored audit record with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub batch_id: Option<i64>,
    pub user_id: Option<String>,
    pub data: AuditEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_events_have_no_batch_or_user() {
        let event = AuditEvent::ServiceStarted {
            version: "0.1.0".to_string(),
            config_hash: "abc123".to_string(),
        };
        assert_eq!(event.event_type(), "service_started");
        assert_eq!(event.batch_id(), None);
        assert_eq!(event.user_id(), None);
    }

    #[test]
    fn test_parcel_confirmed() {
        let event = AuditEvent::ParcelConfirmed {
            parcel_id: 10,
            batch_id: 3,
            user_id: "admin".to_string(),
            external_id: "SPX123".to_string(),
            volume: 0.02,
            size_class: "medium".to_string(),
        };
        assert_eq!(event.event_type(), "parcel_confirmed");
        assert_eq!(event.batch_id(), Some(3));
        assert_eq!(event.user_id(), Some("admin"));
    }

    #[test]
    fn test_auto_batch_has_no_user() {
        let event = AuditEvent::BatchCreated {
            batch_id: 4,
            name: "Auto-101500 (small)".to_string(),
            size_class: "small".to_string(),
            max_volume: 0.5,
            origin: "auto".to_string(),
            user_id: None,
        };
        assert_eq!(event.batch_id(), Some(4));
        assert_eq!(event.user_id(), None);

        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("user_id"));
    }

    #[test]
    fn test_mission_events_attribute_driver() {
        let event = AuditEvent::MissionStarted {
            batch_id: 9,
            vehicle_id: 2,
            driver: "bob".to_string(),
        };
        assert_eq!(event.event_type(), "mission_started");
        assert_eq!(event.user_id(), Some("bob"));
        assert_eq!(event.batch_id(), Some(9));
    }

    #[test]
    fn test_vehicle_events_have_no_batch() {
        let event = AuditEvent::VehicleDeleted {
            vehicle_id: 2,
            user_id: "admin".to_string(),
            plate_number: "AB-1".to_string(),
        };
        assert_eq!(event.batch_id(), None);
        assert_eq!(event.user_id(), Some("admin"));
    }

    #[test]
    fn test_serialize_deserialize_batch_dispatched() {
        let event = AuditEvent::BatchDispatched {
            batch_id: 5,
            user_id: "admin".to_string(),
            load_percent: 42.5,
            low_load: true,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"batch_dispatched\""));

        let deserialized: AuditEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.event_type(), "batch_dispatched");
        assert_eq!(deserialized.batch_id(), Some(5));
    }

    #[test]
    fn test_audit_record_serialize() {
        let record = AuditRecord {
            id: 1,
            timestamp: Utc::now(),
            event_type: "batch_full".to_string(),
            batch_id: Some(2),
            user_id: None,
            data: AuditEvent::BatchFull {
                batch_id: 2,
                current_volume: 0.46,
                max_volume: 0.5,
                successor_batch_id: Some(3),
            },
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"id\":1"));
        assert!(json.contains("\"event_type\":\"batch_full\""));
        assert!(json.contains("\"successor_batch_id\":3"));
    }
}
