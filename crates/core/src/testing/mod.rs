//! Testing utilities and mock implementations.
//!
//! The dispatch store runs fine in memory, so the only external service
//! that needs a stand-in is the measurement backend.
//!
//! # Example
//!
//! ```rust,ignore
//! use parcelhub_core::testing::{fixtures, MockMeasurementProvider};
//!
//! let provider = MockMeasurementProvider::new();
//! provider.push_measurement(fixtures::measurement("SPX42", 0.02)).await;
//!
//! // Use in AppState...
//! ```

mod mock_measurement;

pub use mock_measurement::{MockMeasurementProvider, RecordedMeasurement};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::dispatch::{ConfirmParcelRequest, VehicleSpec, VehicleStatus};
    use crate::measurement::{ImageUpload, Measurement};

    /// A measurement with weight estimated at 30 per volume unit.
    pub fn measurement(external_id: &str, volume: f64) -> Measurement {
        Measurement {
            external_id: external_id.to_string(),
            dimensions: "30*20*10cm".to_string(),
            weight: (volume * 3000.0).round() / 100.0,
            volume,
        }
    }

    /// A tiny JPEG-looking upload.
    pub fn image_upload(file_name: &str) -> ImageUpload {
        ImageUpload {
            file_name: file_name.to_string(),
            content_type: Some("image/jpeg".to_string()),
            bytes: vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10],
        }
    }

    /// A confirmation request for a parcel of the given volume.
    pub fn confirm_request(external_id: &str, volume: f64) -> ConfirmParcelRequest {
        ConfirmParcelRequest {
            external_id: external_id.to_string(),
            dimensions: "30*20*10cm".to_string(),
            weight: (volume * 3000.0).round() / 100.0,
            volume,
            delivery_address: "12 Dock Road".to_string(),
            image_name: None,
            created_by: String::new(),
        }
    }

    /// An available van driven by `driver`.
    pub fn vehicle_spec(uid: &str, driver: &str, capacity: f64) -> VehicleSpec {
        VehicleSpec {
            vehicle_uid: uid.to_string(),
            vehicle_type: "van".to_string(),
            plate_number: format!("PL-{}", uid),
            driver_name: Some(driver.to_string()),
            color: Some("white".to_string()),
            capacity,
            status: VehicleStatus::Available,
        }
    }
}
