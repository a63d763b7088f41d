//! Parcel measurement from photos.
//!
//! A [`MeasurementProvider`] turns an uploaded parcel photo into an
//! identifier, dimensions, weight and volume. The result is only a draft:
//! staff review it and confirm it through the dispatcher, so a failed or
//! odd measurement never touches batches or vehicles.
//!
//! Identifiers that could not be read are reported with sentinel values
//! ([`OCR_NO_TEXT`], [`OCR_ID_NOT_FOUND`], [`OCR_ERROR`]) rather than errors.

mod config;
mod http;
mod parcel_id;

pub use config::{MeasurementBackend, MeasurementConfig};
pub use http::HttpMeasurementProvider;
pub use parcel_id::extract_parcel_id;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// No text at all was read from the label.
pub const OCR_NO_TEXT: &str = "OCR_No_Text";
/// Text was read but contained no parcel identifier.
pub const OCR_ID_NOT_FOUND: &str = "OCR_ID_Not_Found";
/// The analyzer failed to read the label.
pub const OCR_ERROR: &str = "Error";

/// Whether an external id is one of the "could not read" sentinels.
pub fn is_sentinel_id(external_id: &str) -> bool {
    matches!(external_id, OCR_NO_TEXT | OCR_ID_NOT_FOUND | OCR_ERROR)
}

/// An uploaded parcel photo.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    /// Stored file name, also sent as the multipart file name.
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Measurement draft returned to staff for confirmation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Measurement {
    /// Identifier read from the label, or a sentinel.
    pub external_id: String,
    pub dimensions: String,
    pub weight: f64,
    pub volume: f64,
}

#[derive(Debug, Error)]
pub enum MeasurementError {
    #[error("Measurement backend unreachable: {0}")]
    ConnectionFailed(String),

    #[error("Measurement backend timed out")]
    Timeout,

    #[error("Measurement backend error: {0}")]
    Backend(String),

    #[error("Invalid measurement response: {0}")]
    InvalidResponse(String),

    #[error("Measurement is not configured")]
    NotConfigured,
}

/// Measures parcels from photos.
#[async_trait]
pub trait MeasurementProvider: Send + Sync {
    /// Backend name, for logs and metrics.
    fn name(&self) -> &str;

    async fn measure(&self, image: &ImageUpload) -> Result<Measurement, MeasurementError>;
}

/// Build the configured measurement provider.
pub fn create_measurement_provider(
    config: &MeasurementConfig,
) -> Result<Arc<dyn MeasurementProvider>, MeasurementError> {
    match config.backend {
        MeasurementBackend::Http => Ok(Arc::new(HttpMeasurementProvider::new(config.clone())?)),
    }
}
