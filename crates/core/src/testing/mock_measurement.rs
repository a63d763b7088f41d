//! Mock measurement provider for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::measurement::{ImageUpload, Measurement, MeasurementError, MeasurementProvider};

/// A recorded measurement call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedMeasurement {
    pub file_name: String,
    pub content_type: Option<String>,
    pub size_bytes: usize,
}

/// Mock implementation of the MeasurementProvider trait.
///
/// Provides controllable behavior for testing:
/// - Queue measurements to return in order
/// - Fall back to a default measurement when the queue is empty
/// - Track uploads for assertions
/// - Simulate failures
///
/// # Example
///
/// ```rust,ignore
/// use parcelhub_core::testing::{fixtures, MockMeasurementProvider};
///
/// let provider = MockMeasurementProvider::new();
/// provider.push_measurement(fixtures::measurement("SPX001", 0.03)).await;
///
/// let m = provider.measure(&fixtures::image_upload("a.jpg")).await?;
/// assert_eq!(m.external_id, "SPX001");
/// assert_eq!(provider.call_count().await, 1);
/// ```
#[derive(Debug)]
pub struct MockMeasurementProvider {
    queued: Arc<RwLock<VecDeque<Measurement>>>,
    default_measurement: Arc<RwLock<Measurement>>,
    calls: Arc<RwLock<Vec<RecordedMeasurement>>>,
    /// If set, the next call will fail with this error.
    next_error: Arc<RwLock<Option<MeasurementError>>>,
}

impl Default for MockMeasurementProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMeasurementProvider {
    pub fn new() -> Self {
        Self {
            queued: Arc::new(RwLock::new(VecDeque::new())),
            default_measurement: Arc::new(RwLock::new(super::fixtures::measurement(
                "SPX0000000001",
                0.005,
            ))),
            calls: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Queue a measurement to be returned by the next call.
    pub async fn push_measurement(&self, measurement: Measurement) {
        self.queued.write().await.push_back(measurement);
    }

    /// Measurement returned once the queue is drained.
    pub async fn set_default_measurement(&self, measurement: Measurement) {
        *self.default_measurement.write().await = measurement;
    }

    /// Configure the next call to fail with the given error.
    pub async fn set_next_error(&self, error: MeasurementError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn recorded_calls(&self) -> Vec<RecordedMeasurement> {
        self.calls.read().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }
}

#[async_trait]
impl MeasurementProvider for MockMeasurementProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn measure(&self, image: &ImageUpload) -> Result<Measurement, MeasurementError> {
        self.calls.write().await.push(RecordedMeasurement {
            file_name: image.file_name.clone(),
            content_type: image.content_type.clone(),
            size_bytes: image.bytes.len(),
        });

        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }

        match self.queued.write().await.pop_front() {
            Some(measurement) => Ok(measurement),
            None => Ok(self.default_measurement.read().await.clone()),
        }
    }
}
