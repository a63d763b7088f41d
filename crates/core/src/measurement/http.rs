//! Measurement through a remote analyzer service.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{multipart, Client};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{
    extract_parcel_id, ImageUpload, Measurement, MeasurementConfig, MeasurementError,
    MeasurementProvider,
};
use crate::metrics;

/// Posts parcel photos to an analyzer endpoint as multipart `image`.
pub struct HttpMeasurementProvider {
    client: Client,
    config: MeasurementConfig,
}

/// Analyzer response body. Only `volume` is required.
#[derive(Debug, Deserialize)]
struct AnalyzerResponse {
    #[serde(default)]
    external_id: Option<String>,
    #[serde(default)]
    ocr_text: Option<String>,
    #[serde(default)]
    dimensions: Option<String>,
    #[serde(default)]
    weight: Option<f64>,
    volume: f64,
}

impl HttpMeasurementProvider {
    pub fn new(config: MeasurementConfig) -> Result<Self, MeasurementError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| MeasurementError::Backend(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn build_measurement(&self, response: AnalyzerResponse) -> Result<Measurement, MeasurementError> {
        if !response.volume.is_finite() || response.volume < 0.0 {
            return Err(MeasurementError::InvalidResponse(format!(
                "volume must be a non-negative number, got {}",
                response.volume
            )));
        }

        let external_id = match response.external_id {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => extract_parcel_id(response.ocr_text.as_deref().unwrap_or_default()),
        };
        let weight = match response.weight {
            Some(w) if w.is_finite() && w >= 0.0 => w,
            _ => estimate_weight(response.volume, self.config.weight_per_volume),
        };
        let dimensions = response
            .dimensions
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| "unknown".to_string());

        Ok(Measurement {
            external_id,
            dimensions,
            weight,
            volume: response.volume,
        })
    }

    async fn post_image(&self, image: &ImageUpload) -> Result<AnalyzerResponse, MeasurementError> {
        let mut part = multipart::Part::bytes(image.bytes.clone()).file_name(image.file_name.clone());
        if let Some(ref content_type) = image.content_type {
            part = part
                .mime_str(content_type)
                .map_err(|e| MeasurementError::Backend(e.to_string()))?;
        }
        let form = multipart::Form::new().part("image", part);

        let response = self
            .client
            .post(&self.config.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MeasurementError::Timeout
                } else if e.is_connect() {
                    MeasurementError::ConnectionFailed(e.to_string())
                } else {
                    MeasurementError::Backend(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MeasurementError::Backend(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        response
            .json::<AnalyzerResponse>()
            .await
            .map_err(|e| MeasurementError::InvalidResponse(e.to_string()))
    }
}

/// Weight estimate from volume, rounded to two decimals.
pub(crate) fn estimate_weight(volume: f64, weight_per_volume: f64) -> f64 {
    (volume * weight_per_volume * 100.0).round() / 100.0
}

#[async_trait]
impl MeasurementProvider for HttpMeasurementProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn measure(&self, image: &ImageUpload) -> Result<Measurement, MeasurementError> {
        let start = Instant::now();
        let result = self
            .post_image(image)
            .await
            .and_then(|response| self.build_measurement(response));

        let label = if result.is_ok() { "success" } else { "failure" };
        metrics::MEASUREMENTS.with_label_values(&[label]).inc();
        metrics::MEASUREMENT_DURATION
            .with_label_values(&[label])
            .observe(start.elapsed().as_secs_f64());

        match result {
            Ok(ref m) => debug!(
                file = %image.file_name,
                external_id = %m.external_id,
                volume = m.volume,
                "Parcel measured"
            ),
            Err(ref e) => warn!(file = %image.file_name, error = %e, "Measurement failed"),
        }
        result
    }
}
