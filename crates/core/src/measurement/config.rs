//! Measurement backend configuration.

use serde::{Deserialize, Serialize};

/// Which measurement backend to use.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementBackend {
    /// Remote analyzer service reached over HTTP.
    Http,
}

/// Configuration for the measurement backend (`[measurement]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementConfig {
    pub backend: MeasurementBackend,
    /// Analyzer endpoint receiving the multipart upload.
    pub url: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    /// Weight estimate per volume unit, used when the analyzer reports no weight.
    #[serde(default = "default_weight_per_volume")]
    pub weight_per_volume: f64,
}

fn default_timeout() -> u32 {
    60
}

fn default_weight_per_volume() -> f64 {
    30.0
}
