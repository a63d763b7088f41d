//! Allocator policy configuration.

use serde::{Deserialize, Serialize};

use super::SizeClass;

/// Policy constants for parcel classification, batch capacity and load
/// thresholds (`[allocator]` section).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AllocatorConfig {
    /// Parcels below this volume are `small`.
    #[serde(default = "default_small_limit")]
    pub small_volume_limit: f64,

    /// Parcels below this volume (and not small) are `medium`; the rest `large`.
    #[serde(default = "default_medium_limit")]
    pub medium_volume_limit: f64,

    /// Default capacity of a new small batch.
    #[serde(default = "default_small_capacity")]
    pub small_capacity: f64,

    /// Default capacity of a new medium batch.
    #[serde(default = "default_medium_capacity")]
    pub medium_capacity: f64,

    /// Default capacity of a new large batch.
    #[serde(default = "default_large_capacity")]
    pub large_capacity: f64,

    /// Load percentage at which a batch is marked full.
    #[serde(default = "default_full_threshold")]
    pub full_threshold_percent: f64,

    /// Dispatching below this load percentage yields a low-load warning.
    #[serde(default = "default_low_load")]
    pub low_load_percent: f64,

    /// How many generated names to try before giving up on a new batch.
    #[serde(default = "default_name_attempts")]
    pub max_name_attempts: u32,
}

fn default_small_limit() -> f64 {
    0.01
}

fn default_medium_limit() -> f64 {
    0.05
}

fn default_small_capacity() -> f64 {
    0.5
}

fn default_medium_capacity() -> f64 {
    2.0
}

fn default_large_capacity() -> f64 {
    5.0
}

fn default_full_threshold() -> f64 {
    90.0
}

fn default_low_load() -> f64 {
    70.0
}

fn default_name_attempts() -> u32 {
    16
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            small_volume_limit: default_small_limit(),
            medium_volume_limit: default_medium_limit(),
            small_capacity: default_small_capacity(),
            medium_capacity: default_medium_capacity(),
            large_capacity: default_large_capacity(),
            full_threshold_percent: default_full_threshold(),
            low_load_percent: default_low_load(),
            max_name_attempts: default_name_attempts(),
        }
    }
}

impl AllocatorConfig {
    /// Size class for a parcel of the given volume.
    pub fn classify(&self, volume: f64) -> SizeClass {
        if volume < self.small_volume_limit {
            SizeClass::Small
        } else if volume < self.medium_volume_limit {
            SizeClass::Medium
        } else {
            SizeClass::Large
        }
    }

    /// Capacity of a fresh batch of the given class.
    pub fn default_capacity(&self, class: SizeClass) -> f64 {
        match class {
            SizeClass::Small => self.small_capacity,
            SizeClass::Medium => self.medium_capacity,
            SizeClass::Large => self.large_capacity,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.small_volume_limit.is_finite() && self.small_volume_limit > 0.0) {
            return Err("allocator.small_volume_limit must be a positive number".to_string());
        }
        if !(self.medium_volume_limit.is_finite()
            && self.medium_volume_limit > self.small_volume_limit)
        {
            return Err(
                "allocator.medium_volume_limit must be greater than small_volume_limit"
                    .to_string(),
            );
        }
        for (name, capacity) in [
            ("small_capacity", self.small_capacity),
            ("medium_capacity", self.medium_capacity),
            ("large_capacity", self.large_capacity),
        ] {
            if !(capacity.is_finite() && capacity > 0.0) {
                return Err(format!("allocator.{} must be a positive number", name));
            }
        }
        for (name, percent) in [
            ("full_threshold_percent", self.full_threshold_percent),
            ("low_load_percent", self.low_load_percent),
        ] {
            if !(percent > 0.0 && percent <= 100.0) {
                return Err(format!("allocator.{} must be within (0, 100]", name));
            }
        }
        if self.max_name_attempts == 0 {
            return Err("allocator.max_name_attempts must be at least 1".to_string());
        }
        Ok(())
    }
}
