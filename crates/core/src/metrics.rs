//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Allocation (parcels routed, batches opened)
//! - Batch lifecycle transitions and capacity warnings
//! - Measurement backend calls

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// Allocation
// =============================================================================

/// Parcels allocated into batches, by size class.
pub static PARCELS_ALLOCATED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "parcelhub_parcels_allocated_total",
            "Total parcels allocated into batches",
        ),
        &["size_class"],
    )
    .unwrap()
});

/// Parcel volumes in cubic metres, by size class.
pub static PARCEL_VOLUME: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "parcelhub_parcel_volume_cubic_meters",
            "Distribution of allocated parcel volumes",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        &["size_class"],
    )
    .unwrap()
});

/// Batches created, by origin ("auto", "successor", "manual").
pub static BATCHES_CREATED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("parcelhub_batches_created_total", "Total batches created"),
        &["origin"],
    )
    .unwrap()
});

// =============================================================================
// Lifecycle
// =============================================================================

/// Batch status transitions.
pub static BATCH_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "parcelhub_batch_transitions_total",
            "Total batch status transitions",
        ),
        &["from", "to"],
    )
    .unwrap()
});

/// Capacity warnings returned to staff, by kind ("over_capacity", "low_load").
pub static CAPACITY_WARNINGS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "parcelhub_capacity_warnings_total",
            "Total capacity warnings raised",
        ),
        &["kind"],
    )
    .unwrap()
});

// =============================================================================
// Measurement
// =============================================================================

/// Measurement backend calls, by result ("success", "failure").
pub static MEASUREMENTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "parcelhub_measurements_total",
            "Total parcel measurement requests",
        ),
        &["result"],
    )
    .unwrap()
});

/// Measurement backend latency in seconds.
pub static MEASUREMENT_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "parcelhub_measurement_duration_seconds",
            "Duration of measurement backend calls",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["result"],
    )
    .unwrap()
});

/// All core metrics, for registration with the server's registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(PARCELS_ALLOCATED.clone()),
        Box::new(PARCEL_VOLUME.clone()),
        Box::new(BATCHES_CREATED.clone()),
        Box::new(BATCH_TRANSITIONS.clone()),
        Box::new(CAPACITY_WARNINGS.clone()),
        Box::new(MEASUREMENTS.clone()),
        Box::new(MEASUREMENT_DURATION.clone()),
    ]
}
