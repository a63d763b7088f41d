//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the parcelhub server:
//! - HTTP request metrics (latency, counts, errors)
//! - Authentication failures and image uploads
//! - Batch, vehicle and parcel counts (collected on scrape)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use regex_lite::Regex;

use parcelhub_core::{BatchFilter, BatchStatus, VehicleFilter, VehicleStatus};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "parcelhub_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("parcelhub_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "parcelhub_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

/// Authentication failures.
pub static AUTH_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "parcelhub_auth_failures_total",
            "Total authentication failures",
        ),
        &["reason"],
    )
    .unwrap()
});

/// Parcel photo uploads, by result ("stored", "rejected").
pub static UPLOADS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("parcelhub_uploads_total", "Total parcel photo uploads"),
        &["result"],
    )
    .unwrap()
});

// =============================================================================
// Dispatch State (collected dynamically)
// =============================================================================

/// Batches by current status.
pub static BATCHES_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("parcelhub_batches_by_status", "Current batch count by status"),
        &["status"],
    )
    .unwrap()
});

/// Vehicles by current status.
pub static VEHICLES_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "parcelhub_vehicles_by_status",
            "Current vehicle count by status",
        ),
        &["status"],
    )
    .unwrap()
});

/// Parcels stored.
pub static PARCELS_STORED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("parcelhub_parcels_stored", "Number of stored parcels").unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();
    registry
        .register(Box::new(AUTH_FAILURES_TOTAL.clone()))
        .unwrap();
    registry.register(Box::new(UPLOADS_TOTAL.clone())).unwrap();

    // Dispatch state
    registry
        .register(Box::new(BATCHES_BY_STATUS.clone()))
        .unwrap();
    registry
        .register(Box::new(VEHICLES_BY_STATUS.clone()))
        .unwrap();
    registry.register(Box::new(PARCELS_STORED.clone())).unwrap();

    // Core metrics (allocation, lifecycle, measurement)
    for metric in parcelhub_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Refresh the state gauges from the dispatch store.
///
/// Called before encoding so a scrape always reflects the current database.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let store = state.dispatcher().store();

    for status in BatchStatus::ALL {
        if let Ok(count) = store.count_batches(&BatchFilter::new().with_status(status)) {
            BATCHES_BY_STATUS
                .with_label_values(&[status.as_str()])
                .set(count);
        }
    }

    if let Ok(vehicles) = store.list_vehicles(&VehicleFilter::new().with_limit(i64::MAX)) {
        for status in [
            VehicleStatus::Available,
            VehicleStatus::Reserved,
            VehicleStatus::Transporting,
        ] {
            let count = vehicles.iter().filter(|v| v.status == status).count();
            VEHICLES_BY_STATUS
                .with_label_values(&[status.as_str()])
                .set(count as i64);
        }
    }

    if let Ok(stats) = store.stats() {
        PARCELS_STORED.set(stats.parcels_total);
    }
}

static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .unwrap()
});
static NUMERIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\d+(/|$)").unwrap());

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let result = UUID_RE.replace_all(path, "{id}");
    // Run twice: adjacent numeric segments share the separating slash.
    let result = NUMERIC_RE.replace_all(&result, "/{id}$1");
    let result = NUMERIC_RE.replace_all(&result, "/{id}$1");
    result.to_string()
}
