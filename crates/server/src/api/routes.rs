use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{services::ServeDir, trace::TraceLayer};

use super::middleware::{auth_middleware, metrics_middleware};
use super::{analysis, audit, batches, driver, handlers, parcels, vehicles};
use crate::state::AppState;

/// Multipart framing allowance on top of the configured image size.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.uploads().max_bytes + MULTIPART_OVERHEAD;
    let uploads_dir = state.uploads().dir.clone();

    // Authenticated API routes
    let protected_routes = Router::new()
        .route("/config", get(handlers::get_config))
        .route("/audit", get(audit::query_audit))
        // Parcels
        .route(
            "/parcels/measure",
            post(parcels::measure_parcel).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/parcels",
            get(parcels::list_parcels).post(parcels::confirm_parcel),
        )
        .route("/parcels/bulk-delete", post(parcels::bulk_delete_parcels))
        .route(
            "/parcels/{id}",
            get(parcels::get_parcel).delete(parcels::delete_parcel),
        )
        // Batches
        .route(
            "/batches",
            get(batches::list_batches).post(batches::create_batch),
        )
        .route("/batches/bulk-finalize", post(batches::bulk_finalize))
        .route("/batches/bulk-delete", post(batches::bulk_delete))
        .route(
            "/batches/{id}",
            get(batches::get_batch).patch(batches::edit_batch),
        )
        .route("/batches/{id}/parcels", get(batches::list_batch_parcels))
        .route("/batches/{id}/assign", post(batches::assign_vehicle))
        .route("/batches/{id}/dispatch", post(batches::dispatch_batch))
        .route("/batches/{id}/finalize", post(batches::finalize_batch))
        // Vehicles
        .route(
            "/vehicles",
            get(vehicles::list_vehicles).post(vehicles::create_vehicle),
        )
        .route(
            "/vehicles/{id}",
            get(vehicles::get_vehicle)
                .put(vehicles::update_vehicle)
                .delete(vehicles::delete_vehicle),
        )
        // Driver missions
        .route("/driver/missions", get(driver::list_missions))
        .route("/driver/missions/{id}/start", post(driver::start_mission))
        .route("/driver/missions/{id}/complete", post(driver::complete_mission))
        // Analysis
        .route("/analysis", get(analysis::get_stats))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .nest_service("/uploads", ServeDir::new(uploads_dir))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}
