//! Vehicle registry API handlers (administrators only).

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use parcelhub_core::{DispatchError, Vehicle, VehicleFilter, VehicleSpec};

use super::error::{dispatch_error, ApiResult};
use super::middleware::AuthUser;
use crate::state::AppState;

/// Maximum allowed limit for vehicle queries
const MAX_LIMIT: i64 = 1000;

#[derive(Debug, Deserialize)]
pub struct ListVehiclesParams {
    /// Substring match on uid, plate, type or driver
    pub search: Option<String>,
    pub driver: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListVehiclesResponse {
    pub vehicles: Vec<Vehicle>,
}

pub async fn list_vehicles(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Query(params): Query<ListVehiclesParams>,
) -> ApiResult<Json<ListVehiclesResponse>> {
    state
        .dispatcher()
        .admin(&identity)
        .map_err(dispatch_error)?;

    let limit = params.limit.unwrap_or(MAX_LIMIT).clamp(1, MAX_LIMIT);
    let mut filter = VehicleFilter::new().with_limit(limit);
    if let Some(search) = params.search.filter(|s| !s.trim().is_empty()) {
        filter = filter.with_search(search.trim());
    }
    if let Some(driver) = params.driver {
        filter = filter.with_driver(driver);
    }

    let vehicles = state
        .dispatcher()
        .store()
        .list_vehicles(&filter)
        .map_err(dispatch_error)?;
    Ok(Json(ListVehiclesResponse { vehicles }))
}

pub async fn create_vehicle(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Json(spec): Json<VehicleSpec>,
) -> ApiResult<(StatusCode, Json<Vehicle>)> {
    let vehicle = state
        .dispatcher()
        .admin(&identity)
        .and_then(|ops| ops.create_vehicle(spec))
        .map_err(dispatch_error)?;
    Ok((StatusCode::CREATED, Json(vehicle)))
}

pub async fn get_vehicle(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vehicle>> {
    state
        .dispatcher()
        .admin(&identity)
        .and_then(|_| state.dispatcher().store().get_vehicle(id))
        .and_then(|v| v.ok_or_else(|| DispatchError::vehicle_not_found(id)))
        .map(Json)
        .map_err(dispatch_error)
}

/// Replace a vehicle's details and status
pub async fn update_vehicle(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Path(id): Path<i64>,
    Json(spec): Json<VehicleSpec>,
) -> ApiResult<Json<Vehicle>> {
    state
        .dispatcher()
        .admin(&identity)
        .and_then(|ops| ops.update_vehicle(id, spec))
        .map(Json)
        .map_err(dispatch_error)
}

pub async fn delete_vehicle(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vehicle>> {
    state
        .dispatcher()
        .admin(&identity)
        .and_then(|ops| ops.delete_vehicle(id))
        .map(Json)
        .map_err(dispatch_error)
}
