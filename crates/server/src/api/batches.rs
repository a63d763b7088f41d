//! Batch API handlers.
//!
//! Reads go straight to the dispatch store; every mutation goes through
//! [`parcelhub_core::AdminOps`] so it is role-checked, audited and counted.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use parcelhub_core::dispatch::DeletedBatch;
use parcelhub_core::{
    Batch, BatchChange, BatchFilter, BatchStatus, CreateBatchRequest, DispatchError,
    EditBatchRequest, Parcel, ParcelFilter, SizeClass, Vehicle, VehicleChange,
};

use super::error::{bad_request, dispatch_error, ApiResult};
use super::middleware::AuthUser;
use super::parcels::BulkIdsBody;
use crate::state::AppState;

/// Maximum allowed limit for batch queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for batch queries
const DEFAULT_LIMIT: i64 = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for listing batches
#[derive(Debug, Deserialize)]
pub struct ListBatchesParams {
    /// Substring match on batch name
    pub search: Option<String>,
    /// Comma separated statuses, e.g. `full,ready`
    pub status: Option<String>,
    pub size_class: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListBatchesResponse {
    pub batches: Vec<BatchSummary>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// A batch together with its load.
#[derive(Debug, Serialize)]
pub struct BatchSummary {
    #[serde(flatten)]
    pub batch: Batch,
    pub load_percent: f64,
}

impl From<Batch> for BatchSummary {
    fn from(batch: Batch) -> Self {
        Self {
            load_percent: round2(batch.load_percent()),
            batch,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BatchDetailResponse {
    #[serde(flatten)]
    pub summary: BatchSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle: Option<Vehicle>,
    pub parcel_count: i64,
}

/// Request body for creating a batch
#[derive(Debug, Deserialize)]
pub struct CreateBatchBody {
    pub name: String,
    pub size_class: SizeClass,
    pub vehicle_id: Option<i64>,
}

/// Request body for editing a batch. Absent fields are left unchanged.
#[derive(Debug, Deserialize)]
pub struct EditBatchBody {
    pub name: Option<String>,
    pub max_volume: Option<f64>,
    pub vehicle_id: Option<i64>,
    /// Unbind the current vehicle
    #[serde(default)]
    pub clear_vehicle: bool,
}

#[derive(Debug, Deserialize)]
pub struct AssignVehicleBody {
    pub vehicle_id: i64,
}

#[derive(Debug, Serialize)]
pub struct BatchParcelsResponse {
    pub batch_id: i64,
    pub parcels: Vec<Parcel>,
}

#[derive(Debug, Serialize)]
pub struct BulkFinalizeResponse {
    /// Batches that were `Full` and are now `Completed`
    pub finalized: Vec<BatchChange>,
}

#[derive(Debug, Serialize)]
pub struct BulkDeleteBatchesResponse {
    pub deleted: Vec<DeletedBatch>,
}

// ============================================================================
// Queries
// ============================================================================

pub async fn list_batches(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListBatchesParams>,
) -> ApiResult<Json<ListBatchesResponse>> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = BatchFilter::new();
    if let Some(search) = params.search.filter(|s| !s.trim().is_empty()) {
        filter = filter.with_search(search.trim());
    }
    if let Some(ref statuses) = params.status {
        for status in statuses.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let status: BatchStatus = status.parse().map_err(|e| bad_request(format!("{}", e)))?;
            filter = filter.with_status(status);
        }
    }
    if let Some(ref size_class) = params.size_class {
        let size_class: SizeClass = size_class
            .parse()
            .map_err(|e| bad_request(format!("{}", e)))?;
        filter = filter.with_size_class(size_class);
    }

    let store = state.dispatcher().store();
    let total = store.count_batches(&filter).map_err(dispatch_error)?;
    let batches = store
        .list_batches(&filter.with_limit(limit).with_offset(offset))
        .map_err(dispatch_error)?;

    Ok(Json(ListBatchesResponse {
        batches: batches.into_iter().map(BatchSummary::from).collect(),
        total,
        limit,
        offset,
    }))
}

pub async fn get_batch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<BatchDetailResponse>> {
    let store = state.dispatcher().store();
    let batch = store
        .get_batch(id)
        .and_then(|b| b.ok_or_else(|| DispatchError::batch_not_found(id)))
        .map_err(dispatch_error)?;

    let vehicle = match batch.vehicle_id {
        Some(vehicle_id) => store.get_vehicle(vehicle_id).map_err(dispatch_error)?,
        None => None,
    };
    let parcel_count = store
        .count_parcels(&ParcelFilter::new().with_batch(id))
        .map_err(dispatch_error)?;

    Ok(Json(BatchDetailResponse {
        summary: batch.into(),
        vehicle,
        parcel_count,
    }))
}

/// Parcels that belong to a batch
pub async fn list_batch_parcels(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<BatchParcelsResponse>> {
    let store = state.dispatcher().store();
    if store.get_batch(id).map_err(dispatch_error)?.is_none() {
        return Err(dispatch_error(DispatchError::batch_not_found(id)));
    }

    let parcels = store
        .list_parcels(&ParcelFilter::new().with_batch(id).with_limit(i64::MAX))
        .map_err(dispatch_error)?;

    Ok(Json(BatchParcelsResponse {
        batch_id: id,
        parcels,
    }))
}

// ============================================================================
// Mutations
// ============================================================================

pub async fn create_batch(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Json(body): Json<CreateBatchBody>,
) -> ApiResult<(StatusCode, Json<BatchChange>)> {
    let request = CreateBatchRequest {
        name: body.name,
        size_class: body.size_class,
        vehicle_id: body.vehicle_id,
    };

    let change = state
        .dispatcher()
        .admin(&identity)
        .and_then(|ops| ops.create_batch(request))
        .map_err(dispatch_error)?;

    Ok((StatusCode::CREATED, Json(change)))
}

pub async fn edit_batch(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<EditBatchBody>,
) -> ApiResult<Json<BatchChange>> {
    let vehicle = match (body.vehicle_id, body.clear_vehicle) {
        (Some(_), true) => {
            return Err(bad_request(
                "vehicle_id and clear_vehicle are mutually exclusive",
            ))
        }
        (Some(vehicle_id), false) => VehicleChange::Set(vehicle_id),
        (None, true) => VehicleChange::Clear,
        (None, false) => VehicleChange::Keep,
    };
    let request = EditBatchRequest {
        name: body.name,
        max_volume: body.max_volume,
        vehicle,
    };

    state
        .dispatcher()
        .admin(&identity)
        .and_then(|ops| ops.edit_batch(id, request))
        .map(Json)
        .map_err(dispatch_error)
}

pub async fn assign_vehicle(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<AssignVehicleBody>,
) -> ApiResult<Json<BatchChange>> {
    state
        .dispatcher()
        .admin(&identity)
        .and_then(|ops| ops.assign_vehicle(id, body.vehicle_id))
        .map(Json)
        .map_err(dispatch_error)
}

/// Mark a batch ready for its driver
pub async fn dispatch_batch(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<BatchChange>> {
    state
        .dispatcher()
        .admin(&identity)
        .and_then(|ops| ops.dispatch(id))
        .map(Json)
        .map_err(dispatch_error)
}

/// Close a batch immediately, whatever its status
pub async fn finalize_batch(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<BatchChange>> {
    state
        .dispatcher()
        .admin(&identity)
        .and_then(|ops| ops.force_finalize(id))
        .map(Json)
        .map_err(dispatch_error)
}

pub async fn bulk_finalize(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Json(body): Json<BulkIdsBody>,
) -> ApiResult<Json<BulkFinalizeResponse>> {
    if body.ids.is_empty() {
        return Err(bad_request("No batch ids given"));
    }
    let finalized = state
        .dispatcher()
        .admin(&identity)
        .and_then(|ops| ops.finalize_full(&body.ids))
        .map_err(dispatch_error)?;
    Ok(Json(BulkFinalizeResponse { finalized }))
}

/// Delete batches together with their parcels
pub async fn bulk_delete(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Json(body): Json<BulkIdsBody>,
) -> ApiResult<Json<BulkDeleteBatchesResponse>> {
    if body.ids.is_empty() {
        return Err(bad_request("No batch ids given"));
    }
    let deleted = state
        .dispatcher()
        .admin(&identity)
        .and_then(|ops| ops.delete_batches(&body.ids))
        .map_err(dispatch_error)?;
    Ok(Json(BulkDeleteBatchesResponse { deleted }))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
