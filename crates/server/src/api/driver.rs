//! Driver mission endpoints. Drivers only see and move batches bound to the
//! vehicles registered under their user name.

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use parcelhub_core::dispatch::Missions;
use parcelhub_core::BatchChange;

use super::error::{dispatch_error, ApiResult};
use super::middleware::AuthUser;
use crate::state::AppState;

pub async fn list_missions(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
) -> ApiResult<Json<Missions>> {
    state
        .dispatcher()
        .driver(&identity)
        .and_then(|ops| ops.missions())
        .map(Json)
        .map_err(dispatch_error)
}

/// Leave with a `Ready` batch
pub async fn start_mission(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<BatchChange>> {
    state
        .dispatcher()
        .driver(&identity)
        .and_then(|ops| ops.start_mission(id))
        .map(Json)
        .map_err(dispatch_error)
}

/// Report a `Transporting` batch as delivered
pub async fn complete_mission(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<BatchChange>> {
    state
        .dispatcher()
        .driver(&identity)
        .and_then(|ops| ops.complete_mission(id))
        .map(Json)
        .map_err(dispatch_error)
}
