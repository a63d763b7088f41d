use axum::{extract::State, Json};
use std::sync::Arc;
use parcelhub_core::DispatchStats;

use super::error::{dispatch_error, ApiResult};
use crate::state::AppState;

/// Intake and batch statistics for the analysis view
pub async fn get_stats(State(state): State<Arc<AppState>>) -> ApiResult<Json<DispatchStats>> {
    state
        .dispatcher()
        .store()
        .stats()
        .map(Json)
        .map_err(dispatch_error)
}
